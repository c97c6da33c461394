use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`], used when reading class files back in
///
/// Truncated input surfaces as [`Error::IoError`] with kind `UnexpectedEof`.
pub trait Deserialize: Sized {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error>;
}

macro_rules! number_binary_format {
    ($num:ty, $write:ident, $read:ident) => {
        impl Serialize for $num {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }

        impl Deserialize for $num {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
                Ok(reader.$read::<BigEndian>()?)
            }
        }
    };
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        Ok(reader.read_u8()?)
    }
}

number_binary_format!(u16, write_u16, read_u16);
number_binary_format!(u32, write_u32, read_u32);
number_binary_format!(i16, write_i16, read_i16);
number_binary_format!(i32, write_i32, read_i32);
number_binary_format!(i64, write_i64, read_i64);
number_binary_format!(f32, write_f32, read_f32);
number_binary_format!(f64, write_f64, read_f64);

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        (0..len).map(|_| A::deserialize(reader)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numbers_are_big_endian() {
        let mut buffer = vec![];
        0x1234u16.serialize(&mut buffer).unwrap();
        (-2i32).serialize(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0x12, 0x34, 0xFF, 0xFF, 0xFF, 0xFE]);

        let mut reader = &buffer[..];
        assert_eq!(u16::deserialize(&mut reader).unwrap(), 0x1234);
        assert_eq!(i32::deserialize(&mut reader).unwrap(), -2);
        assert!(u8::deserialize(&mut reader).is_err());
    }

    #[test]
    fn vectors_are_length_prefixed() {
        let mut buffer = vec![];
        vec![7u16, 8u16].serialize(&mut buffer).unwrap();
        assert_eq!(buffer, vec![0, 2, 0, 7, 0, 8]);
        let decoded: Vec<u16> = Vec::deserialize(&mut &buffer[..]).unwrap();
        assert_eq!(decoded, vec![7, 8]);
    }
}
