use crate::jvm::class_file::{Attribute, AttributeLike, Deserialize, Serialize};
use crate::jvm::{Error, FieldRef, MethodRef, Name, RefType, RenderDescriptor};
use crate::util::{Offset, Width, WidthVec};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;

/// Class file constants pool
///
/// The pool is append only. Every `get_*` method returns the index of an existing equal constant
/// if there is one, and otherwise pushes a new constant.
pub struct ConstantsPool {
    constants: WidthVec<Constant>,

    utf8s: HashMap<String, Utf8ConstantIndex>,
    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: WidthVec::new_starting_at(Offset(1)),
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            name_and_types: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
        }
    }

    /// Rebuild a pool from constants read out of a class file
    ///
    /// The deduplication tables are repopulated so that the pool can keep growing.
    pub fn from_constants(constants: WidthVec<Constant>) -> ConstantsPool {
        let mut pool = ConstantsPool::new();
        for (offset, constant) in constants.iter() {
            let index = ConstantIndex(offset.0 as u16);
            match constant {
                Constant::Utf8(s) => {
                    pool.utf8s.entry(s.clone()).or_insert(Utf8ConstantIndex(index));
                }
                Constant::Class(name) => {
                    pool.classes.entry(*name).or_insert(ClassConstantIndex(index));
                }
                Constant::String(utf8) => {
                    pool.strings.entry(*utf8).or_insert(StringConstantIndex(index));
                }
                Constant::Integer(i) => {
                    pool.integers.entry(*i).or_insert(index);
                }
                Constant::Float(x) => {
                    pool.floats.entry(x.to_bits()).or_insert(index);
                }
                Constant::Long(l) => {
                    pool.longs.entry(*l).or_insert(index);
                }
                Constant::Double(d) => {
                    pool.doubles.entry(d.to_bits()).or_insert(index);
                }
                Constant::NameAndType { name, descriptor } => {
                    pool.name_and_types
                        .entry((*name, *descriptor))
                        .or_insert(NameAndTypeConstantIndex(index));
                }
                Constant::FieldRef(class, name_and_type) => {
                    pool.fieldrefs
                        .entry((*class, *name_and_type))
                        .or_insert(FieldRefConstantIndex(index));
                }
                Constant::MethodRef {
                    class,
                    name_and_type,
                    is_interface,
                } => {
                    pool.methodrefs
                        .entry((*class, *name_and_type, *is_interface))
                        .or_insert(MethodRefConstantIndex(index));
                }
                Constant::MethodHandle { .. }
                | Constant::MethodType { .. }
                | Constant::InvokeDynamic { .. } => (),
            }
        }
        pool.constants = constants;
        pool
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }
        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Number of slots in the pool, as written in the class file header (one more than the
    /// largest index)
    pub fn count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    pub fn constants(&self) -> &WidthVec<Constant> {
        &self.constants
    }

    /// Get or insert a utf8 constant
    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, Error> {
        if let Some(idx) = self.utf8s.get(utf8) {
            return Ok(*idx);
        }
        let idx = Utf8ConstantIndex(self.push_constant(Constant::Utf8(utf8.to_owned()))?);
        self.utf8s.insert(utf8.to_owned(), idx);
        Ok(idx)
    }

    /// Get or insert a class constant (array types are stored by descriptor)
    pub fn get_class(&mut self, class: &RefType) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(&class.class_constant_name())?;
        if let Some(idx) = self.classes.get(&name) {
            return Ok(*idx);
        }
        let idx = ClassConstantIndex(self.push_constant(Constant::Class(name))?);
        self.classes.insert(name, idx);
        Ok(idx)
    }

    /// Get or insert a string constant
    pub fn get_string(&mut self, string: &str) -> Result<StringConstantIndex, Error> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            return Ok(*idx);
        }
        let idx = StringConstantIndex(self.push_constant(Constant::String(utf8))?);
        self.strings.insert(utf8, idx);
        Ok(idx)
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.integers.get(&integer) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Integer(integer))?;
        self.integers.insert(integer, idx);
        Ok(idx)
    }

    /// Floats are deduplicated by bit pattern (so `0.0` and `-0.0` are different constants)
    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.floats.get(&float.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Float(float))?;
        self.floats.insert(float.to_bits(), idx);
        Ok(idx)
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.longs.get(&long) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Long(long))?;
        self.longs.insert(long, idx);
        Ok(idx)
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.doubles.get(&double.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Double(double))?;
        self.doubles.insert(double.to_bits(), idx);
        Ok(idx)
    }

    /// Get or insert a name & type constant
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let key = (self.get_utf8(name)?, self.get_utf8(descriptor)?);
        if let Some(idx) = self.name_and_types.get(&key) {
            return Ok(*idx);
        }
        let constant = Constant::NameAndType {
            name: key.0,
            descriptor: key.1,
        };
        let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
        self.name_and_types.insert(key, idx);
        Ok(idx)
    }

    pub fn get_field_ref(&mut self, field: &FieldRef) -> Result<FieldRefConstantIndex, Error> {
        let class = self.get_class(&RefType::Object(field.class.clone()))?;
        let name_and_type =
            self.get_name_and_type(field.name.as_str(), &field.descriptor.render())?;
        let key = (class, name_and_type);
        if let Some(idx) = self.fieldrefs.get(&key) {
            return Ok(*idx);
        }
        let idx = FieldRefConstantIndex(self.push_constant(Constant::FieldRef(class, name_and_type))?);
        self.fieldrefs.insert(key, idx);
        Ok(idx)
    }

    pub fn get_method_ref(&mut self, method: &MethodRef) -> Result<MethodRefConstantIndex, Error> {
        let class = self.get_class(&RefType::Object(method.class.clone()))?;
        let name_and_type =
            self.get_name_and_type(method.name.as_str(), &method.descriptor.render())?;
        let key = (class, name_and_type, method.is_interface);
        if let Some(idx) = self.methodrefs.get(&key) {
            return Ok(*idx);
        }
        let constant = Constant::MethodRef {
            class,
            name_and_type,
            is_interface: method.is_interface,
        };
        let idx = MethodRefConstantIndex(self.push_constant(constant)?);
        self.methodrefs.insert(key, idx);
        Ok(idx)
    }

    /// Serialize an attribute, interning its name
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info)?;
        Ok(Attribute { name_index, info })
    }

    /// Look up the constant at an index
    pub fn get(&self, index: u16) -> Result<&Constant, Error> {
        self.constants
            .get_offset(Offset(index as usize))
            .ok_or(Error::BadConstantIndex(index))
    }

    pub fn utf8(&self, index: u16) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Utf8(string) => Ok(string),
            other => Err(unexpected(index, "a UTF-8 constant", other)),
        }
    }

    pub fn class(&self, index: u16) -> Result<RefType, Error> {
        match self.get(index)? {
            Constant::Class(name) => RefType::from_class_constant_name(self.utf8(name.0 .0)?),
            other => Err(unexpected(index, "a class constant", other)),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(name.0 .0)?, self.utf8(descriptor.0 .0)?))
            }
            other => Err(unexpected(index, "a name and type constant", other)),
        }
    }
}

impl Default for ConstantsPool {
    fn default() -> ConstantsPool {
        ConstantsPool::new()
    }
}

fn unexpected(index: u16, expected: &'static str, found: &Constant) -> Error {
    Error::UnexpectedConstant {
        index,
        expected,
        found: format!("{:?}", found),
    }
}

/// Constants as in the constant pool
///
/// Note: `Dynamic`, `Module`, and `Package` constants are not supported
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (see [`encode_modified_utf8`]).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if *is_interface { 11u8 } else { 10u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let tag = u8::deserialize(reader)?;
        Ok(match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                let mut buffer = vec![0; len as usize];
                reader.read_exact(&mut buffer)?;
                Constant::Utf8(decode_modified_utf8(&buffer)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            other => return Err(Error::UnknownConstantTag(other)),
        })
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units).iter() {
            let code = *unit as u32;
            if code != 0 && code < 0x80 {
                buffer.push(code as u8);
            } else if code < 0x800 {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    let malformed = || Error::MalformedUtf8(bytes.to_vec());
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b0) = iter.next() {
        let mut continuation = || match iter.next() {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            _ => Err(malformed()),
        };
        let unit = if b0 & 0b1000_0000 == 0 && b0 != 0 {
            b0 as u16
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            ((b0 & 0x1F) as u16) << 6 | continuation()?
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            let high = continuation()?;
            let low = continuation()?;
            ((b0 & 0x0F) as u16) << 12 | high << 6 | low
        } else {
            return Err(malformed());
        };
        units.push(unit);
    }
    String::from_utf16(&units).map_err(|_| malformed())
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn simple_ascii() {
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(decode_modified_utf8(b"hel10_World").unwrap(), "hel10_World");
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let text = "ĄǍǞǠǺȀȂȦȺӐӒऄअॲঅਅ";
        let encoded = encode_modified_utf8(text);
        assert_eq!(&encoded[..4], &[196, 132, 199, 141]);
        assert_eq!(encoded, text.as_bytes());
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), text);
    }

    #[test]
    fn supplementary_characters() {
        let encoded = encode_modified_utf8("\u{10000}\u{dffff}\u{10FFFF}");
        assert_eq!(
            encoded,
            vec![
                237, 160, 128, 237, 176, 128, 237, 172, 191, 237, 191, 191, 237, 175, 191, 237,
                191, 191
            ]
        );
        assert_eq!(
            decode_modified_utf8(&encoded).unwrap(),
            "\u{10000}\u{dffff}\u{10FFFF}"
        );
    }

    #[test]
    fn malformed_input() {
        assert!(decode_modified_utf8(&[0]).is_err());
        assert!(decode_modified_utf8(&[0b1100_0000]).is_err());
        assert!(decode_modified_utf8(&[0b1110_0000, 0b1000_0000, 0]).is_err());
        assert!(decode_modified_utf8(&[0xFF]).is_err());
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct FieldRefConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub ConstantIndex);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

macro_rules! typed_constant_index {
    ($($index:ident),*) => {
        $(
            impl From<$index> for ConstantIndex {
                fn from(index: $index) -> ConstantIndex {
                    index.0
                }
            }

            impl $index {
                /// Raw index into the pool
                pub fn index(self) -> u16 {
                    self.0 .0
                }
            }

            impl Serialize for $index {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $index {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($index(ConstantIndex::deserialize(reader)?))
                }
            }
        )*
    };
}

typed_constant_index!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex
);

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => return Err(Error::UnknownHandleKind(other)),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BinaryName, FieldType, Name, UnqualifiedName};

    #[test]
    fn constants_are_deduplicated() {
        let mut pool = ConstantsPool::new();
        let a = pool.get_utf8("hello").unwrap();
        let b = pool.get_utf8("hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.index(), 1);

        let s1 = pool.get_string("hello").unwrap();
        let s2 = pool.get_string("hello").unwrap();
        assert_eq!(s1, s2);
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        let long = pool.get_long(1 << 40).unwrap();
        let int = pool.get_integer(7).unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(int, ConstantIndex(3));
        assert!(pool.get(2).is_err());
        assert_eq!(pool.get(3).unwrap(), &Constant::Integer(7));
        assert_eq!(pool.count(), 4);
    }

    #[test]
    fn negative_zero_is_distinct() {
        let mut pool = ConstantsPool::new();
        let zero = pool.get_float(0.0).unwrap();
        let negative_zero = pool.get_float(-0.0).unwrap();
        assert_ne!(zero, negative_zero);
    }

    #[test]
    fn references_resolve_back() {
        let mut pool = ConstantsPool::new();
        let field = FieldRef::new(
            BinaryName::SYSTEM,
            UnqualifiedName::from_string(String::from("out")).unwrap(),
            FieldType::object(BinaryName::from_string(String::from("java/io/PrintStream")).unwrap()),
        );
        let idx = pool.get_field_ref(&field).unwrap();
        match pool.get(idx.index()).unwrap() {
            Constant::FieldRef(class, name_and_type) => {
                assert_eq!(pool.class(class.index()).unwrap(), RefType::Object(BinaryName::SYSTEM));
                assert_eq!(
                    pool.name_and_type(name_and_type.index()).unwrap(),
                    ("out", "Ljava/io/PrintStream;")
                );
            }
            other => panic!("unexpected constant {:?}", other),
        }
    }

    #[test]
    fn round_trip_through_bytes() {
        let mut pool = ConstantsPool::new();
        pool.get_double(2.5).unwrap();
        pool.get_class(&RefType::array(FieldType::int())).unwrap();

        let mut bytes = vec![];
        for (_, constant) in pool.constants().iter() {
            constant.serialize(&mut bytes).unwrap();
        }
        let mut reader = &bytes[..];
        let mut decoded = WidthVec::new_starting_at(Offset(1));
        while !reader.is_empty() {
            decoded.push(Constant::deserialize(&mut reader).unwrap());
        }
        let reread = ConstantsPool::from_constants(decoded);
        assert_eq!(reread.count(), pool.count());
        assert_eq!(reread.class(4).unwrap().class_constant_name(), "[I");
    }
}
