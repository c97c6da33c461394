use crate::jvm::class_file::{
    ClassConstantIndex, ConstantsPool, Deserialize, Serialize, Utf8ConstantIndex,
};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Only the name is interpreted eagerly: the payload stays as raw bytes until it is decoded
/// into a specific [`AttributeLike`] type.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Decode the attribute if its name matches `A::NAME`
    pub fn decode<A: AttributeLike + Deserialize>(
        &self,
        constants: &ConstantsPool,
    ) -> Result<Option<A>, Error> {
        if constants.utf8(self.name_index.index())? != A::NAME {
            return Ok(None);
        }
        let mut reader = &self.info[..];
        let decoded = A::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::TrailingBytes {
                attribute: A::NAME,
                remaining: reader.len(),
            });
        }
        Ok(Some(decoded))
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let mut info = vec![0; len as usize];
        reader.read_exact(&mut info)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally they represent
/// very different things. This trait is implemented by things which can be turned into
/// attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Code {
            max_stack: u16::deserialize(reader)?,
            max_locals: u16::deserialize(reader)?,
            code_array: BytecodeArray::deserialize(reader)?,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

/// Entry in the exception table of a `Code` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Class of exceptions caught, or `None` to catch everything
    pub catch_type: Option<ClassConstantIndex>,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        match self.catch_type {
            Some(catch_type) => catch_type.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let start_pc = BytecodeIndex::deserialize(reader)?;
        let end_pc = BytecodeIndex::deserialize(reader)?;
        let handler_pc = BytecodeIndex::deserialize(reader)?;
        let catch_type = ClassConstantIndex::deserialize(reader)?;
        Ok(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: if catch_type.index() == 0 {
                None
            } else {
                Some(catch_type)
            },
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u32).serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u32::deserialize(reader)?;
        let mut code = vec![0; len as usize];
        reader.read_exact(&mut code)?;
        Ok(BytecodeArray(code))
    }
}

/// Index into `BytecodeArray`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BytecodeIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(BytecodeIndex(u16::deserialize(reader)?))
    }
}

/// Mapping from code offsets to source lines
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u16).serialize(writer)?;
        for entry in &self.0 {
            entry.start_pc.serialize(writer)?;
            entry.line_number.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for LineNumberTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut entries = Vec::with_capacity(len as usize);
        for _ in 0..len {
            entries.push(LineNumber {
                start_pc: BytecodeIndex::deserialize(reader)?,
                line_number: u16::deserialize(reader)?,
            });
        }
        Ok(LineNumberTable(entries))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.10
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFile(pub Utf8ConstantIndex);

impl AttributeLike for SourceFile {
    const NAME: &'static str = "SourceFile";
}

impl Serialize for SourceFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for SourceFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(SourceFile(Utf8ConstantIndex::deserialize(reader)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_attribute_round_trip() {
        let mut constants = ConstantsPool::new();
        let catch_type = constants.get_class(&crate::jvm::RefType::THROWABLE).unwrap();
        let lines = constants
            .get_attribute(LineNumberTable(vec![LineNumber {
                start_pc: BytecodeIndex(0),
                line_number: 12,
            }]))
            .unwrap();
        let code = Code {
            max_stack: 1,
            max_locals: 2,
            code_array: BytecodeArray(vec![0x04, 0xac]),
            exception_table: vec![ExceptionHandler {
                start_pc: BytecodeIndex(0),
                end_pc: BytecodeIndex(1),
                handler_pc: BytecodeIndex(1),
                catch_type: Some(catch_type),
            }],
            attributes: vec![lines],
        };
        let attribute = constants.get_attribute(code.clone()).unwrap();

        let decoded: Code = attribute.decode(&constants).unwrap().unwrap();
        assert_eq!(decoded, code);
        let table: LineNumberTable = decoded.attributes[0].decode(&constants).unwrap().unwrap();
        assert_eq!(table.0[0].line_number, 12);

        // Decoding as the wrong attribute type is not an error
        let not_lines: Option<LineNumberTable> = attribute.decode(&constants).unwrap();
        assert_eq!(not_lines, None);
    }
}
