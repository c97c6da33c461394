use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, Constant, ConstantsPool, Deserialize, Field, Method,
    Serialize, Version,
};
use crate::jvm::{ClassAccessFlags, Error, Name, RefType, UnqualifiedName};
use crate::util::{Offset, WidthVec};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// `None` only for `java/lang/Object`
    pub super_class: Option<ClassConstantIndex>,

    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: u32 = 0xCAFE_BABE;

    /// Parse a class file from its bytes
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class = ClassFile::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::TrailingBytes {
                attribute: "ClassFile",
                remaining: reader.len(),
            });
        }
        Ok(class)
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = fs::File::create(path)?;
        self.serialize(&mut class_file)
    }

    /// Encode the class file into bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Name of this class
    pub fn class_name(&self) -> Result<RefType, Error> {
        self.constants.class(self.this_class.index())
    }

    /// Name and descriptor of a method
    pub fn method_signature(&self, method: &Method) -> Result<(UnqualifiedName, &str), Error> {
        let name = self.constants.utf8(method.name_index.index())?;
        let name = UnqualifiedName::from_string(name.to_owned()).map_err(Error::MalformedName)?;
        let descriptor = self.constants.utf8(method.descriptor_index.index())?;
        Ok((name, descriptor))
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        ClassFile::MAGIC.serialize(writer)?;
        self.version.serialize(writer)?;
        self.constants.count().serialize(writer)?;
        for (_, constant) in self.constants.constants().iter() {
            constant.serialize(writer)?;
        }
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let magic = u32::deserialize(reader)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::deserialize(reader)?;

        // Long and double entries occupy two indices, so count slots rather than entries
        let count = u16::deserialize(reader)? as usize;
        let mut constants: WidthVec<Constant> = WidthVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count {
            constants.push(Constant::deserialize(reader)?);
        }
        if constants.offset_len().0 != count {
            return Err(Error::BadConstantIndex(count as u16));
        }
        let constants = ConstantsPool::from_constants(constants);

        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = if super_class.index() == 0 {
            None
        } else {
            Some(super_class)
        };

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
