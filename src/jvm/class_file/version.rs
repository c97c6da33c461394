use crate::jvm::class_file::{Deserialize, Serialize};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file format version
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.1-200-B.2
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const JAVA1_4: Version = Version { major: 48, minor: 0 };

    /// Last version checked purely by type inference, and the default for generated classes
    pub const JAVA5: Version = Version { major: 49, minor: 0 };

    /// First version with stack map frames (type inference is still a fallback)
    pub const JAVA6: Version = Version { major: 50, minor: 0 };

    /// Whether the `jsr` and `ret` instructions may appear in methods
    pub fn allows_subroutines(&self) -> bool {
        *self <= Version::JAVA6
    }
}

impl Default for Version {
    fn default() -> Version {
        Version::JAVA5
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor.serialize(writer)?;
        self.major.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let minor = u16::deserialize(reader)?;
        let major = u16::deserialize(reader)?;
        Ok(Version { major, minor })
    }
}
