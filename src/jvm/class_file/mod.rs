//! Binary class file format
//!
//! Everything here maps closely onto the structures in [chapter 4 of the JVM specification][0].
//! Types implement [`Serialize`] for writing and [`Deserialize`] for reading back in.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod attribute;
mod class;
mod constants;
mod field;
mod method;
mod serialize;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use serialize::*;
pub use version::*;
