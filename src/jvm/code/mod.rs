//! Bytecode assembly and decoding
//!
//! ### Assembly
//!
//! Method bodies are emitted top to bottom through an [`Assembler`]. Branch targets are named by
//! labels which can be fixed before or after they are jumped to: every branch writes a zero
//! placeholder and registers itself with the [`LabelTable`], and [`Assembler::finish`] patches
//! all placeholders once the code array is complete.
//!
//! Operations that exist in several typed variants (`iload`/`lload`/`aload`, `iadd`/`dadd`, ...)
//! take a [`TypeKind`] and are emitted by the matching [`KindFamily`]. Families pick the most
//! compact encoding for constants and local variable indices.
//!
//! ### Decoding
//!
//! [`BytecodeReader`] decodes a finished code array one [`Instruction`] at a time. It is shared by
//! the [`Disassembler`] and by the [verifier](crate::jvm::verifier), which both need to re-read
//! the code from arbitrary offsets. The instruction set itself is described in [chapter 6 of
//! the JVM specification][0].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-6.html#jvms-6.5

mod assembler;
mod disassembler;
mod family;
mod kinds;
mod label;
pub mod opcodes;
mod reader;
mod switch;
mod writer;

pub use assembler::*;
pub use disassembler::*;
pub use family::*;
pub use kinds::*;
pub use label::*;
pub use reader::*;
pub use switch::*;
pub use writer::*;
