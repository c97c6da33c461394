//! Assemble, serialize, and verify JVM bytecode
//!
//! The crate is organised around the life of a single method body:
//!
//!   1. instructions are emitted symbolically through [`jvm::code::Assembler`], with branch
//!      targets named by labels that may be fixed before or after they are referenced
//!   2. finishing the assembler patches every branch operand into the code array
//!   3. [`jvm::verifier::Verifier`] replays the finished code as an abstract interpreter,
//!      computing the maximum stack depth and rejecting ill-typed or unreachable code
//!   4. [`jvm::ClassBuilder`] collects verified methods into a [`jvm::class_file::ClassFile`]
//!
//! When verification fails, the error carries a listing rendered by
//! [`jvm::code::Disassembler`] with the offending instruction marked.

pub mod jvm;
pub mod util;
