//! Bytecode verification
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as a _frame_
//! (represented using [`Frame`]).
//!
//! Knowing the frame at a point in the code makes it possible to verify that the next instruction
//! makes sense (eg. `dadd` only makes sense if the top two elements on the stack are of type
//! `double`). The "types" used in verification (represented using [`VerificationType`]) are
//! slightly augmented to take into account initialization, `null`, and subroutine return
//! addresses.
//!
//! The [`Verifier`] works by [type inference][0]: it replays the code from the method entry and
//! every exception handler, recording the frame at each branch target. Rather than merging
//! differing frames, it requires every path into a target to agree with the first one, and it
//! rejects code that no path reaches. Since nothing is inferred beyond what was recorded, the
//! classes produced only need the version 49 verifier (no `StackMapTable`).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.10.2

mod frame;
mod interpreter;
mod method;
mod types;

pub use frame::*;
pub use method::*;
pub use types::*;
