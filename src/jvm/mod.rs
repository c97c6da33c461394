//! Assemble and verify JVM classes
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Max {
//!     public static int max(int a, int b) {
//!         if (a < b) {
//!             return b;
//!         }
//!         return a;
//!     }
//! }
//! ```
//!
//! Generating an analogous class file can be done as follows:
//!
//! ```
//! use jvmasm::jvm::code::{Comparison, TypeKind};
//! use jvmasm::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! // Declare the class, with the core `java.lang` types available to the verifier
//! let mut class = ClassBuilder::new(
//!     ClassAccessFlags::PUBLIC,
//!     BinaryName::from_string(String::from("me/alec/Max")).unwrap(),
//!     BinaryName::OBJECT,
//!     vec![],
//!     ClassHierarchy::with_java_lang(),
//! )?;
//!
//! // Assemble the method body (labels can be used before they are placed)
//! let mut code = class.assembler();
//! code.load(TypeKind::Int, 0)?;
//! code.load(TypeKind::Int, 1)?;
//! code.branch_if_cmp(TypeKind::Int, Comparison::Lt, "second")?;
//! code.load(TypeKind::Int, 0)?;
//! code.return_(TypeKind::Int)?;
//! code.label("second")?;
//! code.load(TypeKind::Int, 1)?;
//! code.return_(TypeKind::Int)?;
//! let code = code.finish()?;
//!
//! // Adding the method verifies it and computes its maximum stack depth
//! let limits = class.add_method(
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//!     &UnqualifiedName::from_string(String::from("max")).unwrap(),
//!     &MethodDescriptor {
//!         parameters: vec![FieldType::int(), FieldType::int()],
//!         return_type: Some(FieldType::int()),
//!     },
//!     code,
//! )?;
//! assert_eq!(limits.max_stack, 2);
//!
//! // Finally, encode the class into bytes
//! let class_bytes: Vec<u8> = class.result().to_bytes()?;
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
mod class_builder;
pub mod class_file;
mod class_hierarchy;
pub mod code;
mod descriptors;
mod errors;
mod names;
mod symbols;
pub mod verifier;

pub use access_flags::*;
pub use class_builder::*;
pub use class_hierarchy::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use symbols::*;
