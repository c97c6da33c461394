#![allow(dead_code)]

use jvmasm::jvm::class_file::ConstantsPool;
use jvmasm::jvm::code::{AssembledCode, Assembler, AssemblerSettings};
use jvmasm::jvm::verifier::{MethodBody, VerifiedCode, Verifier};
use jvmasm::jvm::*;

/// Name of the class every test method belongs to
pub fn test_class() -> BinaryName {
    BinaryName::from_string(String::from("me/alec/Test")).unwrap()
}

/// Assemble a method body into a fresh constants pool
pub fn assemble(
    settings: AssemblerSettings,
    build: impl FnOnce(&mut Assembler) -> Result<(), Error>,
) -> Result<(ConstantsPool, AssembledCode), Error> {
    let mut constants = ConstantsPool::new();
    let mut asm = Assembler::new(&mut constants, settings);
    build(&mut asm)?;
    let code = asm.finish()?;
    Ok((constants, code))
}

/// Verify the code as the body of a static method
pub fn verify_static(
    constants: &ConstantsPool,
    code: &AssembledCode,
    descriptor: &MethodDescriptor,
) -> Result<VerifiedCode, Error> {
    let name = UnqualifiedName::from_string(String::from("test")).unwrap();
    verify_method(constants, code, true, &name, descriptor)
}

/// Verify the code as a constructor of the test class
pub fn verify_constructor(
    constants: &ConstantsPool,
    code: &AssembledCode,
    descriptor: &MethodDescriptor,
) -> Result<VerifiedCode, Error> {
    verify_method(constants, code, false, &UnqualifiedName::INIT, descriptor)
}

fn verify_method(
    constants: &ConstantsPool,
    code: &AssembledCode,
    is_static: bool,
    name: &UnqualifiedName,
    descriptor: &MethodDescriptor,
) -> Result<VerifiedCode, Error> {
    let hierarchy = ClassHierarchy::with_java_lang();
    hierarchy.add(ClassInfo::class(test_class(), BinaryName::OBJECT));
    let symbols = PoolSymbols::new(constants, &hierarchy);
    let class = test_class();
    let body = MethodBody {
        class: &class,
        is_static,
        name,
        descriptor,
        code: &code.code,
        exception_table: &code.exception_table,
        labels: Some(&code.labels),
    };
    Verifier::verify(&body, &symbols)
}

pub fn descriptor(parameters: Vec<FieldType>, return_type: Option<FieldType>) -> MethodDescriptor {
    MethodDescriptor {
        parameters,
        return_type,
    }
}
