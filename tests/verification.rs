mod common;

use common::{assemble, descriptor, test_class, verify_constructor, verify_static};
use jvmasm::jvm::code::opcodes::*;
use jvmasm::jvm::code::{AssemblerSettings, Comparison, ConstValue, InvokeType, TypeKind};
use jvmasm::jvm::*;

/// Assemble and verify the body of a static method, returning the verifier's complaint
fn verifier_error(
    method_descriptor: MethodDescriptor,
    build: impl FnOnce(&mut jvmasm::jvm::code::Assembler) -> Result<(), Error>,
) -> VerifyError {
    let (constants, code) = assemble(AssemblerSettings::default(), build).unwrap();
    match verify_static(&constants, &code, &method_descriptor) {
        Err(Error::Verification(err)) => err,
        other => panic!("expected a verification error, got {:?}", other),
    }
}

#[test]
fn incompatible_stacks_at_merge_point() {
    let err = verifier_error(
        descriptor(vec![FieldType::int()], Some(FieldType::int())),
        |asm| {
            asm.load(TypeKind::Int, 0)?;
            asm.branch_if_zero(TypeKind::Int, Comparison::Eq, "float")?;
            asm.push_const(TypeKind::Int, ConstValue::Int(1))?;
            asm.goto("join")?;
            asm.label("float")?;
            asm.push_const(TypeKind::Float, ConstValue::Float(1.0))?;
            asm.label("join")?;
            asm.return_(TypeKind::Int)
        },
    );
    assert!(matches!(
        err.kind,
        VerifierErrorKind::IncompatibleFrames { target: 9, .. }
    ));
    assert_eq!(err.pc, Some(8));

    // The listing uses the assembler's labels and marks the failing instruction
    assert!(err.listing.contains("    float:"));
    assert!(err.listing.contains(">>     8: fconst_1"));
    assert!(err.to_string().contains("verification failed at 8"));
}

#[test]
fn local_set_on_one_path_only() {
    let err = verifier_error(descriptor(vec![FieldType::int()], None), |asm| {
        asm.load(TypeKind::Int, 0)?;
        asm.branch_if_zero(TypeKind::Int, Comparison::Eq, "skip")?;
        asm.push_const(TypeKind::Int, ConstValue::Int(1))?;
        asm.store(TypeKind::Int, 1)?;
        asm.label("skip")?;
        asm.return_(TypeKind::Void)
    });
    assert!(matches!(
        err.kind,
        VerifierErrorKind::IncompatibleFrames { target: 6, .. }
    ));
    assert_eq!(err.pc, Some(5));
}

#[test]
fn unreachable_code_is_rejected() {
    let err = verifier_error(descriptor(vec![], None), |asm| {
        asm.return_(TypeKind::Void)?;
        asm.nop();
        Ok(())
    });
    assert_eq!(err.kind, VerifierErrorKind::NotCovered { start: 1, end: 2 });
}

#[test]
fn dead_code_between_reachable_code_is_rejected() {
    let err = verifier_error(descriptor(vec![], None), |asm| {
        asm.goto("live")?;
        asm.nop();
        asm.nop();
        asm.label("live")?;
        asm.return_(TypeKind::Void)
    });
    assert_eq!(err.kind, VerifierErrorKind::NotCovered { start: 3, end: 5 });
    assert_eq!(err.pc, Some(3));
}

#[test]
fn falling_off_the_end_is_rejected() {
    let err = verifier_error(descriptor(vec![], None), |asm| {
        asm.push_const(TypeKind::Int, ConstValue::Int(0))?;
        asm.pop(TypeKind::Int)
    });
    assert_eq!(err.kind, VerifierErrorKind::FallsOffEnd);
    assert_eq!(err.pc, Some(1));
}

#[test]
fn unset_locals_are_rejected() {
    let err = verifier_error(descriptor(vec![], Some(FieldType::int())), |asm| {
        asm.load(TypeKind::Int, 0)?;
        asm.return_(TypeKind::Int)
    });
    assert_eq!(err.kind, VerifierErrorKind::UninitializedLocal(0));
}

#[test]
fn dup2_x2_checks_value_categories() {
    // Two category 1 values over a category 2 value and a category 1 value fit no form
    let err = verifier_error(descriptor(vec![], None), |asm| {
        asm.push_const(TypeKind::Int, ConstValue::Int(0))?;
        asm.push_const(TypeKind::Long, ConstValue::Long(0))?;
        asm.push_const(TypeKind::Int, ConstValue::Int(0))?;
        asm.simple(DUP2_X2)?;
        asm.return_(TypeKind::Void)
    });
    assert_eq!(err.kind, VerifierErrorKind::InvalidWidth(2));
    assert_eq!(err.pc, Some(3));

    let (constants, code) = assemble(AssemblerSettings::default(), |asm| {
        for _ in 0..4 {
            asm.push_const(TypeKind::Int, ConstValue::Int(0))?;
        }
        asm.simple(DUP2_X2)?;
        for _ in 0..3 {
            asm.simple(POP2)?;
        }
        asm.return_(TypeKind::Void)
    })
    .unwrap();
    let limits = verify_static(&constants, &code, &descriptor(vec![], None)).unwrap();
    assert_eq!(limits.max_stack, 6);
}

#[test]
fn subroutines() {
    let (constants, code) = assemble(AssemblerSettings::default(), |asm| {
        asm.jsr("finally")?;
        asm.return_(TypeKind::Void)?;
        asm.label("finally")?;
        asm.store(TypeKind::ReturnAddress, 0)?;
        asm.ret(0)
    })
    .unwrap();
    assert_eq!(code.code, vec![JSR, 0, 4, RETURN, ASTORE_0, RET, 0]);

    let limits = verify_static(&constants, &code, &descriptor(vec![], None)).unwrap();
    assert_eq!(limits.max_stack, 1);
    assert_eq!(limits.max_locals, 1);
}

#[test]
fn exception_handlers_start_with_the_exception() {
    let (constants, code) = assemble(AssemblerSettings::default(), |asm| {
        asm.exception_handler("try", "end", "catch", None)?;
        asm.label("try")?;
        asm.push_const(TypeKind::Int, ConstValue::Int(1))?;
        asm.pop(TypeKind::Int)?;
        asm.label("end")?;
        asm.return_(TypeKind::Void)?;
        asm.label("catch")?;
        asm.athrow();
        Ok(())
    })
    .unwrap();
    assert_eq!(code.code, vec![ICONST_1, POP, RETURN, ATHROW]);

    let limits = verify_static(&constants, &code, &descriptor(vec![], None)).unwrap();
    assert_eq!(limits.max_stack, 1);
}

#[test]
fn objects_must_be_initialized_before_use() {
    let object_init = MethodRef::new(
        BinaryName::OBJECT,
        UnqualifiedName::INIT,
        descriptor(vec![], None),
    );
    let returns_object = || descriptor(vec![], Some(FieldType::object(BinaryName::OBJECT)));

    let (constants, code) = assemble(AssemblerSettings::default(), |asm| {
        asm.new_object(&RefType::OBJECT)?;
        asm.dup(TypeKind::Reference)?;
        asm.invoke(InvokeType::Special, &object_init)?;
        asm.return_(TypeKind::Reference)
    })
    .unwrap();
    let limits = verify_static(&constants, &code, &returns_object()).unwrap();
    assert_eq!(limits.max_stack, 2);

    let err = verifier_error(returns_object(), |asm| {
        asm.new_object(&RefType::OBJECT)?;
        asm.return_(TypeKind::Reference)
    });
    assert!(matches!(err.kind, VerifierErrorKind::InvalidType { .. }));
    assert_eq!(err.pc, Some(3));
}

fn constructor_error(
    method_descriptor: MethodDescriptor,
    build: impl FnOnce(&mut jvmasm::jvm::code::Assembler) -> Result<(), Error>,
) -> VerifyError {
    let (constants, code) = assemble(AssemblerSettings::default(), build).unwrap();
    match verify_constructor(&constants, &code, &method_descriptor) {
        Err(Error::Verification(err)) => err,
        other => panic!("expected a verification error, got {:?}", other),
    }
}

#[test]
fn constructor_must_call_super_on_every_path() {
    let object_init = MethodRef::new(
        BinaryName::OBJECT,
        UnqualifiedName::INIT,
        descriptor(vec![], None),
    );
    let err = constructor_error(descriptor(vec![FieldType::int()], None), |asm| {
        asm.load(TypeKind::Int, 1)?;
        asm.branch_if_zero(TypeKind::Int, Comparison::Eq, "skip")?;
        asm.load(TypeKind::Reference, 0)?;
        asm.invoke(InvokeType::Special, &object_init)?;
        asm.goto("join")?;
        asm.label("skip")?;
        asm.nop();
        asm.goto("join")?;
        asm.label("join")?;
        asm.return_(TypeKind::Void)
    });
    assert!(matches!(
        err.kind,
        VerifierErrorKind::IncompatibleFrames { target: 15, .. }
    ));
    assert_eq!(err.pc, Some(12));
}

#[test]
fn constructor_delegates_to_own_class_or_superclass() {
    let this_init = MethodRef::new(
        test_class(),
        UnqualifiedName::INIT,
        descriptor(vec![FieldType::int()], None),
    );
    let (constants, code) = assemble(AssemblerSettings::default(), |asm| {
        asm.load(TypeKind::Reference, 0)?;
        asm.push_const(TypeKind::Int, ConstValue::Int(1))?;
        asm.invoke(InvokeType::Special, &this_init)?;
        asm.return_(TypeKind::Void)
    })
    .unwrap();
    let limits = verify_constructor(&constants, &code, &descriptor(vec![], None)).unwrap();
    assert_eq!(limits.max_stack, 2);

    // `me/alec/Test` extends `java/lang/Object`, not `java/lang/String`
    let string_init = MethodRef::new(
        BinaryName::STRING,
        UnqualifiedName::INIT,
        descriptor(vec![], None),
    );
    let err = constructor_error(descriptor(vec![], None), |asm| {
        asm.load(TypeKind::Reference, 0)?;
        asm.invoke(InvokeType::Special, &string_init)?;
        asm.return_(TypeKind::Void)
    });
    assert!(matches!(err.kind, VerifierErrorKind::InvalidType { .. }));
    assert_eq!(err.pc, Some(1));
}
