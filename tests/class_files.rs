mod common;

use jvmasm::jvm::class_file::{ClassFile, Code, Version};
use jvmasm::jvm::code::{AccessMode, ArithmeticOp, ConstValue, Disassembler, TypeKind};
use jvmasm::jvm::verifier::{MethodBody, Verifier};
use jvmasm::jvm::*;

const GREETING: &str = "h\u{e9}llo\u{0} \u{1F642}";

fn greeter() -> Result<ClassFile, Error> {
    let this_class = BinaryName::from_string(String::from("me/alec/Greeter")).unwrap();
    let mut class = ClassBuilder::new(
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class.clone(),
        BinaryName::OBJECT,
        vec![BinaryName::SERIALIZABLE],
        ClassHierarchy::with_java_lang(),
    )?;
    class.set_source_file("Greeter.java")?;

    let counter_name = UnqualifiedName::from_string(String::from("counter")).unwrap();
    class.add_field(
        FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC,
        &counter_name,
        &FieldType::long(),
    )?;
    let counter = FieldRef::new(this_class, counter_name, FieldType::long());

    let mut code = class.assembler();
    code.line_number(7)?;
    code.ldc_string(GREETING)?;
    code.return_(TypeKind::Reference)?;
    let code = code.finish()?;
    class.add_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        &UnqualifiedName::from_string(String::from("greet")).unwrap(),
        &common::descriptor(vec![], Some(FieldType::object(BinaryName::STRING))),
        code,
    )?;

    let mut code = class.assembler();
    code.access_field(&counter, true, AccessMode::Get)?;
    code.push_const(TypeKind::Long, ConstValue::Long(1_000_000_007))?;
    code.arithmetic(TypeKind::Long, ArithmeticOp::Add)?;
    code.access_field(&counter, true, AccessMode::Put)?;
    code.return_(TypeKind::Void)?;
    let code = code.finish()?;
    let limits = class.add_method(
        MethodAccessFlags::STATIC,
        &UnqualifiedName::from_string(String::from("bump")).unwrap(),
        &common::descriptor(vec![], None),
        code,
    )?;
    assert_eq!(limits.max_stack, 4);
    assert_eq!(limits.max_locals, 0);

    Ok(class.result())
}

#[test]
fn class_files_round_trip() -> Result<(), Error> {
    let bytes = greeter()?.to_bytes()?;
    assert_eq!(&bytes[..8], &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 49]);

    let class_file = ClassFile::parse(&bytes)?;
    assert_eq!(class_file.version, Version::JAVA5);
    assert_eq!(
        class_file.class_name()?,
        RefType::Object(BinaryName::from_string(String::from("me/alec/Greeter")).unwrap())
    );
    assert_eq!(class_file.interfaces.len(), 1);
    assert_eq!(class_file.fields.len(), 1);
    assert_eq!(class_file.attributes.len(), 1);

    // Re-encoding what was read back gives the same bytes
    assert_eq!(class_file.to_bytes()?, bytes);
    Ok(())
}

#[test]
fn methods_read_back_can_be_disassembled_and_verified() -> Result<(), Error> {
    let class_file = ClassFile::parse(&greeter()?.to_bytes()?)?;
    let class_name = match class_file.class_name()? {
        RefType::Object(name) => name,
        other => panic!("unexpected class name {}", other),
    };
    let hierarchy = ClassHierarchy::with_java_lang();
    hierarchy.add(ClassInfo::class(class_name.clone(), BinaryName::OBJECT));
    let symbols = PoolSymbols::new(&class_file.constants, &hierarchy);

    let mut names = vec![];
    for method in &class_file.methods {
        let (name, descriptor) = class_file.method_signature(method)?;
        let code: Code = method.attributes[0]
            .decode(&class_file.constants)?
            .expect("method should have code");

        let descriptor = MethodDescriptor::parse(descriptor)?;
        let body = MethodBody {
            class: &class_name,
            is_static: true,
            name: &name,
            descriptor: &descriptor,
            code: &code.code_array.0,
            exception_table: &code.exception_table,
            labels: None,
        };
        let limits = Verifier::verify(&body, &symbols)?;
        assert_eq!(limits.max_stack, code.max_stack);
        assert_eq!(limits.max_locals, code.max_locals);

        let listing = Disassembler::new(&code.code_array.0)
            .with_symbols(&symbols)
            .to_string();
        names.push(name.as_str().to_owned());
        if name.as_str() == "greet" {
            assert!(listing.contains("ldc #"));
            assert!(listing.contains("areturn"));
        } else {
            assert!(listing.contains("getstatic #"));
            assert!(listing.contains("me/alec/Greeter.counter"));
            assert!(listing.contains("ldc2_w #"));
        }
    }
    assert_eq!(names, vec!["greet", "bump"]);
    Ok(())
}

#[test]
fn string_constants_survive_modified_utf8() -> Result<(), Error> {
    let class_file = ClassFile::parse(&greeter()?.to_bytes()?)?;
    let hierarchy = ClassHierarchy::with_java_lang();
    let symbols = PoolSymbols::new(&class_file.constants, &hierarchy);

    let code: Code = class_file.methods[0].attributes[0]
        .decode(&class_file.constants)?
        .expect("method should have code");
    let index = code.code_array.0[1] as u16;
    assert_eq!(
        symbols.resolve(index)?,
        Symbol::Constant(LoadableConstant::String(String::from(GREETING)))
    );
    Ok(())
}
