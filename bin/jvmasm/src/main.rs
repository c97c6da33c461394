use jvmasm::jvm::class_file::{ClassFile, Code};
use jvmasm::jvm::code::Disassembler;
use jvmasm::jvm::verifier::{MethodBody, Verifier};
use jvmasm::jvm::*;

use clap::{value_parser, Arg, ArgAction, Command};
use std::fs;
use std::process;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("JVM class disassembler")
        .version("0.1.0")
        .about("Disassemble (and optionally verify) the methods in JVM class files")
        .arg(
            Arg::new("verify")
                .long("verify")
                .action(ArgAction::SetTrue)
                .help("Run the verifier on every method body"),
        )
        .arg(
            Arg::new("no-labels")
                .long("no-labels")
                .action(ArgAction::SetTrue)
                .help("Show branch targets as raw offsets instead of labels"),
        )
        .arg(
            Arg::new("highlight")
                .long("highlight")
                .value_name("PC")
                .value_parser(value_parser!(usize))
                .help("Mark the instruction at this offset in every listing"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Class files to read")
                .required(true)
                .num_args(1..)
                .index(1),
        )
        .get_matches();

    let verify = matches.get_flag("verify");
    let labels = !matches.get_flag("no-labels");
    let highlight = matches.get_one::<usize>("highlight").copied();

    let mut failures = 0;
    for input in matches.get_many::<String>("INPUT").into_iter().flatten() {
        log::info!("Reading '{}'", input);
        let bytes = fs::read(input)?;
        let class_file = ClassFile::parse(&bytes)?;
        failures += print_class(&class_file, verify, labels, highlight)?;
    }

    if failures > 0 {
        log::error!("{} method(s) failed verification", failures);
        process::exit(1);
    }
    Ok(())
}

/// Print every method in a class, returning the number that failed verification
fn print_class(
    class_file: &ClassFile,
    verify: bool,
    labels: bool,
    highlight: Option<usize>,
) -> Result<usize, Error> {
    let class_name = match class_file.class_name()? {
        RefType::Object(name) => name,
        other => return Err(Error::MalformedName(other.to_string())),
    };

    // Make this class known to the verifier
    let hierarchy = ClassHierarchy::with_java_lang();
    let superclass = match class_file.super_class {
        Some(index) => match class_file.constants.class(index.index())? {
            RefType::Object(name) => name,
            other => return Err(Error::MalformedName(other.to_string())),
        },
        None => BinaryName::OBJECT,
    };
    let mut interfaces = vec![];
    for interface in &class_file.interfaces {
        if let RefType::Object(name) = class_file.constants.class(interface.index())? {
            interfaces.push(name);
        }
    }
    let info = if class_file.access_flags.contains(ClassAccessFlags::INTERFACE) {
        ClassInfo::interface(class_name.clone())
    } else {
        ClassInfo::class(class_name.clone(), superclass)
    };
    hierarchy.add(info.implementing(interfaces));
    let symbols = PoolSymbols::new(&class_file.constants, &hierarchy);

    println!("class {}", class_name);
    let mut failures = 0;
    for method in &class_file.methods {
        let (name, descriptor) = class_file.method_signature(method)?;
        println!();
        println!("  {}{}", name, descriptor);

        let mut code = None;
        for attribute in &method.attributes {
            if let Some(decoded) = attribute.decode::<Code>(&class_file.constants)? {
                code = Some(decoded);
            }
        }
        let code = match code {
            Some(code) => code,
            None => {
                println!("    (no code)");
                continue;
            }
        };
        println!(
            "    max stack {}, max locals {}",
            code.max_stack, code.max_locals
        );

        let disassembler = Disassembler::new(&code.code_array.0)
            .with_symbols(&symbols)
            .highlight(highlight);
        let disassembler = if labels {
            disassembler.with_synthetic_labels()
        } else {
            disassembler
        };
        print!("{}", disassembler);

        if verify {
            let descriptor = MethodDescriptor::parse(descriptor)?;
            let body = MethodBody {
                class: &class_name,
                is_static: method.access_flags.contains(MethodAccessFlags::STATIC),
                name: &name,
                descriptor: &descriptor,
                code: &code.code_array.0,
                exception_table: &code.exception_table,
                labels: None,
            };
            match Verifier::verify(&body, &symbols) {
                Ok(limits) => {
                    println!(
                        "    verified (max stack {}, max locals {})",
                        limits.max_stack, limits.max_locals
                    );
                    if limits.max_stack > code.max_stack || limits.max_locals > code.max_locals {
                        log::warn!("{}.{} declares limits that are too small", class_name, name);
                    }
                }
                Err(Error::Verification(err)) => {
                    println!("    verification failed: {}", err.kind);
                    failures += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
    Ok(failures)
}
