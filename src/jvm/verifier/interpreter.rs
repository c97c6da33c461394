use super::{Frame, VerificationType};
use crate::jvm::code::opcodes::*;
use crate::jvm::code::{Instruction, Operand};
use crate::jvm::{
    BaseType, BinaryName, FieldRef, FieldType, LoadableConstant, MethodRef, Name, RefType,
    RenderDescriptor, Symbol, SymbolResolver, UnqualifiedName, VerifierErrorKind,
};
use crate::util::Width;

/// What the method being verified looks like from the inside
pub(super) struct Environment<'a> {
    pub symbols: &'a dyn SymbolResolver,
    pub this_class: &'a BinaryName,
    pub return_type: Option<&'a FieldType>,
    pub is_constructor: bool,
}

/// Where execution can go after an instruction
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Flow {
    /// Falls through to the next instruction
    Next,

    /// Falls through to the next instruction, or jumps to a target
    Branch(i64),

    /// Jumps to one of the targets
    Jump(Vec<i64>),

    /// Calls a subroutine, which eventually returns to the next instruction
    Subroutine(i64),

    /// Leaves the method or subroutine
    Stop,
}

/// Types for the `i`, `l`, `f`, `d`, `a` prefixes of typed instructions
const PREFIX_TYPES: [VerificationType; 4] = [
    VerificationType::Integer,
    VerificationType::Long,
    VerificationType::Float,
    VerificationType::Double,
];

fn prefix_type(offset: u8) -> Option<VerificationType> {
    PREFIX_TYPES.get(offset as usize).cloned()
}

impl Frame {
    /// Update the frame to reflect the effects of an instruction
    pub(super) fn execute(
        &mut self,
        insn: &Instruction,
        env: &Environment,
    ) -> Result<Flow, VerifierErrorKind> {
        use VerificationType::*;
        let symbols = env.symbols;

        match insn.opcode {
            NOP => (),
            ACONST_NULL => self.push(Null),
            ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH => self.push(Integer),
            LCONST_0 | LCONST_1 => self.push(Long),
            FCONST_0..=FCONST_2 => self.push(Float),
            DCONST_0 | DCONST_1 => self.push(Double),
            LDC | LDC_W => {
                let pushed = match resolve(env, insn)? {
                    Symbol::Class(_) => Object(RefType::CLASS),
                    Symbol::Constant(LoadableConstant::Long(_) | LoadableConstant::Double(_)) => {
                        return Err(VerifierErrorKind::InvalidWidth(2))
                    }
                    Symbol::Constant(constant) => VerificationType::from(&constant.field_type()),
                    other => return Err(unexpected_symbol("a loadable constant", &other)),
                };
                self.push(pushed);
            }
            LDC2_W => {
                let pushed = match resolve(env, insn)? {
                    Symbol::Constant(LoadableConstant::Long(_)) => Long,
                    Symbol::Constant(LoadableConstant::Double(_)) => Double,
                    Symbol::Constant(_) | Symbol::Class(_) => {
                        return Err(VerifierErrorKind::InvalidWidth(1))
                    }
                    other => return Err(unexpected_symbol("a long or double constant", &other)),
                };
                self.push(pushed);
            }

            // Loads and stores
            ILOAD..=DLOAD | ILOAD_0..=0x29 => {
                let index = local_index(insn)?;
                let offset = if insn.opcode <= DLOAD {
                    insn.opcode - ILOAD
                } else {
                    (insn.opcode - ILOAD_0) / 4
                };
                let loaded = prefix_type(offset).unwrap_or(Top);
                self.get_local_expecting(index, &loaded)?;
                self.push(loaded);
            }
            ALOAD | ALOAD_0..=0x2d => {
                let index = local_index(insn)?;
                let loaded = self.get_local(index)?.clone();
                if !loaded.is_reference() {
                    return Err(VerifierErrorKind::InvalidType {
                        expected: String::from("reference"),
                        found: loaded.to_string(),
                    });
                }
                self.push(loaded);
            }
            ISTORE..=DSTORE | ISTORE_0..=0x4a => {
                let index = local_index(insn)?;
                let offset = if insn.opcode <= DSTORE {
                    insn.opcode - ISTORE
                } else {
                    (insn.opcode - ISTORE_0) / 4
                };
                let stored = prefix_type(offset).unwrap_or(Top);
                self.pop_expecting(&stored, symbols)?;
                self.set_local(index, stored);
            }
            ASTORE | ASTORE_0..=0x4e => {
                let index = local_index(insn)?;
                let stored = self.pop()?;
                if !stored.is_reference() && stored != ReturnAddress {
                    return Err(VerifierErrorKind::InvalidType {
                        expected: String::from("reference or returnAddress"),
                        found: stored.to_string(),
                    });
                }
                self.set_local(index, stored);
            }

            // Arrays
            IALOAD | LALOAD | FALOAD | DALOAD | BALOAD | CALOAD | SALOAD => {
                self.pop_expecting(&Integer, symbols)?;
                let (accepted, loaded) = primitive_array_access(insn.opcode);
                self.pop_primitive_array(accepted)?;
                self.push(loaded);
            }
            AALOAD => {
                self.pop_expecting(&Integer, symbols)?;
                let loaded = match self.pop_array()? {
                    None => Null,
                    Some(RefType::PrimitiveArray(arr)) if arr.additional_dimensions == 0 => {
                        return Err(VerifierErrorKind::InvalidType {
                            expected: String::from("array of references"),
                            found: RefType::PrimitiveArray(arr).render(),
                        })
                    }
                    Some(array) => match array.element_type() {
                        Some(element) => VerificationType::from(&element),
                        None => return Err(VerifierErrorKind::NotArrayType(array.render())),
                    },
                };
                self.push(loaded);
            }
            IASTORE | LASTORE | FASTORE | DASTORE | BASTORE | CASTORE | SASTORE => {
                let (accepted, stored) = primitive_array_access(insn.opcode - (IASTORE - IALOAD));
                self.pop_expecting(&stored, symbols)?;
                self.pop_expecting(&Integer, symbols)?;
                self.pop_primitive_array(accepted)?;
            }
            AASTORE => {
                let stored = self.pop_reference()?;
                self.pop_expecting(&Integer, symbols)?;
                if let Some(RefType::PrimitiveArray(arr)) = self.pop_array()? {
                    if arr.additional_dimensions == 0 {
                        return Err(VerifierErrorKind::InvalidType {
                            expected: String::from("array of references"),
                            found: RefType::PrimitiveArray(arr).render(),
                        });
                    }
                }
                if let Uninitialized { .. } | UninitializedThis = stored {
                    return Err(VerifierErrorKind::InvalidType {
                        expected: String::from("initialized reference"),
                        found: stored.to_string(),
                    });
                }
            }
            ARRAYLENGTH => {
                self.pop_array()?;
                self.push(Integer);
            }

            // Stack manipulation
            POP => {
                self.pop_width(1)?;
            }
            POP2 => {
                let arg1 = self.pop()?;
                match arg1.width() {
                    // Form 1
                    1 => {
                        self.pop_width(1)?;
                    }

                    // Form 2
                    _ => (),
                }
            }
            DUP => {
                let arg1 = self.pop_width(1)?;
                self.push(arg1.clone());
                self.push(arg1);
            }
            DUP_X1 => {
                let arg1 = self.pop_width(1)?;
                let arg2 = self.pop_width(1)?;
                self.push(arg1.clone());
                self.push(arg2);
                self.push(arg1);
            }
            DUP_X2 => {
                let arg1 = self.pop_width(1)?;
                let arg2 = self.pop()?;
                match arg2.width() {
                    // Form 1
                    1 => {
                        let arg3 = self.pop_width(1)?;
                        self.push(arg1.clone());
                        self.push(arg3);
                        self.push(arg2);
                        self.push(arg1);
                    }

                    // Form 2
                    _ => {
                        self.push(arg1.clone());
                        self.push(arg2);
                        self.push(arg1);
                    }
                }
            }
            DUP2 => {
                let arg1 = self.pop()?;
                match arg1.width() {
                    // Form 1
                    1 => {
                        let arg2 = self.pop_width(1)?;
                        self.push(arg2.clone());
                        self.push(arg1.clone());
                        self.push(arg2);
                        self.push(arg1);
                    }

                    // Form 2
                    _ => {
                        self.push(arg1.clone());
                        self.push(arg1);
                    }
                }
            }
            DUP2_X1 => {
                let arg1 = self.pop()?;
                let arg2 = self.pop_width(1)?;
                match arg1.width() {
                    // Form 1
                    1 => {
                        let arg3 = self.pop_width(1)?;
                        self.push(arg2.clone());
                        self.push(arg1.clone());
                        self.push(arg3);
                        self.push(arg2);
                        self.push(arg1);
                    }

                    // Form 2
                    _ => {
                        self.push(arg1.clone());
                        self.push(arg2);
                        self.push(arg1);
                    }
                }
            }
            DUP2_X2 => {
                let arg1 = self.pop()?;
                if arg1.width() == 1 {
                    let arg2 = self.pop_width(1)?;
                    let arg3 = self.pop()?;
                    if arg3.width() == 1 {
                        // Form 1
                        let arg4 = self.pop_width(1)?;
                        self.push(arg2.clone());
                        self.push(arg1.clone());
                        self.push(arg4);
                        self.push(arg3);
                        self.push(arg2);
                        self.push(arg1);
                    } else {
                        // Form 3
                        self.push(arg2.clone());
                        self.push(arg1.clone());
                        self.push(arg3);
                        self.push(arg2);
                        self.push(arg1);
                    }
                } else {
                    let arg2 = self.pop()?;
                    if arg2.width() == 1 {
                        // Form 2
                        let arg3 = self.pop_width(1)?;
                        self.push(arg1.clone());
                        self.push(arg3);
                        self.push(arg2);
                        self.push(arg1);
                    } else {
                        // Form 4
                        self.push(arg1.clone());
                        self.push(arg2);
                        self.push(arg1);
                    }
                }
            }
            SWAP => {
                let arg1 = self.pop_width(1)?;
                let arg2 = self.pop_width(1)?;
                self.push(arg1);
                self.push(arg2);
            }

            // Arithmetic
            IADD..=DREM => {
                let typ = prefix_type((insn.opcode - IADD) % 4).unwrap_or(Top);
                self.pop_expecting(&typ, symbols)?;
                self.pop_expecting(&typ, symbols)?;
                self.push(typ);
            }
            INEG..=DNEG => {
                let typ = prefix_type(insn.opcode - INEG).unwrap_or(Top);
                self.pop_expecting(&typ, symbols)?;
                self.push(typ);
            }
            ISHL..=LXOR => {
                let is_shift = insn.opcode <= LUSHR;
                let typ = if (insn.opcode - ISHL) % 2 == 0 {
                    Integer
                } else {
                    Long
                };
                if is_shift {
                    self.pop_expecting(&Integer, symbols)?;
                } else {
                    self.pop_expecting(&typ, symbols)?;
                }
                self.pop_expecting(&typ, symbols)?;
                self.push(typ);
            }
            IINC => {
                let index = local_index(insn)?;
                self.get_local_expecting(index, &Integer)?;
            }
            I2L..=I2S => {
                let (from, to) = match insn.opcode {
                    I2L => (Integer, Long),
                    I2F => (Integer, Float),
                    I2D => (Integer, Double),
                    L2I => (Long, Integer),
                    L2F => (Long, Float),
                    L2D => (Long, Double),
                    F2I => (Float, Integer),
                    F2L => (Float, Long),
                    F2D => (Float, Double),
                    D2I => (Double, Integer),
                    D2L => (Double, Long),
                    D2F => (Double, Float),
                    _ => (Integer, Integer),
                };
                self.pop_expecting(&from, symbols)?;
                self.push(to);
            }
            LCMP | FCMPL | FCMPG | DCMPL | DCMPG => {
                let typ = match insn.opcode {
                    LCMP => Long,
                    FCMPL | FCMPG => Float,
                    _ => Double,
                };
                self.pop_expecting(&typ, symbols)?;
                self.pop_expecting(&typ, symbols)?;
                self.push(Integer);
            }

            // Control flow
            IFEQ..=IFLE => {
                self.pop_expecting(&Integer, symbols)?;
                return Ok(Flow::Branch(branch_target(insn)?));
            }
            IF_ICMPEQ..=IF_ICMPLE => {
                self.pop_expecting(&Integer, symbols)?;
                self.pop_expecting(&Integer, symbols)?;
                return Ok(Flow::Branch(branch_target(insn)?));
            }
            IF_ACMPEQ | IF_ACMPNE => {
                self.pop_reference()?;
                self.pop_reference()?;
                return Ok(Flow::Branch(branch_target(insn)?));
            }
            IFNULL | IFNONNULL => {
                self.pop_reference()?;
                return Ok(Flow::Branch(branch_target(insn)?));
            }
            GOTO | GOTO_W => return Ok(Flow::Jump(vec![branch_target(insn)?])),
            JSR | JSR_W => return Ok(Flow::Subroutine(branch_target(insn)?)),
            RET => {
                let index = local_index(insn)?;
                match self.locals.get(index as usize) {
                    Some(ReturnAddress) => return Ok(Flow::Stop),
                    _ => return Err(VerifierErrorKind::BadSubroutineReturn(index)),
                }
            }
            TABLESWITCH => {
                self.pop_expecting(&Integer, symbols)?;
                return Ok(Flow::Jump(insn.jump_targets()));
            }
            LOOKUPSWITCH => {
                if let Operand::LookupSwitch { pairs, .. } = &insn.operand {
                    if pairs.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
                        return Err(VerifierErrorKind::UnsortedLookupSwitch);
                    }
                }
                self.pop_expecting(&Integer, symbols)?;
                return Ok(Flow::Jump(insn.jump_targets()));
            }
            IRETURN..=RETURN => {
                self.check_return(insn.opcode, env)?;
                return Ok(Flow::Stop);
            }
            ATHROW => {
                self.pop_expecting(&Object(RefType::THROWABLE), symbols)?;
                return Ok(Flow::Stop);
            }

            // Fields and methods
            GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD => {
                let field = match resolve(env, insn)? {
                    Symbol::Field(field) => field,
                    other => return Err(unexpected_symbol("a field", &other)),
                };
                self.access_field(insn.opcode, &field, env)?;
            }
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                let method = match resolve(env, insn)? {
                    Symbol::Method(method) => method,
                    other => return Err(unexpected_symbol("a method", &other)),
                };
                self.invoke(insn.opcode, &method, env)?;
            }

            // Objects
            NEW => {
                let class = match resolve(env, insn)? {
                    Symbol::Class(class @ RefType::Object(_)) => class,
                    other => return Err(unexpected_symbol("a class", &other)),
                };
                self.push(Uninitialized {
                    new_pc: insn.pc,
                    class,
                });
            }
            NEWARRAY => {
                self.pop_expecting(&Integer, symbols)?;
                let element = match insn.operand {
                    Operand::NewArray(base) => base,
                    _ => return Err(VerifierErrorKind::UnsupportedOpcode(insn.opcode)),
                };
                self.push(Object(RefType::array(FieldType::Base(element))));
            }
            ANEWARRAY => {
                self.pop_expecting(&Integer, symbols)?;
                let element = match resolve(env, insn)? {
                    Symbol::Class(class) => class,
                    other => return Err(unexpected_symbol("a class", &other)),
                };
                self.push(Object(RefType::array(FieldType::Ref(element))));
            }
            MULTIANEWARRAY => {
                let dimensions = match insn.operand {
                    Operand::MultiANewArray { dimensions, .. } => dimensions,
                    _ => return Err(VerifierErrorKind::UnsupportedOpcode(insn.opcode)),
                };
                let array = match resolve(env, insn)? {
                    Symbol::Class(class) => class,
                    other => return Err(unexpected_symbol("an array class", &other)),
                };
                if dimensions == 0 || array_dimensions(&array) < dimensions as usize {
                    return Err(VerifierErrorKind::NotArrayType(array.render()));
                }
                for _ in 0..dimensions {
                    self.pop_expecting(&Integer, symbols)?;
                }
                self.push(Object(array));
            }
            CHECKCAST => {
                let class = match resolve(env, insn)? {
                    Symbol::Class(class) => class,
                    other => return Err(unexpected_symbol("a class", &other)),
                };
                self.pop_initialized_reference()?;
                self.push(Object(class));
            }
            INSTANCEOF => {
                self.pop_initialized_reference()?;
                self.push(Integer);
            }
            MONITORENTER | MONITOREXIT => {
                self.pop_initialized_reference()?;
            }

            opcode => return Err(VerifierErrorKind::UnsupportedOpcode(opcode)),
        }

        Ok(Flow::Next)
    }

    /// Pop an array reference (`None` for `null`)
    fn pop_array(&mut self) -> Result<Option<RefType>, VerifierErrorKind> {
        match self.pop()? {
            VerificationType::Null => Ok(None),
            VerificationType::Object(array) if array.is_array() => Ok(Some(array)),
            other => Err(VerifierErrorKind::NotArrayType(other.to_string())),
        }
    }

    /// Pop a one dimensional array of one of the given primitive element types
    fn pop_primitive_array(&mut self, accepted: &[BaseType]) -> Result<(), VerifierErrorKind> {
        match self.pop_array()? {
            None => Ok(()),
            Some(RefType::PrimitiveArray(arr))
                if arr.additional_dimensions == 0 && accepted.contains(&arr.element_type) =>
            {
                Ok(())
            }
            Some(found) => Err(VerifierErrorKind::InvalidType {
                expected: RefType::array(FieldType::Base(accepted[0])).render(),
                found: found.render(),
            }),
        }
    }

    fn pop_initialized_reference(&mut self) -> Result<VerificationType, VerifierErrorKind> {
        match self.pop_reference()? {
            uninitialized @ (VerificationType::Uninitialized { .. }
            | VerificationType::UninitializedThis) => Err(VerifierErrorKind::InvalidType {
                expected: String::from("initialized reference"),
                found: uninitialized.to_string(),
            }),
            initialized => Ok(initialized),
        }
    }

    fn check_return(&mut self, opcode: u8, env: &Environment) -> Result<(), VerifierErrorKind> {
        let expected = env.return_type.map(VerificationType::from);
        let bad_return = || VerifierErrorKind::BadReturnType {
            expected: env
                .return_type
                .map_or_else(|| String::from("V"), |typ| typ.render()),
            found: mnemonic(opcode).unwrap_or("return").to_owned(),
        };
        let expected_opcode = match &expected {
            None => RETURN,
            Some(VerificationType::Integer) => IRETURN,
            Some(VerificationType::Long) => LRETURN,
            Some(VerificationType::Float) => FRETURN,
            Some(VerificationType::Double) => DRETURN,
            Some(_) => ARETURN,
        };
        if opcode != expected_opcode {
            return Err(bad_return());
        }
        if let Some(expected) = expected {
            self.pop_expecting(&expected, env.symbols)?;
        }
        if env.is_constructor && self.locals.first() == Some(&VerificationType::UninitializedThis) {
            return Err(VerifierErrorKind::InvalidType {
                expected: String::from("initialized this"),
                found: VerificationType::UninitializedThis.to_string(),
            });
        }
        Ok(())
    }

    fn access_field(
        &mut self,
        opcode: u8,
        field: &FieldRef,
        env: &Environment,
    ) -> Result<(), VerifierErrorKind> {
        let field_type = VerificationType::from(&field.descriptor);
        let declaring = VerificationType::Object(RefType::Object(field.class.clone()));
        match opcode {
            GETSTATIC => self.push(field_type),
            PUTSTATIC => {
                self.pop_expecting(&field_type, env.symbols)?;
            }
            GETFIELD => {
                self.pop_expecting(&declaring, env.symbols)?;
                self.push(field_type);
            }
            _ => {
                self.pop_expecting(&field_type, env.symbols)?;

                // Constructors may set their own fields before calling the super constructor
                match self.pop()? {
                    VerificationType::UninitializedThis if &field.class == env.this_class => (),
                    receiver if VerificationType::is_assignable(&receiver, &declaring, env.symbols) => (),
                    receiver => {
                        return Err(VerifierErrorKind::InvalidType {
                            expected: declaring.to_string(),
                            found: receiver.to_string(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    fn invoke(
        &mut self,
        opcode: u8,
        method: &MethodRef,
        env: &Environment,
    ) -> Result<(), VerifierErrorKind> {
        if opcode == INVOKEINTERFACE && !env.symbols.is_interface(&method.class) {
            return Err(VerifierErrorKind::NotInterface(method.class.as_str().to_owned()));
        }
        let is_init = method.name == UnqualifiedName::INIT;
        if is_init && opcode != INVOKESPECIAL {
            return Err(VerifierErrorKind::UnresolvedSymbol(format!(
                "{} can only be called with invokespecial",
                method
            )));
        }

        for parameter in method.descriptor.parameters.iter().rev() {
            self.pop_expecting(&VerificationType::from(parameter), env.symbols)?;
        }

        let declaring = VerificationType::Object(RefType::Object(method.class.clone()));
        if opcode != INVOKESTATIC {
            if is_init {
                let receiver = self.pop_reference()?;
                let initialized = match &receiver {
                    // Constructors delegate to another constructor of the same class or of the
                    // direct superclass
                    VerificationType::UninitializedThis
                        if &method.class == env.this_class
                            || env.symbols.superclass(env.this_class).as_ref()
                                == Some(&method.class) =>
                    {
                        VerificationType::Object(RefType::Object(env.this_class.clone()))
                    }
                    VerificationType::Uninitialized { class, .. }
                        if class == &RefType::Object(method.class.clone()) =>
                    {
                        VerificationType::Object(class.clone())
                    }
                    _ => {
                        return Err(VerifierErrorKind::InvalidType {
                            expected: format!("uninitialized {}", method.class),
                            found: receiver.to_string(),
                        })
                    }
                };
                self.replace_all(&receiver, &initialized);
            } else {
                self.pop_expecting(&declaring, env.symbols)?;
            }
        }

        if let Some(return_type) = &method.descriptor.return_type {
            self.push(VerificationType::from(return_type));
        }
        Ok(())
    }
}

fn local_index(insn: &Instruction) -> Result<u16, VerifierErrorKind> {
    insn.local()
        .ok_or(VerifierErrorKind::UnsupportedOpcode(insn.opcode))
}

fn branch_target(insn: &Instruction) -> Result<i64, VerifierErrorKind> {
    match insn.operand {
        Operand::Branch(target) => Ok(target),
        _ => Err(VerifierErrorKind::UnsupportedOpcode(insn.opcode)),
    }
}

fn resolve(env: &Environment, insn: &Instruction) -> Result<Symbol, VerifierErrorKind> {
    let index = match insn.operand {
        Operand::Constant(index)
        | Operand::InvokeInterface { index, .. }
        | Operand::MultiANewArray { index, .. } => index,
        _ => return Err(VerifierErrorKind::UnsupportedOpcode(insn.opcode)),
    };
    env.symbols
        .resolve(index)
        .map_err(|err| VerifierErrorKind::UnresolvedSymbol(err.to_string()))
}

fn unexpected_symbol(expected: &str, found: &Symbol) -> VerifierErrorKind {
    VerifierErrorKind::UnresolvedSymbol(format!("expected {} but found {}", expected, found))
}

/// Accepted element types and the loaded type for primitive array loads
fn primitive_array_access(load_opcode: u8) -> (&'static [BaseType], VerificationType) {
    match load_opcode {
        IALOAD => (&[BaseType::Int], VerificationType::Integer),
        LALOAD => (&[BaseType::Long], VerificationType::Long),
        FALOAD => (&[BaseType::Float], VerificationType::Float),
        DALOAD => (&[BaseType::Double], VerificationType::Double),
        BALOAD => (
            &[BaseType::Byte, BaseType::Boolean],
            VerificationType::Integer,
        ),
        CALOAD => (&[BaseType::Char], VerificationType::Integer),
        _ => (&[BaseType::Short], VerificationType::Integer),
    }
}

fn array_dimensions(ref_type: &RefType) -> usize {
    match ref_type {
        RefType::Object(_) => 0,
        RefType::PrimitiveArray(arr) => arr.additional_dimensions + 1,
        RefType::ObjectArray(arr) => arr.additional_dimensions + 1,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;
    use crate::jvm::code::BytecodeReader;
    use crate::jvm::{ClassHierarchy, PoolSymbols};
    use crate::util::WidthVec;
    use VerificationType::*;

    fn frame<const M: usize>(stack: [VerificationType; M]) -> Frame {
        Frame {
            locals: vec![],
            stack: WidthVec::from_iter(stack),
        }
    }

    fn run(frame: &mut Frame, code: &[u8]) -> Result<Flow, VerifierErrorKind> {
        let constants = ConstantsPool::new();
        let hierarchy = ClassHierarchy::with_java_lang();
        let symbols = PoolSymbols::new(&constants, &hierarchy);
        let this_class = BinaryName::OBJECT;
        let env = Environment {
            symbols: &symbols,
            this_class: &this_class,
            return_type: None,
            is_constructor: false,
        };
        let insn = BytecodeReader::new(code).read_instruction().unwrap();
        frame.execute(&insn, &env)
    }

    fn stack_of(frame: &Frame) -> Vec<VerificationType> {
        frame.stack.iter().map(|(_, t)| t.clone()).collect()
    }

    #[test]
    fn arithmetic() {
        let binops = [
            (Integer, vec![IADD, ISUB, IDIV, IMUL, IREM, IAND, IOR, IXOR]),
            (Long, vec![LADD, LSUB, LDIV, LMUL, LREM, LAND, LOR, LXOR]),
            (Float, vec![FADD, FSUB, FDIV, FMUL, FREM]),
            (Double, vec![DADD, DSUB, DDIV, DMUL, DREM]),
        ];

        for (good_typ, opcodes) in binops {
            for opcode in opcodes {
                for typ in [Integer, Long, Float, Double, Null] {
                    let mut frame = frame([typ.clone(), typ.clone()]);
                    let result = run(&mut frame, &[opcode]);
                    if typ == good_typ {
                        assert_eq!(result, Ok(Flow::Next), "{}", opcode);
                        assert_eq!(stack_of(&frame), vec![typ]);
                    } else {
                        assert!(
                            matches!(result, Err(VerifierErrorKind::InvalidType { .. })),
                            "{} on {}",
                            opcode,
                            typ
                        );
                    }
                }

                let mut frame = frame([good_typ.clone()]);
                assert_eq!(
                    run(&mut frame, &[opcode]),
                    Err(VerifierErrorKind::EmptyStack)
                );
            }
        }
    }

    #[test]
    fn shifts_take_an_int_amount() {
        let mut f = frame([Long, Integer]);
        assert_eq!(run(&mut f, &[LSHL]), Ok(Flow::Next));
        assert_eq!(stack_of(&f), vec![Long]);

        let mut f = frame([Long, Long]);
        assert!(run(&mut f, &[LSHL]).is_err());
    }

    #[test]
    fn dup2_x2_forms() {
        let a = Object(RefType::STRING);

        // Form 1: four category 1 values
        let mut f = frame([Integer, Float, a.clone(), Null]);
        assert_eq!(run(&mut f, &[DUP2_X2]), Ok(Flow::Next));
        assert_eq!(
            stack_of(&f),
            vec![a.clone(), Null, Integer, Float, a.clone(), Null]
        );

        // Form 2: category 2 on top of two category 1 values
        let mut f = frame([Integer, Float, Long]);
        assert_eq!(run(&mut f, &[DUP2_X2]), Ok(Flow::Next));
        assert_eq!(stack_of(&f), vec![Long, Integer, Float, Long]);

        // Form 3: two category 1 values on top of a category 2 value
        let mut f = frame([Double, Integer, Float]);
        assert_eq!(run(&mut f, &[DUP2_X2]), Ok(Flow::Next));
        assert_eq!(stack_of(&f), vec![Integer, Float, Double, Integer, Float]);

        // Form 4: two category 2 values
        let mut f = frame([Double, Long]);
        assert_eq!(run(&mut f, &[DUP2_X2]), Ok(Flow::Next));
        assert_eq!(stack_of(&f), vec![Long, Double, Long]);

        // A category 2 value splitting a pair of category 1 values
        let mut f = frame([Integer, Long, Float]);
        assert_eq!(
            run(&mut f, &[DUP2_X2]),
            Err(VerifierErrorKind::InvalidWidth(2))
        );

        // Category 2 value under a category 2 and category 1 pair
        let mut f = frame([Double, Integer, Long]);
        assert_eq!(
            run(&mut f, &[DUP2_X2]),
            Err(VerifierErrorKind::InvalidWidth(2))
        );
    }

    #[test]
    fn other_dup_forms() {
        let mut f = frame([Integer, Float]);
        run(&mut f, &[DUP_X1]).unwrap();
        assert_eq!(stack_of(&f), vec![Float, Integer, Float]);

        let mut f = frame([Long, Integer]);
        run(&mut f, &[DUP_X2]).unwrap();
        assert_eq!(stack_of(&f), vec![Integer, Long, Integer]);

        let mut f = frame([Integer, Float]);
        run(&mut f, &[DUP2]).unwrap();
        assert_eq!(stack_of(&f), vec![Integer, Float, Integer, Float]);

        let mut f = frame([Integer, Double]);
        run(&mut f, &[DUP2_X1]).unwrap();
        assert_eq!(stack_of(&f), vec![Double, Integer, Double]);

        let mut f = frame([Long]);
        assert_eq!(run(&mut f, &[DUP]), Err(VerifierErrorKind::InvalidWidth(2)));

        let mut f = frame([Long]);
        assert_eq!(run(&mut f, &[POP2]), Ok(Flow::Next));
        assert!(f.stack.is_empty());

        let mut f = frame([Integer, Long]);
        assert_eq!(run(&mut f, &[SWAP]), Err(VerifierErrorKind::InvalidWidth(2)));
    }

    #[test]
    fn locals_and_arrays() {
        let mut f = frame([Long]);
        run(&mut f, &[LSTORE_0 + 1]).unwrap();
        assert_eq!(f.locals, vec![Top, Long, Top]);
        assert!(matches!(
            run(&mut f, &[ILOAD_0 + 1]),
            Err(VerifierErrorKind::InvalidType { .. })
        ));
        run(&mut f, &[LLOAD_0 + 1]).unwrap();
        assert_eq!(stack_of(&f), vec![Long]);

        let bytes = Object(RefType::array(FieldType::Base(BaseType::Boolean)));
        let mut f = frame([bytes, Integer]);
        run(&mut f, &[BALOAD]).unwrap();
        assert_eq!(stack_of(&f), vec![Integer]);

        let strings = Object(RefType::array(FieldType::object(BinaryName::STRING)));
        let mut f = frame([strings, Integer]);
        run(&mut f, &[AALOAD]).unwrap();
        assert_eq!(stack_of(&f), vec![Object(RefType::STRING)]);

        let mut f = frame([Integer, Integer]);
        assert!(matches!(
            run(&mut f, &[IALOAD]),
            Err(VerifierErrorKind::NotArrayType(_))
        ));
    }

    #[test]
    fn branches_and_returns() {
        let mut f = frame([Integer]);
        assert_eq!(run(&mut f, &[IFEQ, 0, 7]), Ok(Flow::Branch(7)));

        let mut f = frame([]);
        assert_eq!(run(&mut f, &[JSR, 0, 3]), Ok(Flow::Subroutine(3)));

        let mut f = frame([]);
        assert_eq!(
            run(&mut f, &[RET, 0]),
            Err(VerifierErrorKind::BadSubroutineReturn(0))
        );
        f.set_local(0, ReturnAddress);
        assert_eq!(run(&mut f, &[RET, 0]), Ok(Flow::Stop));

        let mut f = frame([]);
        assert_eq!(run(&mut f, &[RETURN]), Ok(Flow::Stop));
        let mut f = frame([Integer]);
        assert!(matches!(
            run(&mut f, &[IRETURN]),
            Err(VerifierErrorKind::BadReturnType { .. })
        ));

        // Keys must be strictly increasing
        let mut code = vec![LOOKUPSWITCH, 0, 0, 0];
        for word in [20i32, 2, 5, 20, 1, 20] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        let mut f = frame([Integer]);
        assert_eq!(
            run(&mut f, &code),
            Err(VerifierErrorKind::UnsortedLookupSwitch)
        );
    }
}
