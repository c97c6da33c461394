use super::family::{family, KindFamily};
use super::kinds::{ArithmeticOp, BitwiseOp, Comparison, ConstValue, ShiftOp, TypeKind};
use super::opcodes::*;
use super::writer::CodeWriter;
use crate::jvm::class_file::{
    BytecodeIndex, ClassConstantIndex, ConstantsPool, ExceptionHandler, LineNumber,
};
use crate::jvm::{BaseType, Error, FieldRef, MethodRef, RefType};
use crate::util::Width;
use std::collections::BTreeMap;

/// Options for one assembly session
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AssemblerSettings {
    /// Make every branch able to reach any offset: conditional branches are rewritten into a
    /// negated branch over a `goto_w`, and `goto`/`jsr` become `goto_w`/`jsr_w`
    pub wide_branches: bool,

    /// Drop unconditional jumps that can only be reached by jumping to them
    pub elide_gotos: bool,

    /// Verify method bodies when they are added to a class
    pub verify: bool,
}

impl Default for AssemblerSettings {
    fn default() -> AssemblerSettings {
        AssemblerSettings {
            wide_branches: false,
            elide_gotos: true,
            verify: true,
        }
    }
}

/// Kind of field access
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Get,
    Put,
}

/// Kind of method invocation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

struct PendingHandler {
    start: String,
    end: String,
    handler: String,
    catch_type: Option<ClassConstantIndex>,
}

/// Result of assembling a method body
#[derive(Debug, Clone)]
pub struct AssembledCode {
    /// Code array, with all branches patched
    pub code: Vec<u8>,

    /// Names of the labels, keyed by the offset they are fixed at
    pub labels: BTreeMap<usize, String>,

    pub exception_table: Vec<ExceptionHandler>,
    pub line_numbers: Vec<LineNumber>,
}

/// Symbolic assembler for a single method body
///
/// Type-generic operations take a [`TypeKind`] and are dispatched to the matching
/// [`KindFamily`]. While a family is emitting, its kind is on top of the assembler's type
/// context stack (see [`Assembler::current_type`]); families that delegate to another family
/// (eg. `long` to `byte` conversion going through `int`) push another context.
pub struct Assembler<'p> {
    pub(super) writer: CodeWriter,
    constants: &'p mut ConstantsPool,
    settings: AssemblerSettings,
    type_stack: Vec<TypeKind>,
    handlers: Vec<PendingHandler>,
    line_numbers: Vec<LineNumber>,
}

impl<'p> Assembler<'p> {
    pub fn new(constants: &'p mut ConstantsPool, settings: AssemblerSettings) -> Assembler<'p> {
        Assembler {
            writer: CodeWriter::new(settings.elide_gotos),
            constants,
            settings,
            type_stack: vec![],
            handlers: vec![],
            line_numbers: vec![],
        }
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    pub fn constants_mut(&mut self) -> &mut ConstantsPool {
        self.constants
    }

    /// Current write position
    pub fn position(&self) -> usize {
        self.writer.position()
    }

    /// Kind of the innermost family currently emitting
    pub fn current_type(&self) -> Option<TypeKind> {
        self.type_stack.last().copied()
    }

    /// Run `emit` with the family for `kind`, with `kind` pushed as the current type
    pub fn with_type<T>(
        &mut self,
        kind: TypeKind,
        emit: impl FnOnce(&mut Self, &'static dyn KindFamily) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.type_stack.push(kind);
        let result = emit(self, family(kind));
        self.type_stack.pop();
        result
    }

    // Raw emission used by the families

    pub(crate) fn emit(&mut self, opcode: u8) {
        self.writer.write_opcode(opcode);
    }

    pub(crate) fn emit_u8(&mut self, value: i64) -> Result<(), Error> {
        self.writer.write_u8(value)
    }

    pub(crate) fn emit_u16(&mut self, value: i64) -> Result<(), Error> {
        self.writer.write_u16(value)
    }

    /// Emit a load or store, picking the shortest encoding for the index
    pub(crate) fn emit_local(&mut self, short_base: u8, opcode: u8, index: u16) -> Result<(), Error> {
        match index {
            0..=3 => self.emit(short_base + index as u8),
            4..=255 => {
                self.emit(opcode);
                self.emit_u8(index as i64)?;
            }
            _ => {
                self.emit(WIDE);
                self.emit(opcode);
                self.emit_u16(index as i64)?;
            }
        }
        Ok(())
    }

    /// Load a one-slot constant from the pool
    pub(crate) fn emit_ldc(&mut self, index: u16) -> Result<(), Error> {
        if index <= u8::MAX as u16 {
            self.emit(LDC);
            self.emit_u8(index as i64)
        } else {
            self.emit(LDC_W);
            self.emit_u16(index as i64)
        }
    }

    /// Load a two-slot constant from the pool
    pub(crate) fn emit_ldc2(&mut self, index: u16) -> Result<(), Error> {
        self.emit(LDC2_W);
        self.emit_u16(index as i64)
    }

    /// Emit a conditional branch, rewritten for wide branches if needed
    pub(crate) fn emit_conditional_branch(&mut self, opcode: u8, label: &str) -> Result<(), Error> {
        if !self.settings.wide_branches {
            self.emit(opcode);
            self.writer.write_branch(label, false);
            return Ok(());
        }
        let negated = negate_branch(opcode).ok_or(Error::UnknownOpcode {
            pc: self.position(),
            opcode,
        })?;

        log::trace!(
            "widening {} to {} at {}",
            mnemonic(opcode).unwrap_or("???"),
            label,
            self.position()
        );

        // `if<!cond> +8` jumps over itself (3 bytes) and the `goto_w` (5 bytes)
        self.emit(negated);
        self.emit_u16(8)?;
        self.emit(GOTO_W);
        self.writer.write_branch(label, true);
        self.writer.mark_falls_through();
        Ok(())
    }

    // Type-generic operations

    pub fn push_const(&mut self, kind: TypeKind, value: ConstValue) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.push_const(asm, value))
    }

    pub fn load(&mut self, kind: TypeKind, index: u16) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.load(asm, index))
    }

    pub fn store(&mut self, kind: TypeKind, index: u16) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.store(asm, index))
    }

    /// Load from an array whose elements have the given kind
    pub fn array_load(&mut self, element: TypeKind) -> Result<(), Error> {
        self.with_type(element, |asm, family| family.array_load(asm))
    }

    /// Store into an array whose elements have the given kind
    pub fn array_store(&mut self, element: TypeKind) -> Result<(), Error> {
        self.with_type(element, |asm, family| family.array_store(asm))
    }

    pub fn arithmetic(&mut self, kind: TypeKind, op: ArithmeticOp) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.arithmetic(asm, op))
    }

    pub fn shift(&mut self, kind: TypeKind, op: ShiftOp) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.shift(asm, op))
    }

    pub fn bitwise(&mut self, kind: TypeKind, op: BitwiseOp) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.bitwise(asm, op))
    }

    pub fn compare(&mut self, kind: TypeKind, nan_is_greater: bool) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.compare(asm, nan_is_greater))
    }

    pub fn branch_if_zero(&mut self, kind: TypeKind, cmp: Comparison, label: &str) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.branch_if_zero(asm, cmp, label))
    }

    pub fn branch_if_cmp(&mut self, kind: TypeKind, cmp: Comparison, label: &str) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.branch_if_cmp(asm, cmp, label))
    }

    pub fn convert(&mut self, from: TypeKind, to: TypeKind) -> Result<(), Error> {
        self.with_type(from, |asm, family| family.convert(asm, to))
    }

    pub fn return_(&mut self, kind: TypeKind) -> Result<(), Error> {
        self.with_type(kind, |asm, family| family.return_(asm))
    }

    // Control flow

    /// Bind a label to the current position
    pub fn label(&mut self, name: &str) -> Result<(), Error> {
        self.writer.fix_label(name)?;
        Ok(())
    }

    /// Name for a label that won't collide with any other
    pub fn fresh_label(&mut self) -> String {
        self.writer.labels_mut().fresh_name()
    }

    /// Unconditional jump (possibly elided)
    pub fn goto(&mut self, label: &str) -> Result<(), Error> {
        if self.writer.try_elide_goto(label) {
            return Ok(());
        }
        if self.settings.wide_branches {
            self.emit(GOTO_W);
            self.writer.write_branch(label, true);
        } else {
            self.emit(GOTO);
            self.writer.write_branch(label, false);
        }
        Ok(())
    }

    /// Jump to a subroutine
    pub fn jsr(&mut self, label: &str) -> Result<(), Error> {
        if self.settings.wide_branches {
            self.emit(JSR_W);
            self.writer.write_branch(label, true);
        } else {
            self.emit(JSR);
            self.writer.write_branch(label, false);
        }
        Ok(())
    }

    /// Return from a subroutine, using the address stored in a local
    pub fn ret(&mut self, index: u16) -> Result<(), Error> {
        if index <= u8::MAX as u16 {
            self.emit(RET);
            self.emit_u8(index as i64)
        } else {
            self.emit(WIDE);
            self.emit(RET);
            self.emit_u16(index as i64)
        }
    }

    pub fn athrow(&mut self) {
        self.emit(ATHROW);
    }

    /// Register an exception handler covering `[start, end)`
    ///
    /// The labels involved are pinned, so goto elision never moves them.
    pub fn exception_handler(
        &mut self,
        start: &str,
        end: &str,
        handler: &str,
        catch_type: Option<&RefType>,
    ) -> Result<(), Error> {
        let catch_type = match catch_type {
            Some(ref_type) => Some(self.constants.get_class(ref_type)?),
            None => None,
        };
        let labels = self.writer.labels_mut();
        for name in [start, end, handler] {
            labels.pin(name);
        }
        self.handlers.push(PendingHandler {
            start: start.to_owned(),
            end: end.to_owned(),
            handler: handler.to_owned(),
            catch_type,
        });
        Ok(())
    }

    /// Mark the code from here on as coming from a source line
    pub fn line_number(&mut self, line: u16) -> Result<(), Error> {
        let position = self.position();
        let start_pc = u16::try_from(position).map_err(|_| Error::CodeOverflow(position))?;
        let start_pc = BytecodeIndex(start_pc);
        match self.line_numbers.last_mut() {
            Some(last) if last.start_pc == start_pc => last.line_number = line,
            _ => self.line_numbers.push(LineNumber {
                start_pc,
                line_number: line,
            }),
        }
        Ok(())
    }

    // Other instructions

    pub fn nop(&mut self) {
        self.emit(NOP);
    }

    /// Emit an instruction which has no operands (eg. `pop`, `swap`, `arraylength`)
    pub fn simple(&mut self, opcode: u8) -> Result<(), Error> {
        let ok = matches!(
            opcode,
            NOP..=DCONST_1
                | ILOAD_0..=SALOAD
                | ISTORE_0..=LXOR
                | I2L..=DCMPG
                | IRETURN..=RETURN
                | ARRAYLENGTH
                | ATHROW
                | MONITORENTER
                | MONITOREXIT
        );
        if !ok {
            return Err(Error::UnknownOpcode {
                pc: self.position(),
                opcode,
            });
        }
        self.emit(opcode);
        Ok(())
    }

    /// Pop a value of the given kind, whatever its width
    pub fn pop(&mut self, kind: TypeKind) -> Result<(), Error> {
        match kind.width() {
            0 => (),
            1 => self.emit(POP),
            _ => self.emit(POP2),
        }
        Ok(())
    }

    /// Duplicate a value of the given kind, whatever its width
    pub fn dup(&mut self, kind: TypeKind) -> Result<(), Error> {
        match kind.width() {
            0 => (),
            1 => self.emit(DUP),
            _ => self.emit(DUP2),
        }
        Ok(())
    }

    /// Increment an `int` local by a constant
    pub fn iinc(&mut self, index: u16, delta: i16) -> Result<(), Error> {
        match (u8::try_from(index), i8::try_from(delta)) {
            (Ok(index), Ok(delta)) => {
                self.emit(IINC);
                self.emit_u8(index as i64)?;
                self.emit_u8(delta as i64)
            }
            _ => {
                self.emit(WIDE);
                self.emit(IINC);
                self.emit_u16(index as i64)?;
                self.emit_u16(delta as i64)
            }
        }
    }

    /// Push a `java.lang.String` constant
    pub fn ldc_string(&mut self, string: &str) -> Result<(), Error> {
        let index = self.constants.get_string(string)?;
        self.emit_ldc(index.index())
    }

    /// Push a `java.lang.Class` constant
    pub fn ldc_class(&mut self, class: &RefType) -> Result<(), Error> {
        let index = self.constants.get_class(class)?;
        self.emit_ldc(index.index())
    }

    pub fn access_field(&mut self, field: &FieldRef, is_static: bool, mode: AccessMode) -> Result<(), Error> {
        let index = self.constants.get_field_ref(field)?;
        self.emit(match (is_static, mode) {
            (true, AccessMode::Get) => GETSTATIC,
            (true, AccessMode::Put) => PUTSTATIC,
            (false, AccessMode::Get) => GETFIELD,
            (false, AccessMode::Put) => PUTFIELD,
        });
        self.emit_u16(index.index() as i64)
    }

    pub fn invoke(&mut self, invoke_type: InvokeType, method: &MethodRef) -> Result<(), Error> {
        let index = self.constants.get_method_ref(method)?;
        match invoke_type {
            InvokeType::Virtual => self.emit(INVOKEVIRTUAL),
            InvokeType::Special => self.emit(INVOKESPECIAL),
            InvokeType::Static => self.emit(INVOKESTATIC),
            InvokeType::Interface => {
                self.emit(INVOKEINTERFACE);
                self.emit_u16(index.index() as i64)?;
                self.emit_u8(method.descriptor.parameter_length(true) as i64)?;
                return self.emit_u8(0);
            }
        }
        self.emit_u16(index.index() as i64)
    }

    /// Allocate an uninitialized object
    pub fn new_object(&mut self, class: &RefType) -> Result<(), Error> {
        let index = self.constants.get_class(class)?;
        self.emit(NEW);
        self.emit_u16(index.index() as i64)
    }

    /// Allocate a one dimensional array of primitives
    pub fn new_primitive_array(&mut self, element: BaseType) -> Result<(), Error> {
        self.emit(NEWARRAY);
        self.emit_u8(element.array_type_code() as i64)
    }

    /// Allocate a one dimensional array of references
    pub fn new_ref_array(&mut self, element: &RefType) -> Result<(), Error> {
        let index = self.constants.get_class(element)?;
        self.emit(ANEWARRAY);
        self.emit_u16(index.index() as i64)
    }

    /// Allocate a multidimensional array, popping one length per dimension
    pub fn new_multi_array(&mut self, array_type: &RefType, dimensions: u8) -> Result<(), Error> {
        let index = self.constants.get_class(array_type)?;
        self.emit(MULTIANEWARRAY);
        self.emit_u16(index.index() as i64)?;
        self.emit_u8(dimensions as i64)
    }

    pub fn checkcast(&mut self, class: &RefType) -> Result<(), Error> {
        let index = self.constants.get_class(class)?;
        self.emit(CHECKCAST);
        self.emit_u16(index.index() as i64)
    }

    pub fn instanceof(&mut self, class: &RefType) -> Result<(), Error> {
        let index = self.constants.get_class(class)?;
        self.emit(INSTANCEOF);
        self.emit_u16(index.index() as i64)
    }

    /// Patch all branches and resolve the exception table
    pub fn finish(self) -> Result<AssembledCode, Error> {
        let (code, labels) = self.writer.finish()?;
        let index_of = |name: &str| -> Result<BytecodeIndex, Error> {
            let address = labels.address_of(name)?;
            Ok(BytecodeIndex(address as u16))
        };
        let mut exception_table = vec![];
        for handler in &self.handlers {
            exception_table.push(ExceptionHandler {
                start_pc: index_of(&handler.start)?,
                end_pc: index_of(&handler.end)?,
                handler_pc: index_of(&handler.handler)?,
                catch_type: handler.catch_type,
            });
        }
        Ok(AssembledCode {
            labels: labels.names_by_position(),
            code,
            exception_table,
            line_numbers: self.line_numbers,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BinaryName, MethodDescriptor, Name, UnqualifiedName};

    fn settings(wide_branches: bool) -> AssemblerSettings {
        AssemblerSettings {
            wide_branches,
            ..AssemblerSettings::default()
        }
    }

    #[test]
    fn wide_conditional_branch_rewrite() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, settings(true));
        asm.push_const(TypeKind::Int, ConstValue::Int(0)).unwrap();
        asm.branch_if_zero(TypeKind::Int, Comparison::Lt, "target").unwrap();
        asm.label("target").unwrap();
        asm.return_(TypeKind::Void).unwrap();
        let code = asm.finish().unwrap().code;

        // iconst_0; ifge +8; goto_w target; return
        assert_eq!(code, vec![ICONST_0, IFGE, 0, 8, GOTO_W, 0, 0, 0, 5, RETURN]);
    }

    #[test]
    fn wide_rewrite_is_not_treated_as_terminator() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, settings(true));
        asm.push_const(TypeKind::Int, ConstValue::Int(0)).unwrap();
        asm.branch_if_zero(TypeKind::Int, Comparison::Eq, "a").unwrap();
        asm.label("b").unwrap();
        asm.goto("a").unwrap();
        asm.label("a").unwrap();
        asm.return_(TypeKind::Void).unwrap();
        let code = asm.finish().unwrap().code;
        assert_eq!(code[9], GOTO_W);
    }

    #[test]
    fn goto_and_jsr_widths() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, settings(true));
        asm.label("top").unwrap();
        asm.jsr("top").unwrap();
        asm.goto("top").unwrap();
        let code = asm.finish().unwrap().code;
        assert_eq!(code, vec![JSR_W, 0, 0, 0, 0, GOTO_W, 0xFF, 0xFF, 0xFF, 0xFB]);
    }

    #[test]
    fn exception_handler_labels_are_resolved_and_pinned() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, AssemblerSettings::default());
        asm.exception_handler("try", "end", "catch", Some(&RefType::THROWABLE))
            .unwrap();
        asm.label("try").unwrap();
        asm.return_(TypeKind::Void).unwrap();
        asm.label("end").unwrap();
        asm.label("catch").unwrap();
        asm.goto("elsewhere").unwrap();
        asm.label("elsewhere").unwrap();
        asm.athrow();
        let assembled = asm.finish().unwrap();

        // `catch` is pinned so the `goto` is kept
        assert_eq!(assembled.code, vec![RETURN, GOTO, 0, 3, ATHROW]);
        assert_eq!(assembled.exception_table.len(), 1);
        let handler = assembled.exception_table[0];
        assert_eq!(handler.start_pc, BytecodeIndex(0));
        assert_eq!(handler.end_pc, BytecodeIndex(1));
        assert_eq!(handler.handler_pc, BytecodeIndex(1));
        assert!(handler.catch_type.is_some());
    }

    #[test]
    fn invocations_and_objects() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, AssemblerSettings::default());
        let init = MethodRef::new(
            BinaryName::OBJECT,
            UnqualifiedName::INIT,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        );
        let compare = MethodRef::interface(
            BinaryName::COMPARABLE,
            UnqualifiedName::from_string(String::from("compareTo")).unwrap(),
            MethodDescriptor {
                parameters: vec![crate::jvm::FieldType::object(BinaryName::OBJECT)],
                return_type: Some(crate::jvm::FieldType::int()),
            },
        );
        asm.new_object(&RefType::OBJECT).unwrap();
        asm.dup(TypeKind::Reference).unwrap();
        asm.invoke(InvokeType::Special, &init).unwrap();
        asm.invoke(InvokeType::Interface, &compare).unwrap();
        let code = asm.finish().unwrap().code;
        assert_eq!(code[0], NEW);
        assert_eq!(code[3], DUP);
        assert_eq!(code[4], INVOKESPECIAL);
        assert_eq!(code[7], INVOKEINTERFACE);
        assert_eq!(&code[10..], &[2, 0]);
    }

    #[test]
    fn width_aware_stack_operations() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, AssemblerSettings::default());
        asm.dup(TypeKind::Long).unwrap();
        asm.pop(TypeKind::Double).unwrap();
        asm.pop(TypeKind::Int).unwrap();
        asm.pop(TypeKind::Void).unwrap();
        assert!(asm.simple(GOTO).is_err());
        asm.simple(SWAP).unwrap();
        assert_eq!(asm.finish().unwrap().code, vec![DUP2, POP2, POP, SWAP]);
    }

    #[test]
    fn line_numbers_at_same_position_are_replaced() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, AssemblerSettings::default());
        asm.line_number(1).unwrap();
        asm.line_number(2).unwrap();
        asm.nop();
        asm.line_number(3).unwrap();
        asm.return_(TypeKind::Void).unwrap();
        let lines = asm.finish().unwrap().line_numbers;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_number, 2);
        assert_eq!(lines[1].start_pc, BytecodeIndex(1));
    }
}
