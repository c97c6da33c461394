//! Per-kind emission strategies
//!
//! Every [`TypeKind`] has a [`KindFamily`] which knows the opcodes for that kind. Operations that
//! make no sense for a kind (arithmetic on references, anything but `return` on `void`, ...) fall
//! back to the default trait methods, which fail with [`Error::Unsupported`].

use super::kinds::{ArithmeticOp, BitwiseOp, Comparison, ConstValue, ShiftOp, TypeKind};
use super::opcodes::*;
use super::Assembler;
use crate::jvm::Error;

/// Emission strategy for one kind of value
pub trait KindFamily: Sync {
    fn kind(&self) -> TypeKind;

    fn unsupported(&self, operation: &'static str) -> Error {
        Error::Unsupported {
            kind: self.kind(),
            operation,
        }
    }

    /// Push a constant of this kind
    fn push_const(&self, _asm: &mut Assembler, _value: ConstValue) -> Result<(), Error> {
        Err(self.unsupported("constant"))
    }

    /// Push the value of a local variable
    fn load(&self, _asm: &mut Assembler, _index: u16) -> Result<(), Error> {
        Err(self.unsupported("load"))
    }

    /// Pop a value into a local variable
    fn store(&self, _asm: &mut Assembler, _index: u16) -> Result<(), Error> {
        Err(self.unsupported("store"))
    }

    /// Load an element from an array with elements of this kind
    fn array_load(&self, _asm: &mut Assembler) -> Result<(), Error> {
        Err(self.unsupported("array load"))
    }

    /// Store an element into an array with elements of this kind
    fn array_store(&self, _asm: &mut Assembler) -> Result<(), Error> {
        Err(self.unsupported("array store"))
    }

    fn arithmetic(&self, _asm: &mut Assembler, _op: ArithmeticOp) -> Result<(), Error> {
        Err(self.unsupported("arithmetic"))
    }

    fn shift(&self, _asm: &mut Assembler, _op: ShiftOp) -> Result<(), Error> {
        Err(self.unsupported("shift"))
    }

    fn bitwise(&self, _asm: &mut Assembler, _op: BitwiseOp) -> Result<(), Error> {
        Err(self.unsupported("bitwise"))
    }

    /// Three-way comparison pushing -1, 0, or 1
    ///
    /// For floating point kinds, `nan_is_greater` selects whether `NaN` compares as 1 or -1.
    fn compare(&self, _asm: &mut Assembler, _nan_is_greater: bool) -> Result<(), Error> {
        Err(self.unsupported("compare"))
    }

    /// Pop one value and branch if it compares to zero (or `null`)
    fn branch_if_zero(
        &self,
        _asm: &mut Assembler,
        _cmp: Comparison,
        _label: &str,
    ) -> Result<(), Error> {
        Err(self.unsupported("branch on comparison with zero"))
    }

    /// Pop two values and branch if they compare
    fn branch_if_cmp(
        &self,
        _asm: &mut Assembler,
        _cmp: Comparison,
        _label: &str,
    ) -> Result<(), Error> {
        Err(self.unsupported("branch on comparison"))
    }

    /// Convert the value on top of the stack to another kind
    fn convert(&self, _asm: &mut Assembler, _to: TypeKind) -> Result<(), Error> {
        Err(self.unsupported("conversion"))
    }

    /// Return a value of this kind from the method
    fn return_(&self, _asm: &mut Assembler) -> Result<(), Error> {
        Err(self.unsupported("return"))
    }
}

/// Family for the given kind
pub fn family(kind: TypeKind) -> &'static dyn KindFamily {
    match kind {
        TypeKind::Boolean => &BOOLEAN,
        TypeKind::Byte => &BYTE,
        TypeKind::Char => &CHAR,
        TypeKind::Short => &SHORT,
        TypeKind::Int => &INT,
        TypeKind::Long => &LONG,
        TypeKind::Float => &FLOAT,
        TypeKind::Double => &DOUBLE,
        TypeKind::Reference => &REFERENCE,
        TypeKind::Void => &VOID,
        TypeKind::ReturnAddress => &RETURN_ADDRESS,
    }
}

static BOOLEAN: IntFamily = IntFamily(TypeKind::Boolean);
static BYTE: IntFamily = IntFamily(TypeKind::Byte);
static CHAR: IntFamily = IntFamily(TypeKind::Char);
static SHORT: IntFamily = IntFamily(TypeKind::Short);
static INT: IntFamily = IntFamily(TypeKind::Int);
static LONG: LongFamily = LongFamily;
static FLOAT: FloatFamily = FloatFamily;
static DOUBLE: DoubleFamily = DoubleFamily;
static REFERENCE: ReferenceFamily = ReferenceFamily;
static VOID: VoidFamily = VoidFamily;
static RETURN_ADDRESS: ReturnAddressFamily = ReturnAddressFamily;

/// `int` and the kinds which are `int` on the stack
struct IntFamily(TypeKind);

impl KindFamily for IntFamily {
    fn kind(&self) -> TypeKind {
        self.0
    }

    fn push_const(&self, asm: &mut Assembler, value: ConstValue) -> Result<(), Error> {
        let value = match value {
            ConstValue::Int(value) => value,
            _ => return Err(self.unsupported("non-int constant")),
        };
        match value {
            -1..=5 => {
                asm.emit((ICONST_0 as i32 + value) as u8);
                Ok(())
            }
            -128..=127 => {
                asm.emit(BIPUSH);
                asm.emit_u8(value as i64)
            }
            -32768..=32767 => {
                asm.emit(SIPUSH);
                asm.emit_u16(value as i64)
            }
            _ => {
                let index = asm.constants_mut().get_integer(value)?;
                asm.emit_ldc(index.0)
            }
        }
    }

    fn load(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(ILOAD_0, ILOAD, index)
    }

    fn store(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(ISTORE_0, ISTORE, index)
    }

    fn array_load(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(match self.0 {
            TypeKind::Boolean | TypeKind::Byte => BALOAD,
            TypeKind::Char => CALOAD,
            TypeKind::Short => SALOAD,
            _ => IALOAD,
        });
        Ok(())
    }

    fn array_store(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(match self.0 {
            TypeKind::Boolean | TypeKind::Byte => BASTORE,
            TypeKind::Char => CASTORE,
            TypeKind::Short => SASTORE,
            _ => IASTORE,
        });
        Ok(())
    }

    fn arithmetic(&self, asm: &mut Assembler, op: ArithmeticOp) -> Result<(), Error> {
        asm.emit(op.int_opcode());
        Ok(())
    }

    fn shift(&self, asm: &mut Assembler, op: ShiftOp) -> Result<(), Error> {
        asm.emit(match op {
            ShiftOp::Left => ISHL,
            ShiftOp::Right => ISHR,
            ShiftOp::UnsignedRight => IUSHR,
        });
        Ok(())
    }

    fn bitwise(&self, asm: &mut Assembler, op: BitwiseOp) -> Result<(), Error> {
        asm.emit(match op {
            BitwiseOp::And => IAND,
            BitwiseOp::Or => IOR,
            BitwiseOp::Xor => IXOR,
        });
        Ok(())
    }

    fn branch_if_zero(&self, asm: &mut Assembler, cmp: Comparison, label: &str) -> Result<(), Error> {
        asm.emit_conditional_branch(cmp.if_zero_opcode(), label)
    }

    fn branch_if_cmp(&self, asm: &mut Assembler, cmp: Comparison, label: &str) -> Result<(), Error> {
        asm.emit_conditional_branch(cmp.if_icmp_opcode(), label)
    }

    fn convert(&self, asm: &mut Assembler, to: TypeKind) -> Result<(), Error> {
        use TypeKind::*;
        match (self.0, to) {
            (from, to) if from == to => (),
            (_, Boolean) => return Err(self.unsupported("conversion to boolean")),
            (_, Long) => asm.emit(I2L),
            (_, Float) => asm.emit(I2F),
            (_, Double) => asm.emit(I2D),

            // Widening into a kind that can hold every value needs no instruction
            (Boolean, _) | (Byte, Short | Int) | (Char | Short, Int) => (),

            (_, Byte) => asm.emit(I2B),
            (_, Char) => asm.emit(I2C),
            (_, Short) => asm.emit(I2S),
            _ => return Err(self.unsupported("conversion")),
        }
        Ok(())
    }

    fn return_(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(IRETURN);
        Ok(())
    }
}

struct LongFamily;

impl KindFamily for LongFamily {
    fn kind(&self) -> TypeKind {
        TypeKind::Long
    }

    fn push_const(&self, asm: &mut Assembler, value: ConstValue) -> Result<(), Error> {
        match value {
            ConstValue::Long(0) => asm.emit(LCONST_0),
            ConstValue::Long(1) => asm.emit(LCONST_1),
            ConstValue::Long(value) => {
                let index = asm.constants_mut().get_long(value)?;
                asm.emit_ldc2(index.0)?;
            }
            _ => return Err(self.unsupported("non-long constant")),
        }
        Ok(())
    }

    fn load(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(LLOAD_0, LLOAD, index)
    }

    fn store(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(LSTORE_0, LSTORE, index)
    }

    fn array_load(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(LALOAD);
        Ok(())
    }

    fn array_store(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(LASTORE);
        Ok(())
    }

    fn arithmetic(&self, asm: &mut Assembler, op: ArithmeticOp) -> Result<(), Error> {
        asm.emit(op.int_opcode() + 1);
        Ok(())
    }

    fn shift(&self, asm: &mut Assembler, op: ShiftOp) -> Result<(), Error> {
        asm.emit(match op {
            ShiftOp::Left => LSHL,
            ShiftOp::Right => LSHR,
            ShiftOp::UnsignedRight => LUSHR,
        });
        Ok(())
    }

    fn bitwise(&self, asm: &mut Assembler, op: BitwiseOp) -> Result<(), Error> {
        asm.emit(match op {
            BitwiseOp::And => LAND,
            BitwiseOp::Or => LOR,
            BitwiseOp::Xor => LXOR,
        });
        Ok(())
    }

    fn compare(&self, asm: &mut Assembler, _nan_is_greater: bool) -> Result<(), Error> {
        asm.emit(LCMP);
        Ok(())
    }

    fn branch_if_zero(&self, asm: &mut Assembler, cmp: Comparison, label: &str) -> Result<(), Error> {
        asm.emit(LCONST_0);
        asm.emit(LCMP);
        asm.emit_conditional_branch(cmp.if_zero_opcode(), label)
    }

    fn branch_if_cmp(&self, asm: &mut Assembler, cmp: Comparison, label: &str) -> Result<(), Error> {
        asm.emit(LCMP);
        asm.emit_conditional_branch(cmp.if_zero_opcode(), label)
    }

    fn convert(&self, asm: &mut Assembler, to: TypeKind) -> Result<(), Error> {
        match to {
            TypeKind::Long => (),
            TypeKind::Int => asm.emit(L2I),
            TypeKind::Float => asm.emit(L2F),
            TypeKind::Double => asm.emit(L2D),
            TypeKind::Byte | TypeKind::Char | TypeKind::Short => {
                asm.emit(L2I);
                asm.with_type(TypeKind::Int, |asm, int| int.convert(asm, to))?;
            }
            _ => return Err(self.unsupported("conversion")),
        }
        Ok(())
    }

    fn return_(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(LRETURN);
        Ok(())
    }
}

struct FloatFamily;

impl KindFamily for FloatFamily {
    fn kind(&self) -> TypeKind {
        TypeKind::Float
    }

    fn push_const(&self, asm: &mut Assembler, value: ConstValue) -> Result<(), Error> {
        let value = match value {
            ConstValue::Float(value) => value,
            _ => return Err(self.unsupported("non-float constant")),
        };

        // Compare bits so that `-0.0` does not get pushed as `0.0`
        if value.to_bits() == 0.0f32.to_bits() {
            asm.emit(FCONST_0);
        } else if value.to_bits() == 1.0f32.to_bits() {
            asm.emit(FCONST_1);
        } else if value.to_bits() == 2.0f32.to_bits() {
            asm.emit(FCONST_2);
        } else {
            let index = asm.constants_mut().get_float(value)?;
            asm.emit_ldc(index.0)?;
        }
        Ok(())
    }

    fn load(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(FLOAD_0, FLOAD, index)
    }

    fn store(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(FSTORE_0, FSTORE, index)
    }

    fn array_load(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(FALOAD);
        Ok(())
    }

    fn array_store(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(FASTORE);
        Ok(())
    }

    fn arithmetic(&self, asm: &mut Assembler, op: ArithmeticOp) -> Result<(), Error> {
        asm.emit(op.int_opcode() + 2);
        Ok(())
    }

    fn compare(&self, asm: &mut Assembler, nan_is_greater: bool) -> Result<(), Error> {
        asm.emit(if nan_is_greater { FCMPG } else { FCMPL });
        Ok(())
    }

    fn convert(&self, asm: &mut Assembler, to: TypeKind) -> Result<(), Error> {
        match to {
            TypeKind::Float => (),
            TypeKind::Int => asm.emit(F2I),
            TypeKind::Long => asm.emit(F2L),
            TypeKind::Double => asm.emit(F2D),
            TypeKind::Byte | TypeKind::Char | TypeKind::Short => {
                asm.emit(F2I);
                asm.with_type(TypeKind::Int, |asm, int| int.convert(asm, to))?;
            }
            _ => return Err(self.unsupported("conversion")),
        }
        Ok(())
    }

    fn return_(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(FRETURN);
        Ok(())
    }
}

struct DoubleFamily;

impl KindFamily for DoubleFamily {
    fn kind(&self) -> TypeKind {
        TypeKind::Double
    }

    fn push_const(&self, asm: &mut Assembler, value: ConstValue) -> Result<(), Error> {
        let value = match value {
            ConstValue::Double(value) => value,
            _ => return Err(self.unsupported("non-double constant")),
        };
        if value.to_bits() == 0.0f64.to_bits() {
            asm.emit(DCONST_0);
        } else if value.to_bits() == 1.0f64.to_bits() {
            asm.emit(DCONST_1);
        } else {
            let index = asm.constants_mut().get_double(value)?;
            asm.emit_ldc2(index.0)?;
        }
        Ok(())
    }

    fn load(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(DLOAD_0, DLOAD, index)
    }

    fn store(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(DSTORE_0, DSTORE, index)
    }

    fn array_load(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(DALOAD);
        Ok(())
    }

    fn array_store(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(DASTORE);
        Ok(())
    }

    fn arithmetic(&self, asm: &mut Assembler, op: ArithmeticOp) -> Result<(), Error> {
        asm.emit(op.int_opcode() + 3);
        Ok(())
    }

    fn compare(&self, asm: &mut Assembler, nan_is_greater: bool) -> Result<(), Error> {
        asm.emit(if nan_is_greater { DCMPG } else { DCMPL });
        Ok(())
    }

    fn convert(&self, asm: &mut Assembler, to: TypeKind) -> Result<(), Error> {
        match to {
            TypeKind::Double => (),
            TypeKind::Int => asm.emit(D2I),
            TypeKind::Long => asm.emit(D2L),
            TypeKind::Float => asm.emit(D2F),
            TypeKind::Byte | TypeKind::Char | TypeKind::Short => {
                asm.emit(D2I);
                asm.with_type(TypeKind::Int, |asm, int| int.convert(asm, to))?;
            }
            _ => return Err(self.unsupported("conversion")),
        }
        Ok(())
    }

    fn return_(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(DRETURN);
        Ok(())
    }
}

/// Object and array references
struct ReferenceFamily;

impl KindFamily for ReferenceFamily {
    fn kind(&self) -> TypeKind {
        TypeKind::Reference
    }

    fn push_const(&self, asm: &mut Assembler, value: ConstValue) -> Result<(), Error> {
        match value {
            ConstValue::Null => {
                asm.emit(ACONST_NULL);
                Ok(())
            }
            _ => Err(self.unsupported("non-null constant")),
        }
    }

    fn load(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(ALOAD_0, ALOAD, index)
    }

    fn store(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(ASTORE_0, ASTORE, index)
    }

    fn array_load(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(AALOAD);
        Ok(())
    }

    fn array_store(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(AASTORE);
        Ok(())
    }

    fn branch_if_zero(&self, asm: &mut Assembler, cmp: Comparison, label: &str) -> Result<(), Error> {
        match cmp {
            Comparison::Eq => asm.emit_conditional_branch(IFNULL, label),
            Comparison::Ne => asm.emit_conditional_branch(IFNONNULL, label),
            _ => Err(self.unsupported("ordered comparison with null")),
        }
    }

    fn branch_if_cmp(&self, asm: &mut Assembler, cmp: Comparison, label: &str) -> Result<(), Error> {
        match cmp {
            Comparison::Eq => asm.emit_conditional_branch(IF_ACMPEQ, label),
            Comparison::Ne => asm.emit_conditional_branch(IF_ACMPNE, label),
            _ => Err(self.unsupported("ordered comparison of references")),
        }
    }

    fn convert(&self, _asm: &mut Assembler, to: TypeKind) -> Result<(), Error> {
        match to {
            TypeKind::Reference => Ok(()),
            _ => Err(self.unsupported("conversion")),
        }
    }

    fn return_(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(ARETURN);
        Ok(())
    }
}

struct VoidFamily;

impl KindFamily for VoidFamily {
    fn kind(&self) -> TypeKind {
        TypeKind::Void
    }

    fn return_(&self, asm: &mut Assembler) -> Result<(), Error> {
        asm.emit(RETURN);
        Ok(())
    }
}

/// Return addresses pushed by `jsr` can only be stored (and then used by `ret`)
struct ReturnAddressFamily;

impl KindFamily for ReturnAddressFamily {
    fn kind(&self) -> TypeKind {
        TypeKind::ReturnAddress
    }

    fn store(&self, asm: &mut Assembler, index: u16) -> Result<(), Error> {
        asm.emit_local(ASTORE_0, ASTORE, index)
    }
}
