use crate::jvm::{BaseType, FieldType};
use crate::util::Width;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Kind of value an instruction operates on
///
/// This selects which [`super::KindFamily`] emits a type-generic operation. The small integral
/// kinds are all `int` on the operand stack and only differ at loads, stores, and conversions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
    Void,
    ReturnAddress,
}

impl TypeKind {
    /// Kind of a field type, with `None` meaning `void`
    pub fn of(field_type: Option<&FieldType>) -> TypeKind {
        match field_type {
            None => TypeKind::Void,
            Some(FieldType::Ref(_)) => TypeKind::Reference,
            Some(FieldType::Base(base)) => TypeKind::from(*base),
        }
    }

    /// Is this `int` or one of the kinds that are represented as `int` on the stack?
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            TypeKind::Boolean | TypeKind::Byte | TypeKind::Char | TypeKind::Short | TypeKind::Int
        )
    }

    /// Kind the value has on the operand stack
    pub fn stack_kind(self) -> TypeKind {
        if self.is_integral() {
            TypeKind::Int
        } else {
            self
        }
    }
}

impl From<BaseType> for TypeKind {
    fn from(base: BaseType) -> TypeKind {
        match base {
            BaseType::Boolean => TypeKind::Boolean,
            BaseType::Byte => TypeKind::Byte,
            BaseType::Char => TypeKind::Char,
            BaseType::Short => TypeKind::Short,
            BaseType::Int => TypeKind::Int,
            BaseType::Long => TypeKind::Long,
            BaseType::Float => TypeKind::Float,
            BaseType::Double => TypeKind::Double,
        }
    }
}

/// Number of stack or local slots taken (0 for `void`)
impl Width for TypeKind {
    fn width(&self) -> usize {
        match self {
            TypeKind::Void => 0,
            TypeKind::Long | TypeKind::Double => 2,
            _ => 1,
        }
    }
}

impl Display for TypeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            TypeKind::Boolean => "boolean",
            TypeKind::Byte => "byte",
            TypeKind::Char => "char",
            TypeKind::Short => "short",
            TypeKind::Int => "int",
            TypeKind::Long => "long",
            TypeKind::Float => "float",
            TypeKind::Double => "double",
            TypeKind::Reference => "reference",
            TypeKind::Void => "void",
            TypeKind::ReturnAddress => "returnAddress",
        };
        f.write_str(name)
    }
}

/// Constant value to push
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
}

impl ArithmeticOp {
    /// Opcode of the `int` form (the long, float and double forms follow it in that order)
    pub(crate) fn int_opcode(self) -> u8 {
        use super::opcodes::*;
        match self {
            ArithmeticOp::Add => IADD,
            ArithmeticOp::Sub => ISUB,
            ArithmeticOp::Mul => IMUL,
            ArithmeticOp::Div => IDIV,
            ArithmeticOp::Rem => IREM,
            ArithmeticOp::Neg => INEG,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Left,
    Right,
    UnsignedRight,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
}

/// Comparison used by conditional branches
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Comparison {
    /// Opcode of `if<cond>` (comparison against zero)
    pub(crate) fn if_zero_opcode(self) -> u8 {
        use super::opcodes::*;
        match self {
            Comparison::Eq => IFEQ,
            Comparison::Ne => IFNE,
            Comparison::Lt => IFLT,
            Comparison::Ge => IFGE,
            Comparison::Gt => IFGT,
            Comparison::Le => IFLE,
        }
    }

    /// Opcode of `if_icmp<cond>`
    pub(crate) fn if_icmp_opcode(self) -> u8 {
        self.if_zero_opcode() + (super::opcodes::IF_ICMPEQ - super::opcodes::IFEQ)
    }

    pub fn negate(self) -> Comparison {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Lt => Comparison::Ge,
            Comparison::Ge => Comparison::Lt,
            Comparison::Gt => Comparison::Le,
            Comparison::Le => Comparison::Gt,
        }
    }
}
