use super::class_file::Constant;
use super::code::TypeKind;
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    // Malformed class files and descriptors
    BadMagic(u32),
    /// Code ended in the middle of an instruction at this offset
    UnexpectedEof(usize),
    UnknownConstantTag(u8),
    UnknownHandleKind(u8),
    BadConstantIndex(u16),
    UnexpectedConstant {
        index: u16,
        expected: &'static str,
        found: String,
    },
    MalformedUtf8(Vec<u8>),
    TrailingBytes {
        attribute: &'static str,
        remaining: usize,
    },
    MalformedName(String),
    BadDescriptor(String),

    // Emission
    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },
    /// Operand does not fit in the given number of bytes
    ValueOutOfRange {
        value: i64,
        width: usize,
    },
    /// Branch to the label needs a wide offset
    BranchOutOfRange {
        label: String,
        offset: i64,
    },
    /// Code array would have this length, which is above the limit
    CodeOverflow(usize),
    LabelAlreadyFixed(String),
    /// Label is branched to but never fixed
    UnfixedLabel(String),
    DuplicateSwitchCase(i32),

    // Decoding
    UnknownOpcode {
        pc: usize,
        opcode: u8,
    },
    MalformedSwitch(usize),

    /// Operation makes no sense for values of this kind (eg. `void` array load)
    Unsupported {
        kind: TypeKind,
        operation: &'static str,
    },

    Verification(VerifyError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<VerifyError> for Error {
    fn from(err: VerifyError) -> Error {
        Error::Verification(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "bad magic number {:#010x}", magic),
            Error::UnexpectedEof(pc) => write!(f, "code ends inside instruction at {}", pc),
            Error::UnknownConstantTag(tag) => write!(f, "unknown constant pool tag {}", tag),
            Error::UnknownHandleKind(kind) => write!(f, "unknown method handle kind {}", kind),
            Error::BadConstantIndex(index) => write!(f, "bad constant pool index {}", index),
            Error::UnexpectedConstant {
                index,
                expected,
                found,
            } => write!(
                f,
                "constant #{} should be {} but is {}",
                index, expected, found
            ),
            Error::MalformedUtf8(bytes) => write!(f, "malformed modified UTF-8 {:?}", bytes),
            Error::TrailingBytes {
                attribute,
                remaining,
            } => write!(f, "{} has {} trailing bytes", attribute, remaining),
            Error::MalformedName(name) => write!(f, "malformed name {:?}", name),
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "constant pool is full (adding {:?} at {})",
                constant, offset
            ),
            Error::ValueOutOfRange { value, width } => {
                write!(f, "{} does not fit in {} byte(s)", value, width)
            }
            Error::BranchOutOfRange { label, offset } => write!(
                f,
                "branch to {} has offset {} which needs wide branches",
                label, offset
            ),
            Error::CodeOverflow(len) => write!(f, "code length {} is over 65534 bytes", len),
            Error::LabelAlreadyFixed(label) => write!(f, "label {} is fixed twice", label),
            Error::UnfixedLabel(label) => write!(f, "label {} is never fixed", label),
            Error::DuplicateSwitchCase(key) => write!(f, "switch has case {} twice", key),
            Error::UnknownOpcode { pc, opcode } => {
                write!(f, "unknown opcode {:#04x} at {}", opcode, pc)
            }
            Error::MalformedSwitch(pc) => write!(f, "malformed switch at {}", pc),
            Error::Unsupported { kind, operation } => {
                write!(f, "{} is not supported for {}", operation, kind)
            }
            Error::Verification(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

/// Method body rejected by the verifier
#[derive(Debug)]
pub struct VerifyError {
    /// Offset of the offending instruction, if there is one
    pub pc: Option<usize>,
    pub kind: VerifierErrorKind,

    /// Disassembly of the whole method, with the offending instruction marked
    pub listing: String,
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.pc {
            Some(pc) => write!(f, "verification failed at {}: {}", pc, self.kind)?,
            None => write!(f, "verification failed: {}", self.kind)?,
        }
        if !self.listing.is_empty() {
            write!(f, "\n{}", self.listing)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierErrorKind {
    /// Popped from an empty stack
    EmptyStack,
    /// Category 2 value used where a category 1 value is needed (or the other way around)
    InvalidWidth(usize),
    InvalidType {
        expected: String,
        found: String,
    },
    NotArrayType(String),
    /// Load from a local variable which is unset (or holds the wrong half of a wide value)
    UninitializedLocal(u16),
    /// Branch target outside of the code
    BranchOutOfRange(i64),
    /// Branch target inside of another instruction
    BranchIntoInstruction(usize),
    /// Execution can reach the end of the code
    FallsOffEnd,
    /// State at a branch target differs from the state of an earlier visit
    IncompatibleFrames {
        target: usize,
        recorded: String,
        found: String,
    },
    /// Bytes that are never executed
    NotCovered {
        start: usize,
        end: usize,
    },
    UnsortedLookupSwitch,
    /// Constant pool entry did not resolve to what the instruction needs
    UnresolvedSymbol(String),
    NotInterface(String),
    /// Instruction which the verifier does not handle (eg. `invokedynamic`)
    UnsupportedOpcode(u8),
    /// Exception table entry with a bad range or handler
    BadExceptionRange {
        start: usize,
        end: usize,
        handler: usize,
    },
    BadReturnType {
        expected: String,
        found: String,
    },
    /// `ret` on a local that does not hold a return address
    BadSubroutineReturn(u16),
    /// Operand stack or locals would need more than 65535 slots
    LimitExceeded(usize),
}

impl Display for VerifierErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VerifierErrorKind::EmptyStack => f.write_str("operand stack is empty"),
            VerifierErrorKind::InvalidWidth(width) => {
                write!(f, "value of width {} cannot be used here", width)
            }
            VerifierErrorKind::InvalidType { expected, found } => {
                write!(f, "expected {} but found {}", expected, found)
            }
            VerifierErrorKind::NotArrayType(found) => write!(f, "{} is not an array", found),
            VerifierErrorKind::UninitializedLocal(index) => {
                write!(f, "local {} is not initialized", index)
            }
            VerifierErrorKind::BranchOutOfRange(target) => {
                write!(f, "branch target {} is outside the code", target)
            }
            VerifierErrorKind::BranchIntoInstruction(target) => {
                write!(f, "branch target {} is inside an instruction", target)
            }
            VerifierErrorKind::FallsOffEnd => f.write_str("execution falls off the end of the code"),
            VerifierErrorKind::IncompatibleFrames {
                target,
                recorded,
                found,
            } => write!(
                f,
                "incompatible states at {}: recorded {} but found {}",
                target, recorded, found
            ),
            VerifierErrorKind::NotCovered { start, end } => {
                write!(f, "code in [{}, {}) is unreachable", start, end)
            }
            VerifierErrorKind::UnsortedLookupSwitch => f.write_str("lookupswitch keys are not sorted"),
            VerifierErrorKind::UnresolvedSymbol(msg) => write!(f, "bad symbol: {}", msg),
            VerifierErrorKind::NotInterface(class) => write!(f, "{} is not an interface", class),
            VerifierErrorKind::UnsupportedOpcode(opcode) => {
                write!(f, "opcode {:#04x} is not supported", opcode)
            }
            VerifierErrorKind::BadExceptionRange {
                start,
                end,
                handler,
            } => write!(
                f,
                "bad exception handler [{}, {}) -> {}",
                start, end, handler
            ),
            VerifierErrorKind::BadReturnType { expected, found } => {
                write!(f, "method returns {} but found {}", expected, found)
            }
            VerifierErrorKind::BadSubroutineReturn(index) => {
                write!(f, "local {} does not hold a return address", index)
            }
            VerifierErrorKind::LimitExceeded(slots) => write!(f, "{} slots is too many", slots),
        }
    }
}
