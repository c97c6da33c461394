use super::opcodes::*;
use crate::jvm::{BaseType, Error};
use byteorder::{BigEndian, ByteOrder};

/// Read cursor over a finished code array
///
/// Cursors are cheap to create, so re-reading from another program counter is done by
/// [`BytecodeReader::branch`]ing off a fresh cursor rather than seeking this one.
#[derive(Clone, Debug)]
pub struct BytecodeReader<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> BytecodeReader<'a> {
    pub fn new(code: &'a [u8]) -> BytecodeReader<'a> {
        BytecodeReader { code, pc: 0 }
    }

    /// Independent cursor over the same code, starting at `pc`
    pub fn branch(&self, pc: usize) -> BytecodeReader<'a> {
        BytecodeReader {
            code: self.code,
            pc,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    pub fn is_at_end(&self) -> bool {
        self.pc >= self.code.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self.pc + len;
        if end > self.code.len() {
            return Err(Error::UnexpectedEof(self.pc));
        }
        let bytes = &self.code[self.pc..end];
        self.pc = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    /// Decode the instruction at the cursor, advancing past it
    pub fn read_instruction(&mut self) -> Result<Instruction, Error> {
        let pc = self.pc;
        let mut opcode = self.read_u8()?;
        let wide = opcode == WIDE;
        if wide {
            opcode = self.read_u8()?;
            if !matches!(opcode, ILOAD..=ALOAD | ISTORE..=ASTORE | RET | IINC) {
                return Err(Error::UnknownOpcode { pc, opcode });
            }
        }

        let operand = match opcode {
            NOP..=DCONST_1 => Operand::None,
            BIPUSH => Operand::Immediate(self.read_i8()? as i32),
            SIPUSH => Operand::Immediate(self.read_i16()? as i32),
            LDC => Operand::Constant(self.read_u8()? as u16),
            LDC_W | LDC2_W => Operand::Constant(self.read_u16()?),
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Operand::Local(self.read_local(wide)?),
            ILOAD_0..=SALOAD | ISTORE_0..=LXOR => Operand::None,
            IINC => {
                let index = self.read_local(wide)?;
                let delta = if wide {
                    self.read_i16()?
                } else {
                    self.read_i8()? as i16
                };
                Operand::IInc { index, delta }
            }
            I2L..=DCMPG => Operand::None,
            IFEQ..=JSR | IFNULL | IFNONNULL => {
                Operand::Branch(pc as i64 + self.read_i16()? as i64)
            }
            GOTO_W | JSR_W => Operand::Branch(pc as i64 + self.read_i32()? as i64),
            TABLESWITCH => {
                self.skip_padding()?;
                let default = pc as i64 + self.read_i32()? as i64;
                let low = self.read_i32()?;
                let high = self.read_i32()?;
                if high < low {
                    return Err(Error::MalformedSwitch(pc));
                }
                let mut targets = vec![];
                for _ in low..=high {
                    targets.push(pc as i64 + self.read_i32()? as i64);
                }
                Operand::TableSwitch {
                    default,
                    low,
                    targets,
                }
            }
            LOOKUPSWITCH => {
                self.skip_padding()?;
                let default = pc as i64 + self.read_i32()? as i64;
                let npairs = self.read_i32()?;
                if npairs < 0 {
                    return Err(Error::MalformedSwitch(pc));
                }
                let mut pairs = vec![];
                for _ in 0..npairs {
                    let key = self.read_i32()?;
                    pairs.push((key, pc as i64 + self.read_i32()? as i64));
                }
                Operand::LookupSwitch { default, pairs }
            }
            IRETURN..=RETURN => Operand::None,
            GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                Operand::Constant(self.read_u16()?)
            }
            INVOKEINTERFACE => {
                let index = self.read_u16()?;
                let count = self.read_u8()?;
                self.read_u8()?;
                Operand::InvokeInterface { index, count }
            }
            INVOKEDYNAMIC => {
                let index = self.read_u16()?;
                self.read_u16()?;
                Operand::Constant(index)
            }
            NEWARRAY => {
                let code = self.read_u8()?;
                match BaseType::from_array_type_code(code) {
                    Some(element_type) => Operand::NewArray(element_type),
                    None => return Err(Error::UnknownOpcode { pc, opcode }),
                }
            }
            ARRAYLENGTH | ATHROW | MONITORENTER | MONITOREXIT => Operand::None,
            MULTIANEWARRAY => {
                let index = self.read_u16()?;
                let dimensions = self.read_u8()?;
                Operand::MultiANewArray { index, dimensions }
            }
            _ => return Err(Error::UnknownOpcode { pc, opcode }),
        };

        Ok(Instruction {
            pc,
            opcode,
            wide,
            operand,
            next_pc: self.pc,
        })
    }

    fn read_local(&mut self, wide: bool) -> Result<u16, Error> {
        if wide {
            self.read_u16()
        } else {
            Ok(self.read_u8()? as u16)
        }
    }

    /// Switch operands start at a multiple of 4 from the start of the code
    fn skip_padding(&mut self) -> Result<(), Error> {
        let padding = (4 - self.pc % 4) % 4;
        self.take(padding)?;
        Ok(())
    }
}

impl<'a> Iterator for BytecodeReader<'a> {
    type Item = Result<Instruction, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        let result = self.read_instruction();
        if result.is_err() {
            // Stop after the first decoding error
            self.pc = self.code.len();
        }
        Some(result)
    }
}

/// A decoded instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first byte of the instruction (the `wide` prefix, if there is one)
    pub pc: usize,

    /// Opcode, not counting any `wide` prefix
    pub opcode: u8,

    pub wide: bool,
    pub operand: Operand,

    /// Offset just past the instruction
    pub next_pc: usize,
}

/// Operands of an instruction
///
/// Branch targets are absolute (already offset from the instruction start), but are left signed
/// so that nonsensical offsets can be reported rather than wrapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    Local(u16),
    Immediate(i32),
    Constant(u16),
    Branch(i64),
    IInc {
        index: u16,
        delta: i16,
    },
    NewArray(BaseType),
    InvokeInterface {
        index: u16,
        count: u8,
    },
    MultiANewArray {
        index: u16,
        dimensions: u8,
    },
    TableSwitch {
        default: i64,
        low: i32,
        targets: Vec<i64>,
    },
    LookupSwitch {
        default: i64,
        pairs: Vec<(i32, i64)>,
    },
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        mnemonic(self.opcode).unwrap_or("???")
    }

    /// Local variable index, including the implicit one of forms like `iload_2`
    pub fn local(&self) -> Option<u16> {
        match (&self.operand, self.opcode) {
            (Operand::Local(index), _) | (Operand::IInc { index, .. }, _) => Some(*index),
            (_, ILOAD_0..=0x2d) => Some(((self.opcode - ILOAD_0) % 4) as u16),
            (_, ISTORE_0..=0x4e) => Some(((self.opcode - ISTORE_0) % 4) as u16),
            _ => None,
        }
    }

    /// Every code offset this instruction can jump to (not counting falling through)
    pub fn jump_targets(&self) -> Vec<i64> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Operand::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_all(code: &[u8]) -> Vec<Instruction> {
        BytecodeReader::new(code)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn simple_instructions() {
        let insns = decode_all(&[ICONST_2, BIPUSH, 0xFF, SIPUSH, 0x01, 0x00, ISTORE_0 + 1, RETURN]);
        assert_eq!(insns.len(), 5);
        assert_eq!(insns[1].operand, Operand::Immediate(-1));
        assert_eq!(insns[2].operand, Operand::Immediate(256));
        assert_eq!(insns[3].local(), Some(1));
        assert_eq!(insns[4].pc, 7);
        assert_eq!(insns[4].mnemonic(), "return");
    }

    #[test]
    fn wide_prefixes() {
        let code = [WIDE, ILOAD, 0x01, 0x00, WIDE, IINC, 0x01, 0x00, 0xFF, 0xFE, RETURN];
        let insns = decode_all(&code);
        assert!(insns[0].wide);
        assert_eq!(insns[0].local(), Some(256));
        assert_eq!(insns[0].next_pc, 4);
        assert_eq!(
            insns[1].operand,
            Operand::IInc {
                index: 256,
                delta: -2
            }
        );
        assert_eq!(insns[2].pc, 10);
    }

    #[test]
    fn wide_on_other_opcode_is_rejected() {
        let mut reader = BytecodeReader::new(&[WIDE, IADD]);
        assert!(matches!(
            reader.read_instruction(),
            Err(Error::UnknownOpcode { pc: 0, opcode: IADD })
        ));
    }

    #[test]
    fn branch_targets_are_absolute() {
        let code = [NOP, GOTO, 0xFF, 0xFF, GOTO_W, 0, 0, 0, 5];
        let insns = decode_all(&code);
        assert_eq!(insns[1].operand, Operand::Branch(0));
        assert_eq!(insns[2].operand, Operand::Branch(9));
    }

    #[test]
    fn switch_padding_is_relative_to_code_start() {
        // tableswitch at pc 1 needs 2 bytes of padding to reach pc 4
        let mut code = vec![ICONST_0, TABLESWITCH, 0, 0];
        for word in [20i32, 0, 1, 19, 19] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        let insns = decode_all(&code);
        assert_eq!(
            insns[1].operand,
            Operand::TableSwitch {
                default: 21,
                low: 0,
                targets: vec![20, 20],
            }
        );
        assert_eq!(insns[1].next_pc, code.len());
        assert_eq!(insns[1].jump_targets(), vec![21, 20, 20]);
    }

    #[test]
    fn lookupswitch_pairs() {
        let mut code = vec![LOOKUPSWITCH, 0, 0, 0];
        for word in [12i32, 2, -5, 10, 7, 11] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        let insn = BytecodeReader::new(&code).read_instruction().unwrap();
        assert_eq!(
            insn.operand,
            Operand::LookupSwitch {
                default: 12,
                pairs: vec![(-5, 10), (7, 11)],
            }
        );
    }

    #[test]
    fn truncated_and_unknown() {
        let mut reader = BytecodeReader::new(&[SIPUSH, 0]);
        assert!(matches!(reader.read_instruction(), Err(Error::UnexpectedEof(1))));

        let mut reader = BytecodeReader::new(&[0xCB]);
        assert!(matches!(
            reader.read_instruction(),
            Err(Error::UnknownOpcode { pc: 0, opcode: 0xCB })
        ));
    }

    #[test]
    fn branching_does_not_move_the_original() {
        let code = [NOP, NOP, RETURN];
        let mut reader = BytecodeReader::new(&code);
        reader.read_instruction().unwrap();
        let mut other = reader.branch(2);
        assert_eq!(other.read_instruction().unwrap().opcode, RETURN);
        assert_eq!(reader.pc(), 1);
    }
}
