use super::kinds::TypeKind;
use super::reader::{BytecodeReader, Instruction, Operand};
use crate::jvm::SymbolResolver;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult, Write};

/// Human-readable listing of a code array
///
/// Each instruction goes on its own line, prefixed by its offset. Labels known at an offset are
/// printed on a line of their own before it, and branch targets are shown by label name when one
/// is known. With a symbol resolver, constant pool operands are followed by what they refer to.
///
/// ```text
///         0: iconst_5
///         1: istore_0
///         2: iload_0
///         3: ifeq L1
///         6: iconst_1
///         7: goto L2
///     L1:
///        10: iconst_0
///     L2:
///        11: ireturn
/// ```
pub struct Disassembler<'a> {
    code: &'a [u8],
    labels: BTreeMap<usize, String>,
    symbols: Option<&'a dyn SymbolResolver>,
    highlight: Option<usize>,
}

impl<'a> Disassembler<'a> {
    pub fn new(code: &'a [u8]) -> Disassembler<'a> {
        Disassembler {
            code,
            labels: BTreeMap::new(),
            symbols: None,
            highlight: None,
        }
    }

    /// Use these label names (keyed by offset)
    pub fn with_labels(mut self, labels: BTreeMap<usize, String>) -> Disassembler<'a> {
        self.labels = labels;
        self
    }

    /// Invent a label (`L<offset>`) for every offset some instruction jumps to
    pub fn with_synthetic_labels(mut self) -> Disassembler<'a> {
        for instruction in BytecodeReader::new(self.code).flatten() {
            for target in instruction.jump_targets() {
                if let Ok(target) = usize::try_from(target) {
                    self.labels
                        .entry(target)
                        .or_insert_with(|| format!("L{}", target));
                }
            }
        }
        self
    }

    pub fn with_symbols(mut self, symbols: &'a dyn SymbolResolver) -> Disassembler<'a> {
        self.symbols = Some(symbols);
        self
    }

    /// Mark the instruction at this offset with `>>`
    pub fn highlight(mut self, pc: Option<usize>) -> Disassembler<'a> {
        self.highlight = pc;
        self
    }

    fn target(&self, target: i64) -> String {
        usize::try_from(target)
            .ok()
            .and_then(|target| self.labels.get(&target))
            .cloned()
            .unwrap_or_else(|| target.to_string())
    }

    fn constant(&self, f: &mut Formatter<'_>, index: u16) -> FmtResult {
        write!(f, " #{}", index)?;
        if let Some(symbols) = self.symbols {
            match symbols.resolve(index) {
                Ok(symbol) => write!(f, " // {}", symbol)?,
                Err(err) => write!(f, " // <{}>", err)?,
            }
        }
        Ok(())
    }

    fn instruction(&self, f: &mut Formatter<'_>, instruction: &Instruction) -> FmtResult {
        let marker = if self.highlight == Some(instruction.pc) {
            ">>"
        } else {
            "  "
        };
        write!(f, "{}{:>6}: ", marker, instruction.pc)?;
        if instruction.wide {
            f.write_str("wide ")?;
        }
        f.write_str(instruction.mnemonic())?;

        match &instruction.operand {
            Operand::None => (),
            Operand::Local(index) => write!(f, " {}", index)?,
            Operand::Immediate(value) => write!(f, " {}", value)?,
            Operand::Constant(index) => self.constant(f, *index)?,
            Operand::Branch(target) => write!(f, " {}", self.target(*target))?,
            Operand::IInc { index, delta } => write!(f, " {} {}", index, delta)?,
            Operand::NewArray(base) => write!(f, " {}", TypeKind::from(*base))?,
            Operand::InvokeInterface { index, count } => {
                write!(f, " {}", count)?;
                self.constant(f, *index)?;
            }
            Operand::MultiANewArray { index, dimensions } => {
                write!(f, " {}", dimensions)?;
                self.constant(f, *index)?;
            }
            Operand::TableSwitch {
                default,
                low,
                targets,
            } => {
                f.write_str(" {")?;
                for (key, target) in (*low as i64..).zip(targets) {
                    write!(f, " {}: {},", key, self.target(*target))?;
                }
                write!(f, " default: {} }}", self.target(*default))?;
            }
            Operand::LookupSwitch { default, pairs } => {
                f.write_str(" {")?;
                for (key, target) in pairs {
                    write!(f, " {}: {},", key, self.target(*target))?;
                }
                write!(f, " default: {} }}", self.target(*default))?;
            }
        }
        f.write_char('\n')
    }
}

impl<'a> Display for Disassembler<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut reader = BytecodeReader::new(self.code);
        while !reader.is_at_end() {
            let pc = reader.pc();
            if let Some(label) = self.labels.get(&pc) {
                writeln!(f, "    {}:", label)?;
            }
            match reader.read_instruction() {
                Ok(instruction) => self.instruction(f, &instruction)?,
                Err(err) => {
                    return writeln!(f, "{:>8}: <{}>", pc, err);
                }
            }
        }

        // Labels fixed at the very end of the code
        if let Some(label) = self.labels.get(&self.code.len()) {
            writeln!(f, "    {}:", label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;

    #[test]
    fn plain_listing() {
        let code = [ICONST_5, ISTORE_0, ILOAD_0, IFEQ, 0, 4, RETURN, ICONST_0, IRETURN];
        let listing = Disassembler::new(&code).to_string();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "       0: iconst_5");
        assert_eq!(lines[3], "       3: ifeq 7");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn labels_and_highlight() {
        let code = [ICONST_0, IFEQ, 0, 4, NOP, RETURN];
        let labels = BTreeMap::from([(5, String::from("done"))]);
        let listing = Disassembler::new(&code)
            .with_labels(labels)
            .highlight(Some(4))
            .to_string();
        assert!(listing.contains("ifeq done\n"));
        assert!(listing.contains("    done:\n       5: return"));
        assert!(listing.contains(">>     4: nop"));
    }

    #[test]
    fn synthetic_labels_for_switches() {
        // iload_0; tableswitch (padded to 4) default -> 28, 0..1 -> 24, 26
        let mut code = vec![ILOAD_0, TABLESWITCH, 0, 0];
        for word in [27i32, 0, 1, 23, 25] {
            code.extend_from_slice(&word.to_be_bytes());
        }
        code.extend_from_slice(&[ICONST_0, IRETURN, ICONST_1, IRETURN, RETURN]);
        let listing = Disassembler::new(&code).with_synthetic_labels().to_string();
        assert!(listing.contains("tableswitch { 0: L24, 1: L26, default: L28 }"));
        assert!(listing.contains("    L26:\n      26: iconst_1"));
    }

    #[test]
    fn decoding_error_ends_listing() {
        let code = [NOP, SIPUSH, 0];
        let listing = Disassembler::new(&code).to_string();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("       1: <"));
    }

    #[test]
    fn wide_and_iinc_operands() {
        let code = [WIDE, ILOAD, 1, 0, IINC, 2, 0xFF, WIDE, IINC, 1, 0, 0x01, 0x00];
        let listing = Disassembler::new(&code).to_string();
        assert!(listing.contains("0: wide iload 256"));
        assert!(listing.contains("4: iinc 2 -1"));
        assert!(listing.contains("7: wide iinc 256 256"));
    }
}
