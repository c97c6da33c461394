use super::label::{Branch, LabelId, LabelTable};
use super::opcodes;
use crate::jvm::Error;
use byteorder::{BigEndian, WriteBytesExt};

/// Append-only cursor over the code array of a method being assembled
///
/// Multi-byte values are big-endian. Branch operands only ever enter the code array through
/// [`CodeWriter::write_branch`], which records the operand position against a label and writes a
/// placeholder that gets patched in [`CodeWriter::finish`].
#[derive(Debug)]
pub struct CodeWriter {
    code: Vec<u8>,
    labels: LabelTable,
    instruction_start: usize,
    last_opcode: Option<u8>,
    elide_gotos: bool,
}

impl CodeWriter {
    pub fn new(elide_gotos: bool) -> CodeWriter {
        CodeWriter {
            code: vec![],
            labels: LabelTable::new(),
            instruction_start: 0,
            last_opcode: None,
            elide_gotos,
        }
    }

    /// Current write position
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Opcode of the most recently started instruction
    pub fn last_opcode(&self) -> Option<u8> {
        self.last_opcode
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut LabelTable {
        &mut self.labels
    }

    /// Start a new instruction
    pub fn write_opcode(&mut self, opcode: u8) {
        self.instruction_start = self.code.len();
        self.last_opcode = Some(opcode);
        self.code.push(opcode);
    }

    /// Forget the last opcode, so that the current position counts as reachable by falling through
    pub fn mark_falls_through(&mut self) {
        self.last_opcode = None;
    }

    /// Write a byte, accepting both signed and unsigned interpretations
    pub fn write_u8(&mut self, value: i64) -> Result<(), Error> {
        check_range(value, 1, -0x80, 0xFF)?;
        self.code.push(value as u8);
        Ok(())
    }

    /// Write two bytes, accepting both signed and unsigned interpretations
    pub fn write_u16(&mut self, value: i64) -> Result<(), Error> {
        check_range(value, 2, -0x8000, 0xFFFF)?;
        self.code.write_u16::<BigEndian>(value as u16)?;
        Ok(())
    }

    /// Write four bytes, accepting both signed and unsigned interpretations
    pub fn write_u32(&mut self, value: i64) -> Result<(), Error> {
        check_range(value, 4, i32::MIN as i64, u32::MAX as i64)?;
        self.code.write_u32::<BigEndian>(value as u32)?;
        Ok(())
    }

    /// Write a placeholder branch operand for the current instruction
    pub fn write_branch(&mut self, label: &str, wide: bool) -> LabelId {
        let branch = Branch {
            instruction_start: self.instruction_start,
            patch_at: self.code.len(),
            wide,
        };
        let width = if wide { 4 } else { 2 };
        self.code.extend(std::iter::repeat(0).take(width));
        self.labels.record_branch(label, branch)
    }

    /// Pad with zeroes until the position is a multiple of 4
    pub fn align4(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    /// Bind a label to the current position
    pub fn fix_label(&mut self, label: &str) -> Result<LabelId, Error> {
        self.labels.fix_address(label, self.code.len())
    }

    /// Try to avoid emitting an unconditional jump to `target`
    ///
    /// This works when the previous instruction never falls through and the current position is
    /// labelled: the only way to get here is by jumping to that label, so the label can stand for
    /// `target` instead. Returns whether the jump was elided.
    pub fn try_elide_goto(&mut self, target: &str) -> bool {
        if !self.elide_gotos {
            return false;
        }
        match self.last_opcode {
            Some(opcode) if opcodes::is_terminator(opcode) => (),
            _ => return false,
        }
        let here = match self.labels.label_at(self.code.len()) {
            Some(here) => here,
            None => return false,
        };
        if self.labels.label(here).is_pinned() {
            return false;
        }
        let target_id = self.labels.resolve(target);
        if target_id == here {
            return false;
        }
        log::debug!(
            "eliding goto {} at {}, unifying with {}",
            target,
            self.code.len(),
            self.labels.label(here).name()
        );
        self.labels.unify(here, target_id);
        true
    }

    /// Patch all branches and return the finished code array along with the labels
    pub fn finish(mut self) -> Result<(Vec<u8>, LabelTable), Error> {
        self.labels.finalize_all(&mut self.code)?;
        Ok((self.code, self.labels))
    }
}

fn check_range(value: i64, width: usize, min: i64, max: i64) -> Result<(), Error> {
    if value < min || value > max {
        Err(Error::ValueOutOfRange { value, width })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::opcodes::*;

    #[test]
    fn range_checked_writes() {
        let mut writer = CodeWriter::new(false);
        writer.write_u8(-128).unwrap();
        writer.write_u8(255).unwrap();
        writer.write_u16(-32768).unwrap();
        writer.write_u16(65535).unwrap();
        assert!(matches!(
            writer.write_u8(256),
            Err(Error::ValueOutOfRange { value: 256, width: 1 })
        ));
        assert!(matches!(
            writer.write_u16(-32769),
            Err(Error::ValueOutOfRange { width: 2, .. })
        ));
        assert!(writer.write_u32(u32::MAX as i64 + 1).is_err());
        assert_eq!(writer.position(), 6);
    }

    #[test]
    fn branch_offsets_are_relative_to_opcode() {
        let mut writer = CodeWriter::new(false);
        writer.write_opcode(NOP);
        writer.write_opcode(GOTO);
        writer.write_branch("end", false);
        writer.write_opcode(NOP);
        writer.fix_label("end").unwrap();
        writer.write_opcode(RETURN);
        let (code, _) = writer.finish().unwrap();
        assert_eq!(code, vec![NOP, GOTO, 0, 4, NOP, RETURN]);
    }

    #[test]
    fn alignment_is_relative_to_code_start() {
        let mut writer = CodeWriter::new(false);
        writer.write_opcode(TABLESWITCH);
        writer.align4();
        assert_eq!(writer.position(), 4);
        writer.align4();
        assert_eq!(writer.position(), 4);
    }

    #[test]
    fn goto_after_terminator_at_label_is_elided() {
        let mut writer = CodeWriter::new(true);
        writer.write_opcode(ICONST_0);
        writer.write_opcode(IFEQ);
        writer.write_branch("skip", false);
        writer.write_opcode(RETURN);
        writer.fix_label("skip").unwrap();
        assert!(writer.try_elide_goto("done"));

        writer.fix_label("done").unwrap();
        writer.write_opcode(RETURN);
        let (code, labels) = writer.finish().unwrap();
        assert_eq!(code, vec![ICONST_0, IFEQ, 0, 4, RETURN, RETURN]);
        assert_eq!(labels.lookup("skip"), labels.lookup("done"));
    }

    #[test]
    fn goto_is_kept_without_terminator_or_label() {
        let mut writer = CodeWriter::new(true);
        writer.write_opcode(NOP);
        writer.fix_label("here").unwrap();
        assert!(!writer.try_elide_goto("there"));

        let mut writer = CodeWriter::new(true);
        writer.write_opcode(RETURN);
        assert!(!writer.try_elide_goto("there"));

        let mut writer = CodeWriter::new(false);
        writer.write_opcode(RETURN);
        writer.fix_label("here").unwrap();
        assert!(!writer.try_elide_goto("there"));
    }

    #[test]
    fn pinned_labels_are_not_elided() {
        let mut writer = CodeWriter::new(true);
        writer.write_opcode(RETURN);
        writer.labels_mut().pin("handler");
        writer.fix_label("handler").unwrap();
        assert!(!writer.try_elide_goto("there"));
    }

    #[test]
    fn goto_to_own_label_is_kept() {
        let mut writer = CodeWriter::new(true);
        writer.write_opcode(RETURN);
        writer.fix_label("loop").unwrap();
        assert!(!writer.try_elide_goto("loop"));
    }
}
