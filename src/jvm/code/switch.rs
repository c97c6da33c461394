use super::kinds::{Comparison, ConstValue, TypeKind};
use super::opcodes::*;
use super::Assembler;
use crate::jvm::Error;

/// Largest number of cases compiled to a chain of comparisons
const MAX_CHAIN_CASES: usize = 2;

/// How a switch got compiled
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SwitchStrategy {
    /// One `if_icmp` per case
    Chain,

    /// `tableswitch` over contiguous cases
    Table,

    /// `lookupswitch` with keys in ascending order
    Lookup,
}

impl<'p> Assembler<'p> {
    /// Pop an `int` and jump to the label of the matching case (or to `default`)
    ///
    /// The encoding follows the shape of the keys: few cases become a chain of comparisons,
    /// contiguous cases a `tableswitch`, and anything else a `lookupswitch`. The estimated size
    /// of the chosen encoding is only logged.
    pub fn optimized_switch(
        &mut self,
        cases: &[(i32, &str)],
        default: &str,
    ) -> Result<SwitchStrategy, Error> {
        let mut sorted: Vec<(i32, &str)> = cases.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        for pair in sorted.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(Error::DuplicateSwitchCase(pair[0].0));
            }
        }

        let strategy = match (sorted.first(), sorted.last()) {
            _ if sorted.len() <= MAX_CHAIN_CASES => SwitchStrategy::Chain,
            (Some((low, _)), Some((high, _)))
                if (*high as i64 - *low as i64) as usize + 1 == sorted.len() =>
            {
                SwitchStrategy::Table
            }
            _ => SwitchStrategy::Lookup,
        };
        log::debug!(
            "compiling switch with {} cases as {:?} (about {} bytes)",
            sorted.len(),
            strategy,
            self.estimated_switch_size(strategy, &sorted)
        );

        match strategy {
            SwitchStrategy::Chain => self.switch_chain(cases, default)?,
            SwitchStrategy::Table => {
                self.emit(TABLESWITCH);
                self.writer.align4();
                self.writer.write_branch(default, true);
                let low = sorted[0].0;
                let high = sorted[sorted.len() - 1].0;
                self.writer.write_u32(low as i64)?;
                self.writer.write_u32(high as i64)?;
                for (_, label) in &sorted {
                    self.writer.write_branch(label, true);
                }
            }
            SwitchStrategy::Lookup => {
                self.emit(LOOKUPSWITCH);
                self.writer.align4();
                self.writer.write_branch(default, true);
                self.writer.write_u32(sorted.len() as i64)?;
                for (key, label) in &sorted {
                    self.writer.write_u32(*key as i64)?;
                    self.writer.write_branch(label, true);
                }
            }
        }
        Ok(strategy)
    }

    /// `dup; <key>; if_icmpne next; pop; goto case; next:` for all but the last case, which
    /// gets `<key>; if_icmpeq case; goto default`
    fn switch_chain(&mut self, cases: &[(i32, &str)], default: &str) -> Result<(), Error> {
        let (last, init) = match cases.split_last() {
            Some(split) => split,
            None => {
                self.emit(POP);
                return self.goto(default);
            }
        };
        for (key, label) in init {
            let next = self.fresh_label();
            self.emit(DUP);
            self.push_const(TypeKind::Int, ConstValue::Int(*key))?;
            self.branch_if_cmp(TypeKind::Int, Comparison::Ne, &next)?;
            self.emit(POP);
            self.goto(label)?;
            self.label(&next)?;
        }
        self.push_const(TypeKind::Int, ConstValue::Int(last.0))?;
        self.branch_if_cmp(TypeKind::Int, Comparison::Eq, last.1)?;
        self.goto(default)
    }

    fn estimated_switch_size(&self, strategy: SwitchStrategy, sorted: &[(i32, &str)]) -> usize {
        let padding = 3 - self.position() % 4;
        match strategy {
            SwitchStrategy::Chain => sorted
                .iter()
                .map(|(key, _)| {
                    let push = match key {
                        -1..=5 => 1,
                        -128..=127 => 2,
                        _ => 3,
                    };
                    push + 8
                })
                .sum(),
            SwitchStrategy::Table => 1 + padding + 12 + 4 * sorted.len(),
            SwitchStrategy::Lookup => 1 + padding + 8 + 8 * sorted.len(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;
    use crate::jvm::code::{AssemblerSettings, BytecodeReader, Operand};

    fn compile(cases: &[(i32, &str)]) -> (SwitchStrategy, Vec<u8>) {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, AssemblerSettings::default());
        asm.load(TypeKind::Int, 0).unwrap();
        let strategy = asm.optimized_switch(cases, "default").unwrap();
        for (_, label) in cases {
            asm.label(label).unwrap();
        }
        asm.label("default").unwrap();
        asm.return_(TypeKind::Void).unwrap();
        (strategy, asm.finish().unwrap().code)
    }

    #[test]
    fn contiguous_cases_use_a_table() {
        let cases = [(2, "c"), (0, "a"), (4, "e"), (1, "b"), (3, "d")];
        let (strategy, code) = compile(&cases);
        assert_eq!(strategy, SwitchStrategy::Table);

        let insn = BytecodeReader::new(&code).branch(1).read_instruction().unwrap();
        match insn.operand {
            Operand::TableSwitch { low, targets, .. } => {
                assert_eq!(low, 0);
                assert_eq!(targets.len(), 5);
            }
            other => panic!("expected tableswitch, got {:?}", other),
        }
    }

    #[test]
    fn sparse_cases_use_a_sorted_lookup() {
        let cases = [(1_000_000, "c"), (0, "a"), (1000, "b")];
        let (strategy, code) = compile(&cases);
        assert_eq!(strategy, SwitchStrategy::Lookup);

        let insn = BytecodeReader::new(&code).branch(1).read_instruction().unwrap();
        match insn.operand {
            Operand::LookupSwitch { pairs, .. } => {
                let keys: Vec<i32> = pairs.iter().map(|(key, _)| *key).collect();
                assert_eq!(keys, vec![0, 1000, 1_000_000]);
            }
            other => panic!("expected lookupswitch, got {:?}", other),
        }
    }

    #[test]
    fn single_case_is_a_plain_comparison() {
        let (strategy, code) = compile(&[(7, "seven")]);
        assert_eq!(strategy, SwitchStrategy::Chain);
        assert!(!code.contains(&TABLESWITCH));
        assert!(!code.contains(&LOOKUPSWITCH));
        assert_eq!(&code[..4], &[ILOAD_0, BIPUSH, 7, IF_ICMPEQ]);
    }

    #[test]
    fn two_case_chain_keeps_scrutinee_until_match() {
        let (_, code) = compile(&[(0, "a"), (1, "b")]);
        assert_eq!(&code[..3], &[ILOAD_0, DUP, ICONST_0]);
        assert_eq!(code[3], IF_ICMPNE);
        assert_eq!(&code[6..8], &[POP, GOTO]);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut constants = ConstantsPool::new();
        let mut asm = Assembler::new(&mut constants, AssemblerSettings::default());
        assert!(matches!(
            asm.optimized_switch(&[(1, "a"), (1, "b")], "c"),
            Err(Error::DuplicateSwitchCase(1))
        ));
    }

    #[test]
    fn empty_switch_pops_and_jumps() {
        let (strategy, code) = compile(&[]);
        assert_eq!(strategy, SwitchStrategy::Chain);
        assert_eq!(code, vec![ILOAD_0, POP, GOTO, 0, 3, RETURN]);
    }
}
