use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Largest code array accepted (the exception table can only refer to `end_pc` values up to
/// 65535, and `end_pc` is exclusive)
pub const MAX_CODE_LENGTH: usize = 65534;

/// Opaque handle to a label in a [`LabelTable`]
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct LabelId(usize);

impl fmt::Debug for LabelId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Branch operand waiting for its label to get an address
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    /// Offset of the opcode of the branching instruction (offsets are relative to this)
    pub instruction_start: usize,

    /// Offset of the placeholder operand bytes
    pub patch_at: usize,

    /// Is the operand 4 bytes (otherwise it is 2 bytes)
    pub wide: bool,
}

/// Symbolic address in the code array
///
/// A label can be known under several names once labels have been unified.
#[derive(Debug)]
pub struct Label {
    names: Vec<String>,
    address: Option<usize>,
    branches: Vec<Branch>,
    pinned: bool,
}

impl Label {
    /// Primary name of the label
    pub fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("<merged>")
    }

    /// All names that refer to this label
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Address, if the label has been fixed
    pub fn address(&self) -> Option<usize> {
        self.address
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Pinned labels are never unified away by goto elision
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }
}

/// Arena of labels for a single method body
///
/// Labels are created on first mention (either a branch to them or fixing their address) and are
/// referred to by [`LabelId`]. Unifying two labels moves every name and pending branch of one
/// label onto the other; the emptied label stays in the arena but is no longer reachable by name.
#[derive(Debug, Default)]
pub struct LabelTable {
    labels: Vec<Label>,
    names: HashMap<String, LabelId>,
    positions: BTreeMap<usize, LabelId>,
    next_fresh: usize,
}

impl LabelTable {
    pub fn new() -> LabelTable {
        LabelTable::default()
    }

    /// Get or create the label with the given name
    pub fn resolve(&mut self, name: &str) -> LabelId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        let id = LabelId(self.labels.len());
        self.labels.push(Label {
            names: vec![name.to_owned()],
            address: None,
            branches: vec![],
            pinned: false,
        });
        self.names.insert(name.to_owned(), id);
        id
    }

    /// Find an existing label by name
    pub fn lookup(&self, name: &str) -> Option<LabelId> {
        self.names.get(name).copied()
    }

    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id.0]
    }

    /// Label fixed at a position, if any
    pub fn label_at(&self, position: usize) -> Option<LabelId> {
        self.positions.get(&position).copied()
    }

    /// Name that is not yet in use, for labels generated internally
    pub fn fresh_name(&mut self) -> String {
        loop {
            self.next_fresh += 1;
            let name = format!("${}", self.next_fresh);
            if !self.names.contains_key(&name) {
                return name;
            }
        }
    }

    /// Register a branch operand against a label
    ///
    /// This happens uniformly, even if the label already has an address: offsets are only
    /// computed in [`LabelTable::finalize_all`].
    pub fn record_branch(&mut self, name: &str, branch: Branch) -> LabelId {
        let id = self.resolve(name);
        self.labels[id.0].branches.push(branch);
        id
    }

    /// Bind a label to a position
    ///
    /// If another label is already fixed at the same position, the two labels are unified.
    pub fn fix_address(&mut self, name: &str, position: usize) -> Result<LabelId, Error> {
        let id = self.resolve(name);
        if self.labels[id.0].address.is_some() {
            return Err(Error::LabelAlreadyFixed(name.to_owned()));
        }
        match self.positions.get(&position).copied() {
            Some(existing) => {
                log::debug!("label {} shares position {} with {}", name, position, self.labels[existing.0].name());
                self.unify(id, existing);
                Ok(existing)
            }
            None => {
                log::debug!("fixing label {} at {}", name, position);
                self.labels[id.0].address = Some(position);
                self.positions.insert(position, id);
                Ok(id)
            }
        }
    }

    /// Mark a label so that it is never unified away
    pub fn pin(&mut self, name: &str) -> LabelId {
        let id = self.resolve(name);
        self.labels[id.0].pinned = true;
        id
    }

    /// Merge `from` into `into`
    ///
    /// The merged label keeps the address of `into`. If `from` was fixed, its position no longer
    /// has a label.
    pub fn unify(&mut self, from: LabelId, into: LabelId) {
        if from == into {
            return;
        }
        let moved = Label {
            names: std::mem::take(&mut self.labels[from.0].names),
            address: self.labels[from.0].address.take(),
            branches: std::mem::take(&mut self.labels[from.0].branches),
            pinned: std::mem::replace(&mut self.labels[from.0].pinned, false),
        };
        if let Some(position) = moved.address {
            if self.positions.get(&position) == Some(&from) {
                self.positions.remove(&position);
            }
        }
        for name in &moved.names {
            self.names.insert(name.clone(), into);
        }
        let target = &mut self.labels[into.0];
        target.names.extend(moved.names);
        target.branches.extend(moved.branches);
        target.pinned |= moved.pinned;
    }

    /// Names of labels by the position they are fixed at
    pub fn names_by_position(&self) -> BTreeMap<usize, String> {
        self.positions
            .iter()
            .map(|(position, id)| (*position, self.labels[id.0].name().to_owned()))
            .collect()
    }

    /// Address of a named label, or an error if it was never fixed
    pub fn address_of(&self, name: &str) -> Result<usize, Error> {
        self.lookup(name)
            .and_then(|id| self.labels[id.0].address)
            .ok_or_else(|| Error::UnfixedLabel(name.to_owned()))
    }

    /// Patch every recorded branch operand with its final offset
    ///
    /// Non-wide branches must fit in a signed 16-bit offset. There is no promotion to wide
    /// branches at this point.
    pub fn finalize_all(&self, code: &mut [u8]) -> Result<(), Error> {
        if code.len() > MAX_CODE_LENGTH {
            return Err(Error::CodeOverflow(code.len()));
        }
        for label in &self.labels {
            if label.branches.is_empty() {
                continue;
            }
            let address = match label.address {
                Some(address) => address as i64,
                None => return Err(Error::UnfixedLabel(label.name().to_owned())),
            };
            for branch in &label.branches {
                let offset = address - branch.instruction_start as i64;
                if branch.wide {
                    BigEndian::write_i32(&mut code[branch.patch_at..], offset as i32);
                } else {
                    let offset = i16::try_from(offset).map_err(|_| Error::BranchOutOfRange {
                        label: label.name().to_owned(),
                        offset,
                    })?;
                    BigEndian::write_i16(&mut code[branch.patch_at..], offset);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn branch(instruction_start: usize, wide: bool) -> Branch {
        Branch {
            instruction_start,
            patch_at: instruction_start + 1,
            wide,
        }
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut labels = LabelTable::new();
        let a = labels.resolve("a");
        assert_eq!(labels.resolve("a"), a);
        assert_ne!(labels.resolve("b"), a);
        assert_eq!(labels.lookup("a"), Some(a));
        assert_eq!(labels.lookup("c"), None);
    }

    #[test]
    fn forward_and_backward_branches() {
        let mut labels = LabelTable::new();
        let mut code = vec![0u8; 10];

        labels.fix_address("back", 0).unwrap();
        labels.record_branch("back", branch(3, false));
        labels.record_branch("fwd", branch(0, false));
        labels.record_branch("fwd", branch(5, true));
        labels.fix_address("fwd", 8).unwrap();
        labels.finalize_all(&mut code).unwrap();

        assert_eq!(&code[1..3], &[0, 8]);
        assert_eq!(&code[4..6], &(-3i16).to_be_bytes());
        assert_eq!(&code[6..10], &[0, 0, 0, 3]);
    }

    #[test]
    fn fixing_twice_fails() {
        let mut labels = LabelTable::new();
        labels.fix_address("a", 0).unwrap();
        assert!(matches!(labels.fix_address("a", 3), Err(Error::LabelAlreadyFixed(_))));
    }

    #[test]
    fn labels_at_same_position_unify() {
        let mut labels = LabelTable::new();
        let a = labels.fix_address("a", 4).unwrap();
        labels.record_branch("b", branch(0, false));
        let b = labels.fix_address("b", 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(labels.lookup("b"), Some(a));
        assert_eq!(labels.label(a).names(), &["a".to_owned(), "b".to_owned()]);
        assert_eq!(labels.label(a).branches().len(), 1);
    }

    #[test]
    fn unified_label_takes_target_address() {
        let mut labels = LabelTable::new();
        let skip = labels.fix_address("skip", 6).unwrap();
        labels.record_branch("skip", branch(0, false));
        let target = labels.resolve("target");
        labels.unify(skip, target);

        assert_eq!(labels.label_at(6), None);
        assert_eq!(labels.lookup("skip"), Some(target));
        labels.fix_address("target", 9).unwrap();

        let mut code = vec![0u8; 12];
        labels.finalize_all(&mut code).unwrap();
        assert_eq!(&code[1..3], &[0, 9]);
    }

    #[test]
    fn unfixed_label_is_reported() {
        let mut labels = LabelTable::new();
        labels.record_branch("nowhere", branch(0, false));
        let mut code = vec![0u8; 3];
        assert!(matches!(
            labels.finalize_all(&mut code),
            Err(Error::UnfixedLabel(name)) if name == "nowhere"
        ));
    }

    #[test]
    fn short_branch_boundaries() {
        let len = 40_000;
        let mut labels = LabelTable::new();
        labels.record_branch("max", branch(0, false));
        labels.fix_address("max", i16::MAX as usize).unwrap();
        labels.fix_address("min", 0).unwrap();
        labels.record_branch("min", branch(32_768, false));
        let mut code = vec![0u8; len];
        labels.finalize_all(&mut code).unwrap();
        assert_eq!(&code[1..3], &i16::MAX.to_be_bytes());
        assert_eq!(&code[32_769..32_771], &i16::MIN.to_be_bytes());

        let mut labels = LabelTable::new();
        labels.record_branch("far", branch(0, false));
        labels.fix_address("far", i16::MAX as usize + 1).unwrap();
        assert!(matches!(
            labels.finalize_all(&mut code),
            Err(Error::BranchOutOfRange { offset: 32_768, .. })
        ));
    }

    #[test]
    fn oversized_code_is_rejected() {
        let labels = LabelTable::new();
        let mut code = vec![0u8; MAX_CODE_LENGTH + 1];
        assert!(matches!(
            labels.finalize_all(&mut code),
            Err(Error::CodeOverflow(65535))
        ));
    }

    #[test]
    fn fresh_names_avoid_collisions() {
        let mut labels = LabelTable::new();
        labels.resolve("$1");
        let name = labels.fresh_name();
        assert_ne!(name, "$1");
        assert_eq!(labels.lookup(&name), None);
    }
}
