use super::VerificationType;
use crate::jvm::{SymbolResolver, VerifierErrorKind};
use crate::util::{Width, WidthVec};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Snapshot of the stack and local variables at a point in the bytecode
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables, one entry per slot (wide values are followed by `Top`)
    pub locals: Vec<VerificationType>,

    /// Types of values on the stack
    pub stack: WidthVec<VerificationType>,
}

impl Frame {
    /// Number of slots the stack occupies
    pub fn stack_slots(&self) -> usize {
        self.stack.slots()
    }

    pub fn push(&mut self, verification_type: VerificationType) {
        self.stack.push(verification_type);
    }

    pub fn pop(&mut self) -> Result<VerificationType, VerifierErrorKind> {
        self.stack.pop().ok_or(VerifierErrorKind::EmptyStack)
    }

    /// Pop a value, checking it occupies exactly `expected_width` slots
    pub fn pop_width(&mut self, expected_width: usize) -> Result<VerificationType, VerifierErrorKind> {
        let popped = self.pop()?;
        let found_width = popped.width();
        if found_width == expected_width {
            Ok(popped)
        } else {
            Err(VerifierErrorKind::InvalidWidth(found_width))
        }
    }

    /// Pop a value, checking it is assignable to the expected type
    pub fn pop_expecting(
        &mut self,
        expected: &VerificationType,
        symbols: &dyn SymbolResolver,
    ) -> Result<VerificationType, VerifierErrorKind> {
        let popped = self.pop()?;
        if VerificationType::is_assignable(&popped, expected, symbols) {
            Ok(popped)
        } else {
            Err(VerifierErrorKind::InvalidType {
                expected: expected.to_string(),
                found: popped.to_string(),
            })
        }
    }

    /// Pop a value which must be some reference (including `null` or uninitialized objects)
    pub fn pop_reference(&mut self) -> Result<VerificationType, VerifierErrorKind> {
        let popped = self.pop()?;
        if popped.is_reference() {
            Ok(popped)
        } else {
            Err(VerifierErrorKind::InvalidType {
                expected: String::from("reference"),
                found: popped.to_string(),
            })
        }
    }

    /// Read a local, checking that it is set
    pub fn get_local(&self, index: u16) -> Result<&VerificationType, VerifierErrorKind> {
        match self.locals.get(index as usize) {
            None | Some(VerificationType::Top) => Err(VerifierErrorKind::UninitializedLocal(index)),
            Some(local) => Ok(local),
        }
    }

    /// Read a local, checking that it has exactly the expected type
    pub fn get_local_expecting(
        &self,
        index: u16,
        expected: &VerificationType,
    ) -> Result<(), VerifierErrorKind> {
        let local = self.get_local(index)?;
        if local == expected {
            Ok(())
        } else {
            Err(VerifierErrorKind::InvalidType {
                expected: expected.to_string(),
                found: local.to_string(),
            })
        }
    }

    /// Overwrite a local (and the slot after it, for wide values)
    ///
    /// A wide value whose second half gets overwritten is killed.
    pub fn set_local(&mut self, index: u16, local: VerificationType) {
        let index = index as usize;
        let width = local.width();
        if self.locals.len() < index + width {
            self.locals.resize(index + width, VerificationType::Top);
        }
        if index > 0 && self.locals[index - 1].width() == 2 {
            self.locals[index - 1] = VerificationType::Top;
        }
        self.locals[index] = local;
        if width == 2 {
            self.locals[index + 1] = VerificationType::Top;
        }
    }

    /// Replace every occurrence of a type on the stack and in the locals
    ///
    /// Used when `<init>` turns an uninitialized object into an initialized one.
    pub fn replace_all(&mut self, original: &VerificationType, updated: &VerificationType) {
        for local in self.locals.iter_mut() {
            if local == original {
                *local = updated.clone();
            }
        }
        self.stack.for_each_mut(|entry| {
            if entry == original {
                *entry = updated.clone();
            }
        });
    }

    /// Check that this frame can reach the same code as another one
    ///
    /// The stacks must have the same depth and the locals the same number of set slots, with
    /// each pair of entries compatible (see [`VerificationType::is_compatible`]). Missing locals
    /// count as `Top`.
    pub fn is_compatible(&self, other: &Frame) -> bool {
        if self.stack.len() != other.stack.len() {
            return false;
        }
        let stacks_compatible = self
            .stack
            .iter()
            .zip(other.stack.iter())
            .all(|((_, t1), (_, t2))| t1.is_compatible(t2));
        if !stacks_compatible {
            return false;
        }

        let locals_len = self.locals.len().max(other.locals.len());
        (0..locals_len).all(|index| {
            let t1 = self.locals.get(index).unwrap_or(&VerificationType::Top);
            let t2 = other.locals.get(index).unwrap_or(&VerificationType::Top);
            t1.is_compatible(t2)
        })
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("locals [")?;
        let set_locals = self
            .locals
            .iter()
            .rposition(|local| local != &VerificationType::Top)
            .map_or(0, |last| last + 1);
        for (i, local) in self.locals[..set_locals].iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            local.fmt(f)?;
        }
        f.write_str("] stack [")?;
        for (i, (_, entry)) in self.stack.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            entry.fmt(f)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::RefType;
    use VerificationType::*;

    fn frame<const N: usize, const M: usize>(
        locals: [VerificationType; N],
        stack: [VerificationType; M],
    ) -> Frame {
        Frame {
            locals: Vec::from(locals),
            stack: WidthVec::from_iter(stack),
        }
    }

    #[test]
    fn wide_locals_take_two_slots() {
        let mut frame = frame([Integer, Integer, Integer], []);
        frame.set_local(1, Long);
        assert_eq!(frame.locals, vec![Integer, Long, Top]);

        // Overwriting the second half kills the `long`
        frame.set_local(2, Float);
        assert_eq!(frame.locals, vec![Integer, Top, Float]);
        assert!(matches!(
            frame.get_local(1),
            Err(VerifierErrorKind::UninitializedLocal(1))
        ));
        assert!(matches!(
            frame.get_local(7),
            Err(VerifierErrorKind::UninitializedLocal(7))
        ));

        frame.set_local(4, Double);
        assert_eq!(frame.locals.len(), 6);
    }

    #[test]
    fn stack_widths() {
        let mut frame = frame([], [Integer, Double]);
        assert_eq!(frame.stack_slots(), 3);
        assert!(matches!(
            frame.pop_width(1),
            Err(VerifierErrorKind::InvalidWidth(2))
        ));
        assert_eq!(frame.pop_width(1), Ok(Integer));
        assert_eq!(frame.pop(), Err(VerifierErrorKind::EmptyStack));
    }

    #[test]
    fn frame_compatibility() {
        let string = Object(RefType::STRING);
        let base = frame([Integer, string.clone()], [Integer]);

        assert!(base.is_compatible(&frame([Integer, Null], [Integer])));
        assert!(base.is_compatible(&frame([Integer, string.clone(), Top], [Integer])));
        assert!(!base.is_compatible(&frame([Integer, string.clone()], [])));
        assert!(!base.is_compatible(&frame([Float, string.clone()], [Integer])));
        assert!(!base.is_compatible(&frame([Integer], [Integer])));
        assert!(!base.is_compatible(&frame([Integer, string], [Float])));
    }

    #[test]
    fn rendering() {
        let rendered = frame([Integer, Long, Top, Top], [Object(RefType::STRING)]).to_string();
        assert_eq!(rendered, "locals [int, long] stack [Ljava/lang/String;]");
    }
}
