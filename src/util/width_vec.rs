use std::fmt::{Debug, Error, Formatter};
use std::iter::{Extend, FromIterator};
use std::ops::Sub;
use std::result::Result;

/// Elements that occupy a fixed number of slots (eg. inside a `WidthVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", indexed either by position or by the sum
/// of the widths of the preceding elements.
///
/// The JVM counts in slots in a handful of places where values are not all the same size:
///
///   - constant pool indices (long and double constants take up two entries)
///   - the operand stack (category 2 values take up two slots)
///   - local variables (same as the operand stack)
///
#[derive(Clone)]
pub struct WidthVec<T> {
    /// Entries, along with the slot offset at which they start
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,

    /// Offset for the first element (0 for stacks, 1 for the constant pool)
    initial_offset: Offset,
}

/// Slot offset into a `WidthVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl<T: Width> WidthVec<T> {
    pub fn new() -> WidthVec<T> {
        WidthVec::new_starting_at(Offset(0))
    }

    /// New empty vector, with a custom offset for the first element
    pub fn new_starting_at(initial_offset: Offset) -> WidthVec<T> {
        WidthVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Number of entries (not slots)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset of the next element to be added
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Total number of slots occupied
    pub fn slots(&self) -> usize {
        self.offset_len.0 - self.initial_offset.0
    }

    /// Add an entry to the back, returning the offset at which it was placed
    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }

    /// Remove an entry from the back
    pub fn pop(&mut self) -> Option<T> {
        let (offset, elem) = self.entries.pop()?;
        self.offset_len = offset;
        Some(elem)
    }

    /// Last entry, if any
    pub fn last(&self) -> Option<&T> {
        self.entries.last().map(|(_, elem)| elem)
    }

    /// Get the entry starting exactly at some offset
    ///
    /// Offsets that land inside a wide element (or past the end) produce `None`.
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    /// Mutably visit every entry
    pub fn for_each_mut(&mut self, mut visit: impl FnMut(&mut T)) {
        for (_, elem) in &mut self.entries {
            visit(elem);
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(offset, elem)| (*offset, elem))
    }
}

impl<T: PartialEq> PartialEq for WidthVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T: Eq> Eq for WidthVec<T> {}

impl<T: Width> Default for WidthVec<T> {
    fn default() -> Self {
        WidthVec::new()
    }
}

impl<T: Width> FromIterator<T> for WidthVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut vec = WidthVec::new();
        vec.extend(elems);
        vec
    }
}

impl<T: Width> Extend<T> for WidthVec<T> {
    fn extend<U: IntoIterator<Item = T>>(&mut self, iter: U) {
        for elem in iter {
            self.push(elem);
        }
    }
}

impl<T> IntoIterator for WidthVec<T> {
    type Item = T;
    type IntoIter = std::iter::Map<std::vec::IntoIter<(Offset, T)>, fn((Offset, T)) -> T>;

    fn into_iter(self) -> Self::IntoIter {
        fn element<T>((_, elem): (Offset, T)) -> T {
            elem
        }
        self.entries.into_iter().map(element as fn((Offset, T)) -> T)
    }
}

impl<T: Debug> Debug for WidthVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Slot {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::Narrow(_) => 1,
                Slot::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_account_for_width() {
        let slots: WidthVec<Slot> = vec![Slot::Narrow(1), Slot::Wide(2), Slot::Narrow(3)]
            .into_iter()
            .collect();
        assert_eq!(
            slots.iter().map(|(off, _)| off).collect::<Vec<_>>(),
            vec![Offset(0), Offset(1), Offset(3)]
        );
        assert_eq!(slots.offset_len(), Offset(4));
        assert_eq!(slots.slots(), 4);
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn lookup_inside_wide_element() {
        let slots: WidthVec<Slot> = vec![Slot::Wide(1), Slot::Narrow(2)].into_iter().collect();
        assert_eq!(slots.get_offset(Offset(0)), Some(&Slot::Wide(1)));
        assert_eq!(slots.get_offset(Offset(1)), None);
        assert_eq!(slots.get_offset(Offset(2)), Some(&Slot::Narrow(2)));
        assert_eq!(slots.get_offset(Offset(3)), None);
    }

    #[test]
    fn pop_restores_offset() {
        let mut slots: WidthVec<Slot> = WidthVec::new_starting_at(Offset(1));
        slots.push(Slot::Narrow(1));
        slots.push(Slot::Wide(2));
        assert_eq!(slots.offset_len(), Offset(4));
        assert_eq!(slots.slots(), 3);
        assert_eq!(slots.pop(), Some(Slot::Wide(2)));
        assert_eq!(slots.offset_len(), Offset(2));
        assert_eq!(slots.pop(), Some(Slot::Narrow(1)));
        assert_eq!(slots.pop(), None);
        assert_eq!(slots.offset_len(), Offset(1));
    }
}
