//! Positions and iterators over dense arrays.
//!
//! Every pool iterates its dense array from the back to the front, so the
//! most recently added element comes first. A [`Cursor`] stores its position
//! as an offset counted down from the logical end of the array: `end` is
//! always offset zero, no matter how long the array is, and removing the
//! element under a cursor with swap-and-pop never invalidates it.

use std::cmp::Ordering;
use std::iter::FusedIterator;

/// Random-access position in a dense array, in iteration order.
///
/// A cursor with offset `n` refers to dense position `n - 1`. Cursors compare
/// by iteration order: the cursor returned by `begin` is the smallest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Cursor {
    offset: usize,
}

impl Cursor {
    /// First position of an array of `len` elements.
    #[must_use]
    pub const fn begin(len: usize) -> Self {
        Self { offset: len }
    }

    /// One past the last position of any array.
    #[must_use]
    pub const fn end() -> Self {
        Self { offset: 0 }
    }

    /// Cursor referring to dense position `index`.
    #[must_use]
    pub const fn at(index: usize) -> Self {
        Self { offset: index + 1 }
    }

    /// Distance from the logical end.
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset
    }

    /// Whether the cursor is past the last element.
    #[must_use]
    pub const fn is_end(self) -> bool {
        self.offset == 0
    }

    /// Dense position the cursor refers to.
    #[must_use]
    pub fn index(self) -> usize {
        debug_assert!(!self.is_end(), "end cursor has no position");
        self.offset - 1
    }

    /// Move `n` steps forward in iteration order, saturating at the end.
    #[must_use]
    pub const fn advance(self, n: usize) -> Self {
        Self {
            offset: self.offset.saturating_sub(n),
        }
    }

    /// Move `n` steps backward in iteration order.
    #[must_use]
    pub const fn retreat(self, n: usize) -> Self {
        Self {
            offset: self.offset + n,
        }
    }

    /// Number of steps from `self` to `other`, negative if `other` comes first.
    #[must_use]
    pub fn distance(self, other: Self) -> isize {
        self.offset as isize - other.offset as isize
    }

    /// Element under the cursor, if it is inside `dense`.
    pub fn get<T: Copy>(self, dense: &[T]) -> Option<T> {
        self.offset.checked_sub(1).and_then(|pos| dense.get(pos).copied())
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        other.offset.cmp(&self.offset)
    }
}

/// Dense positions in iteration order: `front - 1` down to `back`.
#[derive(Clone, Debug)]
pub struct Positions {
    front: usize,
    back: usize,
}

impl Positions {
    /// Every position of an array of `len` elements.
    #[must_use]
    pub const fn new(len: usize) -> Self {
        Self { front: len, back: 0 }
    }

    /// Cursor of the next position to be yielded.
    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        Cursor::begin(self.front)
    }
}

impl Iterator for Positions {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.front == self.back {
            return None;
        }
        self.front -= 1;
        Some(self.front)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.front - self.back;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Positions {
    #[inline]
    fn next_back(&mut self) -> Option<usize> {
        if self.front == self.back {
            return None;
        }
        self.back += 1;
        Some(self.back - 1)
    }
}

impl ExactSizeIterator for Positions {}
impl FusedIterator for Positions {}

/// Elements of a dense array in iteration order.
#[derive(Clone, Debug)]
pub struct DenseIter<'a, T> {
    dense: &'a [T],
    positions: Positions,
}

impl<'a, T: Copy> DenseIter<'a, T> {
    /// Iterate all of `dense`.
    #[must_use]
    pub const fn new(dense: &'a [T]) -> Self {
        Self {
            dense,
            positions: Positions::new(dense.len()),
        }
    }

    /// Iterate the first `len` dense positions only.
    #[must_use]
    pub fn prefix(dense: &'a [T], len: usize) -> Self {
        debug_assert!(len <= dense.len(), "prefix exceeds the array");
        Self {
            dense,
            positions: Positions::new(len),
        }
    }

    /// Cursor of the next element to be yielded.
    #[must_use]
    pub const fn cursor(&self) -> Cursor {
        self.positions.cursor()
    }
}

impl<T: Copy> Iterator for DenseIter<'_, T> {
    type Item = T;

    #[inline]
    fn next(&mut self) -> Option<T> {
        self.positions.next().map(|pos| self.dense[pos])
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.positions.size_hint()
    }
}

impl<T: Copy> DoubleEndedIterator for DenseIter<'_, T> {
    #[inline]
    fn next_back(&mut self) -> Option<T> {
        self.positions.next_back().map(|pos| self.dense[pos])
    }
}

impl<T: Copy> ExactSizeIterator for DenseIter<'_, T> {}
impl<T: Copy> FusedIterator for DenseIter<'_, T> {}
