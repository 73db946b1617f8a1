//! Paged sparse set.
//!
//! A sparse set maps entities to dense positions in O(1). It is made of:
//! - a **sparse** page table indexed by the entity index, where the slot of a
//!   contained entity stores `construct(dense_position, entity_version)`,
//! - a **packed** array holding the entities themselves.
//!
//! Since the sparse slot carries the version, a single read answers both
//! "is this index present?" and "is it this generation?".
//!
//! # Deletion Policies
//!
//! | policy | on removal | `len` | stable positions |
//! |---|---|---|---|
//! | [`SwapAndPop`](DeletionPolicy::SwapAndPop) | last element fills the hole | -1 | no |
//! | [`InPlace`](DeletionPolicy::InPlace) | tombstone threaded on the free list | = | yes |
//! | [`SwapOnly`](DeletionPolicy::SwapOnly) | swapped past the free-list boundary, version bumped | = | alive side only |
//!
//! Iteration always walks the packed array from the back to the front.

use std::cmp::Ordering;
use std::fmt;

use crate::config::SPARSE_PAGE;
use crate::cursor::{Cursor, DenseIter};
use crate::entity::EntityLike;
use crate::error::{EcsError, Result};

/// How a sparse set reclaims the dense slot of a removed entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeletionPolicy {
    /// Move the last element into the hole and shrink.
    #[default]
    SwapAndPop,
    /// Leave a tombstone in the hole and reuse it on the next insertion.
    InPlace,
    /// Swap the element behind the free-list boundary and keep it around.
    SwapOnly,
}

/// Sparse set of entities with a configurable deletion policy.
#[derive(Clone)]
pub struct SparseSet<E: EntityLike> {
    sparse: Vec<Option<Box<[E]>>>,
    packed: Vec<E>,
    policy: DeletionPolicy,
    /// `InPlace`: first free dense slot, `max_size()` when there is none.
    /// `SwapOnly`: number of alive elements at the front of `packed`.
    head: usize,
}

impl<E: EntityLike> Default for SparseSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityLike> fmt::Debug for SparseSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseSet")
            .field("policy", &self.policy)
            .field("len", &self.packed.len())
            .field("head", &self.head)
            .finish()
    }
}

impl<E: EntityLike> SparseSet<E> {
    /// Create an empty set using [`DeletionPolicy::SwapAndPop`].
    #[must_use]
    pub fn new() -> Self {
        Self::raw(DeletionPolicy::SwapAndPop)
    }

    /// Create an empty set with the given deletion policy.
    ///
    /// In-place deletion is rejected for identifiers without version bits,
    /// since tombstones could not be told apart from live entities.
    pub fn with_policy(policy: DeletionPolicy) -> Result<Self> {
        if policy == DeletionPolicy::InPlace && E::VERSION_MASK == 0 {
            return Err(EcsError::InPlaceUnsupported);
        }
        Ok(Self::raw(policy))
    }

    pub(crate) fn raw(policy: DeletionPolicy) -> Self {
        Self {
            sparse: Vec::new(),
            packed: Vec::new(),
            policy,
            head: Self::initial_head(policy),
        }
    }

    /// Sentinel position meaning "no free slot".
    #[inline]
    const fn max_size() -> usize {
        E::ENTITY_MASK as usize
    }

    const fn initial_head(policy: DeletionPolicy) -> usize {
        match policy {
            DeletionPolicy::SwapOnly => 0,
            DeletionPolicy::SwapAndPop | DeletionPolicy::InPlace => Self::max_size(),
        }
    }

    /// Sparse slot value for `entity` living at dense position `pos`.
    #[inline]
    fn slot(pos: usize, entity: E) -> E {
        E::construct(pos, entity.to_version())
    }

    #[inline]
    fn page_of(entity: E) -> (usize, usize) {
        let index = entity.to_index();
        (index / SPARSE_PAGE, index % SPARSE_PAGE)
    }

    #[inline]
    fn sparse_ptr(&self, entity: E) -> Option<E> {
        let (page, offset) = Self::page_of(entity);
        self.sparse.get(page)?.as_ref().map(|page| page[offset])
    }

    /// Sparse slot of `entity`, allocating its page on first use.
    fn assure_at_least(&mut self, entity: E) -> &mut E {
        let (page, offset) = Self::page_of(entity);
        if page >= self.sparse.len() {
            self.sparse.resize_with(page + 1, || None);
        }
        let page = self.sparse[page]
            .get_or_insert_with(|| vec![E::null(); SPARSE_PAGE].into_boxed_slice());
        &mut page[offset]
    }

    // ==================== Queries ====================

    /// Deletion policy chosen at construction.
    pub fn policy(&self) -> DeletionPolicy {
        self.policy
    }

    /// Number of dense slots, tombstones and recycled entities included.
    pub fn len(&self) -> usize {
        self.packed.len()
    }

    /// Whether the packed array is empty.
    pub fn is_empty(&self) -> bool {
        self.packed.is_empty()
    }

    /// Capacity of the packed array.
    pub fn capacity(&self) -> usize {
        self.packed.capacity()
    }

    /// Make room for at least `capacity` dense slots.
    pub fn reserve(&mut self, capacity: usize) {
        self.packed
            .reserve(capacity.saturating_sub(self.packed.len()));
    }

    /// Release unused packed capacity.
    pub fn shrink_to_fit(&mut self) {
        self.packed.shrink_to_fit();
    }

    /// Raw packed array, in dense order.
    pub fn data(&self) -> &[E] {
        &self.packed
    }

    /// Free-list head.
    ///
    /// For `SwapOnly` this is the number of alive elements, which live in
    /// `data()[..free_list()]`.
    pub fn free_list(&self) -> usize {
        self.head
    }

    /// Move the free-list boundary of a `SwapOnly` set.
    pub fn set_free_list(&mut self, len: usize) {
        debug_assert!(
            self.policy == DeletionPolicy::SwapOnly && len <= self.packed.len(),
            "invalid free list value"
        );
        self.head = len;
    }

    /// Whether the packed array holds no tombstones.
    pub fn contiguous(&self) -> bool {
        self.policy != DeletionPolicy::InPlace || self.head == Self::max_size()
    }

    /// Whether `entity` is present with this exact version.
    #[inline]
    pub fn contains(&self, entity: E) -> bool {
        let version_bits = E::null().to_bits() & !E::ENTITY_MASK;
        self.sparse_ptr(entity).is_some_and(|elem| {
            ((version_bits & entity.to_bits()) ^ elem.to_bits()) < E::ENTITY_MASK
        })
    }

    /// Version stored for the index of `entity`, tombstone version if absent.
    pub fn current(&self, entity: E) -> u32 {
        self.sparse_ptr(entity)
            .map_or(E::tombstone_version(), E::to_version)
    }

    /// Dense position of a contained entity.
    #[inline]
    pub fn index(&self, entity: E) -> usize {
        debug_assert!(self.contains(entity), "set does not contain {entity:?}");
        self.sparse_ptr(entity)
            .map_or(Self::max_size(), E::to_index)
    }

    /// Cursor to `entity`, if contained.
    pub fn find(&self, entity: E) -> Option<Cursor> {
        self.contains(entity)
            .then(|| Cursor::at(self.index(entity)))
    }

    /// Entity at dense position `pos`, if in bounds.
    pub fn at(&self, pos: usize) -> Option<E> {
        self.packed.get(pos).copied()
    }

    /// Entity at dense position `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is out of bounds.
    pub fn access(&self, pos: usize) -> E {
        self.packed[pos]
    }

    /// Cursor to the first element in iteration order.
    pub fn begin(&self) -> Cursor {
        Cursor::begin(self.packed.len())
    }

    /// Entity under `cursor`, if in bounds.
    pub fn get_at(&self, cursor: Cursor) -> Option<E> {
        cursor.get(&self.packed)
    }

    /// Entities in iteration order, tombstones and recycled entities included.
    pub fn iter(&self) -> DenseIter<'_, E> {
        DenseIter::new(&self.packed)
    }

    // ==================== Insertion ====================

    /// Add `entity`, reusing a free slot when the policy allows it.
    pub fn push(&mut self, entity: E) -> Cursor {
        Cursor::at(self.try_emplace(entity, false))
    }

    /// Add every entity of `entities` at the back, skipping the free list.
    ///
    /// Returns a cursor to the last entity added, or `end` if none was.
    pub fn push_range(&mut self, entities: impl IntoIterator<Item = E>) -> Cursor {
        let mut last = Cursor::end();
        for entity in entities {
            last = Cursor::at(self.try_emplace(entity, true));
        }
        last
    }

    /// Overwrite the stored version of a contained index.
    pub fn bump(&mut self, entity: E) -> u32 {
        debug_assert!(!entity.is_null(), "cannot set the required version");
        let slot = self.assure_at_least(entity);
        debug_assert!(!slot.is_null(), "cannot bump an absent entity");
        *slot = E::combine(*slot, entity);
        let pos = slot.to_index();
        self.packed[pos] = entity;
        entity.to_version()
    }

    /// Insert `entity` and return its dense position.
    pub(crate) fn try_emplace(&mut self, entity: E, force_back: bool) -> usize {
        debug_assert!(
            !entity.is_null() && !entity.is_tombstone(),
            "invalid element {entity:?}"
        );

        match self.policy {
            DeletionPolicy::InPlace if self.head != Self::max_size() && !force_back => {
                let pos = self.head;
                let slot = self.assure_at_least(entity);
                debug_assert!(slot.is_null(), "slot not available");
                *slot = Self::slot(pos, entity);
                self.head = self.packed[pos].to_index();
                self.packed[pos] = entity;
                pos
            }
            DeletionPolicy::SwapAndPop | DeletionPolicy::InPlace => {
                let pos = self.packed.len();
                let slot = self.assure_at_least(entity);
                debug_assert!(slot.is_null(), "slot not available");
                *slot = Self::slot(pos, entity);
                self.packed.push(entity);
                pos
            }
            DeletionPolicy::SwapOnly => {
                let len = self.packed.len();
                let slot = self.assure_at_least(entity);
                if slot.is_null() {
                    *slot = Self::slot(len, entity);
                    self.packed.push(entity);
                } else {
                    debug_assert!(slot.to_index() >= self.head, "slot not available");
                    self.bump(entity);
                }
                let pos = self.head;
                self.head += 1;
                self.swap_at(self.index(entity), pos);
                pos
            }
        }
    }

    // ==================== Removal ====================

    /// Remove a contained entity.
    pub fn erase(&mut self, entity: E) {
        self.pop_with(entity, &mut |_, _| {});
    }

    /// Remove `entity` if contained.
    pub fn remove(&mut self, entity: E) -> bool {
        if !self.contains(entity) {
            return false;
        }
        self.erase(entity);
        true
    }

    /// Remove every contained entity of `entities`, returning how many were.
    pub fn remove_range(&mut self, entities: impl IntoIterator<Item = E>) -> usize {
        entities
            .into_iter()
            .filter(|&entity| self.remove(entity))
            .count()
    }

    /// Remove every entity and reset the free list.
    pub fn clear(&mut self) {
        self.pop_all();
    }

    /// Remove a contained entity according to the policy.
    ///
    /// `on_swap(a, b)` is called before dense positions `a` and `b` exchange
    /// their elements. Returns the dense position whose payload is released,
    /// if any.
    pub(crate) fn pop_with(
        &mut self,
        entity: E,
        on_swap: &mut impl FnMut(usize, usize),
    ) -> Option<usize> {
        let pos = self.index(entity);
        match self.policy {
            DeletionPolicy::SwapAndPop => {
                let last = self.packed.len() - 1;
                on_swap(pos, last);
                let moved = self.packed[last];
                *self.assure_at_least(moved) = Self::slot(pos, moved);
                self.packed[pos] = moved;
                *self.assure_at_least(entity) = E::null();
                self.packed.pop();
                Some(last)
            }
            DeletionPolicy::InPlace => {
                *self.assure_at_least(entity) = E::null();
                self.packed[pos] = E::construct(self.head, E::tombstone_version());
                self.head = pos;
                Some(pos)
            }
            DeletionPolicy::SwapOnly => {
                self.bump(entity.next());
                if pos < self.head {
                    self.head -= 1;
                }
                on_swap(pos, self.head);
                self.swap_at(pos, self.head);
                None
            }
        }
    }

    pub(crate) fn pop_all(&mut self) {
        let skip_tombstones = self.policy == DeletionPolicy::InPlace;
        for index in 0..self.packed.len() {
            let entity = self.packed[index];
            if !(skip_tombstones && entity.is_tombstone()) {
                *self.assure_at_least(entity) = E::null();
            }
        }
        self.head = Self::initial_head(self.policy);
        self.packed.clear();
    }

    // ==================== Reordering ====================

    fn swap_at(&mut self, lhs: usize, rhs: usize) {
        let from = self.packed[lhs];
        let to = self.packed[rhs];
        *self.assure_at_least(from) = Self::slot(rhs, from);
        *self.assure_at_least(to) = Self::slot(lhs, to);
        self.packed.swap(lhs, rhs);
    }

    /// Exchange the dense positions of two contained entities.
    pub fn swap_elements(&mut self, lhs: E, rhs: E) {
        self.swap_elements_with(lhs, rhs, &mut |_, _| {});
    }

    pub(crate) fn swap_elements_with(
        &mut self,
        lhs: E,
        rhs: E,
        on_swap: &mut impl FnMut(usize, usize),
    ) {
        let from = self.index(lhs);
        let to = self.index(rhs);
        debug_assert!(
            self.policy != DeletionPolicy::SwapOnly || ((from < self.head) == (to < self.head)),
            "cross swapping is not supported"
        );
        on_swap(from, to);
        self.swap_at(from, to);
    }

    /// Remove every tombstone, keeping survivors in their relative order.
    pub fn compact(&mut self) {
        self.compact_with(&mut |_, _| {});
    }

    /// `on_move(from, to)` is called for every survivor that changes position.
    pub(crate) fn compact_with(&mut self, on_move: &mut impl FnMut(usize, usize)) {
        if self.contiguous() {
            return;
        }

        let len = self.packed.len();
        let mut write = 0;
        for read in 0..len {
            let entity = self.packed[read];
            if entity.is_tombstone() {
                continue;
            }
            if read != write {
                on_move(read, write);
                self.packed[write] = entity;
                *self.assure_at_least(entity) = Self::slot(write, entity);
            }
            write += 1;
        }

        self.packed.truncate(write);
        self.head = Self::max_size();
        tracing::trace!(reclaimed = len - write, "compacted sparse set");
    }

    /// Number of elements sorting considers.
    fn sortable_len(&self) -> usize {
        if self.policy == DeletionPolicy::SwapOnly {
            self.head
        } else {
            self.packed.len()
        }
    }

    /// Sort the set so that iteration is non-decreasing under `compare`.
    ///
    /// `SwapOnly` sets only sort their alive part.
    pub fn sort_by(&mut self, compare: impl FnMut(&E, &E) -> Ordering) {
        self.sort_n_by(self.sortable_len(), compare);
    }

    /// Sort the first `length` dense positions.
    pub fn sort_n_by(&mut self, length: usize, compare: impl FnMut(&E, &E) -> Ordering) {
        let order = self.sorted_prefix(length, compare);
        self.arrange(&order, &mut |_, _| {});
    }

    /// The first `length` dense positions in iteration order, sorted.
    pub(crate) fn sorted_prefix(
        &self,
        length: usize,
        compare: impl FnMut(&E, &E) -> Ordering,
    ) -> Vec<E> {
        debug_assert!(self.contiguous(), "sorting with tombstones is not allowed");
        debug_assert!(length <= self.packed.len(), "length exceeds the number of elements");
        let mut order: Vec<E> = DenseIter::prefix(&self.packed, length).collect();
        order.sort_by(compare);
        order
    }

    /// Lay out `order` so it becomes the iteration order of the prefix it covers.
    ///
    /// `order` must be a permutation of `data()[..order.len()]`. Payload
    /// follows through `on_swap`, in position space.
    pub(crate) fn arrange(&mut self, order: &[E], on_swap: &mut impl FnMut(usize, usize)) {
        let length = order.len();
        for (offset, &entity) in order.iter().enumerate() {
            self.packed[length - 1 - offset] = entity;
        }

        // Sparse slots still hold the old positions: walk each permutation
        // cycle, moving payload and re-threading slots as we go.
        for pos in 0..length {
            let mut curr = pos;
            let mut next = self.index(self.packed[curr]);

            while curr != next {
                let idx = self.index(self.packed[next]);
                let entity = self.packed[curr];

                on_swap(next, idx);
                *self.assure_at_least(entity) = Self::slot(curr, entity);
                curr = next;
                next = idx;
            }
        }
    }

    /// Reorder so that iteration follows `other`, restricted to contained
    /// entities. Entities not in `other` end up after the matched ones.
    ///
    /// Returns the number of matched entities.
    pub fn sort_as(&mut self, other: impl IntoIterator<Item = E>) -> usize {
        self.sort_as_with(other, &mut |_, _| {})
    }

    pub(crate) fn sort_as_with(
        &mut self,
        other: impl IntoIterator<Item = E>,
        on_swap: &mut impl FnMut(usize, usize),
    ) -> usize {
        debug_assert!(self.contiguous(), "sorting with tombstones is not allowed");
        let mut it = self.sortable_len();
        let mut matched = 0;

        for curr in other {
            if it == 0 {
                break;
            }
            if self.contains(curr) {
                let entity = self.packed[it - 1];
                if entity != curr {
                    self.swap_elements_with(entity, curr, on_swap);
                }
                it -= 1;
                matched += 1;
            }
        }

        matched
    }
}

impl<'a, E: EntityLike> IntoIterator for &'a SparseSet<E> {
    type Item = E;
    type IntoIter = DenseIter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    crate::entity_type!(Flat, u32, entity_mask = 0xFFFF_FFFF, version_mask = 0);

    fn e(index: usize) -> Entity {
        Entity::construct(index, 0)
    }

    fn in_place() -> SparseSet<Entity> {
        SparseSet::with_policy(DeletionPolicy::InPlace).unwrap()
    }

    fn swap_only() -> SparseSet<Entity> {
        SparseSet::with_policy(DeletionPolicy::SwapOnly).unwrap()
    }

    #[test]
    fn test_push_and_contains() {
        let mut set = SparseSet::new();
        set.push(e(3));
        set.push(e(42));

        assert_eq!(set.len(), 2);
        assert!(set.contains(e(3)));
        assert!(set.contains(e(42)));
        assert!(!set.contains(e(4)));
        assert!(!set.contains(Entity::construct(3, 1)));
        assert!(!set.contains(Entity::null()));
        assert_eq!(set.index(e(42)), 1);
    }

    #[test]
    fn test_pages_are_lazy() {
        let mut set = SparseSet::new();
        set.push(e(SPARSE_PAGE * 2 + 5));
        assert!(set.contains(e(SPARSE_PAGE * 2 + 5)));
        assert!(!set.contains(e(5)));
        assert!(set.sparse[0].is_none());
        assert!(set.sparse[2].is_some());
    }

    #[test]
    fn test_swap_and_pop() {
        let mut set = SparseSet::new();
        set.push(e(1));
        set.push(e(2));
        set.erase(e(1));

        assert_eq!(set.len(), 1);
        assert!(!set.contains(e(1)));
        assert_eq!(set.access(0), e(2));
        assert_eq!(set.index(e(2)), 0);
        assert!(set.contiguous());
    }

    #[test]
    fn test_in_place() {
        let mut set = in_place();
        set.push(e(1));
        set.push(e(2));
        set.erase(e(1));

        assert_eq!(set.len(), 2);
        assert!(set.access(0).is_tombstone());
        assert_eq!(set.access(1), e(2));
        assert!(!set.contiguous());

        set.push(e(3));
        assert_eq!(set.access(0), e(3));
        assert!(set.contiguous());

        set.compact();
        assert_eq!(set.len(), 2);
        assert_eq!(set.data(), &[e(3), e(2)]);
    }

    #[test]
    fn test_in_place_free_list_is_lifo() {
        let mut set = in_place();
        set.push(e(10));
        set.push(e(20));
        set.erase(e(10));

        assert!(set.access(0).is_tombstone());
        assert_eq!(set.access(1), e(20));

        set.push(e(30));
        assert_eq!(set.access(0), e(30));

        set.push(e(40));
        set.push(e(50));
        set.erase(e(40));
        set.erase(e(30));
        set.push(e(60));
        set.push(e(70));
        assert_eq!(set.index(e(60)), 0);
        assert_eq!(set.index(e(70)), 2);
    }

    #[test]
    fn test_in_place_push_range_skips_free_list() {
        let mut set = in_place();
        set.push(e(1));
        set.erase(e(1));
        set.push_range([e(2), e(3)]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.index(e(2)), 1);
        assert!(!set.contiguous());
    }

    #[test]
    fn test_compact_preserves_order() {
        let mut set = in_place();
        for index in 1..=6 {
            set.push(e(index));
        }
        set.erase(e(2));
        set.erase(e(5));
        set.erase(e(1));

        set.compact();
        assert!(set.contiguous());
        assert_eq!(set.data(), &[e(3), e(4), e(6)]);
        assert_eq!(set.index(e(6)), 2);

        // The free list is empty again: new entities go to the back.
        set.push(e(7));
        assert_eq!(set.index(e(7)), 3);
    }

    #[test]
    fn test_swap_only() {
        let mut set = swap_only();
        set.push(e(1));
        set.push(e(2));
        set.erase(e(1));

        assert_eq!(set.len(), 2);
        assert_eq!(set.free_list(), 1);
        assert!(!set.contains(e(1)));
        assert!(set.contains(e(1).next()));
        assert_eq!(set.access(0), e(2));
        assert_eq!(set.current(e(1)), 1);
    }

    #[test]
    fn test_swap_only_reinsert_moves_across_boundary() {
        let mut set = swap_only();
        set.push(e(1));
        set.push(e(2));
        set.erase(e(1));

        let revived = Entity::construct(1, 5);
        set.push(revived);
        assert_eq!(set.free_list(), 2);
        assert!(set.contains(revived));
        assert_eq!(set.current(revived), 5);
        assert!(set.index(revived) < set.free_list());
    }

    #[test]
    fn test_zero_version_rejects_in_place() {
        assert_eq!(
            SparseSet::<Flat>::with_policy(DeletionPolicy::InPlace).unwrap_err(),
            EcsError::InPlaceUnsupported
        );
        assert!(SparseSet::<Flat>::with_policy(DeletionPolicy::SwapOnly).is_ok());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut set = SparseSet::new();
        set.push(e(1));
        assert!(set.remove(e(1)));
        assert!(!set.remove(e(1)));
        assert_eq!(set.remove_range([e(1), e(2)]), 0);

        set.push_range([e(1), e(2), e(3)]);
        assert_eq!(set.remove_range([e(1), e(3), e(9)]), 2);
        assert_eq!(set.data(), &[e(2)]);
    }

    #[test]
    fn test_current_and_bump() {
        let mut set = SparseSet::new();
        assert_eq!(set.current(e(4)), Entity::tombstone_version());

        set.push(e(4));
        assert_eq!(set.current(e(4)), 0);
        assert_eq!(set.bump(Entity::construct(4, 9)), 9);
        assert!(set.contains(Entity::construct(4, 9)));
        assert!(!set.contains(e(4)));
        assert_eq!(set.access(0), Entity::construct(4, 9));
    }

    #[test]
    fn test_iteration_is_reverse_dense() {
        let mut set = SparseSet::new();
        set.push_range([e(1), e(2), e(3)]);
        let order: Vec<_> = set.iter().collect();
        assert_eq!(order, vec![e(3), e(2), e(1)]);
        assert_eq!(set.find(e(2)), Some(Cursor::at(1)));
        assert_eq!(set.find(e(9)), None);
    }

    #[test]
    fn test_remove_during_cursor_walk() {
        let mut set = SparseSet::new();
        set.push_range((0..8).map(e));

        let mut visited = Vec::new();
        let mut cursor = set.begin();
        while let Some(entity) = set.get_at(cursor) {
            visited.push(entity);
            if entity.to_index() % 2 == 0 {
                set.erase(entity);
            }
            cursor = cursor.advance(1);
        }

        visited.sort();
        assert_eq!(visited, (0..8).map(e).collect::<Vec<_>>());
        assert_eq!(set.len(), 4);
        assert!(set.iter().all(|entity| entity.to_index() % 2 == 1));
    }

    #[test]
    fn test_clear() {
        let mut set = in_place();
        set.push_range([e(1), e(2)]);
        set.erase(e(1));
        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains(e(2)));
        assert!(set.contiguous());
        set.push(e(2));
        assert_eq!(set.index(e(2)), 0);
    }

    #[test]
    fn test_sort_by() {
        let mut set = SparseSet::new();
        set.push_range([e(5), e(1), e(4), e(2), e(3)]);
        set.sort_by(|a, b| a.to_index().cmp(&b.to_index()));

        let order: Vec<_> = set.iter().map(EntityLike::to_index).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        for (pos, &entity) in set.data().iter().enumerate() {
            assert_eq!(set.index(entity), pos);
        }
    }

    #[test]
    fn test_sort_n_by_leaves_tail() {
        let mut set = SparseSet::new();
        set.push_range([e(9), e(3), e(1), e(7)]);
        set.sort_n_by(3, |a, b| b.cmp(a));

        assert_eq!(set.access(3), e(7));
        let head: Vec<_> = DenseIter::prefix(set.data(), 3).collect();
        assert_eq!(head, vec![e(9), e(3), e(1)]);
    }

    #[test]
    fn test_sort_swap_only_alive_part() {
        let mut set = swap_only();
        set.push_range([e(3), e(1), e(2), e(0)]);
        set.erase(e(0));
        set.sort_by(|a, b| a.cmp(b));

        assert_eq!(set.free_list(), 3);
        let alive: Vec<_> = DenseIter::prefix(set.data(), 3).collect();
        assert_eq!(alive, vec![e(1), e(2), e(3)]);
        assert_eq!(set.access(3), e(0).next());
    }

    #[test]
    fn test_sort_as() {
        let mut lhs = SparseSet::new();
        let mut rhs = SparseSet::new();
        lhs.push_range([e(1), e(2), e(3), e(4)]);
        rhs.push_range([e(3), e(9), e(1), e(4)]);

        let matched = lhs.sort_as(rhs.iter());
        assert_eq!(matched, 3);

        let order: Vec<_> = lhs.iter().collect();
        assert_eq!(&order[..3], &[e(4), e(1), e(3)]);
        assert_eq!(order[3], e(2));
    }

    #[test]
    fn test_swap_elements() {
        let mut set = SparseSet::new();
        set.push_range([e(1), e(2), e(3)]);
        set.swap_elements(e(1), e(3));
        assert_eq!(set.data(), &[e(3), e(2), e(1)]);
        assert_eq!(set.index(e(1)), 2);
        assert_eq!(set.index(e(3)), 0);
    }

    #[test]
    fn test_arrange_reports_payload_swaps() {
        let mut set = SparseSet::new();
        set.push_range([e(0), e(1), e(2)]);
        let mut payload = vec!['a', 'b', 'c'];

        // Iteration order becomes 1, 2, 0, i.e. dense [0, 2, 1].
        set.arrange(&[e(1), e(2), e(0)], &mut |a, b| payload.swap(a, b));

        assert_eq!(set.data(), &[e(0), e(2), e(1)]);
        assert_eq!(payload, vec!['a', 'c', 'b']);
        for (pos, &entity) in set.data().iter().enumerate() {
            assert_eq!(set.index(entity), pos);
        }
    }
}
