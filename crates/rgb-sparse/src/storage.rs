//! Typed component storage.
//!
//! A [`Storage`] pairs a [`SparseSet`] with a paged payload array: the
//! component of the entity at dense position `pos` lives in page
//! `pos / T::PAGE_SIZE`. Pages are allocated on demand and never move, and
//! every dense reordering of the sparse set is mirrored on the payload.
//!
//! Types with a page size of zero get an *empty storage*: membership only.
//! Such types must be zero-sized; the storage keeps one instance of the type
//! and lends it out for every contained entity, so there is no per-entity
//! data to lose.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;
use std::ops::Deref;

use crate::component::{Component, policy_of};
use crate::cursor::Positions;
use crate::entity::{Entity, EntityLike};
use crate::sparse_set::{DeletionPolicy, SparseSet};

/// Paged payload array indexed by dense position.
struct Payload<T> {
    pages: Vec<Box<[Option<T>]>>,
    page_size: usize,
}

impl<T> Payload<T> {
    const fn new(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            page_size,
        }
    }

    fn cell(&self, pos: usize) -> Option<&T> {
        self.pages
            .get(pos / self.page_size)?
            .get(pos % self.page_size)?
            .as_ref()
    }

    fn cell_mut(&mut self, pos: usize) -> &mut Option<T> {
        let page = pos / self.page_size;
        while self.pages.len() <= page {
            self.pages
                .push((0..self.page_size).map(|_| None).collect());
        }
        &mut self.pages[page][pos % self.page_size]
    }

    fn take(&mut self, pos: usize) -> Option<T> {
        self.pages
            .get_mut(pos / self.page_size)?
            .get_mut(pos % self.page_size)?
            .take()
    }

    /// Exchange two cells. Swapping with an empty cell is a move.
    fn swap(&mut self, lhs: usize, rhs: usize) {
        if lhs == rhs {
            return;
        }
        let value = self.take(lhs);
        let value = std::mem::replace(self.cell_mut(rhs), value);
        *self.cell_mut(lhs) = value;
    }

    fn capacity(&self) -> usize {
        self.pages.len() * self.page_size
    }

    /// Drop pages past the first `len` cells.
    fn shrink(&mut self, len: usize) {
        self.pages.truncate(len.div_ceil(self.page_size));
        self.pages.shrink_to_fit();
    }
}

/// Sparse set of entities with one `T` per entity.
pub struct Storage<T: Component, E: EntityLike = Entity> {
    base: SparseSet<E>,
    /// `None` for empty storage.
    payload: Option<Payload<T>>,
    /// Zero-sized instance lent out by an empty storage.
    unit: Option<T>,
}

impl<T: Component, E: EntityLike> Default for Storage<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component, E: EntityLike> fmt::Debug for Storage<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("component", &std::any::type_name::<T>())
            .field("base", &self.base)
            .finish()
    }
}

impl<T: Component, E: EntityLike> Deref for Storage<T, E> {
    type Target = SparseSet<E>;

    fn deref(&self) -> &SparseSet<E> {
        &self.base
    }
}

impl<T: Component, E: EntityLike> Storage<T, E> {
    const IN_PLACE_NEEDS_VERSIONS: () = assert!(
        !T::IN_PLACE_DELETE || E::VERSION_MASK != 0,
        "in-place deletion is not supported by identifiers without version bits"
    );

    const EMPTY_NEEDS_ZST: () = assert!(
        T::PAGE_SIZE != 0 || size_of::<T>() == 0,
        "empty storage (page size 0) requires a zero-sized component type"
    );

    /// Create an empty storage configured by the component traits of `T`.
    #[must_use]
    pub fn new() -> Self {
        let () = Self::IN_PLACE_NEEDS_VERSIONS;
        let () = Self::EMPTY_NEEDS_ZST;
        Self {
            base: SparseSet::raw(policy_of::<T>()),
            payload: (T::PAGE_SIZE != 0).then(|| Payload::new(T::PAGE_SIZE)),
            unit: None,
        }
    }

    /// Underlying sparse set.
    pub fn base(&self) -> &SparseSet<E> {
        &self.base
    }

    /// Whether this is an empty storage with no payload array.
    pub fn is_empty_type(&self) -> bool {
        self.payload.is_none()
    }

    /// Number of payload slots allocated.
    pub fn payload_capacity(&self) -> usize {
        self.payload.as_ref().map_or(0, Payload::capacity)
    }

    /// Release unused packed capacity and payload pages.
    pub fn shrink_to_fit(&mut self) {
        self.base.shrink_to_fit();
        if let Some(payload) = &mut self.payload {
            payload.shrink(self.base.len());
        }
    }

    // ==================== Access ====================

    /// Whether dense position `pos` holds a live entity.
    fn is_live(&self, pos: usize) -> bool {
        self.base.at(pos).is_some_and(|entity| !entity.is_tombstone())
    }

    /// Component at dense position `pos`.
    pub fn value_at(&self, pos: usize) -> Option<&T> {
        match &self.payload {
            Some(payload) => payload.cell(pos),
            None if self.is_live(pos) => self.unit.as_ref(),
            None => None,
        }
    }

    /// Mutable component at dense position `pos`.
    pub fn value_at_mut(&mut self, pos: usize) -> Option<&mut T> {
        if !self.is_live(pos) {
            return None;
        }
        match &mut self.payload {
            Some(payload) => payload.cell_mut(pos).as_mut(),
            None => self.unit.as_mut(),
        }
    }

    /// Component of `entity`, if present.
    pub fn get(&self, entity: E) -> Option<&T> {
        if !self.base.contains(entity) {
            return None;
        }
        self.value_at(self.base.index(entity))
    }

    /// Mutable component of `entity`, if present.
    pub fn get_mut(&mut self, entity: E) -> Option<&mut T> {
        if !self.base.contains(entity) {
            return None;
        }
        let pos = self.base.index(entity);
        self.value_at_mut(pos)
    }

    // ==================== Insertion ====================

    /// Attach `value` to `entity`, which must not have one yet.
    pub fn emplace(&mut self, entity: E, value: T) -> &mut T {
        debug_assert!(
            !self.base.contains(entity),
            "{entity:?} already has a {}",
            std::any::type_name::<T>()
        );
        let pos = self.base.try_emplace(entity, false);
        match &mut self.payload {
            Some(payload) => payload.cell_mut(pos).insert(value),
            None => self.unit.insert(value),
        }
    }

    /// Attach a clone of `value` to every entity, appending at the back.
    pub fn insert(&mut self, entities: impl IntoIterator<Item = E>, value: T)
    where
        T: Clone,
    {
        for entity in entities {
            self.push_back(entity, value.clone());
        }
    }

    /// Attach one value per entity, appending at the back.
    pub fn insert_from(
        &mut self,
        entities: impl IntoIterator<Item = E>,
        values: impl IntoIterator<Item = T>,
    ) {
        for (entity, value) in entities.into_iter().zip(values) {
            self.push_back(entity, value);
        }
    }

    fn push_back(&mut self, entity: E, value: T) {
        let pos = self.base.try_emplace(entity, true);
        match &mut self.payload {
            Some(payload) => *payload.cell_mut(pos) = Some(value),
            None => self.unit = Some(value),
        }
    }

    /// Run `func` on the component of `entity`.
    pub fn patch(&mut self, entity: E, func: impl FnOnce(&mut T)) -> Option<&mut T> {
        let value = self.get_mut(entity)?;
        func(value);
        Some(value)
    }

    /// Swap in a new component, returning the previous one.
    pub fn replace(&mut self, entity: E, value: T) -> Option<T> {
        self.get_mut(entity)
            .map(|slot| std::mem::replace(slot, value))
    }

    // ==================== Removal ====================

    /// Detach and return the component of a contained entity.
    pub fn take(&mut self, entity: E) -> Option<T> {
        if !self.base.contains(entity) {
            return None;
        }
        let Self { base, payload, .. } = self;
        match payload {
            Some(payload) => {
                let released = base.pop_with(entity, &mut |a, b| payload.swap(a, b))?;
                payload.take(released)
            }
            None => {
                base.pop_with(entity, &mut |_, _| {});
                None
            }
        }
    }

    /// Detach the component of a contained entity.
    pub fn erase(&mut self, entity: E) {
        debug_assert!(self.base.contains(entity), "storage does not contain {entity:?}");
        self.take(entity);
    }

    /// Detach the component of `entity` if present.
    pub fn remove(&mut self, entity: E) -> bool {
        if !self.base.contains(entity) {
            return false;
        }
        self.take(entity);
        true
    }

    /// Detach every present entity of `entities`, returning how many were.
    pub fn remove_range(&mut self, entities: impl IntoIterator<Item = E>) -> usize {
        entities
            .into_iter()
            .filter(|&entity| self.remove(entity))
            .count()
    }

    /// Drop every component.
    pub fn clear(&mut self) {
        self.base.pop_all();
        if let Some(payload) = &mut self.payload {
            payload.pages.clear();
        }
        self.unit = None;
    }

    /// Reclaim tombstones, keeping survivors in order.
    pub fn compact(&mut self) {
        let Self { base, payload, .. } = self;
        match payload {
            Some(payload) => base.compact_with(&mut |from, to| payload.swap(from, to)),
            None => base.compact(),
        }
    }

    // ==================== Reordering ====================

    /// Exchange the dense positions of two entities, payload included.
    pub fn swap_elements(&mut self, lhs: E, rhs: E) {
        let Self { base, payload, .. } = self;
        match payload {
            Some(payload) => base.swap_elements_with(lhs, rhs, &mut |a, b| payload.swap(a, b)),
            None => base.swap_elements(lhs, rhs),
        }
    }

    /// Lay out `order` as the iteration order of the prefix it covers.
    pub(crate) fn arrange(&mut self, order: &[E]) {
        let Self { base, payload, .. } = self;
        match payload {
            Some(payload) => base.arrange(order, &mut |a, b| payload.swap(a, b)),
            None => base.arrange(order, &mut |_, _| {}),
        }
    }

    fn sortable_len(&self) -> usize {
        if self.base.policy() == DeletionPolicy::SwapOnly {
            self.base.free_list()
        } else {
            self.base.len()
        }
    }

    /// Sort so that iteration yields components in non-decreasing order.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&T, &T) -> Ordering) {
        let order = self.base.sorted_prefix(self.sortable_len(), |lhs, rhs| {
            match (self.get(*lhs), self.get(*rhs)) {
                (Some(lhs), Some(rhs)) => compare(lhs, rhs),
                _ => Ordering::Equal,
            }
        });
        self.arrange(&order);
    }

    /// Sort by a key extracted from each component.
    pub fn sort_by_key<K: Ord>(&mut self, mut key: impl FnMut(&T) -> K) {
        self.sort_by(|lhs, rhs| key(lhs).cmp(&key(rhs)));
    }

    /// Sort by comparing entities.
    pub fn sort_entities_by(&mut self, compare: impl FnMut(&E, &E) -> Ordering) {
        self.sort_n_entities_by(self.sortable_len(), compare);
    }

    /// Sort the first `length` dense positions by comparing entities.
    pub fn sort_n_entities_by(&mut self, length: usize, compare: impl FnMut(&E, &E) -> Ordering) {
        let order = self.base.sorted_prefix(length, compare);
        self.arrange(&order);
    }

    /// Follow the order of `other`, restricted to contained entities.
    pub fn sort_as(&mut self, other: impl IntoIterator<Item = E>) -> usize {
        let Self { base, payload, .. } = self;
        match payload {
            Some(payload) => base.sort_as_with(other, &mut |a, b| payload.swap(a, b)),
            None => base.sort_as(other),
        }
    }

    // ==================== Iteration ====================

    /// Entities with their components, in iteration order.
    ///
    /// Empty storages have no payload to iterate and yield nothing; walk
    /// [`Storage::base`] for their entities.
    pub fn iter(&self) -> Iter<'_, T, E> {
        let len = if self.payload.is_some() { self.base.len() } else { 0 };
        Iter {
            storage: self,
            positions: Positions::new(len),
        }
    }

    /// Entities with mutable components, in iteration order.
    ///
    /// Empty storages yield nothing, as with [`Storage::iter`].
    pub fn iter_mut(&mut self) -> IterMut<'_, T, E> {
        let entities = self.base.data();
        let Some(payload) = &mut self.payload else {
            return IterMut::empty();
        };
        let len = entities.len();
        let used = len.div_ceil(payload.page_size);
        let page_size = payload.page_size;
        // Make sure every dense position has a page, so cells line up with
        // entities even for trailing tombstones.
        if used > 0 {
            payload.cell_mut(len - 1);
        }
        match payload.pages[..used].split_last_mut() {
            Some((last, pages)) => IterMut {
                entities,
                pages,
                current: &mut last[..len - (used - 1) * page_size],
            },
            None => IterMut::empty(),
        }
    }

    /// Components in iteration order.
    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter().map(|(_, value)| value)
    }
}

impl<'a, T: Component, E: EntityLike> IntoIterator for &'a Storage<T, E> {
    type Item = (E, &'a T);
    type IntoIter = Iter<'a, T, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over `(entity, &component)` pairs. Tombstones are skipped.
pub struct Iter<'a, T: Component, E: EntityLike> {
    storage: &'a Storage<T, E>,
    positions: Positions,
}

impl<'a, T: Component, E: EntityLike> Iterator for Iter<'a, T, E> {
    type Item = (E, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        for pos in self.positions.by_ref() {
            let entity = self.storage.base.access(pos);
            if entity.is_tombstone() {
                continue;
            }
            if let Some(value) = self.storage.value_at(pos) {
                return Some((entity, value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.positions.len()))
    }
}

impl<T: Component, E: EntityLike> DoubleEndedIterator for Iter<'_, T, E> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some(pos) = self.positions.next_back() {
            let entity = self.storage.base.access(pos);
            if entity.is_tombstone() {
                continue;
            }
            if let Some(value) = self.storage.value_at(pos) {
                return Some((entity, value));
            }
        }
        None
    }
}

impl<T: Component, E: EntityLike> FusedIterator for Iter<'_, T, E> {}

/// Iterator over `(entity, &mut component)` pairs. Tombstones are skipped.
pub struct IterMut<'a, T, E> {
    /// Entities not yet visited; consumed from the back.
    entities: &'a [E],
    /// Pages not yet entered; consumed from the back.
    pages: &'a mut [Box<[Option<T>]>],
    /// Remaining cells of the current page; consumed from the back.
    current: &'a mut [Option<T>],
}

impl<T, E> IterMut<'_, T, E> {
    fn empty() -> Self {
        Self {
            entities: &[],
            pages: &mut [],
            current: &mut [],
        }
    }
}

impl<'a, T, E: EntityLike> Iterator for IterMut<'a, T, E> {
    type Item = (E, &'a mut T);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((cell, rest)) = std::mem::take(&mut self.current).split_last_mut() {
                self.current = rest;
                let (&entity, entities) = self.entities.split_last()?;
                self.entities = entities;
                if let Some(value) = cell.as_mut() {
                    return Some((entity, value));
                }
                continue;
            }
            let (page, rest) = std::mem::take(&mut self.pages).split_last_mut()?;
            self.pages = rest;
            self.current = &mut page[..];
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entities.len()))
    }
}

impl<T, E: EntityLike> FusedIterator for IterMut<'_, T, E> {}

/// Type-erased view of a pool, used by the registry and by groups.
pub trait Pool<E: EntityLike>: Any {
    /// Underlying sparse set.
    fn base(&self) -> &SparseSet<E>;

    /// Name of the stored type.
    fn type_name(&self) -> &'static str;

    /// Detach `entity` if present.
    fn remove(&mut self, entity: E) -> bool;

    /// Exchange the dense positions of two contained entities.
    fn swap_elements(&mut self, lhs: E, rhs: E);

    /// Lay out `order` as the iteration order of the prefix it covers.
    fn arrange(&mut self, order: &[E]);

    /// Follow the iteration order of `order`.
    fn sort_as(&mut self, order: &[E]) -> usize;

    /// Drop every element.
    fn clear(&mut self);

    /// Reclaim tombstones.
    fn compact(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component, E: EntityLike> Pool<E> for Storage<T, E> {
    fn base(&self) -> &SparseSet<E> {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn remove(&mut self, entity: E) -> bool {
        Self::remove(self, entity)
    }

    fn swap_elements(&mut self, lhs: E, rhs: E) {
        Self::swap_elements(self, lhs, rhs);
    }

    fn arrange(&mut self, order: &[E]) {
        Self::arrange(self, order);
    }

    fn sort_as(&mut self, order: &[E]) -> usize {
        Self::sort_as(self, order.iter().copied())
    }

    fn clear(&mut self) {
        Self::clear(self);
    }

    fn compact(&mut self) {
        Self::compact(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
