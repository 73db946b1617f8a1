//! Storage of the identifiers themselves.
//!
//! The entity storage is a `SwapOnly` sparse set: alive entities occupy
//! `data()[..in_use()]`, released ones sit behind the boundary with their
//! version already bumped, ready to be handed out again.

use std::fmt;

use crate::cursor::DenseIter;
use crate::entity::{Entity, EntityLike};
use crate::sparse_set::{DeletionPolicy, SparseSet};

/// Allocator and registry of entity identifiers.
#[derive(Clone)]
pub struct EntityStorage<E: EntityLike = Entity> {
    base: SparseSet<E>,
    /// Next never-used index candidate.
    placeholder: usize,
}

impl<E: EntityLike> Default for EntityStorage<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityLike> fmt::Debug for EntityStorage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStorage")
            .field("in_use", &self.in_use())
            .field("len", &self.base.len())
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

impl<E: EntityLike> EntityStorage<E> {
    /// Create an empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: SparseSet::raw(DeletionPolicy::SwapOnly),
            placeholder: 0,
        }
    }

    /// Underlying sparse set, released entities included.
    pub fn base(&self) -> &SparseSet<E> {
        &self.base
    }

    /// Raw packed array: alive entities first, then released ones.
    pub fn data(&self) -> &[E] {
        self.base.data()
    }

    /// Number of slots, alive or released.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    /// Whether no entity was ever created (or the storage was cleared).
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// Number of alive entities.
    pub fn in_use(&self) -> usize {
        self.base.free_list()
    }

    /// Move the alive boundary, e.g. after restoring a snapshot.
    pub fn set_in_use(&mut self, len: usize) {
        self.base.set_free_list(len);
    }

    /// Whether `entity` is alive with this exact version.
    pub fn contains(&self, entity: E) -> bool {
        self.base.contains(entity) && self.base.index(entity) < self.base.free_list()
    }

    /// Version currently associated with the index of `entity`.
    pub fn current(&self, entity: E) -> u32 {
        self.base.current(entity)
    }

    /// Alive entities in iteration order.
    pub fn iter(&self) -> DenseIter<'_, E> {
        DenseIter::prefix(self.base.data(), self.base.free_list())
    }

    /// Continue minting fresh indices from `hint`.
    pub fn start_from(&mut self, hint: E) {
        self.placeholder = hint.to_index();
    }

    fn from_placeholder(&mut self) -> E {
        let entity = E::construct(self.placeholder, 0);
        self.placeholder += usize::from(!entity.is_null());
        entity
    }

    /// Whether the index of `entity` has a slot, alive or released.
    fn is_taken(&self, entity: E) -> bool {
        self.base
            .contains(E::construct(entity.to_index(), self.base.current(entity)))
    }

    /// Smallest never-used index whose slot is free.
    fn next_fresh(&mut self) -> E {
        let mut entity = self.from_placeholder();
        while self.is_taken(entity) && !entity.is_null() {
            entity = self.from_placeholder();
        }
        entity
    }

    /// Create an entity, recycling a released one if possible.
    ///
    /// # Panics
    ///
    /// Panics if every index of the identifier layout is in use.
    pub fn generate(&mut self) -> E {
        let len = self.base.free_list();
        let entity = if len == self.base.len() {
            self.next_fresh()
        } else {
            let recycled = self.base.access(len);
            tracing::trace!(entity = ?recycled, "recycling entity");
            recycled
        };
        assert!(!entity.is_null(), "no more entities available");
        let pos = self.base.try_emplace(entity, true);
        self.base.access(pos)
    }

    /// Create `hint` if its index is free, any entity otherwise.
    pub fn generate_with_hint(&mut self, hint: E) -> E {
        if !hint.is_null() && !hint.is_tombstone() {
            let curr = E::construct(hint.to_index(), self.base.current(hint));
            if !self.is_taken(curr) || self.base.index(curr) >= self.base.free_list() {
                let pos = self.base.try_emplace(hint, true);
                return self.base.access(pos);
            }
        }
        self.generate()
    }

    /// Create `count` entities.
    pub fn generate_n(&mut self, count: usize) -> Vec<E> {
        (0..count).map(|_| self.generate()).collect()
    }

    /// Mark exact identifiers alive, e.g. when loading a snapshot.
    pub fn insert(&mut self, entities: impl IntoIterator<Item = E>) {
        for entity in entities {
            self.base.try_emplace(entity, true);
        }
    }

    /// Release an alive entity, bumping its version.
    pub fn erase(&mut self, entity: E) {
        debug_assert!(self.contains(entity), "{entity:?} is not alive");
        self.base.erase(entity);
    }

    /// Release `entity` if alive.
    pub fn remove(&mut self, entity: E) -> bool {
        if !self.contains(entity) {
            return false;
        }
        self.base.erase(entity);
        true
    }

    /// Forget every entity and restart numbering from zero.
    pub fn clear(&mut self) {
        self.base.pop_all();
        self.placeholder = 0;
    }
}

impl<'a, E: EntityLike> IntoIterator for &'a EntityStorage<E> {
    type Item = E;
    type IntoIter = DenseIter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
