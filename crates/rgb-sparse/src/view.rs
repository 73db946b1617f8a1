//! Views: stateless intersections of pools.
//!
//! A view iterates the entities that are in every *get* pool and in no
//! *exclude* pool. Nothing is cached: the view walks the smallest get pool
//! (the *driver*) and probes the others for every candidate.
//!
//! Exclude slots may be left unbound. An unbound slot behaves like an empty
//! pool, and [`View::ok`] reports `false` until every slot is bound.
//!
//! # Example
//!
//! ```ignore
//! let view = registry.view::<(Position, Velocity), (Frozen,)>();
//! view.each(|entity, (pos, vel)| {
//!     println!("{entity}: {pos:?} {vel:?}");
//! });
//! ```

use std::fmt;
use std::iter::FusedIterator;
use std::ops::BitOr;

use smallvec::SmallVec;

use crate::cursor::{Cursor, Positions};
use crate::entity::EntityLike;
use crate::fetch::{ComponentSet, Join, PerComponent};
use crate::sparse_set::{DeletionPolicy, SparseSet};

/// Elements of `pool` a view has to walk.
fn pool_len<E: EntityLike>(pool: &SparseSet<E>) -> usize {
    if pool.policy() == DeletionPolicy::SwapOnly {
        pool.free_list()
    } else {
        pool.len()
    }
}

/// Intersection of get pools minus exclude pools.
pub struct View<'a, E: EntityLike, G: ComponentSet<E>> {
    storages: G::Storages<'a>,
    pools: PerComponent<&'a SparseSet<E>>,
    filter: PerComponent<Option<&'a SparseSet<E>>>,
    driver: Option<usize>,
}

impl<E: EntityLike, G: ComponentSet<E>> Clone for View<'_, E, G> {
    fn clone(&self) -> Self {
        Self {
            storages: self.storages,
            pools: self.pools.clone(),
            filter: self.filter.clone(),
            driver: self.driver,
        }
    }
}

impl<E: EntityLike, G: ComponentSet<E>> fmt::Debug for View<'_, E, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("components", &G::type_names())
            .field("filter", &self.filter.len())
            .field("driver", &self.driver)
            .finish()
    }
}

impl<'a, E: EntityLike, G: ComponentSet<E>> View<'a, E, G> {
    /// View over `storages` with no exclude pool.
    pub fn new(storages: G::Storages<'a>) -> Self {
        Self::with_filter(storages, [])
    }

    /// View over `storages` excluding entities of the `exclude` pools.
    pub fn with_exclude(
        storages: G::Storages<'a>,
        exclude: impl IntoIterator<Item = &'a SparseSet<E>>,
    ) -> Self {
        Self::with_filter(storages, exclude.into_iter().map(Some))
    }

    /// View with exclude slots, `None` marking a slot still to be bound.
    pub fn with_filter(
        storages: G::Storages<'a>,
        filter: impl IntoIterator<Item = Option<&'a SparseSet<E>>>,
    ) -> Self {
        let mut view = Self {
            storages,
            pools: G::bases(storages),
            filter: filter.into_iter().collect(),
            driver: None,
        };
        view.refresh();
        view
    }

    /// Pick the smallest get pool as the driver again.
    pub fn refresh(&mut self) {
        self.driver = self
            .pools
            .iter()
            .enumerate()
            .min_by_key(|(_, pool)| pool_len(pool))
            .map(|(index, _)| index);
    }

    /// Drive iteration with the get pool at `index`.
    pub fn use_pool(&mut self, index: usize) {
        debug_assert!(index < self.pools.len(), "get pool {index} out of range");
        self.driver = Some(index);
    }

    /// Bind exclude slot `index`.
    pub fn set_exclude(&mut self, index: usize, pool: &'a SparseSet<E>) {
        self.filter[index] = Some(pool);
    }

    /// Exclude pool bound at slot `index`.
    pub fn exclude(&self, index: usize) -> Option<&'a SparseSet<E>> {
        self.filter.get(index).copied().flatten()
    }

    /// Storages of the get components.
    pub fn storages(&self) -> G::Storages<'a> {
        self.storages
    }

    /// Whether every pool is bound.
    pub fn ok(&self) -> bool {
        self.driver.is_some() && self.filter.iter().all(Option::is_some)
    }

    /// The driving pool.
    pub fn handle(&self) -> Option<&'a SparseSet<E>> {
        self.driver.map(|index| self.pools[index])
    }

    fn is_single(&self) -> bool {
        self.pools.len() == 1 && self.filter.is_empty()
    }

    /// Upper bound of the number of entities the view yields.
    ///
    /// Exact for a single get pool without excludes.
    pub fn size_hint(&self) -> usize {
        let Some(handle) = self.handle() else {
            return 0;
        };
        if self.is_single() && !handle.contiguous() {
            return handle.iter().filter(|entity| !entity.is_tombstone()).count();
        }
        pool_len(handle)
    }

    /// Whether `entity` is in every get pool and no exclude pool.
    pub fn contains(&self, entity: E) -> bool {
        self.driver.is_some()
            && self.pools.iter().all(|pool| pool.contains(entity))
            && self.filter.iter().flatten().all(|pool| !pool.contains(entity))
    }

    /// Entities of the view, in the iteration order of the driver.
    pub fn iter(&self) -> ViewIter<'a, E> {
        let Some(index) = self.driver else {
            return ViewIter::empty();
        };
        let driver = self.pools[index];
        ViewIter {
            driver: Some(driver),
            others: self
                .pools
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != index)
                .map(|(_, &pool)| pool)
                .collect(),
            filter: self.filter.iter().flatten().copied().collect(),
            skip_tombstones: driver.policy() == DeletionPolicy::InPlace,
            positions: Positions::new(pool_len(driver)),
        }
    }

    /// Entities with their components.
    pub fn components(&self) -> impl Iterator<Item = (E, G::Refs<'a>)> + 'a {
        let storages = self.storages;
        self.iter()
            .filter_map(move |entity| G::fetch(storages, entity).map(|refs| (entity, refs)))
    }

    /// Call `func` with every entity and its components.
    pub fn each(&self, mut func: impl FnMut(E, G::Refs<'a>)) {
        for (entity, refs) in self.components() {
            func(entity, refs);
        }
    }

    /// Components of a contained entity.
    pub fn get(&self, entity: E) -> Option<G::Refs<'a>> {
        if !self.contains(entity) {
            return None;
        }
        G::fetch(self.storages, entity)
    }

    /// First entity in iteration order.
    pub fn front(&self) -> Option<E> {
        self.iter().next()
    }

    /// Last entity in iteration order.
    pub fn back(&self) -> Option<E> {
        self.iter().next_back()
    }

    /// Cursor to `entity` within the driver, if the view contains it.
    pub fn find(&self, entity: E) -> Option<Cursor> {
        if !self.contains(entity) {
            return None;
        }
        self.handle().and_then(|handle| handle.find(entity))
    }

    /// Merge with another view: get and exclude pools are concatenated.
    pub fn join<R: ComponentSet<E>>(self, other: View<'a, E, R>) -> View<'a, E, Join<G, R>> {
        let mut view = View {
            storages: (self.storages, other.storages),
            pools: self.pools.into_iter().chain(other.pools).collect(),
            filter: self.filter.into_iter().chain(other.filter).collect(),
            driver: None,
        };
        view.refresh();
        view
    }
}

impl<'a, E: EntityLike, L: ComponentSet<E>, R: ComponentSet<E>> BitOr<View<'a, E, R>>
    for View<'a, E, L>
{
    type Output = View<'a, E, Join<L, R>>;

    fn bitor(self, rhs: View<'a, E, R>) -> Self::Output {
        self.join(rhs)
    }
}

impl<'a, E: EntityLike, G: ComponentSet<E>> IntoIterator for &View<'a, E, G> {
    type Item = E;
    type IntoIter = ViewIter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entities of a view.
#[derive(Clone)]
pub struct ViewIter<'a, E: EntityLike> {
    driver: Option<&'a SparseSet<E>>,
    others: SmallVec<[&'a SparseSet<E>; 4]>,
    filter: SmallVec<[&'a SparseSet<E>; 4]>,
    skip_tombstones: bool,
    positions: Positions,
}

impl<'a, E: EntityLike> ViewIter<'a, E> {
    fn empty() -> Self {
        Self {
            driver: None,
            others: SmallVec::new(),
            filter: SmallVec::new(),
            skip_tombstones: false,
            positions: Positions::new(0),
        }
    }

    fn accepts(&self, entity: E) -> bool {
        (!self.skip_tombstones || !entity.is_tombstone())
            && self.others.iter().all(|pool| pool.contains(entity))
            && self.filter.iter().all(|pool| !pool.contains(entity))
    }
}

impl<E: EntityLike> Iterator for ViewIter<'_, E> {
    type Item = E;

    fn next(&mut self) -> Option<E> {
        let driver = self.driver?;
        while let Some(pos) = self.positions.next() {
            let entity = driver.access(pos);
            if self.accepts(entity) {
                return Some(entity);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.positions.len()))
    }
}

impl<E: EntityLike> DoubleEndedIterator for ViewIter<'_, E> {
    fn next_back(&mut self) -> Option<E> {
        let driver = self.driver?;
        while let Some(pos) = self.positions.next_back() {
            let entity = driver.access(pos);
            if self.accepts(entity) {
                return Some(entity);
            }
        }
        None
    }
}

impl<E: EntityLike> FusedIterator for ViewIter<'_, E> {}
