//! Groups: cached intersections of pools.
//!
//! A group is kept up to date by the registry, which forwards the
//! construct and destroy events of every involved pool to it.
//!
//! - A **non-owning** group stores its matching entities in a sparse set of
//!   its own.
//! - An **owning** group stores nothing but a length. It reorders the pools
//!   it owns so that the matching entities occupy `data()[..len]` in every
//!   one of them, at the same dense positions. Iterating an owning group is
//!   a walk over aligned arrays with no lookups at all.
//!
//! A pool can be owned by a single group only.

use std::cmp::Ordering;
use std::fmt;

use crate::cursor::{Cursor, DenseIter};
use crate::entity::EntityLike;
use crate::fetch::{ComponentSet, PerComponent};
use crate::sparse_set::SparseSet;
use crate::storage::Pool;

/// Part a pool plays in a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Role {
    Owned,
    Get,
    Exclude,
}

pub(crate) enum GroupState<E: EntityLike> {
    /// Matching entities are `data()[..len]` of every owned pool.
    Owning { len: usize },
    /// Matching entities, in insertion order.
    NonOwning { elem: SparseSet<E> },
}

/// Registry-side bookkeeping of a group.
pub(crate) struct GroupData<E: EntityLike> {
    pub(crate) owned: PerComponent<usize>,
    pub(crate) get: PerComponent<usize>,
    pub(crate) exclude: PerComponent<usize>,
    pub(crate) state: GroupState<E>,
}

impl<E: EntityLike> fmt::Debug for GroupData<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupData")
            .field("owned", &self.owned)
            .field("get", &self.get)
            .field("exclude", &self.exclude)
            .field("len", &self.len())
            .finish()
    }
}

fn contains_all<E: EntityLike>(pools: &[Box<dyn Pool<E>>], indices: &[usize], entity: E) -> bool {
    indices.iter().all(|&index| pools[index].base().contains(entity))
}

fn count_present<E: EntityLike>(pools: &[Box<dyn Pool<E>>], indices: &[usize], entity: E) -> usize {
    indices
        .iter()
        .filter(|&&index| pools[index].base().contains(entity))
        .count()
}

impl<E: EntityLike> GroupData<E> {
    pub(crate) fn new(
        owned: PerComponent<usize>,
        get: PerComponent<usize>,
        exclude: PerComponent<usize>,
    ) -> Self {
        let state = if owned.is_empty() {
            GroupState::NonOwning {
                elem: SparseSet::new(),
            }
        } else {
            GroupState::Owning { len: 0 }
        };
        Self {
            owned,
            get,
            exclude,
            state,
        }
    }

    pub(crate) fn is_owning(&self) -> bool {
        matches!(self.state, GroupState::Owning { .. })
    }

    /// Number of matching entities.
    pub(crate) fn len(&self) -> usize {
        match &self.state {
            GroupState::Owning { len } => *len,
            GroupState::NonOwning { elem } => elem.len(),
        }
    }

    /// Every pool the group observes, in role order.
    pub(crate) fn members(&self) -> impl Iterator<Item = (usize, Role)> + '_ {
        let owned = self.owned.iter().map(|&index| (index, Role::Owned));
        let get = self.get.iter().map(|&index| (index, Role::Get));
        let exclude = self.exclude.iter().map(|&index| (index, Role::Exclude));
        owned.chain(get).chain(exclude)
    }

    /// Sparse set that iteration walks.
    pub(crate) fn handle<'a>(&'a self, pools: &'a [Box<dyn Pool<E>>]) -> &'a SparseSet<E> {
        match &self.state {
            GroupState::Owning { .. } => pools[self.owned[0]].base(),
            GroupState::NonOwning { elem } => elem,
        }
    }

    fn in_group(&self, pools: &[Box<dyn Pool<E>>], entity: E) -> bool {
        match &self.state {
            GroupState::Owning { len } => {
                let lead = pools[self.owned[0]].base();
                lead.contains(entity) && lead.index(entity) < *len
            }
            GroupState::NonOwning { elem } => elem.contains(entity),
        }
    }

    fn admit(&mut self, pools: &mut [Box<dyn Pool<E>>], entity: E) {
        match &mut self.state {
            GroupState::Owning { len } => {
                let pos = *len;
                *len += 1;
                for &index in &self.owned {
                    let other = pools[index].base().access(pos);
                    pools[index].swap_elements(other, entity);
                }
            }
            GroupState::NonOwning { elem } => {
                elem.push(entity);
            }
        }
    }

    /// A pool gained `entity`: add it if it now matches.
    pub(crate) fn push_on_construct(&mut self, pools: &mut [Box<dyn Pool<E>>], entity: E) {
        let matches = contains_all(pools, &self.owned, entity)
            && contains_all(pools, &self.get, entity)
            && count_present(pools, &self.exclude, entity) == 0;
        if matches && !self.in_group(pools, entity) {
            self.admit(pools, entity);
        }
    }

    /// An exclude pool is about to lose `entity`: add it if that is the only
    /// thing keeping it out.
    pub(crate) fn push_on_destroy(&mut self, pools: &mut [Box<dyn Pool<E>>], entity: E) {
        let matches = contains_all(pools, &self.owned, entity)
            && contains_all(pools, &self.get, entity)
            && count_present(pools, &self.exclude, entity) == 1;
        if matches && !self.in_group(pools, entity) {
            self.admit(pools, entity);
        }
    }

    /// Drop `entity` if it is in the group.
    pub(crate) fn remove_if(&mut self, pools: &mut [Box<dyn Pool<E>>], entity: E) {
        if !self.in_group(pools, entity) {
            return;
        }
        match &mut self.state {
            GroupState::Owning { len } => {
                *len -= 1;
                let pos = *len;
                for &index in &self.owned {
                    let other = pools[index].base().access(pos);
                    pools[index].swap_elements(other, entity);
                }
            }
            GroupState::NonOwning { elem } => {
                elem.erase(entity);
            }
        }
    }

    /// Forward an event of the pool playing `role`.
    pub(crate) fn on_construct(&mut self, pools: &mut [Box<dyn Pool<E>>], role: Role, entity: E) {
        match role {
            Role::Owned | Role::Get => self.push_on_construct(pools, entity),
            Role::Exclude => self.remove_if(pools, entity),
        }
    }

    pub(crate) fn on_destroy(&mut self, pools: &mut [Box<dyn Pool<E>>], role: Role, entity: E) {
        match role {
            Role::Owned | Role::Get => self.remove_if(pools, entity),
            Role::Exclude => self.push_on_destroy(pools, entity),
        }
    }

    /// Scan the pools for entities that already match.
    pub(crate) fn populate(&mut self, pools: &mut [Box<dyn Pool<E>>]) {
        let driver = match &self.state {
            GroupState::Owning { .. } => self.owned[0],
            GroupState::NonOwning { .. } => self.get[0],
        };
        if self.is_owning() {
            for pos in 0..pools[driver].base().len() {
                let entity = pools[driver].base().access(pos);
                self.push_on_construct(pools, entity);
            }
        } else {
            let candidates: Vec<E> = pools[driver]
                .base()
                .iter()
                .filter(|entity| !entity.is_tombstone())
                .collect();
            for entity in candidates {
                self.push_on_construct(pools, entity);
            }
        }
    }

    /// Lay out `order`, a permutation of the group in its new iteration order.
    pub(crate) fn apply_order(&mut self, pools: &mut [Box<dyn Pool<E>>], order: &[E]) {
        match &mut self.state {
            GroupState::NonOwning { elem } => elem.arrange(order, &mut |_, _| {}),
            GroupState::Owning { len } => {
                let len = *len;
                let (&lead, others) = match self.owned.split_first() {
                    Some(split) => split,
                    None => return,
                };
                pools[lead].arrange(order);
                for &index in others {
                    for pos in (0..len).rev() {
                        let wanted = pools[lead].base().access(pos);
                        let current = pools[index].base().access(pos);
                        if wanted != current {
                            pools[index].swap_elements(current, wanted);
                        }
                    }
                }
            }
        }
    }

    /// The group in iteration order, sorted by `compare`.
    pub(crate) fn sorted(
        &self,
        pools: &[Box<dyn Pool<E>>],
        compare: impl FnMut(&E, &E) -> Ordering,
    ) -> Vec<E> {
        let mut order: Vec<E> = DenseIter::prefix(self.handle(pools).data(), self.len()).collect();
        order.sort_by(compare);
        order
    }
}

#[derive(Clone, Copy)]
enum GroupKind<'a, E: EntityLike> {
    Owning { lead: &'a SparseSet<E>, len: usize },
    NonOwning { handle: &'a SparseSet<E> },
}

/// Handle to a group registered in a [`Registry`](crate::Registry).
///
/// `O` are the owned components, `G` the observed ones. Excluded components
/// only affect membership and are not part of the handle type.
pub struct Group<'a, E: EntityLike, O: ComponentSet<E>, G: ComponentSet<E>> {
    owned: O::Storages<'a>,
    get: G::Storages<'a>,
    kind: GroupKind<'a, E>,
}

impl<E: EntityLike, O: ComponentSet<E>, G: ComponentSet<E>> Clone for Group<'_, E, O, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: EntityLike, O: ComponentSet<E>, G: ComponentSet<E>> Copy for Group<'_, E, O, G> {}

impl<E: EntityLike, O: ComponentSet<E>, G: ComponentSet<E>> fmt::Debug for Group<'_, E, O, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("owned", &O::type_names())
            .field("get", &G::type_names())
            .field("len", &self.len())
            .finish()
    }
}

impl<'a, E: EntityLike, O: ComponentSet<E>, G: ComponentSet<E>> Group<'a, E, O, G> {
    pub(crate) fn new(
        data: &'a GroupData<E>,
        pools: &'a [Box<dyn Pool<E>>],
        owned: O::Storages<'a>,
        get: G::Storages<'a>,
    ) -> Self {
        let kind = match &data.state {
            GroupState::Owning { len } => GroupKind::Owning {
                lead: pools[data.owned[0]].base(),
                len: *len,
            },
            GroupState::NonOwning { elem } => GroupKind::NonOwning { handle: elem },
        };
        Self { owned, get, kind }
    }

    /// Whether the group reorders the pools it owns.
    pub fn is_owning(&self) -> bool {
        matches!(self.kind, GroupKind::Owning { .. })
    }

    /// Number of matching entities.
    pub fn len(&self) -> usize {
        match self.kind {
            GroupKind::Owning { len, .. } => len,
            GroupKind::NonOwning { handle } => handle.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sparse set iteration walks: the first owned pool, or the group's
    /// own set.
    pub fn handle(&self) -> &'a SparseSet<E> {
        match self.kind {
            GroupKind::Owning { lead, .. } => lead,
            GroupKind::NonOwning { handle } => handle,
        }
    }

    /// Matching entities in the order the group keeps them.
    pub fn data(&self) -> &'a [E] {
        &self.handle().data()[..self.len()]
    }

    /// Whether `entity` matches the group.
    pub fn contains(&self, entity: E) -> bool {
        match self.kind {
            GroupKind::Owning { lead, len } => lead.contains(entity) && lead.index(entity) < len,
            GroupKind::NonOwning { handle } => handle.contains(entity),
        }
    }

    /// Matching entities, in iteration order.
    pub fn iter(&self) -> DenseIter<'a, E> {
        DenseIter::new(self.data())
    }

    /// Entities with their owned and observed components.
    pub fn components(
        &self,
    ) -> impl DoubleEndedIterator<Item = (E, O::Refs<'a>, G::Refs<'a>)> + 'a {
        let Self { owned, get, kind } = *self;
        let entities = self.data();
        (0..entities.len()).rev().filter_map(move |pos| {
            let entity = entities[pos];
            let owned = match kind {
                GroupKind::Owning { .. } => O::fetch_at(owned, pos)?,
                GroupKind::NonOwning { .. } => O::fetch(owned, entity)?,
            };
            Some((entity, owned, G::fetch(get, entity)?))
        })
    }

    /// Call `func` with every entity and its components.
    pub fn each(&self, mut func: impl FnMut(E, O::Refs<'a>, G::Refs<'a>)) {
        for (entity, owned, get) in self.components() {
            func(entity, owned, get);
        }
    }

    /// Components of a matching entity.
    pub fn get(&self, entity: E) -> Option<(O::Refs<'a>, G::Refs<'a>)> {
        if !self.contains(entity) {
            return None;
        }
        Some((O::fetch(self.owned, entity)?, G::fetch(self.get, entity)?))
    }

    /// First entity in iteration order.
    pub fn front(&self) -> Option<E> {
        self.iter().next()
    }

    /// Last entity in iteration order.
    pub fn back(&self) -> Option<E> {
        self.iter().next_back()
    }

    /// Cursor to a matching entity.
    pub fn find(&self, entity: E) -> Option<Cursor> {
        self.contains(entity)
            .then(|| Cursor::at(self.handle().index(entity)))
    }
}

impl<'a, E: EntityLike, O: ComponentSet<E>, G: ComponentSet<E>> IntoIterator
    for &Group<'a, E, O, G>
{
    type Item = E;
    type IntoIter = DenseIter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
