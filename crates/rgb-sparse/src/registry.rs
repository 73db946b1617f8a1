//! Registry - owner of every pool, group and signal.
//!
//! The registry creates pools lazily on first reference, keeps the entity
//! storage, and routes the construct/update/destroy events of every pool to
//! the groups observing it and to user listeners. Groups never talk to pools
//! directly: the registry hands them the pool arena when an event arrives.
//!
//! Group bookkeeping runs before user listeners, so listeners observe groups
//! that are already consistent with the change. Destroy events are published
//! while the component is still present.

use std::any::{TypeId, type_name};
use std::cmp::Ordering;
use std::fmt;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::{Entity, EntityLike};
use crate::entity_storage::EntityStorage;
use crate::error::{EcsError, Result};
use crate::fetch::{ComponentSet, PerComponent, storage_at};
use crate::group::{Group, GroupData, Role};
use crate::signal::{Sigh, Sink};
use crate::storage::{Pool, Storage};
use crate::view::View;

type FxHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Owned, get and exclude type ids.
type GroupKey = [PerComponent<TypeId>; 3];

/// Signal of the registry, called with the affected entity.
pub type RegistrySigh<E> = Sigh<Registry<E>, E>;

/// Channels and group subscriptions of one pool.
struct PoolSignals<E: EntityLike> {
    construct: RegistrySigh<E>,
    update: RegistrySigh<E>,
    destroy: RegistrySigh<E>,
    groups: SmallVec<[(usize, Role); 4]>,
    /// Group owning the pool, if any.
    owner: Option<usize>,
}

impl<E: EntityLike> PoolSignals<E> {
    fn new() -> Self {
        Self {
            construct: Sigh::new(),
            update: Sigh::new(),
            destroy: Sigh::new(),
            groups: SmallVec::new(),
            owner: None,
        }
    }
}

/// Typed container of entities, components and groups.
pub struct Registry<E: EntityLike = Entity> {
    entities: EntityStorage<E>,
    on_create: RegistrySigh<E>,
    on_release: RegistrySigh<E>,
    pools: Vec<Box<dyn Pool<E>>>,
    signals: Vec<PoolSignals<E>>,
    index: FxHashMap<TypeId, usize>,
    groups: Vec<GroupData<E>>,
    group_index: FxHashMap<GroupKey, usize>,
}

impl<E: EntityLike> Default for Registry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityLike> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("alive", &self.alive())
            .field(
                "pools",
                &self.pools.iter().map(|pool| pool.type_name()).collect::<Vec<_>>(),
            )
            .field("groups", &self.groups)
            .finish()
    }
}

impl<E: EntityLike> Registry<E> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: EntityStorage::new(),
            on_create: Sigh::new(),
            on_release: Sigh::new(),
            pools: Vec::new(),
            signals: Vec::new(),
            index: FxHashMap::default(),
            groups: Vec::new(),
            group_index: FxHashMap::default(),
        }
    }

    // ==================== Pools ====================

    /// Index of the pool of `T`, created on first use.
    pub(crate) fn assure_index<T: Component>(&mut self) -> usize {
        if let Some(&index) = self.index.get(&TypeId::of::<T>()) {
            return index;
        }
        let index = self.pools.len();
        self.pools.push(Box::new(Storage::<T, E>::new()));
        self.signals.push(PoolSignals::new());
        self.index.insert(TypeId::of::<T>(), index);
        tracing::debug!(component = type_name::<T>(), index, "created pool");
        index
    }

    fn index_of<T: Component>(&self) -> Option<usize> {
        self.index.get(&TypeId::of::<T>()).copied()
    }

    fn storage_mut_at<T: Component>(&mut self, index: usize) -> &mut Storage<T, E> {
        match self.pools[index].as_any_mut().downcast_mut::<Storage<T, E>>() {
            Some(storage) => storage,
            None => unreachable!("pool {index} does not store {}", type_name::<T>()),
        }
    }

    /// Storage of `T`, if any component of that type was ever referenced.
    pub fn storage<T: Component>(&self) -> Option<&Storage<T, E>> {
        self.index_of::<T>()
            .map(|index| storage_at::<T, E>(&self.pools, index))
    }

    /// Storage of `T`, created if missing.
    pub fn assure<T: Component>(&mut self) -> &Storage<T, E> {
        let index = self.assure_index::<T>();
        storage_at::<T, E>(&self.pools, index)
    }

    /// Number of pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    // ==================== Events ====================

    fn notify_construct(&mut self, index: usize, entity: E) {
        let groups = self.signals[index].groups.clone();
        for (group, role) in groups {
            self.groups[group].on_construct(&mut self.pools, role, entity);
        }
        let sigh = self.signals[index].construct.share();
        sigh.publish(self, entity);
    }

    fn notify_update(&mut self, index: usize, entity: E) {
        let sigh = self.signals[index].update.share();
        sigh.publish(self, entity);
    }

    fn notify_destroy(&mut self, index: usize, entity: E) {
        let groups = self.signals[index].groups.clone();
        for (group, role) in groups {
            self.groups[group].on_destroy(&mut self.pools, role, entity);
        }
        let sigh = self.signals[index].destroy.share();
        sigh.publish(self, entity);
    }

    /// Listeners of components of type `T` being attached.
    pub fn on_construct<T: Component>(&mut self) -> Sink<'_, Self, E> {
        let index = self.assure_index::<T>();
        self.signals[index].construct.sink()
    }

    /// Listeners of components of type `T` being patched or replaced.
    pub fn on_update<T: Component>(&mut self) -> Sink<'_, Self, E> {
        let index = self.assure_index::<T>();
        self.signals[index].update.sink()
    }

    /// Listeners of components of type `T` about to be detached.
    pub fn on_destroy<T: Component>(&mut self) -> Sink<'_, Self, E> {
        let index = self.assure_index::<T>();
        self.signals[index].destroy.sink()
    }

    /// Listeners of entity creation.
    pub fn on_create(&self) -> Sink<'_, Self, E> {
        self.on_create.sink()
    }

    /// Listeners of entity release, called once every component is gone.
    pub fn on_release(&self) -> Sink<'_, Self, E> {
        self.on_release.sink()
    }

    // ==================== Entities ====================

    fn publish_create(&mut self, entity: E) {
        let sigh = self.on_create.share();
        sigh.publish(self, entity);
    }

    /// Create an entity.
    pub fn create(&mut self) -> E {
        let entity = self.entities.generate();
        self.publish_create(entity);
        entity
    }

    /// Create `hint` if its index is free, any entity otherwise.
    pub fn create_with_hint(&mut self, hint: E) -> E {
        let entity = self.entities.generate_with_hint(hint);
        self.publish_create(entity);
        entity
    }

    /// Create `count` entities.
    pub fn create_many(&mut self, count: usize) -> Vec<E> {
        (0..count).map(|_| self.create()).collect()
    }

    /// Whether `entity` is alive with this exact version.
    pub fn valid(&self, entity: E) -> bool {
        self.entities.contains(entity)
    }

    /// Version currently associated with the index of `entity`.
    pub fn current(&self, entity: E) -> u32 {
        self.entities.current(entity)
    }

    /// Number of alive entities.
    pub fn alive(&self) -> usize {
        self.entities.in_use()
    }

    /// The entity storage.
    pub fn entities(&self) -> &EntityStorage<E> {
        &self.entities
    }

    /// Whether `entity` has no component at all.
    pub fn orphan(&self, entity: E) -> bool {
        self.pools.iter().all(|pool| !pool.base().contains(entity))
    }

    /// Detach every component of `entity` and release it.
    ///
    /// Returns the version the index will be recycled with.
    pub fn destroy(&mut self, entity: E) -> u32 {
        debug_assert!(self.valid(entity), "invalid entity {entity:?}");
        for index in (0..self.pools.len()).rev() {
            if self.pools[index].base().contains(entity) {
                self.notify_destroy(index, entity);
                self.pools[index].remove(entity);
            }
        }
        let sigh = self.on_release.share();
        sigh.publish(self, entity);
        self.entities.remove(entity);
        self.entities.current(entity)
    }

    // ==================== Components ====================

    /// Attach `value` to `entity`, which must not have a `T` yet.
    ///
    /// Returns the component, or `None` if a construct listener detached it
    /// again.
    pub fn emplace<T: Component>(&mut self, entity: E, value: T) -> Option<&mut T> {
        debug_assert!(self.valid(entity), "invalid entity {entity:?}");
        let index = self.assure_index::<T>();
        self.storage_mut_at::<T>(index).emplace(entity, value);
        self.notify_construct(index, entity);
        self.storage_mut_at::<T>(index).get_mut(entity)
    }

    /// Attach `value`, replacing the current component if there is one.
    pub fn emplace_or_replace<T: Component>(&mut self, entity: E, value: T) -> Option<&mut T> {
        let index = self.assure_index::<T>();
        if !self.pools[index].base().contains(entity) {
            return self.emplace(entity, value);
        }
        self.storage_mut_at::<T>(index).replace(entity, value);
        self.notify_update(index, entity);
        self.storage_mut_at::<T>(index).get_mut(entity)
    }

    /// Attach a clone of `value` to every entity of `entities`.
    pub fn insert<T: Component + Clone>(&mut self, entities: impl IntoIterator<Item = E>, value: T) {
        for entity in entities {
            self.emplace(entity, value.clone());
        }
    }

    /// Run `func` on the component of `entity`, then notify update listeners.
    ///
    /// Returns `false` if `entity` has no `T`.
    pub fn patch<T: Component>(&mut self, entity: E, func: impl FnOnce(&mut T)) -> bool {
        let Some(index) = self.index_of::<T>() else {
            return false;
        };
        if self.storage_mut_at::<T>(index).patch(entity, func).is_none() {
            return false;
        }
        self.notify_update(index, entity);
        true
    }

    /// Swap in a new component, returning the previous one.
    pub fn replace<T: Component>(&mut self, entity: E, value: T) -> Option<T> {
        let index = self.index_of::<T>()?;
        let previous = self.storage_mut_at::<T>(index).replace(entity, value)?;
        self.notify_update(index, entity);
        Some(previous)
    }

    /// Detach the `T` of `entity` if present.
    pub fn remove<T: Component>(&mut self, entity: E) -> bool {
        let Some(index) = self.index_of::<T>() else {
            return false;
        };
        if !self.pools[index].base().contains(entity) {
            return false;
        }
        self.notify_destroy(index, entity);
        self.pools[index].remove(entity);
        true
    }

    /// Detach the `T` of `entity`, which must have one.
    pub fn erase<T: Component>(&mut self, entity: E) {
        let removed = self.remove::<T>(entity);
        debug_assert!(removed, "{entity:?} has no {}", type_name::<T>());
    }

    /// Component of `entity`.
    pub fn get<T: Component>(&self, entity: E) -> Option<&T> {
        self.storage::<T>()?.get(entity)
    }

    /// Mutable component of `entity`. No update is published; use
    /// [`patch`](Self::patch) for that.
    pub fn get_mut<T: Component>(&mut self, entity: E) -> Option<&mut T> {
        let index = self.index_of::<T>()?;
        self.storage_mut_at::<T>(index).get_mut(entity)
    }

    fn has_pool_with(&self, id: &TypeId, entity: E) -> bool {
        self.index
            .get(id)
            .is_some_and(|&index| self.pools[index].base().contains(entity))
    }

    /// Whether `entity` has every component of `S`.
    pub fn all_of<S: ComponentSet<E>>(&self, entity: E) -> bool {
        S::type_ids().iter().all(|id| self.has_pool_with(id, entity))
    }

    /// Whether `entity` has at least one component of `S`.
    pub fn any_of<S: ComponentSet<E>>(&self, entity: E) -> bool {
        S::type_ids().iter().any(|id| self.has_pool_with(id, entity))
    }

    /// Detach every `T`, notifying destroy listeners for each.
    pub fn clear<T: Component>(&mut self) {
        let Some(index) = self.index_of::<T>() else {
            return;
        };
        let entities: Vec<E> = self.pools[index]
            .base()
            .iter()
            .filter(|entity| !entity.is_tombstone())
            .collect();
        for entity in entities {
            if self.pools[index].base().contains(entity) {
                self.notify_destroy(index, entity);
                self.pools[index].remove(entity);
            }
        }
    }

    /// Reclaim the tombstones of the pool of `T`.
    pub fn compact<T: Component>(&mut self) {
        if let Some(index) = self.index_of::<T>() {
            self.pools[index].compact();
            tracing::debug!(component = type_name::<T>(), "compacted pool");
        }
    }

    /// Whether a group owns the pool of `T`.
    pub fn owned<T: Component>(&self) -> bool {
        self.index_of::<T>()
            .is_some_and(|index| self.signals[index].owner.is_some())
    }

    /// Sort the pool of `T` by component.
    pub fn sort<T: Component>(&mut self, compare: impl FnMut(&T, &T) -> Ordering) {
        debug_assert!(!self.owned::<T>(), "cannot sort owned storage {}", type_name::<T>());
        let index = self.assure_index::<T>();
        self.storage_mut_at::<T>(index).sort_by(compare);
    }

    /// Sort the pool of `T` by entity.
    pub fn sort_entities<T: Component>(&mut self, compare: impl FnMut(&E, &E) -> Ordering) {
        debug_assert!(!self.owned::<T>(), "cannot sort owned storage {}", type_name::<T>());
        let index = self.assure_index::<T>();
        self.storage_mut_at::<T>(index).sort_entities_by(compare);
    }

    /// Make the pool of `To` iterate in the order of the pool of `From`.
    pub fn sort_as<To: Component, From: Component>(&mut self) {
        debug_assert!(!self.owned::<To>(), "cannot sort owned storage {}", type_name::<To>());
        let to = self.assure_index::<To>();
        let from = self.assure_index::<From>();
        let order: Vec<E> = self.pools[from].base().iter().collect();
        self.pools[to].sort_as(&order);
    }

    // ==================== Views ====================

    /// View over the entities having every `G` and no `X`.
    pub fn view<G: ComponentSet<E>, X: ComponentSet<E>>(&mut self) -> View<'_, E, G> {
        let get = G::assure(self);
        let exclude = X::assure(self);
        let pools = &self.pools;
        View::with_exclude(
            G::storages(pools, &get),
            exclude.iter().map(|&index| pools[index].base()),
        )
    }

    // ==================== Groups ====================

    fn group_key<O, G, X>() -> GroupKey
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
    {
        [O::type_ids(), G::type_ids(), X::type_ids()]
    }

    fn create_group<O, G, X>(&mut self, key: GroupKey) -> Result<usize>
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
    {
        if key[0].is_empty() && key[1].is_empty() {
            return Err(EcsError::EmptyGroup);
        }
        let names = O::type_names();
        if let Some(pos) = O::in_place().iter().position(|&in_place| in_place) {
            return Err(EcsError::InPlaceOwned(names[pos]));
        }

        let owned = O::assure(self);
        if let Some(pos) = owned
            .iter()
            .position(|&index| self.signals[index].owner.is_some())
        {
            return Err(EcsError::ConflictingGroups(names[pos]));
        }
        let get = G::assure(self);
        let exclude = X::assure(self);

        let slot = self.groups.len();
        let mut data = GroupData::new(owned, get, exclude);
        for (index, role) in data.members() {
            let signals = &mut self.signals[index];
            signals.groups.push((slot, role));
            if role == Role::Owned {
                signals.owner = Some(slot);
            }
        }
        data.populate(&mut self.pools);
        tracing::debug!(
            owned = ?names,
            get = ?G::type_names(),
            exclude = ?X::type_names(),
            len = data.len(),
            "created group"
        );

        self.groups.push(data);
        self.group_index.insert(key, slot);
        Ok(slot)
    }

    fn group_slot<O, G, X>(&mut self) -> Result<usize>
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
    {
        let key = Self::group_key::<O, G, X>();
        match self.group_index.get(&key) {
            Some(&slot) => Ok(slot),
            None => self.create_group::<O, G, X>(key),
        }
    }

    fn group_at<O: ComponentSet<E>, G: ComponentSet<E>>(&self, slot: usize) -> Group<'_, E, O, G> {
        let data = &self.groups[slot];
        Group::new(
            data,
            &self.pools,
            O::storages(&self.pools, &data.owned),
            G::storages(&self.pools, &data.get),
        )
    }

    /// Group owning `O`, observing `G` and excluding `X`.
    ///
    /// The group is created and populated on first request and maintained
    /// by the registry afterwards.
    ///
    /// # Errors
    ///
    /// - [`EcsError::EmptyGroup`] if `O` and `G` are both empty.
    /// - [`EcsError::InPlaceOwned`] if an owned component uses in-place deletion.
    /// - [`EcsError::ConflictingGroups`] if another group already owns one of `O`.
    pub fn group<O, G, X>(&mut self) -> Result<Group<'_, E, O, G>>
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
    {
        let slot = self.group_slot::<O, G, X>()?;
        Ok(self.group_at::<O, G>(slot))
    }

    /// The group for this exact key, if it was already created.
    pub fn group_if_exists<O, G, X>(&self) -> Option<Group<'_, E, O, G>>
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
    {
        let key = Self::group_key::<O, G, X>();
        let &slot = self.group_index.get(&key)?;
        Some(self.group_at::<O, G>(slot))
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn sort_group_slot(&mut self, slot: usize, order: &[E]) {
        self.groups[slot].apply_order(&mut self.pools, order);
        tracing::debug!(len = order.len(), owning = self.groups[slot].is_owning(), "sorted group");
    }

    /// Sort a group by entity.
    ///
    /// For owning groups the owned pools are reordered in lockstep.
    ///
    /// # Errors
    ///
    /// Fails like [`group`](Self::group) if the group has to be created.
    pub fn sort_group<O, G, X>(&mut self, compare: impl FnMut(&E, &E) -> Ordering) -> Result<()>
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
    {
        let slot = self.group_slot::<O, G, X>()?;
        let order = self.groups[slot].sorted(&self.pools, compare);
        self.sort_group_slot(slot, &order);
        Ok(())
    }

    /// Sort a group by one of the components of its members.
    ///
    /// # Errors
    ///
    /// Fails like [`group`](Self::group) if the group has to be created.
    pub fn sort_group_by<O, G, X, T>(&mut self, mut compare: impl FnMut(&T, &T) -> Ordering) -> Result<()>
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
        T: Component,
    {
        let slot = self.group_slot::<O, G, X>()?;
        let index = self.assure_index::<T>();
        let storage = storage_at::<T, E>(&self.pools, index);
        let order = self.groups[slot].sorted(&self.pools, |lhs, rhs| {
            match (storage.get(*lhs), storage.get(*rhs)) {
                (Some(lhs), Some(rhs)) => compare(lhs, rhs),
                _ => Ordering::Equal,
            }
        });
        self.sort_group_slot(slot, &order);
        Ok(())
    }

    /// Make a group iterate in the order of the pool of `T`.
    ///
    /// # Errors
    ///
    /// Fails like [`group`](Self::group) if the group has to be created.
    pub fn sort_group_as<O, G, X, T>(&mut self) -> Result<()>
    where
        O: ComponentSet<E>,
        G: ComponentSet<E>,
        X: ComponentSet<E>,
        T: Component,
    {
        let slot = self.group_slot::<O, G, X>()?;
        let index = self.assure_index::<T>();
        let data = &self.groups[slot];
        let members = data.handle(&self.pools);
        let len = data.len();
        let is_member = |entity: &E| members.contains(*entity) && members.index(*entity) < len;

        // Members in the reference order, then the rest in their current order.
        let mut order: Vec<E> = self.pools[index]
            .base()
            .iter()
            .filter(|entity| !entity.is_tombstone() && is_member(entity))
            .collect();
        let rest: Vec<E> = data
            .sorted(&self.pools, |_, _| Ordering::Equal)
            .into_iter()
            .filter(|entity| !self.pools[index].base().contains(*entity))
            .collect();
        order.extend(rest);
        self.sort_group_slot(slot, &order);
        Ok(())
    }
}
