//! Integration tests for rgb-sparse

use std::cell::RefCell;
use std::rc::Rc;

use rgb_sparse::prelude::*;
use rgb_sparse::{ScopedConnection, Sink};

// ============================================================================
// Test Components
// ============================================================================

#[derive(Component, Clone, Debug, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}

#[derive(Component, Clone, Debug, PartialEq)]
struct Velocity {
    dx: i32,
    dy: i32,
}

#[derive(Component, Clone, Debug, PartialEq)]
struct Health(u32);

#[derive(Component)]
struct Frozen;

#[derive(Component, Clone, Debug, PartialEq)]
#[component(in_place)]
struct Slot(u32);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn pos(x: i32) -> Position {
    Position { x, y: 0 }
}

fn vel(dx: i32) -> Velocity {
    Velocity { dx, dy: 0 }
}

/// Positions `[0, len)` of the position and velocity pools hold exactly the
/// entities accepted by `is_member`, in the same order.
fn assert_prefix_aligned(registry: &Registry, len: usize, is_member: impl Fn(Entity) -> bool) {
    let positions = registry.storage::<Position>().expect("pool").data();
    let velocities = registry.storage::<Velocity>().expect("pool").data();
    assert_eq!(&positions[..len], &velocities[..len]);
    for &entity in &positions[..len] {
        assert!(is_member(entity), "{entity} should not be in the group");
    }
    for &entity in &positions[len..] {
        assert!(!is_member(entity), "{entity} should be in the group");
    }
}

/// Positions `[0, len)` of every owned pool hold the group, in the same order.
fn assert_owned_prefix_aligned(registry: &Registry) {
    let len = registry
        .group_if_exists::<(Position, Velocity), (), ()>()
        .expect("group exists")
        .len();
    assert_prefix_aligned(registry, len, |entity| {
        registry.all_of::<(Position, Velocity)>(entity)
    });
}

// ============================================================================
// Entity Lifecycle
// ============================================================================

#[test]
fn test_generation_cycle() {
    let mut registry = Registry::<Entity>::new();
    let first = registry.create();
    assert_eq!(first.to_version(), 0);

    assert_eq!(registry.destroy(first), 1);
    let second = registry.create();
    assert_eq!(second.to_index(), first.to_index());
    assert_eq!(second.to_version(), 1);
    assert!(!registry.valid(first));
    assert!(registry.valid(second));
    assert_eq!(registry.current(first), 1);
}

#[test]
fn test_destroy_removes_every_component() {
    init_tracing();
    let mut registry = Registry::<Entity>::new();
    let entity = registry.create();
    registry.emplace(entity, pos(1));
    registry.emplace(entity, vel(2));
    registry.emplace(entity, Frozen);

    registry.destroy(entity);
    assert!(!registry.any_of::<(Position, Velocity, Frozen)>(entity));
    assert_eq!(registry.alive(), 0);
}

#[test]
fn test_create_with_hint() {
    let mut registry = Registry::<Entity>::new();
    let hinted = registry.create_with_hint(Entity::construct(42, 3));
    assert_eq!(hinted, Entity::construct(42, 3));
    assert_eq!(registry.create().to_index(), 0);
}

// ============================================================================
// Signals
// ============================================================================

#[test]
fn test_signals_in_reverse_registration_order() {
    let mut registry = Registry::<Entity>::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let first = Rc::clone(&log);
    registry
        .on_construct::<Position>()
        .connect_fn(move |_, _| first.borrow_mut().push("first"));
    let second = Rc::clone(&log);
    registry
        .on_construct::<Position>()
        .connect_fn(move |_, _| second.borrow_mut().push("second"));

    let entity = registry.create();
    registry.emplace(entity, pos(0));
    assert_eq!(*log.borrow(), vec!["second", "first"]);
}

#[test]
fn test_update_and_destroy_signals() {
    let mut registry = Registry::<Entity>::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let updates = Rc::clone(&log);
    registry
        .on_update::<Health>()
        .connect_fn(move |registry, entity| {
            let health = registry.get::<Health>(entity).map(|health| health.0);
            updates.borrow_mut().push(("update", health));
        });
    let destroys = Rc::clone(&log);
    registry
        .on_destroy::<Health>()
        .connect_fn(move |registry, entity| {
            // Still attached while destroy listeners run.
            let health = registry.get::<Health>(entity).map(|health| health.0);
            destroys.borrow_mut().push(("destroy", health));
        });

    let entity = registry.create();
    registry.emplace(entity, Health(10));
    registry.patch::<Health>(entity, |health| health.0 -= 3);
    registry.replace(entity, Health(1));
    registry.remove::<Health>(entity);

    assert_eq!(
        *log.borrow(),
        vec![("update", Some(7)), ("update", Some(1)), ("destroy", Some(1))]
    );
}

#[test]
fn test_listener_mutates_registry() {
    let mut registry = Registry::<Entity>::new();
    registry
        .on_construct::<Position>()
        .connect(|registry, entity| {
            registry.emplace(entity, vel(0));
        });

    let entity = registry.create();
    registry.emplace(entity, pos(1));
    assert!(registry.all_of::<(Position, Velocity)>(entity));
}

#[test]
fn test_scoped_connection() {
    let mut registry = Registry::<Entity>::new();
    let count = Rc::new(RefCell::new(0));

    {
        let counter = Rc::clone(&count);
        let sink: Sink<'_, Registry, Entity> = registry.on_construct::<Position>();
        let _guard = ScopedConnection::from(sink.connect_fn(move |_, _| *counter.borrow_mut() += 1));
        drop(sink);
        let entity = registry.create();
        registry.emplace(entity, pos(0));
    }

    let entity = registry.create();
    registry.emplace(entity, pos(0));
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn test_create_and_release_signals() {
    let mut registry = Registry::<Entity>::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let created = Rc::clone(&log);
    registry
        .on_create()
        .connect_fn(move |_, entity: Entity| created.borrow_mut().push(("create", entity)));
    let released = Rc::clone(&log);
    registry
        .on_release()
        .connect_fn(move |registry: &mut Registry, entity: Entity| {
            assert!(registry.orphan(entity));
            released.borrow_mut().push(("release", entity));
        });

    let entity = registry.create();
    registry.emplace(entity, pos(0));
    registry.destroy(entity);
    assert_eq!(*log.borrow(), vec![("create", entity), ("release", entity)]);
}

// ============================================================================
// Views
// ============================================================================

#[test]
fn test_view_upper_bound() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(20);
    for (i, &entity) in entities.iter().enumerate() {
        registry.emplace(entity, pos(i as i32));
        if i % 2 == 0 {
            registry.emplace(entity, vel(i as i32));
        }
        if i % 4 == 0 {
            registry.emplace(entity, Frozen);
        }
    }

    let view = registry.view::<(Position, Velocity), (Frozen,)>();
    let count = view.iter().count();
    assert_eq!(count, 5);
    assert!(view.size_hint() >= count);
    for entity in &view {
        assert!(view.contains(entity));
    }
}

#[test]
fn test_view_each() {
    let mut registry = Registry::<Entity>::new();
    for i in 0..5 {
        let entity = registry.create();
        registry.emplace(entity, pos(i));
        registry.emplace(entity, vel(i * 10));
    }

    let mut sum = 0;
    registry
        .view::<(Position, Velocity), ()>()
        .each(|_, (pos, vel)| sum += pos.x + vel.dx);
    assert_eq!(sum, (0..5).map(|i| i + i * 10).sum::<i32>());
}

// ============================================================================
// Groups
// ============================================================================

#[test]
fn test_owning_group_invariant() {
    init_tracing();
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(10);
    for (i, &entity) in entities.iter().enumerate() {
        registry.emplace(entity, pos(i as i32));
        if i % 3 != 0 {
            registry.emplace(entity, vel(i as i32));
        }
    }

    let len = registry
        .group::<(Position, Velocity), (), ()>()
        .expect("group")
        .len();
    assert_eq!(len, 6);
    assert_owned_prefix_aligned(&registry);

    // Maintenance: add, remove, destroy.
    registry.emplace(entities[0], vel(0));
    assert_owned_prefix_aligned(&registry);
    registry.remove::<Velocity>(entities[1]);
    assert_owned_prefix_aligned(&registry);
    registry.destroy(entities[2]);
    assert_owned_prefix_aligned(&registry);

    let group = registry
        .group_if_exists::<(Position, Velocity), (), ()>()
        .expect("group");
    assert_eq!(group.len(), 5);
    assert!(group.contains(entities[0]));
    assert!(!group.contains(entities[1]));
    assert!(group.is_owning());

    let mut visited = 0;
    group.each(|entity, (pos, vel), ()| {
        assert_eq!(registry.get::<Position>(entity), Some(pos));
        assert_eq!(registry.get::<Velocity>(entity), Some(vel));
        visited += 1;
    });
    assert_eq!(visited, 5);
}

#[test]
fn test_owning_group_with_exclude() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(6);
    for (i, &entity) in entities.iter().enumerate() {
        registry.emplace(entity, pos(i as i32));
        registry.emplace(entity, vel(i as i32));
    }
    registry.emplace(entities[0], Frozen);
    registry.emplace(entities[1], Frozen);

    let group_len = |registry: &Registry| {
        registry
            .group_if_exists::<(Position, Velocity), (), (Frozen,)>()
            .expect("group exists")
            .len()
    };
    let assert_aligned = |registry: &Registry| {
        assert_prefix_aligned(registry, group_len(registry), |entity| {
            registry.all_of::<(Position, Velocity)>(entity) && !registry.any_of::<(Frozen,)>(entity)
        });
    };

    let len = registry
        .group::<(Position, Velocity), (), (Frozen,)>()
        .expect("group")
        .len();
    assert_eq!(len, 4);
    assert_aligned(&registry);

    // Dropping the excluded component admits the entity.
    registry.remove::<Frozen>(entities[0]);
    assert_eq!(group_len(&registry), 5);
    assert_aligned(&registry);

    // Adding it back evicts it again.
    registry.emplace(entities[0], Frozen);
    assert_eq!(group_len(&registry), 4);
    assert_aligned(&registry);

    // Completing the owned set joins, destroying leaves.
    let late = registry.create();
    registry.emplace(late, pos(10));
    assert_eq!(group_len(&registry), 4);
    registry.emplace(late, vel(10));
    assert_eq!(group_len(&registry), 5);
    assert_aligned(&registry);

    registry.destroy(late);
    assert_eq!(group_len(&registry), 4);
    assert_aligned(&registry);

    // Destroying an excluded entity leaves the group untouched.
    registry.destroy(entities[1]);
    assert_eq!(group_len(&registry), 4);
    assert_aligned(&registry);

    let group = registry
        .group_if_exists::<(Position, Velocity), (), (Frozen,)>()
        .expect("group");
    assert!(!group.contains(entities[0]));
    assert!(group.contains(entities[2]));
    assert!(group.is_owning());
}

#[test]
fn test_construct_listener_removes_component_in_owning_group() {
    let mut registry = Registry::<Entity>::new();
    let member = registry.create();
    registry.emplace(member, pos(1));
    registry.emplace(member, vel(1));
    let len = registry
        .group::<(Position, Velocity), (), ()>()
        .expect("group")
        .len();
    assert_eq!(len, 1);

    registry
        .on_construct::<Position>()
        .connect(|registry, entity| {
            registry.remove::<Position>(entity);
        });

    let rejected = registry.create();
    registry.emplace(rejected, vel(2));
    assert!(registry.emplace(rejected, pos(2)).is_none());

    assert!(!registry.all_of::<(Position,)>(rejected));
    assert!(registry.all_of::<(Velocity,)>(rejected));
    assert_owned_prefix_aligned(&registry);

    let group = registry
        .group_if_exists::<(Position, Velocity), (), ()>()
        .expect("group");
    assert_eq!(group.len(), 1);
    assert!(group.contains(member));
    assert!(!group.contains(rejected));
}

#[test]
fn test_non_owning_group_with_exclude() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(4);
    for &entity in &entities {
        registry.emplace(entity, pos(0));
        registry.emplace(entity, Health(1));
    }
    registry.emplace(entities[1], Frozen);

    let group = registry
        .group::<(), (Position, Health), (Frozen,)>()
        .expect("group");
    assert!(!group.is_owning());
    assert_eq!(group.len(), 3);

    // Dropping the excluded component brings the entity back.
    registry.remove::<Frozen>(entities[1]);
    let group = registry
        .group_if_exists::<(), (Position, Health), (Frozen,)>()
        .expect("group");
    assert_eq!(group.len(), 4);
    assert!(group.contains(entities[1]));

    // Adding it again excludes it.
    registry.emplace(entities[1], Frozen);
    registry.remove::<Health>(entities[2]);
    let group = registry
        .group_if_exists::<(), (Position, Health), (Frozen,)>()
        .expect("group");
    assert_eq!(group.len(), 2);
    assert!(!group.contains(entities[1]));
    assert!(!group.contains(entities[2]));
    assert_eq!(
        group.get(entities[0]),
        Some(((), (&pos(0), &Health(1))))
    );
}

#[test]
fn test_partial_owning_group_with_get() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(6);
    for (i, &entity) in entities.iter().enumerate() {
        registry.emplace(entity, pos(i as i32));
        if i % 2 == 1 {
            registry.emplace(entity, Health(i as u32));
        }
    }

    let group = registry
        .group::<(Position,), (Health,), ()>()
        .expect("group");
    assert_eq!(group.len(), 3);
    let mut members: Vec<_> = group.iter().collect();
    members.sort();
    assert_eq!(members, vec![entities[1], entities[3], entities[5]]);
    assert!(registry.owned::<Position>());
    assert!(!registry.owned::<Health>());
}

#[test]
fn test_group_setup_errors() {
    let mut registry = Registry::<Entity>::new();
    assert_eq!(
        registry.group::<(Slot,), (), ()>().err(),
        Some(EcsError::InPlaceOwned(std::any::type_name::<Slot>()))
    );
    assert_eq!(
        registry.group::<(), (), (Frozen,)>().err(),
        Some(EcsError::EmptyGroup)
    );

    registry
        .group::<(Position, Velocity), (), ()>()
        .expect("first group");
    assert_eq!(
        registry.group::<(Velocity,), (Health,), ()>().err(),
        Some(EcsError::ConflictingGroups(std::any::type_name::<Velocity>()))
    );
    // Observing an owned pool is fine.
    assert!(registry.group::<(), (Velocity, Health), ()>().is_ok());
}

#[test]
fn test_sort_owning_group() {
    let mut registry = Registry::<Entity>::new();
    for value in [5, 3, 9, 1, 7] {
        let entity = registry.create();
        registry.emplace(entity, pos(value));
        registry.emplace(entity, vel(-value));
    }

    registry
        .sort_group_by::<(Position, Velocity), (), (), Position>(|lhs, rhs| lhs.x.cmp(&rhs.x))
        .expect("sort");
    assert_owned_prefix_aligned(&registry);

    let group = registry
        .group_if_exists::<(Position, Velocity), (), ()>()
        .expect("group");
    let xs: Vec<_> = group.components().map(|(_, (pos, _), ())| pos.x).collect();
    assert_eq!(xs, vec![1, 3, 5, 7, 9]);
    let dxs: Vec<_> = group.components().map(|(_, (_, vel), ())| vel.dx).collect();
    assert_eq!(dxs, vec![-1, -3, -5, -7, -9]);
}

#[test]
fn test_sort_non_owning_group() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(4);
    for &entity in entities.iter().rev() {
        registry.emplace(entity, pos(0));
    }

    registry
        .sort_group::<(), (Position,), ()>(|lhs, rhs| lhs.cmp(rhs))
        .expect("sort");
    let group = registry
        .group_if_exists::<(), (Position,), ()>()
        .expect("group");
    assert_eq!(group.iter().collect::<Vec<_>>(), entities);
}

#[test]
fn test_sort_group_as_pool() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(4);
    for &entity in &entities {
        registry.emplace(entity, pos(0));
    }
    for &entity in entities.iter().rev() {
        registry.emplace(entity, Health(0));
    }

    registry
        .sort_group_as::<(Position,), (), (), Health>()
        .expect("sort");
    let group = registry
        .group_if_exists::<(Position,), (), ()>()
        .expect("group");
    let health_order: Vec<_> = registry.storage::<Health>().expect("pool").iter().map(|(e, _)| e).collect();
    assert_eq!(group.iter().collect::<Vec<_>>(), health_order);
}

// ============================================================================
// Pools
// ============================================================================

#[test]
fn test_in_place_free_list_reuse() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(40);
    for &entity in &entities {
        registry.emplace(entity, Slot(entity.to_index() as u32));
    }

    for index in [10, 20, 30] {
        registry.remove::<Slot>(entities[index]);
    }
    let slots = registry.storage::<Slot>().expect("pool");
    assert_eq!(slots.len(), 40);
    assert!(!slots.contiguous());

    // LIFO: the hole left by 30 is reused first.
    let fresh = registry.create_many(3);
    for &entity in &fresh {
        registry.emplace(entity, Slot(0));
    }
    let slots = registry.storage::<Slot>().expect("pool");
    assert_eq!(slots.index(fresh[0]), 30);
    assert_eq!(slots.index(fresh[1]), 20);
    assert_eq!(slots.index(fresh[2]), 10);
    assert_eq!(slots.len(), 40);
    assert!(slots.contiguous());
}

#[test]
fn test_compact_through_registry() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(5);
    for &entity in &entities {
        registry.emplace(entity, Slot(entity.to_index() as u32));
    }
    registry.remove::<Slot>(entities[1]);
    registry.remove::<Slot>(entities[3]);

    registry.compact::<Slot>();
    let slots = registry.storage::<Slot>().expect("pool");
    assert_eq!(slots.data(), &[entities[0], entities[2], entities[4]]);
    assert_eq!(registry.get::<Slot>(entities[4]), Some(&Slot(4)));
}

#[test]
fn test_sort_and_sort_as() {
    let mut registry = Registry::<Entity>::new();
    let entities = registry.create_many(4);
    for (&entity, value) in entities.iter().zip([3, 1, 4, 2]) {
        registry.emplace(entity, Health(value));
        registry.emplace(entity, pos(value as i32));
    }

    registry.sort::<Health>(|lhs, rhs| lhs.0.cmp(&rhs.0));
    let values: Vec<_> = registry
        .storage::<Health>()
        .expect("pool")
        .values()
        .map(|health| health.0)
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4]);

    registry.sort_as::<Position, Health>();
    let xs: Vec<_> = registry
        .storage::<Position>()
        .expect("pool")
        .values()
        .map(|pos| pos.x)
        .collect();
    assert_eq!(xs, vec![1, 2, 3, 4]);
}

#[test]
fn test_clear_publishes_destroy() {
    let mut registry = Registry::<Entity>::new();
    let count = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&count);
    registry
        .on_destroy::<Health>()
        .connect_fn(move |_, _| *counter.borrow_mut() += 1);

    for entity in registry.create_many(3) {
        registry.emplace(entity, Health(0));
    }
    registry.clear::<Health>();
    assert_eq!(*count.borrow(), 3);
    assert!(registry.storage::<Health>().expect("pool").is_empty());
}
