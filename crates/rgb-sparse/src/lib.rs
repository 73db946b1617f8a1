#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::type_complexity)]

//! RGB Sparse - sparse-set Entity Component storage
//!
//! Components live in one pool per type. A pool is a sparse set: O(1)
//! membership and lookup, dense arrays for iteration. Pools are combined at
//! query time (views) or cached and maintained incrementally (groups).
//!
//! # Key Concepts
//!
//! - **Entity**: index + version packed in an integer ([`Entity`], [`Entity64`])
//! - **Sparse set**: paged sparse index + dense array, with a [`DeletionPolicy`]
//! - **Storage**: sparse set + paged component payload
//! - **View**: intersection of pools, computed while iterating
//! - **Group**: cached intersection; an owning group keeps its members packed
//!   at the front of the pools it owns
//! - **Signals**: construct/update/destroy listeners per pool
//!
//! # Example
//!
//! ```ignore
//! let mut registry = Registry::<Entity>::new();
//! let entity = registry.create();
//! registry.emplace(entity, Position { x: 0.0, y: 0.0 });
//! registry.emplace(entity, Velocity { x: 1.0, y: 0.0 });
//!
//! let group = registry.group::<(Position, Velocity), (), ()>()?;
//! group.each(|entity, (pos, vel), ()| {
//!     println!("{entity}: {pos:?} {vel:?}");
//! });
//! ```

#[allow(unused_extern_crates)]
extern crate self as rgb_sparse;

mod component;
mod config;
mod cursor;
mod entity;
mod entity_storage;
mod error;
mod fetch;
mod group;
mod registry;
mod signal;
mod sparse_set;
mod storage;
mod view;

pub use component::Component;
pub use config::{PACKED_PAGE, SPARSE_PAGE};
pub use cursor::{Cursor, DenseIter, Positions};
pub use entity::{Entity, Entity64, EntityLike, mask_is_contiguous};
pub use entity_storage::EntityStorage;
pub use error::{EcsError, Result};
pub use fetch::{ComponentSet, Join, PerComponent};
pub use group::Group;
pub use registry::{Registry, RegistrySigh};
pub use rgb_sparse_derive::Component;
pub use signal::{Connection, ScopedConnection, Sigh, Sink};
pub use sparse_set::{DeletionPolicy, SparseSet};
pub use storage::{Iter, IterMut, Pool, Storage};
pub use view::{View, ViewIter};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Component, DeletionPolicy, EcsError, Entity, EntityLike, Group, Registry, SparseSet,
        Storage, View,
    };
}
