//! Typed sets of components.
//!
//! Views and groups are parameterized by tuples of component types, e.g.
//! `(Position, Velocity)`. [`ComponentSet`] turns such a tuple into the
//! matching tuple of storages and of component references.

use std::any::{TypeId, type_name};
use std::marker::PhantomData;

use smallvec::{SmallVec, smallvec};

use crate::component::Component;
use crate::entity::EntityLike;
use crate::registry::Registry;
use crate::sparse_set::SparseSet;
use crate::storage::{Pool, Storage};

/// Pool indices, type ids and the like, one per component of a set.
pub type PerComponent<T> = SmallVec<[T; 4]>;

/// Downcast a registry pool known to store `T`.
pub(crate) fn storage_at<T: Component, E: EntityLike>(
    pools: &[Box<dyn Pool<E>>],
    index: usize,
) -> &Storage<T, E> {
    match pools[index].as_any().downcast_ref::<Storage<T, E>>() {
        Some(storage) => storage,
        None => unreachable!("pool {index} does not store {}", type_name::<T>()),
    }
}

/// A tuple of component types.
pub trait ComponentSet<E: EntityLike>: 'static {
    /// One storage reference per component.
    type Storages<'a>: Copy;
    /// One component reference per component.
    type Refs<'a>;

    /// Type ids, in tuple order.
    fn type_ids() -> PerComponent<TypeId>;

    /// Type names, in tuple order.
    fn type_names() -> PerComponent<&'static str>;

    /// Whether each component uses in-place deletion.
    fn in_place() -> PerComponent<bool>;

    /// Registry pool indices, creating missing pools.
    #[doc(hidden)]
    fn assure(registry: &mut Registry<E>) -> PerComponent<usize>;

    /// Storages at the given registry pool indices.
    #[doc(hidden)]
    fn storages<'a>(pools: &'a [Box<dyn Pool<E>>], indices: &[usize]) -> Self::Storages<'a>;

    /// Sparse sets of the storages, in tuple order.
    fn bases<'a>(storages: Self::Storages<'a>) -> PerComponent<&'a SparseSet<E>>;

    /// Components of `entity`, if it has all of them.
    fn fetch<'a>(storages: Self::Storages<'a>, entity: E) -> Option<Self::Refs<'a>>;

    /// Components at dense position `pos` of every storage.
    fn fetch_at<'a>(storages: Self::Storages<'a>, pos: usize) -> Option<Self::Refs<'a>>;
}

macro_rules! impl_component_set {
    ($($name:ident $idx:tt),*) => {
        impl<E: EntityLike, $($name: Component),*> ComponentSet<E> for ($($name,)*) {
            type Storages<'a> = ($(&'a Storage<$name, E>,)*);
            type Refs<'a> = ($(&'a $name,)*);

            fn type_ids() -> PerComponent<TypeId> {
                smallvec![$(TypeId::of::<$name>()),*]
            }

            fn type_names() -> PerComponent<&'static str> {
                smallvec![$(type_name::<$name>()),*]
            }

            fn in_place() -> PerComponent<bool> {
                smallvec![$($name::IN_PLACE_DELETE),*]
            }

            #[allow(unused_variables)]
            fn assure(registry: &mut Registry<E>) -> PerComponent<usize> {
                smallvec![$(registry.assure_index::<$name>()),*]
            }

            #[allow(unused_variables)]
            fn storages<'a>(pools: &'a [Box<dyn Pool<E>>], indices: &[usize]) -> Self::Storages<'a> {
                ($(storage_at::<$name, E>(pools, indices[$idx]),)*)
            }

            #[allow(unused_variables)]
            fn bases<'a>(storages: Self::Storages<'a>) -> PerComponent<&'a SparseSet<E>> {
                smallvec![$(storages.$idx.base()),*]
            }

            #[allow(unused_variables)]
            fn fetch<'a>(storages: Self::Storages<'a>, entity: E) -> Option<Self::Refs<'a>> {
                Some(($(storages.$idx.get(entity)?,)*))
            }

            #[allow(unused_variables)]
            fn fetch_at<'a>(storages: Self::Storages<'a>, pos: usize) -> Option<Self::Refs<'a>> {
                Some(($(storages.$idx.value_at(pos)?,)*))
            }
        }
    };
}

impl_component_set!();
impl_component_set!(A 0);
impl_component_set!(A 0, B 1);
impl_component_set!(A 0, B 1, C 2);
impl_component_set!(A 0, B 1, C 2, D 3);
impl_component_set!(A 0, B 1, C 2, D 3, F 4);
impl_component_set!(A 0, B 1, C 2, D 3, F 4, G 5);

/// Concatenation of two component sets, produced by joining views.
pub struct Join<L, R>(PhantomData<fn() -> (L, R)>);

impl<E: EntityLike, L: ComponentSet<E>, R: ComponentSet<E>> ComponentSet<E> for Join<L, R> {
    type Storages<'a> = (L::Storages<'a>, R::Storages<'a>);
    type Refs<'a> = (L::Refs<'a>, R::Refs<'a>);

    fn type_ids() -> PerComponent<TypeId> {
        L::type_ids().into_iter().chain(R::type_ids()).collect()
    }

    fn type_names() -> PerComponent<&'static str> {
        L::type_names().into_iter().chain(R::type_names()).collect()
    }

    fn in_place() -> PerComponent<bool> {
        L::in_place().into_iter().chain(R::in_place()).collect()
    }

    fn assure(registry: &mut Registry<E>) -> PerComponent<usize> {
        let mut indices = L::assure(registry);
        indices.extend(R::assure(registry));
        indices
    }

    fn storages<'a>(pools: &'a [Box<dyn Pool<E>>], indices: &[usize]) -> Self::Storages<'a> {
        let split = L::type_ids().len();
        (
            L::storages(pools, &indices[..split]),
            R::storages(pools, &indices[split..]),
        )
    }

    fn bases<'a>(storages: Self::Storages<'a>) -> PerComponent<&'a SparseSet<E>> {
        let mut bases = L::bases(storages.0);
        bases.extend(R::bases(storages.1));
        bases
    }

    fn fetch<'a>(storages: Self::Storages<'a>, entity: E) -> Option<Self::Refs<'a>> {
        Some((L::fetch(storages.0, entity)?, R::fetch(storages.1, entity)?))
    }

    fn fetch_at<'a>(storages: Self::Storages<'a>, pos: usize) -> Option<Self::Refs<'a>> {
        Some((L::fetch_at(storages.0, pos)?, R::fetch_at(storages.1, pos)?))
    }
}
