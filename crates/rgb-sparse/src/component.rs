//! Component traits.
//!
//! Every type stored in a pool implements [`Component`]. The trait carries no
//! methods, only the compile-time configuration of the pool that stores it:
//!
//! - `PAGE_SIZE`: payload page size. Zero turns the pool into an empty
//!   storage that tracks membership only, which is only allowed for
//!   zero-sized types. Zero-sized types default to it.
//! - `IN_PLACE_DELETE`: pick [`DeletionPolicy::InPlace`] instead of
//!   [`DeletionPolicy::SwapAndPop`], so removing a component never moves the
//!   others ("stable" components).
//!
//! # Example
//!
//! ```ignore
//! #[derive(Component)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component)]
//! #[component(in_place, page_size = 256)]
//! struct Node { parent: Entity }
//!
//! #[derive(Component)]
//! struct Frozen;
//! ```

use crate::config::PACKED_PAGE;
use crate::sparse_set::DeletionPolicy;

/// Types that can be stored in a pool.
pub trait Component: Sized + 'static {
    /// Number of components per payload page, zero for empty storage.
    const PAGE_SIZE: usize = if size_of::<Self>() == 0 { 0 } else { PACKED_PAGE };

    /// Remove with tombstones rather than swap-and-pop.
    const IN_PLACE_DELETE: bool = false;
}

/// Deletion policy of the pool storing `T`.
pub(crate) const fn policy_of<T: Component>() -> DeletionPolicy {
    if T::IN_PLACE_DELETE {
        DeletionPolicy::InPlace
    } else {
        DeletionPolicy::SwapAndPop
    }
}

macro_rules! impl_component {
    ($($ty:ty),* $(,)?) => {
        $(impl Component for $ty {})*
    };
}

impl_component!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, &'static str,
);

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(#[allow(dead_code)] u64);
    impl Component for Plain {}

    struct Tag;
    impl Component for Tag {}

    struct Stable;
    impl Component for Stable {
        const PAGE_SIZE: usize = 16;
        const IN_PLACE_DELETE: bool = true;
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Plain::PAGE_SIZE, PACKED_PAGE);
        assert!(!Plain::IN_PLACE_DELETE);
        assert_eq!(policy_of::<Plain>(), DeletionPolicy::SwapAndPop);
        assert_eq!(u32::PAGE_SIZE, PACKED_PAGE);
    }

    #[test]
    fn test_zero_sized_is_empty_storage() {
        assert_eq!(Tag::PAGE_SIZE, 0);
    }

    #[test]
    fn test_overrides() {
        assert_eq!(Stable::PAGE_SIZE, 16);
        assert_eq!(policy_of::<Stable>(), DeletionPolicy::InPlace);
    }
}
