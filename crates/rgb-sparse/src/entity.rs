//! Entity identifiers with packed generations.
//!
//! An identifier is a single unsigned integer split in two fields: the low
//! bits hold the index used to address sparse pages, the high bits hold a
//! version (generation) bumped every time the index is recycled.
//!
//! Two sentinels are reserved:
//! - **null**: the index field is all ones. No live entity ever has it.
//! - **tombstone**: the version field is all ones. Used to mark holes left by
//!   in-place deletion, and skipped by [`EntityLike::next`].
//!
//! Layouts are declared with [`entity_type!`](crate::entity_type), which
//! rejects malformed masks at compile time.

use std::fmt;
use std::hash::Hash;

/// Check that `mask` is a run of set bits starting at bit zero.
#[must_use]
pub const fn mask_is_contiguous(mask: u64) -> bool {
    mask & mask.wrapping_add(1) == 0
}

/// Integer arithmetic over a packed identifier layout.
///
/// Implementors only describe the layout and the conversion to and from raw
/// bits; every other operation is provided.
pub trait EntityLike: Copy + Eq + Ord + Hash + fmt::Debug + 'static {
    /// Mask of the index field, right-aligned.
    const ENTITY_MASK: u64;
    /// Mask of the version field, right-aligned.
    const VERSION_MASK: u64;
    /// Width of the index field.
    const ENTITY_SHIFT: u32;

    /// Widen the identifier to its raw bits.
    fn to_bits(self) -> u64;

    /// Build an identifier from raw bits. Bits outside the layout are dropped.
    fn from_bits(bits: u64) -> Self;

    /// Index field of the identifier.
    #[inline]
    fn to_index(self) -> usize {
        (self.to_bits() & Self::ENTITY_MASK) as usize
    }

    /// Version field of the identifier.
    #[inline]
    fn to_version(self) -> u32 {
        ((self.to_bits() >> Self::ENTITY_SHIFT) & Self::VERSION_MASK) as u32
    }

    /// Pack an index and a version. Both are truncated to their field.
    #[inline]
    fn construct(index: usize, version: u32) -> Self {
        Self::from_bits(
            (index as u64 & Self::ENTITY_MASK)
                | ((u64::from(version) & Self::VERSION_MASK) << Self::ENTITY_SHIFT),
        )
    }

    /// Index field from `lhs`, version field from `rhs`.
    #[inline]
    fn combine(lhs: Self, rhs: Self) -> Self {
        Self::from_bits(
            (lhs.to_bits() & Self::ENTITY_MASK)
                | (rhs.to_bits() & (Self::VERSION_MASK << Self::ENTITY_SHIFT)),
        )
    }

    /// Same index, next version. The tombstone version is never produced.
    #[inline]
    fn next(self) -> Self {
        let version = u64::from(self.to_version()) + 1;
        let version = version + u64::from(version == Self::VERSION_MASK);
        Self::construct(self.to_index(), version as u32)
    }

    /// The null identifier.
    #[inline]
    fn null() -> Self {
        Self::construct(Self::ENTITY_MASK as usize, Self::VERSION_MASK as u32)
    }

    /// The tombstone identifier.
    #[inline]
    fn tombstone() -> Self {
        Self::null()
    }

    /// Whether the index field is the null index.
    #[inline]
    fn is_null(self) -> bool {
        self.to_bits() & Self::ENTITY_MASK == Self::ENTITY_MASK
    }

    /// Whether the version field is the tombstone version.
    ///
    /// Layouts without version bits have no tombstones.
    #[inline]
    fn is_tombstone(self) -> bool {
        Self::VERSION_MASK != 0 && u64::from(self.to_version()) == Self::VERSION_MASK
    }

    /// Version reserved for tombstones.
    #[inline]
    fn tombstone_version() -> u32 {
        Self::VERSION_MASK as u32
    }
}

/// Declare an identifier type with the given field masks.
///
/// ```ignore
/// entity_type!(
///     /// Compact handle for tile entities.
///     pub TileId, u16, entity_mask = 0xFFF, version_mask = 0xF
/// );
/// ```
///
/// Masks must be contiguous runs of low bits, the entity mask must not be
/// empty, versions must fit 32 bits and both fields together must fit the
/// representation. Violations fail to compile.
#[macro_export]
macro_rules! entity_type {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident, $repr:ty, entity_mask = $entity:expr, version_mask = $version:expr
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        $vis struct $name($repr);

        impl $crate::EntityLike for $name {
            const ENTITY_MASK: u64 = $entity;
            const VERSION_MASK: u64 = $version;
            const ENTITY_SHIFT: u32 = (($entity) as u64).count_ones();

            #[inline]
            fn to_bits(self) -> u64 {
                self.0 as u64
            }

            #[inline]
            fn from_bits(bits: u64) -> Self {
                Self(bits as $repr)
            }
        }

        const _: () = {
            let entity = <$name as $crate::EntityLike>::ENTITY_MASK;
            let version = <$name as $crate::EntityLike>::VERSION_MASK;
            assert!(
                entity != 0 && $crate::mask_is_contiguous(entity),
                "entity mask must be a non-empty run of low bits"
            );
            assert!(
                $crate::mask_is_contiguous(version),
                "version mask must be a run of low bits"
            );
            assert!(version.count_ones() <= 32, "versions are limited to 32 bits");
            assert!(
                entity.count_ones() + version.count_ones() <= <$repr>::BITS,
                "masks exceed the width of the identifier"
            );
        };

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                use $crate::EntityLike as _;
                if self.is_null() {
                    write!(f, "{}(null)", stringify!($name))
                } else {
                    write!(f, "{}({}v{})", stringify!($name), self.to_index(), self.to_version())
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                use $crate::EntityLike as _;
                write!(f, "{}v{}", self.to_index(), self.to_version())
            }
        }
    };
}

entity_type!(
    /// Default identifier: 20 index bits, 12 version bits.
    pub Entity, u32, entity_mask = 0xF_FFFF, version_mask = 0xFFF
);

entity_type!(
    /// Wide identifier: 32 index bits, 32 version bits.
    pub Entity64, u64, entity_mask = 0xFFFF_FFFF, version_mask = 0xFFFF_FFFF
);

impl Entity {
    /// Raw 32-bit value.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Wrap a raw 32-bit value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl Entity64 {
    /// Raw 64-bit value.
    #[must_use]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Wrap a raw 64-bit value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}
