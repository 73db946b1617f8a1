//! Setup-time errors.
//!
//! Misuse that can only come from a programming error (stale identifiers,
//! sorting a pool owned by a group, ...) is checked with `debug_assert!`
//! instead and never reaches this type.

use thiserror::Error;

/// Errors raised while configuring pools and groups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    /// In-place deletion needs version bits to mark tombstones.
    #[error("in-place deletion is not supported by identifiers without version bits")]
    InPlaceUnsupported,

    /// Owning groups reorder their pools, which in-place pools forbid.
    #[error("pool `{0}` uses in-place deletion and cannot be owned by a group")]
    InPlaceOwned(&'static str),

    /// Two owning groups would share an owned pool.
    #[error("conflicting groups: pool `{0}` is already owned by another group")]
    ConflictingGroups(&'static str),

    /// A non-owning group needs at least one pool to scan.
    #[error("a group must own or observe at least one pool")]
    EmptyGroup,
}

/// Result alias for fallible setup operations.
pub type Result<T, E = EcsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EcsError::ConflictingGroups("Position");
        assert_eq!(
            err.to_string(),
            "conflicting groups: pool `Position` is already owned by another group"
        );
        assert!(EcsError::EmptyGroup.to_string().contains("at least one pool"));
    }
}
