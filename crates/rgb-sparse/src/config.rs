//! Layout constants shared by every pool.

/// Number of slots in one page of the sparse index.
///
/// Sparse pages are allocated lazily, so a sparse set holding a single entity
/// with index `n` costs one page rather than `n` slots.
pub const SPARSE_PAGE: usize = 4096;

/// Default number of components stored in one payload page.
///
/// Payload pages never move once allocated, which keeps references handed out
/// by a pool valid while the pool grows.
pub const PACKED_PAGE: usize = 1024;
