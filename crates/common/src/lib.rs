//! Shared vocabulary types for the homestead world core.
//!
//! # Invariants
//! - `PlacementId` values are unique for the lifetime of a placement.
//! - `ZoneBounds` containment is inclusive on every axis.

pub mod types;

pub use types::{
    ItemSpec, ItemTier, OwnerId, OwnerRef, PlacementId, Transform, ZoneBounds,
};
