use homestead_common::PlacementId;
use serde::{Deserialize, Serialize};

use crate::object::PlacedObject;

/// Kind of ledger mutation a [`ChangeRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Place,
    Remove,
    Relocate,
}

/// An append-only record produced by every ledger mutation.
///
/// The pending change queue feeds incremental backups and is drained only
/// once a backup write is confirmed. Each record carries the object state
/// after the mutation so replay is idempotent per placement id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub placement_id: PlacementId,
    /// Object state after the mutation; for removals, the object as it was.
    pub payload: Option<PlacedObject>,
    pub timestamp: u64,
}
