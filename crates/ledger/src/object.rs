use homestead_common::{ItemSpec, ItemTier, OwnerRef, PlacementId, Transform};
use serde::{Deserialize, Serialize};

/// A single player-placed object.
///
/// Exclusively owned by the [`PlacementLedger`](crate::PlacementLedger);
/// everything else refers to placements by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedObject {
    pub id: PlacementId,
    pub owner: OwnerRef,
    pub item_id: String,
    pub tier: ItemTier,
    /// Catalog base value captured at placement time, used for compensation.
    pub base_value: u64,
    pub transform: Transform,
    pub created_at: u64,
    pub last_modified_at: u64,
    /// Set when the object was moved or flagged by conflict resolution.
    pub relocation_reason: Option<String>,
}

impl PlacedObject {
    pub fn new(
        id: PlacementId,
        owner: OwnerRef,
        item: &ItemSpec,
        transform: Transform,
        now: u64,
    ) -> Self {
        Self {
            id,
            owner,
            item_id: item.item_id.clone(),
            tier: item.tier,
            base_value: item.base_value,
            transform,
            created_at: now,
            last_modified_at: now,
            relocation_reason: None,
        }
    }
}
