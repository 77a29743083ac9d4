use homestead_backup::StoreChain;
use homestead_common::PlacementId;
use homestead_ledger::{LedgerError, PlacementLedger};
use std::collections::BTreeSet;
use tracing::{info, info_span, warn};

use crate::compensation::{compensation_amount, PayoutGateway};
use crate::credits;
use crate::relocation::{find_slot, RelocationConfig};

/// Errors from conflict resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown zone `{0}`")]
    UnknownZone(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Outcome tally of enforcing one zone: every conflicting placement lands in
/// exactly one bucket, so `relocated + compensated + failed == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneEnforcement {
    pub total: usize,
    pub relocated: usize,
    pub compensated: usize,
    pub failed: usize,
}

/// Reconciles placements against active protected zones.
///
/// Strategy order per conflicting object: relocate to a clear spot found by
/// the radial scan; else compensate the owner and remove the object; else
/// leave it placed and flag it for manual follow-up. Compensation failure
/// never deletes the object.
pub struct ConflictResolver {
    config: RelocationConfig,
    flagged: BTreeSet<PlacementId>,
}

impl ConflictResolver {
    pub fn new(config: RelocationConfig) -> Self {
        Self {
            config,
            flagged: BTreeSet::new(),
        }
    }

    /// Placements left in place because compensation could not be delivered
    /// or queued. Cleared per object when a later enforcement succeeds.
    pub fn flagged_count(&self) -> usize {
        self.flagged.len()
    }

    pub fn flagged_ids(&self) -> impl Iterator<Item = &PlacementId> {
        self.flagged.iter()
    }

    /// Resolve every placement conflicting with the named zone's bounds.
    /// The batch entry point invoked when a zone transitions to active.
    pub fn enforce_zone(
        &mut self,
        ledger: &mut PlacementLedger,
        stores: &mut StoreChain,
        gateway: &mut dyn PayoutGateway,
        zone_name: &str,
        now: u64,
    ) -> Result<ZoneEnforcement, ResolveError> {
        let _span = info_span!("enforce_zone", zone = zone_name).entered();
        let zone = ledger
            .zone(zone_name)
            .ok_or_else(|| ResolveError::UnknownZone(zone_name.to_string()))?
            .clone();

        let conflicting: Vec<PlacementId> = ledger
            .query_region(zone.bounds.min, zone.bounds.max)
            .iter()
            .map(|o| o.id)
            .collect();

        let mut tally = ZoneEnforcement {
            total: conflicting.len(),
            ..ZoneEnforcement::default()
        };

        for id in conflicting {
            let Some(obj) = ledger.get(id).cloned() else {
                continue;
            };

            if let Some(slot) = find_slot(ledger, &obj, &self.config) {
                let reason = format!("cleared for {}", zone.planned_feature);
                ledger.relocate(id, slot, &reason, now)?;
                self.flagged.remove(&id);
                tally.relocated += 1;
                continue;
            }

            // Scan exhausted; compensate the owner, then remove.
            let amount = compensation_amount(obj.base_value, obj.tier, obj.created_at, now);
            let delivery = if gateway.is_connected(obj.owner.id) {
                gateway
                    .deposit(obj.owner.id, amount)
                    .map_err(|e| e.to_string())
            } else {
                credits::queue_credit(stores, obj.owner.id, amount, now).map_err(|e| e.to_string())
            };

            match delivery {
                Ok(()) => {
                    ledger.remove(id, now)?;
                    self.flagged.remove(&id);
                    tally.compensated += 1;
                }
                Err(err) => {
                    warn!(
                        placement = ?id,
                        owner = obj.owner.id.0,
                        amount,
                        %err,
                        "compensation failed, placement retained for manual follow-up"
                    );
                    ledger.relocate(id, obj.transform.position, "compensation pending", now)?;
                    self.flagged.insert(id);
                    tally.failed += 1;
                }
            }
        }

        info!(
            zone = zone_name,
            total = tally.total,
            relocated = tally.relocated,
            compensated = tally.compensated,
            failed = tally.failed,
            "zone enforcement finished"
        );
        Ok(tally)
    }
}
