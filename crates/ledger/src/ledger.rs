use glam::Vec3;
use homestead_common::{ItemSpec, OwnerRef, PlacementId, Transform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::change::{ChangeKind, ChangeRecord};
use crate::object::PlacedObject;
use crate::zone::ProtectedZone;

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("placement {0:?} already exists")]
    DuplicateId(PlacementId),
    #[error("placement {0:?} not found")]
    NotFound(PlacementId),
    #[error("unknown zone `{0}`")]
    UnknownZone(String),
}

/// The authoritative record of placed objects and protected zones.
///
/// Uses BTreeMap for deterministic iteration order, so region queries and
/// zone lookups produce the same results on repeated calls over the same
/// state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlacementLedger {
    objects: BTreeMap<PlacementId, PlacedObject>,
    zones: BTreeMap<String, ProtectedZone>,
    /// Pending change records awaiting the next incremental backup.
    #[serde(skip)]
    changes: Vec<ChangeRecord>,
}

impl PlacementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new placement with a generated id.
    pub fn record(
        &mut self,
        owner: OwnerRef,
        item: &ItemSpec,
        transform: Transform,
        now: u64,
    ) -> Result<PlacementId, LedgerError> {
        let id = PlacementId::new();
        self.insert_with_id(id, owner, item, transform, now)?;
        Ok(id)
    }

    /// Record a placement under a caller-chosen id.
    ///
    /// Id collisions are not expected but fail closed rather than silently
    /// replacing an existing object.
    pub fn insert_with_id(
        &mut self,
        id: PlacementId,
        owner: OwnerRef,
        item: &ItemSpec,
        transform: Transform,
        now: u64,
    ) -> Result<(), LedgerError> {
        if self.objects.contains_key(&id) {
            return Err(LedgerError::DuplicateId(id));
        }
        let obj = PlacedObject::new(id, owner, item, transform, now);
        self.changes.push(ChangeRecord {
            kind: ChangeKind::Place,
            placement_id: id,
            payload: Some(obj.clone()),
            timestamp: now,
        });
        self.objects.insert(id, obj);
        Ok(())
    }

    pub fn get(&self, id: PlacementId) -> Option<&PlacedObject> {
        self.objects.get(&id)
    }

    /// Remove a placement. Returns the removed object.
    pub fn remove(&mut self, id: PlacementId, now: u64) -> Result<PlacedObject, LedgerError> {
        let obj = self.objects.remove(&id).ok_or(LedgerError::NotFound(id))?;
        self.changes.push(ChangeRecord {
            kind: ChangeKind::Remove,
            placement_id: id,
            payload: Some(obj.clone()),
            timestamp: now,
        });
        Ok(obj)
    }

    /// Move a placement to a new position, stamping the reason.
    ///
    /// Also used to annotate an object in place (same position, new reason)
    /// when compensation is pending.
    pub fn relocate(
        &mut self,
        id: PlacementId,
        new_position: Vec3,
        reason: &str,
        now: u64,
    ) -> Result<(), LedgerError> {
        let obj = self.objects.get_mut(&id).ok_or(LedgerError::NotFound(id))?;
        obj.transform.position = new_position;
        obj.last_modified_at = now;
        obj.relocation_reason = Some(reason.to_string());
        let payload = obj.clone();
        self.changes.push(ChangeRecord {
            kind: ChangeKind::Relocate,
            placement_id: id,
            payload: Some(payload),
            timestamp: now,
        });
        Ok(())
    }

    /// All placements whose position lies within the inclusive box.
    pub fn query_region(&self, min: Vec3, max: Vec3) -> Vec<&PlacedObject> {
        let bounds = homestead_common::ZoneBounds::new(min, max);
        self.objects
            .values()
            .filter(|o| bounds.contains(o.transform.position))
            .collect()
    }

    /// Name of the first active zone containing the position, if any.
    pub fn is_in_protected_zone(&self, p: Vec3) -> Option<&str> {
        self.zones
            .values()
            .find(|z| z.active && z.contains(p))
            .map(|z| z.name.as_str())
    }

    /// Create or replace a zone definition.
    pub fn upsert_zone(&mut self, zone: ProtectedZone) {
        self.zones.insert(zone.name.clone(), zone);
    }

    pub fn set_zone_active(&mut self, name: &str, active: bool) -> Result<(), LedgerError> {
        let zone = self
            .zones
            .get_mut(name)
            .ok_or_else(|| LedgerError::UnknownZone(name.to_string()))?;
        zone.active = active;
        tracing::info!(zone = name, active, "zone state changed");
        Ok(())
    }

    pub fn zone(&self, name: &str) -> Option<&ProtectedZone> {
        self.zones.get(name)
    }

    pub fn active_zones(&self) -> impl Iterator<Item = &ProtectedZone> {
        self.zones.values().filter(|z| z.active)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Read-only access to all placements (BTreeMap for deterministic order).
    pub fn objects(&self) -> &BTreeMap<PlacementId, PlacedObject> {
        &self.objects
    }

    /// Change records awaiting backup.
    pub fn pending_changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub fn change_backlog(&self) -> usize {
        self.changes.len()
    }

    /// Drop the first `count` pending records after a confirmed backup write.
    ///
    /// Records appended while the backup was in flight stay queued, keeping
    /// delivery at-least-once.
    pub fn confirm_changes(&mut self, count: usize) {
        let count = count.min(self.changes.len());
        self.changes.drain(..count);
    }

    /// Insert or overwrite a placement without emitting a change record.
    /// Restore path only.
    pub fn restore_object(&mut self, obj: PlacedObject) {
        self.objects.insert(obj.id, obj);
    }

    /// Replace the entire object set atomically. Restore path only; the
    /// pending change queue is cleared since its records describe the
    /// pre-recovery state.
    pub fn replace_all(&mut self, objects: Vec<PlacedObject>) -> usize {
        self.objects = objects.into_iter().map(|o| (o.id, o)).collect();
        self.changes.clear();
        self.objects.len()
    }

    /// Apply a change record idempotently. Restore path only.
    pub fn apply_change(&mut self, record: &ChangeRecord) {
        match record.kind {
            ChangeKind::Place | ChangeKind::Relocate => {
                if let Some(obj) = &record.payload {
                    self.restore_object(obj.clone());
                }
            }
            ChangeKind::Remove => {
                self.objects.remove(&record.placement_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homestead_common::{ItemTier, ZoneBounds};

    fn chair() -> ItemSpec {
        ItemSpec::new("chair", ItemTier::Basic, 5)
    }

    fn place(ledger: &mut PlacementLedger, pos: Vec3) -> PlacementId {
        ledger
            .record(
                OwnerRef::new(1, "ada"),
                &chair(),
                Transform::at(pos),
                1_000,
            )
            .unwrap()
    }

    #[test]
    fn record_and_get() {
        let mut ledger = PlacementLedger::new();
        let id = place(&mut ledger, Vec3::new(1.0, 0.0, 2.0));
        let obj = ledger.get(id).unwrap();
        assert_eq!(obj.item_id, "chair");
        assert_eq!(obj.transform.position, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(obj.created_at, 1_000);
    }

    #[test]
    fn duplicate_id_fails_closed() {
        let mut ledger = PlacementLedger::new();
        let id = place(&mut ledger, Vec3::ZERO);
        let err = ledger
            .insert_with_id(
                id,
                OwnerRef::new(2, "bob"),
                &chair(),
                Transform::default(),
                2_000,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateId(_)));
        // Original object untouched
        assert_eq!(ledger.get(id).unwrap().owner.name, "ada");
    }

    #[test]
    fn remove_unknown_is_not_found_and_leaves_size() {
        let mut ledger = PlacementLedger::new();
        place(&mut ledger, Vec3::ZERO);
        let err = ledger.remove(PlacementId::new(), 2_000).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert_eq!(ledger.object_count(), 1);
    }

    #[test]
    fn query_region_is_inclusive() {
        let mut ledger = PlacementLedger::new();
        let inside = place(&mut ledger, Vec3::new(10.0, 0.0, 10.0)); // on the boundary
        place(&mut ledger, Vec3::new(10.1, 0.0, 10.0));
        let hits = ledger.query_region(Vec3::ZERO, Vec3::new(10.0, 0.0, 10.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, inside);
    }

    #[test]
    fn query_region_reflects_latest_state() {
        let mut ledger = PlacementLedger::new();
        let id = place(&mut ledger, Vec3::ZERO);
        ledger.remove(id, 2_000).unwrap();
        assert!(ledger.query_region(Vec3::splat(-1.0), Vec3::splat(1.0)).is_empty());
    }

    #[test]
    fn protected_zone_lookup_requires_active() {
        let mut ledger = PlacementLedger::new();
        ledger.upsert_zone(ProtectedZone::new(
            "DevZone",
            ZoneBounds::new(Vec3::splat(-5.0), Vec3::splat(5.0)),
            "fountain",
        ));
        assert!(ledger.is_in_protected_zone(Vec3::ZERO).is_none());
        ledger.set_zone_active("DevZone", true).unwrap();
        assert_eq!(ledger.is_in_protected_zone(Vec3::ZERO), Some("DevZone"));
        assert!(ledger.is_in_protected_zone(Vec3::splat(6.0)).is_none());
    }

    #[test]
    fn unknown_zone_activation_errors() {
        let mut ledger = PlacementLedger::new();
        assert!(matches!(
            ledger.set_zone_active("nope", true),
            Err(LedgerError::UnknownZone(_))
        ));
    }

    #[test]
    fn every_mutation_appends_one_change() {
        let mut ledger = PlacementLedger::new();
        let id = place(&mut ledger, Vec3::ZERO);
        ledger.relocate(id, Vec3::new(3.0, 0.0, 0.0), "moved", 1_100).unwrap();
        ledger.remove(id, 1_200).unwrap();
        let kinds: Vec<ChangeKind> = ledger.pending_changes().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Place, ChangeKind::Relocate, ChangeKind::Remove]
        );
    }

    #[test]
    fn confirm_changes_keeps_in_flight_appends() {
        let mut ledger = PlacementLedger::new();
        place(&mut ledger, Vec3::ZERO);
        place(&mut ledger, Vec3::ONE);
        let snapshot_len = ledger.change_backlog();
        // A third mutation lands while the backup is "in flight"
        place(&mut ledger, Vec3::splat(2.0));
        ledger.confirm_changes(snapshot_len);
        assert_eq!(ledger.change_backlog(), 1);
    }

    #[test]
    fn relocate_updates_object_and_reason() {
        let mut ledger = PlacementLedger::new();
        let id = place(&mut ledger, Vec3::ZERO);
        ledger
            .relocate(id, Vec3::new(60.0, 0.0, 0.0), "cleared for fountain", 1_500)
            .unwrap();
        let obj = ledger.get(id).unwrap();
        assert_eq!(obj.transform.position, Vec3::new(60.0, 0.0, 0.0));
        assert_eq!(obj.last_modified_at, 1_500);
        assert_eq!(obj.relocation_reason.as_deref(), Some("cleared for fountain"));
    }

    #[test]
    fn replace_all_swaps_wholesale_without_records() {
        let mut ledger = PlacementLedger::new();
        place(&mut ledger, Vec3::ZERO);
        let replacement = PlacedObject::new(
            PlacementId::new(),
            OwnerRef::new(9, "zoe"),
            &chair(),
            Transform::default(),
            5_000,
        );
        let restored = ledger.replace_all(vec![replacement.clone()]);
        assert_eq!(restored, 1);
        assert_eq!(ledger.object_count(), 1);
        assert!(ledger.get(replacement.id).is_some());
        assert!(ledger.pending_changes().is_empty());
    }

    #[test]
    fn apply_change_is_idempotent() {
        let mut ledger = PlacementLedger::new();
        let id = place(&mut ledger, Vec3::ZERO);
        let records = ledger.pending_changes().to_vec();
        ledger.remove(id, 1_100).unwrap();

        let mut restored = PlacementLedger::new();
        for rec in &records {
            restored.apply_change(rec);
            restored.apply_change(rec); // twice, same outcome
        }
        assert_eq!(restored.object_count(), 1);
        // Removing something never placed is a no-op
        restored.apply_change(&ChangeRecord {
            kind: ChangeKind::Remove,
            placement_id: PlacementId::new(),
            payload: None,
            timestamp: 1_200,
        });
        assert_eq!(restored.object_count(), 1);
    }
}
