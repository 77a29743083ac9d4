use homestead_ledger::{ChangeRecord, PlacedObject, PlacementLedger};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{from_cbor, to_cbor, StoreError};

/// What a snapshot captures: a change-queue delta, the complete object set,
/// or a best-effort emergency capture of the complete set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKind {
    Incremental,
    Full,
    Emergency,
}

/// An immutable capture of ledger state.
///
/// The checksum is an FNV-1a hash over the serialized payload, enabling
/// corruption detection on load. Versions are the zero-padded capture
/// timestamp plus a sequence and random suffix, so they sort by capture
/// order and stay distinguishable within a second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub timestamp: u64,
    pub version: String,
    pub payload: Vec<u8>,
    pub checksum: u64,
}

impl Snapshot {
    /// Capture the entire object set. `kind` is `Full` or `Emergency`.
    pub fn capture_full(
        kind: SnapshotKind,
        ledger: &PlacementLedger,
        now: u64,
    ) -> Result<Self, StoreError> {
        let objects: Vec<PlacedObject> = ledger.objects().values().cloned().collect();
        let payload = to_cbor(&objects)?;
        Ok(Self::from_payload(kind, payload, now))
    }

    /// Capture a pending change-queue delta.
    pub fn capture_incremental(changes: &[ChangeRecord], now: u64) -> Result<Self, StoreError> {
        let payload = to_cbor(changes)?;
        Ok(Self::from_payload(SnapshotKind::Incremental, payload, now))
    }

    fn from_payload(kind: SnapshotKind, payload: Vec<u8>, now: u64) -> Self {
        let checksum = fnv1a(&payload);
        Self {
            kind,
            timestamp: now,
            version: new_version(now),
            payload,
            checksum,
        }
    }

    /// Verify integrity by recomputing the payload checksum.
    pub fn verify(&self) -> bool {
        fnv1a(&self.payload) == self.checksum
    }

    /// Decode the payload of a full or emergency snapshot.
    pub fn objects(&self) -> Result<Vec<PlacedObject>, StoreError> {
        from_cbor(&self.payload)
    }

    /// Decode the payload of an incremental snapshot.
    pub fn changes(&self) -> Result<Vec<ChangeRecord>, StoreError> {
        from_cbor(&self.payload)
    }

    /// Parse the capture timestamp out of a version string.
    pub fn version_timestamp(version: &str) -> Option<u64> {
        version.split('-').next()?.parse().ok()
    }
}

/// Zero-padded timestamp, a process-wide sequence number, and a random
/// suffix. The padding keeps versions lexicographically ordered by capture
/// time, and the sequence keeps captures within the same second ordered.
fn new_version(now: u64) -> String {
    static SEQUENCE: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = SEQUENCE.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{now:012}-{seq:06}-{}", &suffix[..4])
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
