use homestead_ledger::PlacementLedger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn};

use crate::snapshot::{Snapshot, SnapshotKind};
use crate::store::{to_cbor, DurableStore, StoreChain, StoreError};

/// Tunables for the backup cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// How often the incremental cycle runs (only when changes are pending).
    pub incremental_interval: Duration,
    /// How often the full cycle runs, unconditionally.
    pub full_interval: Duration,
    /// Pending-change count that forces an incremental flush between cycles.
    pub max_pending: usize,
    /// How long the emergency path waits to count store acknowledgements.
    pub emergency_wait: Duration,
    /// How often maintenance (pruning + revalidation) runs.
    pub maintenance_interval: Duration,
    /// Snapshots older than this are pruned by maintenance.
    pub retention: Duration,
    /// Store acknowledgements required before a full snapshot is durable.
    pub quorum: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            incremental_interval: Duration::from_secs(30),
            full_interval: Duration::from_secs(300),
            max_pending: 100,
            emergency_wait: Duration::from_secs(2),
            maintenance_interval: Duration::from_secs(60 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            quorum: 2,
        }
    }
}

/// Per-cycle coordinator state. `Failed` is transient: the next cycle
/// retries, it is never terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    Idle,
    BackingUp,
    Failed,
}

/// Errors from backup and recovery operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no full snapshot available")]
    NoSnapshots,
    #[error("checksum mismatch for snapshot {version}")]
    ChecksumMismatch { version: String },
    #[error("write quorum not reached: {acks}/{required}")]
    QuorumNotReached { acks: usize, required: usize },
    #[error("a recovery is already in progress")]
    RecoveryInProgress,
}

/// Outcome of a recovery run.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub restored: usize,
    pub failed: usize,
    pub version: String,
}

/// Outcome of an emergency backup: how many stores acknowledged within the
/// bounded wait.
#[derive(Debug, Clone, Copy)]
pub struct EmergencyReport {
    pub acked: usize,
    pub total: usize,
}

/// Drives incremental, full, and emergency snapshots against the store
/// chain, and restores the ledger from them.
///
/// The coordinator does not own the ledger or the stores; callers pass both
/// into each operation, which keeps all placement mutations on the
/// supervisor's single write path.
pub struct BackupCoordinator {
    config: BackupConfig,
    state: BackupState,
    last_error: Option<String>,
    consecutive_failures: u32,
    incremental_count: u64,
    full_count: u64,
    recovery_flag: AtomicBool,
}

impl BackupCoordinator {
    pub fn new(config: BackupConfig) -> Self {
        Self {
            config,
            state: BackupState::Idle,
            last_error: None,
            consecutive_failures: 0,
            incremental_count: 0,
            full_count: 0,
            recovery_flag: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn state(&self) -> BackupState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn incremental_count(&self) -> u64 {
        self.incremental_count
    }

    pub fn full_count(&self) -> u64 {
        self.full_count
    }

    pub fn recovery_in_progress(&self) -> bool {
        self.recovery_flag.load(Ordering::SeqCst)
    }

    /// Restart hook used by the supervisor: clears transient failure state.
    pub fn reset(&mut self) {
        self.state = BackupState::Idle;
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    /// Serialize the pending change queue and write it down the store chain,
    /// first success wins. The queue is cleared only on a confirmed write,
    /// so delivery is at-least-once.
    ///
    /// Returns the snapshot version, or `None` when the queue was empty.
    pub fn run_incremental(
        &mut self,
        ledger: &mut PlacementLedger,
        stores: &mut StoreChain,
        now: u64,
    ) -> Result<Option<String>, BackupError> {
        if ledger.pending_changes().is_empty() {
            return Ok(None);
        }
        let _span = info_span!("incremental_backup").entered();
        self.state = BackupState::BackingUp;

        let changes = ledger.pending_changes().to_vec();
        let snap = Snapshot::capture_incremental(&changes, now)?;
        let key = format!("incr/{}", snap.version);
        let bytes = to_cbor(&snap)?;

        let mut last_err: Option<StoreError> = None;
        for store in stores.iter_mut() {
            match store.set(&key, &bytes) {
                Ok(()) => {
                    ledger.confirm_changes(changes.len());
                    self.mark_success();
                    self.incremental_count += 1;
                    debug!(
                        store = store.label(),
                        records = changes.len(),
                        version = %snap.version,
                        "incremental backup written"
                    );
                    return Ok(Some(snap.version));
                }
                Err(err) => {
                    warn!(store = store.label(), %err, "incremental write failed, trying next store");
                    last_err = Some(err);
                }
            }
        }

        let err = last_err.unwrap_or(StoreError::Unavailable {
            store: "chain".into(),
            reason: "no stores configured".into(),
        });
        self.mark_failure(&err.to_string());
        Err(BackupError::Store(err))
    }

    /// Serialize the entire object set and fan it out across the chain.
    /// Durable only once the configured write quorum acknowledges.
    pub fn run_full(
        &mut self,
        ledger: &PlacementLedger,
        stores: &mut StoreChain,
        now: u64,
    ) -> Result<String, BackupError> {
        let _span = info_span!("full_backup").entered();
        self.state = BackupState::BackingUp;

        let snap = Snapshot::capture_full(SnapshotKind::Full, ledger, now)?;
        let key = format!("full/{}", snap.version);
        let bytes = to_cbor(&snap)?;
        let acks = fan_out(stores, &key, &bytes, Some(&snap.version), None);

        if acks >= self.config.quorum {
            self.mark_success();
            self.full_count += 1;
            info!(
                acks,
                stores = stores.len(),
                objects = ledger.object_count(),
                version = %snap.version,
                "full backup durable"
            );
            Ok(snap.version)
        } else {
            let err = BackupError::QuorumNotReached {
                acks,
                required: self.config.quorum,
            };
            self.mark_failure(&err.to_string());
            Err(err)
        }
    }

    /// Best-effort capture on shutdown or declared emergency: writes to every
    /// store, counts acknowledgements only within the bounded wait, accepts
    /// partial success, and never returns an error.
    pub fn run_emergency(
        &mut self,
        ledger: &PlacementLedger,
        stores: &mut StoreChain,
        now: u64,
    ) -> EmergencyReport {
        let _span = info_span!("emergency_backup").entered();
        let total = stores.len();

        let snap = match Snapshot::capture_full(SnapshotKind::Emergency, ledger, now) {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "emergency capture failed");
                return EmergencyReport { acked: 0, total };
            }
        };
        let key = format!("emergency/{}", snap.version);
        let bytes = match to_cbor(&snap) {
            Ok(b) => b,
            Err(err) => {
                warn!(%err, "emergency encode failed");
                return EmergencyReport { acked: 0, total };
            }
        };

        let deadline = Instant::now() + self.config.emergency_wait;
        let acked = fan_out(stores, &key, &bytes, None, Some(deadline));
        info!(acked, total, version = %snap.version, "emergency backup finished");
        EmergencyReport { acked, total }
    }

    /// Restore the ledger from the latest (or a specific) full snapshot,
    /// then replay newer incremental snapshots idempotently.
    ///
    /// Single-flight: a concurrent request while one is in progress is
    /// rejected. The live ledger is only touched after a validated full
    /// snapshot has been decoded.
    pub fn recover(
        &mut self,
        ledger: &mut PlacementLedger,
        stores: &StoreChain,
        version: Option<&str>,
    ) -> Result<RecoveryReport, BackupError> {
        if self.recovery_flag.swap(true, Ordering::SeqCst) {
            return Err(BackupError::RecoveryInProgress);
        }
        let result = self.recover_inner(ledger, stores, version);
        self.recovery_flag.store(false, Ordering::SeqCst);
        result
    }

    fn recover_inner(
        &mut self,
        ledger: &mut PlacementLedger,
        stores: &StoreChain,
        version: Option<&str>,
    ) -> Result<RecoveryReport, BackupError> {
        let _span = info_span!("recovery").entered();

        let mut chosen: Option<Snapshot> = None;
        let mut corrupt_version: Option<String> = None;
        for store in stores.iter() {
            let target = match version {
                Some(v) => Some(v.to_string()),
                None => match latest_full_version(store.as_ref()) {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(store = store.label(), %err, "store probe failed");
                        None
                    }
                },
            };
            let Some(target) = target else { continue };
            match load_snapshot(store.as_ref(), &format!("full/{target}")) {
                Ok(Some(snap)) => {
                    if snap.verify() {
                        chosen = Some(snap);
                        break;
                    }
                    warn!(store = store.label(), version = %target, "full snapshot failed validation");
                    corrupt_version = Some(target);
                }
                Ok(None) => {}
                Err(err) => warn!(store = store.label(), %err, "full snapshot read failed"),
            }
        }

        let snap = match chosen {
            Some(s) => s,
            None => {
                return Err(match corrupt_version {
                    Some(version) => BackupError::ChecksumMismatch { version },
                    None => BackupError::NoSnapshots,
                });
            }
        };
        // Decode before touching the ledger so a bad payload aborts cleanly.
        let objects = snap.objects()?;

        // Incrementals newer than the full snapshot may live on any store in
        // the chain; merge by version, first store holding a version wins.
        let mut newer: BTreeMap<String, usize> = BTreeMap::new();
        for (idx, store) in stores.iter().enumerate() {
            match store.keys("incr/") {
                Ok(keys) => {
                    for k in keys {
                        if let Some(v) = k.strip_prefix("incr/") {
                            if v > snap.version.as_str() {
                                newer.entry(v.to_string()).or_insert(idx);
                            }
                        }
                    }
                }
                Err(err) => warn!(store = store.label(), %err, "incremental listing failed"),
            }
        }

        ledger.replace_all(objects);
        let mut failed = 0usize;
        for (ver, idx) in &newer {
            match load_snapshot(stores[*idx].as_ref(), &format!("incr/{ver}")) {
                Ok(Some(s)) if s.verify() => match s.changes() {
                    Ok(records) => {
                        for rec in &records {
                            ledger.apply_change(rec);
                        }
                    }
                    Err(err) => {
                        failed += 1;
                        warn!(version = %ver, %err, "incremental payload undecodable");
                    }
                },
                _ => {
                    failed += 1;
                    warn!(version = %ver, "incremental snapshot unusable during recovery");
                }
            }
        }

        let report = RecoveryReport {
            restored: ledger.object_count(),
            failed,
            version: snap.version.clone(),
        };
        info!(
            restored = report.restored,
            failed = report.failed,
            version = %report.version,
            "recovery complete"
        );
        Ok(report)
    }

    /// Remove snapshots older than the retention window. The newest full
    /// snapshot on each store is kept regardless so recovery stays possible.
    /// Best-effort: store errors are logged and skipped.
    pub fn prune_expired(&mut self, stores: &mut StoreChain, now: u64) -> usize {
        let mut removed = 0usize;
        for store in stores.iter_mut() {
            let keep = latest_full_version(store.as_ref()).unwrap_or(None);
            for prefix in ["incr/", "full/", "emergency/"] {
                let keys = match store.keys(prefix) {
                    Ok(keys) => keys,
                    Err(err) => {
                        warn!(store = store.label(), %err, "listing failed during pruning");
                        continue;
                    }
                };
                for key in keys {
                    let Some(version) = key.strip_prefix(prefix) else {
                        continue;
                    };
                    if version == "latest" {
                        continue;
                    }
                    let Some(ts) = Snapshot::version_timestamp(version) else {
                        continue;
                    };
                    if now.saturating_sub(ts) <= self.config.retention.as_secs() {
                        continue;
                    }
                    if prefix == "full/" && keep.as_deref() == Some(version) {
                        continue;
                    }
                    match store.remove(&key) {
                        Ok(()) => removed += 1,
                        Err(err) => warn!(store = store.label(), %key, %err, "prune failed"),
                    }
                }
            }
        }
        if removed > 0 {
            debug!(removed, "pruned expired snapshots");
        }
        removed
    }

    /// Re-check the newest full snapshot on each store. Best-effort; returns
    /// (validated, corrupt) counts.
    pub fn revalidate_recent(&self, stores: &StoreChain) -> (usize, usize) {
        let mut validated = 0usize;
        let mut corrupt = 0usize;
        for store in stores.iter() {
            let version = match latest_full_version(store.as_ref()) {
                Ok(Some(v)) => v,
                Ok(None) => continue,
                Err(err) => {
                    warn!(store = store.label(), %err, "store probe failed during revalidation");
                    continue;
                }
            };
            match load_snapshot(store.as_ref(), &format!("full/{version}")) {
                Ok(Some(snap)) if snap.verify() => validated += 1,
                Ok(Some(_)) => {
                    corrupt += 1;
                    warn!(store = store.label(), version = %version, "stored snapshot failed validation");
                }
                Ok(None) => {}
                Err(err) => {
                    corrupt += 1;
                    warn!(store = store.label(), %err, "snapshot read failed during revalidation");
                }
            }
        }
        (validated, corrupt)
    }

    fn mark_success(&mut self) {
        self.state = BackupState::Idle;
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    fn mark_failure(&mut self, err: &str) {
        self.state = BackupState::Failed;
        self.last_error = Some(err.to_string());
        self.consecutive_failures += 1;
    }
}

/// Write `bytes` under `key` on every store concurrently and return the
/// acknowledgement count. When `latest` is set, acking stores also get their
/// `full/latest` pointer updated. When `deadline` is set, acknowledgements
/// arriving after it are not counted (the writes themselves still complete
/// within the adapter's own I/O budget).
fn fan_out(
    stores: &mut StoreChain,
    key: &str,
    bytes: &[u8],
    latest: Option<&str>,
    deadline: Option<Instant>,
) -> usize {
    let total = stores.len();
    let (tx, rx) = mpsc::channel::<bool>();
    let mut acked = 0usize;

    std::thread::scope(|scope| {
        for store in stores.iter_mut() {
            let tx = tx.clone();
            scope.spawn(move || {
                let ok = match store.set(key, bytes) {
                    Ok(()) => {
                        if let Some(version) = latest {
                            if let Err(err) = store.set("full/latest", version.as_bytes()) {
                                warn!(store = store.label(), %err, "latest pointer write failed");
                            }
                        }
                        true
                    }
                    Err(err) => {
                        warn!(store = store.label(), %err, "snapshot write failed");
                        false
                    }
                };
                let _ = tx.send(ok);
            });
        }
        drop(tx);

        for _ in 0..total {
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(remaining).ok()
                }
                None => rx.recv().ok(),
            };
            match received {
                Some(true) => acked += 1,
                Some(false) => {}
                None => break,
            }
        }
    });
    acked
}

fn latest_full_version(store: &dyn DurableStore) -> Result<Option<String>, StoreError> {
    if let Some(bytes) = store.get("full/latest")? {
        if let Ok(version) = String::from_utf8(bytes) {
            if store.get(&format!("full/{version}"))?.is_some() {
                return Ok(Some(version));
            }
        }
    }
    // Pointer missing or dangling: fall back to scanning the keyspace.
    let mut versions: Vec<String> = store
        .keys("full/")?
        .into_iter()
        .filter_map(|k| k.strip_prefix("full/").map(str::to_string))
        .filter(|v| v != "latest")
        .collect();
    versions.sort();
    Ok(versions.pop())
}

fn load_snapshot(store: &dyn DurableStore, key: &str) -> Result<Option<Snapshot>, StoreError> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(crate::store::from_cbor(&bytes)?)),
        None => Ok(None),
    }
}
