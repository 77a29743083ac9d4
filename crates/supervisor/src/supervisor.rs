use glam::{Quat, Vec3};
use homestead_backup::{BackupConfig, BackupCoordinator, BackupError, BackupState, StoreChain};
use homestead_common::{ItemSpec, OwnerId, OwnerRef, PlacementId, Transform};
use homestead_ledger::{LedgerError, PlacementLedger, ProtectedZone};
use homestead_resolver::{
    credits, ConflictResolver, RelocationConfig, ResolveError, ZoneEnforcement,
};
use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, info_span, warn};

use crate::collab::{Collaborators, PoolError, PoolHandle};
use crate::health::{HealthConfig, HealthMonitor, HealthPriority, HealthRecord, HealthStatus};
use crate::ticker::Ticker;

/// Lifecycle state of the supervisor.
///
/// `Operational`, `Degraded`, and `Critical` track the aggregate health and
/// move freely between each other; `Emergency` and `ShuttingDown` are
/// entered by escalation only, and `ShuttingDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initializing,
    Operational,
    Degraded,
    Critical,
    Emergency,
    ShuttingDown,
}

/// Errors from the placement pipeline, in pipeline order.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    #[error("placement rejected by security validation: {0:?}")]
    Violation(Vec<String>),
    #[error("placement blocked by moderation")]
    ModerationBlocked,
    #[error(transparent)]
    PoolUnavailable(#[from] PoolError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("system is shutting down")]
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoveError {
    #[error("placement {0:?} not found")]
    NotFound(PlacementId),
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

/// The orchestrator over ledger, resolver, and backup.
///
/// Holds constructed references to every collaborator, passed in at
/// construction; there is no ambient global state. All placement mutations
/// are serialized through `&mut self`, so no other path can race them.
pub struct SystemSupervisor {
    ledger: PlacementLedger,
    resolver: ConflictResolver,
    coordinator: BackupCoordinator,
    stores: StoreChain,
    collab: Collaborators,
    monitor: HealthMonitor,
    state: SupervisorState,
    critical_errors: u32,
    health_config: HealthConfig,
    health_ticker: Ticker,
    incremental_ticker: Ticker,
    full_ticker: Ticker,
    maintenance_ticker: Ticker,
    pool_handles: BTreeMap<PlacementId, PoolHandle>,
}

impl SystemSupervisor {
    pub fn new(
        stores: StoreChain,
        collab: Collaborators,
        backup_config: BackupConfig,
        health_config: HealthConfig,
        relocation_config: RelocationConfig,
    ) -> Self {
        let mut monitor = HealthMonitor::new();
        monitor.register("ledger", HealthPriority::Critical);
        monitor.register("backup", HealthPriority::Critical);
        monitor.register("stores", HealthPriority::Critical);
        monitor.register("resolver", HealthPriority::Medium);

        let health_ticker = Ticker::new(health_config.check_interval);
        let incremental_ticker = Ticker::new(backup_config.incremental_interval);
        let full_ticker = Ticker::new(backup_config.full_interval);
        let maintenance_ticker = Ticker::new(backup_config.maintenance_interval);

        Self {
            ledger: PlacementLedger::new(),
            resolver: ConflictResolver::new(relocation_config),
            coordinator: BackupCoordinator::new(backup_config),
            stores,
            collab,
            monitor,
            state: SupervisorState::Initializing,
            critical_errors: 0,
            health_config,
            health_ticker,
            incremental_ticker,
            full_ticker,
            maintenance_ticker,
            pool_handles: BTreeMap::new(),
        }
    }

    /// Restore the world from the newest backup (if any) and go operational.
    pub fn start(&mut self) {
        let _span = info_span!("startup").entered();
        match self.coordinator.recover(&mut self.ledger, &self.stores, None) {
            Ok(report) => info!(
                restored = report.restored,
                version = %report.version,
                "world restored from backup"
            ),
            Err(BackupError::NoSnapshots) => info!("no backups found, starting fresh"),
            Err(err) => warn!(%err, "startup recovery failed, starting fresh"),
        }
        self.state = SupervisorState::Operational;
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn ledger(&self) -> &PlacementLedger {
        &self.ledger
    }

    /// The transactional entry point for placing an object.
    ///
    /// Fail-fast with no partial effect: validation and moderation run
    /// before anything is allocated, and a pooled object acquired for a
    /// placement that cannot be recorded is released on the spot.
    pub fn place_object(
        &mut self,
        requester: &OwnerRef,
        item: &ItemSpec,
        position: Vec3,
        rotation: Quat,
    ) -> Result<PlacementId, PlaceError> {
        if self.state == SupervisorState::ShuttingDown {
            return Err(PlaceError::Unavailable);
        }

        self.collab
            .security
            .validate(requester, item, position, rotation)
            .map_err(PlaceError::Violation)?;

        if !self.collab.moderation.check_placement(requester, "place", item) {
            return Err(PlaceError::ModerationBlocked);
        }

        let id = PlacementId::new();
        let handle = self.collab.pool.acquire(item, id)?;

        let transform = Transform { position, rotation };
        if let Err(err) =
            self.ledger
                .insert_with_id(id, requester.clone(), item, transform, unix_now())
        {
            self.collab.pool.release(handle, None);
            return Err(err.into());
        }
        self.pool_handles.insert(id, handle);

        self.collab.analytics.track_placement(requester, item, position);
        debug!(placement = ?id, owner = requester.id.0, item = %item.item_id, "object placed");
        Ok(id)
    }

    /// Remove a placement, returning its backing object to the pool.
    pub fn remove_object(&mut self, id: PlacementId, reason: &str) -> Result<(), RemoveError> {
        let removed = self
            .ledger
            .remove(id, unix_now())
            .map_err(|_| RemoveError::NotFound(id))?;
        if let Some(handle) = self.pool_handles.remove(&id) {
            self.collab.pool.release(handle, Some(&removed));
        }
        debug!(placement = ?id, reason, "object removed");
        Ok(())
    }

    /// Register or update a zone definition (external planning action).
    pub fn upsert_zone(&mut self, zone: ProtectedZone) {
        self.ledger.upsert_zone(zone);
    }

    pub fn set_zone_active(&mut self, name: &str, active: bool) -> Result<(), SupervisorError> {
        Ok(self.ledger.set_zone_active(name, active)?)
    }

    /// Activate a zone and resolve every placement conflicting with it.
    pub fn enforce_zone(&mut self, name: &str) -> Result<ZoneEnforcement, SupervisorError> {
        self.ledger.set_zone_active(name, true)?;
        let tally = self.resolver.enforce_zone(
            &mut self.ledger,
            &mut self.stores,
            self.collab.payouts.as_mut(),
            name,
            unix_now(),
        )?;

        // Compensated placements are gone from the ledger; return their
        // backing objects to the pool.
        let stale: Vec<PlacementId> = self
            .pool_handles
            .keys()
            .filter(|id| self.ledger.get(**id).is_none())
            .copied()
            .collect();
        for id in stale {
            if let Some(handle) = self.pool_handles.remove(&id) {
                self.collab.pool.release(handle, None);
            }
        }
        Ok(tally)
    }

    /// Deliver any offline compensation credits queued for a connecting
    /// owner. Returns the delivered amount.
    pub fn connect_owner(&mut self, owner: OwnerId) -> u64 {
        match credits::apply_pending_credits(
            &mut self.stores,
            self.collab.payouts.as_mut(),
            owner,
        ) {
            Ok(amount) => amount,
            Err(err) => {
                warn!(owner = owner.0, %err, "queued credits could not be delivered");
                0
            }
        }
    }

    pub fn subsystem_status(&self, name: &str) -> Option<&HealthRecord> {
        self.monitor.record(name)
    }

    pub fn status_map(&self) -> &BTreeMap<String, HealthRecord> {
        self.monitor.records()
    }

    pub fn overall_status(&self) -> HealthStatus {
        self.monitor.overall()
    }

    /// Force a full backup now. Returns whether it reached quorum.
    pub fn force_backup(&mut self) -> bool {
        match self
            .coordinator
            .run_full(&self.ledger, &mut self.stores, unix_now())
        {
            Ok(version) => {
                info!(%version, "forced full backup durable");
                true
            }
            Err(err) => {
                warn!(%err, "forced full backup failed");
                false
            }
        }
    }

    /// Force a recovery from the latest (or a specific) full snapshot.
    pub fn force_recovery(&mut self, version: Option<&str>) -> bool {
        match self.coordinator.recover(&mut self.ledger, &self.stores, version) {
            Ok(report) => {
                info!(restored = report.restored, version = %report.version, "forced recovery complete");
                true
            }
            Err(err) => {
                warn!(%err, "forced recovery failed");
                false
            }
        }
    }

    /// Drive the periodic loops. Long operations run here, off the request
    /// path; placement calls never wait on a backup cycle.
    pub fn tick(&mut self) {
        if self.state == SupervisorState::ShuttingDown {
            return;
        }
        let now = Instant::now();

        let forced = self.ledger.change_backlog() >= self.coordinator.config().max_pending;
        if self.incremental_ticker.due(now) || forced {
            self.run_incremental_cycle();
        }
        if self.full_ticker.due(now) {
            self.run_full_cycle();
        }
        if self.maintenance_ticker.due(now) {
            self.run_maintenance();
        }
        if self.health_ticker.due(now) {
            self.run_health_check();
        }
    }

    /// One incremental backup cycle. Failures are logged and retried on the
    /// next cycle; the pending queue is preserved.
    pub fn run_incremental_cycle(&mut self) {
        if let Err(err) =
            self.coordinator
                .run_incremental(&mut self.ledger, &mut self.stores, unix_now())
        {
            warn!(%err, "incremental backup cycle failed, will retry");
        }
    }

    /// One full backup cycle.
    pub fn run_full_cycle(&mut self) {
        if let Err(err) = self
            .coordinator
            .run_full(&self.ledger, &mut self.stores, unix_now())
        {
            warn!(%err, "full backup cycle failed, will retry");
        }
    }

    /// Prune expired snapshots and revalidate recent ones. Best-effort.
    pub fn run_maintenance(&mut self) {
        let now = unix_now();
        let pruned = self.coordinator.prune_expired(&mut self.stores, now);
        let (validated, corrupt) = self.coordinator.revalidate_recent(&self.stores);
        debug!(pruned, validated, corrupt, "maintenance cycle finished");
    }

    /// Probe every subsystem, classify, aggregate, and escalate if needed.
    /// Returns the aggregate status.
    pub fn run_health_check(&mut self) -> HealthStatus {
        if self.state == SupervisorState::ShuttingDown {
            return self.monitor.overall();
        }
        let _span = info_span!("health_check").entered();
        let now = unix_now();

        self.probe_subsystems(now);

        // A critical-priority failure gets one restart attempt and counts
        // toward the emergency threshold.
        let failing: Vec<String> = self
            .monitor
            .critical_failures()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for name in &failing {
            self.restart_subsystem(name);
            self.critical_errors += 1;
        }

        let overall = self.monitor.overall();
        self.apply_overall(overall);
        self.escalate();
        overall
    }

    fn probe_subsystems(&mut self, now: u64) {
        let max_pending = self.coordinator.config().max_pending;
        let ledger_status = if self.ledger.change_backlog() >= max_pending.saturating_mul(10) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Operational
        };
        self.monitor.report("ledger", ledger_status, now);

        let backup_status = match self.coordinator.state() {
            BackupState::Failed if self.coordinator.consecutive_failures() >= 3 => {
                HealthStatus::Critical
            }
            BackupState::Failed => HealthStatus::Degraded,
            _ => HealthStatus::Operational,
        };
        self.monitor.report("backup", backup_status, now);

        let unreachable = self
            .stores
            .iter()
            .filter(|s| s.keys("full/").is_err())
            .count();
        let stores_status = if unreachable == self.stores.len() {
            HealthStatus::Failed
        } else if unreachable > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Operational
        };
        self.monitor.report("stores", stores_status, now);

        let resolver_status = if self.resolver.flagged_count() > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Operational
        };
        self.monitor.report("resolver", resolver_status, now);
    }

    fn restart_subsystem(&mut self, name: &str) {
        warn!(subsystem = %name, "critical failure, attempting restart");
        if name == "backup" {
            self.coordinator.reset();
        }
    }

    fn apply_overall(&mut self, overall: HealthStatus) {
        if matches!(
            self.state,
            SupervisorState::Emergency | SupervisorState::ShuttingDown
        ) {
            return;
        }
        self.state = match overall {
            HealthStatus::Operational => {
                // A clean cycle closes the monitoring window.
                self.critical_errors = 0;
                SupervisorState::Operational
            }
            HealthStatus::Degraded => SupervisorState::Degraded,
            HealthStatus::Critical | HealthStatus::Failed => SupervisorState::Critical,
        };
    }

    fn escalate(&mut self) {
        if self.critical_errors >= self.health_config.shutdown_threshold {
            self.graceful_shutdown();
        } else if self.critical_errors > self.health_config.emergency_threshold {
            self.enter_emergency();
        }
    }

    /// Emergency mode: protect the world state, shed load, wake operators.
    fn enter_emergency(&mut self) {
        if matches!(
            self.state,
            SupervisorState::Emergency | SupervisorState::ShuttingDown
        ) {
            return;
        }
        warn!(
            critical_errors = self.critical_errors,
            "entering emergency mode"
        );
        self.state = SupervisorState::Emergency;

        let now = unix_now();
        if let Err(err) = self.coordinator.run_full(&self.ledger, &mut self.stores, now) {
            warn!(%err, "emergency full backup failed");
        }
        self.coordinator
            .run_emergency(&self.ledger, &mut self.stores, now);

        self.collab.ops.shed_load();
        self.collab.ops.notify_operators(&format!(
            "world core in emergency mode after {} critical errors",
            self.critical_errors
        ));
    }

    /// Controlled shutdown: warn sessions, grant the grace period, take a
    /// final emergency backup, then disconnect everyone. Terminal.
    pub fn graceful_shutdown(&mut self) {
        if self.state == SupervisorState::ShuttingDown {
            return;
        }
        warn!(
            critical_errors = self.critical_errors,
            "beginning graceful shutdown"
        );
        self.collab
            .ops
            .broadcast("the world is shutting down shortly, your builds are being saved");
        std::thread::sleep(self.health_config.shutdown_grace);

        self.coordinator
            .run_emergency(&self.ledger, &mut self.stores, unix_now());
        self.collab.ops.disconnect_all();
        self.state = SupervisorState::ShuttingDown;
        info!("shutdown complete");
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{
        AnalyticsSink, ModerationGate, ObjectPool, OpsChannel, SecurityValidator,
    };
    use homestead_backup::{DurableStore, MemoryStore};
    use homestead_common::{ItemTier, ZoneBounds};
    use homestead_ledger::PlacedObject;
    use homestead_resolver::{PayoutError, PayoutGateway};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct StrictSecurity {
        reject_with: Option<Vec<String>>,
    }

    impl SecurityValidator for StrictSecurity {
        fn validate(
            &self,
            _requester: &OwnerRef,
            _item: &ItemSpec,
            _position: Vec3,
            _rotation: Quat,
        ) -> Result<(), Vec<String>> {
            match &self.reject_with {
                Some(violations) => Err(violations.clone()),
                None => Ok(()),
            }
        }
    }

    struct Gate {
        block: bool,
    }

    impl ModerationGate for Gate {
        fn check_placement(&self, _r: &OwnerRef, _intent: &str, _item: &ItemSpec) -> bool {
            !self.block
        }
    }

    #[derive(Default)]
    struct PoolStats {
        acquired: usize,
        released: usize,
    }

    struct TestPool {
        stats: Arc<Mutex<PoolStats>>,
        next: u64,
        exhausted: bool,
    }

    impl ObjectPool for TestPool {
        fn acquire(&mut self, item: &ItemSpec, _id: PlacementId) -> Result<PoolHandle, PoolError> {
            if self.exhausted {
                return Err(PoolError {
                    item_id: item.item_id.clone(),
                    reason: "exhausted".into(),
                });
            }
            self.next += 1;
            self.stats.lock().unwrap().acquired += 1;
            Ok(PoolHandle(self.next))
        }
        fn release(&mut self, _handle: PoolHandle, _placement: Option<&PlacedObject>) {
            self.stats.lock().unwrap().released += 1;
        }
    }

    struct CountingAnalytics {
        events: Arc<Mutex<usize>>,
    }

    impl AnalyticsSink for CountingAnalytics {
        fn track_placement(&mut self, _r: &OwnerRef, _item: &ItemSpec, _p: Vec3) {
            *self.events.lock().unwrap() += 1;
        }
    }

    struct TestWallet {
        connected: Arc<Mutex<bool>>,
        balance: Arc<Mutex<u64>>,
    }

    impl PayoutGateway for TestWallet {
        fn is_connected(&self, _owner: OwnerId) -> bool {
            *self.connected.lock().unwrap()
        }
        fn deposit(&mut self, _owner: OwnerId, amount: u64) -> Result<(), PayoutError> {
            *self.balance.lock().unwrap() += amount;
            Ok(())
        }
    }

    struct RecordingOps {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl OpsChannel for RecordingOps {
        fn notify_operators(&mut self, message: &str) {
            self.log.lock().unwrap().push(format!("notify:{message}"));
        }
        fn shed_load(&mut self) {
            self.log.lock().unwrap().push("shed".into());
        }
        fn broadcast(&mut self, message: &str) {
            self.log.lock().unwrap().push(format!("broadcast:{message}"));
        }
        fn disconnect_all(&mut self) {
            self.log.lock().unwrap().push("disconnect".into());
        }
    }

    struct Rig {
        supervisor: SystemSupervisor,
        pool_stats: Arc<Mutex<PoolStats>>,
        analytics: Arc<Mutex<usize>>,
        wallet_connected: Arc<Mutex<bool>>,
        wallet_balance: Arc<Mutex<u64>>,
        ops_log: Arc<Mutex<Vec<String>>>,
    }

    struct RigOptions {
        stores: StoreChain,
        reject_with: Option<Vec<String>>,
        block_moderation: bool,
        pool_exhausted: bool,
        wallet_connected: bool,
    }

    impl Default for RigOptions {
        fn default() -> Self {
            Self {
                stores: online_chain(3),
                reject_with: None,
                block_moderation: false,
                pool_exhausted: false,
                wallet_connected: true,
            }
        }
    }

    fn online_chain(n: usize) -> StoreChain {
        (1..=n)
            .map(|i| Box::new(MemoryStore::new(format!("store-{i}"))) as Box<dyn DurableStore>)
            .collect()
    }

    fn offline_chain(n: usize) -> StoreChain {
        (1..=n)
            .map(|i| {
                let mut store = MemoryStore::new(format!("store-{i}"));
                store.set_offline(true);
                Box::new(store) as Box<dyn DurableStore>
            })
            .collect()
    }

    fn rig(options: RigOptions) -> Rig {
        let pool_stats = Arc::new(Mutex::new(PoolStats::default()));
        let analytics = Arc::new(Mutex::new(0));
        let wallet_connected = Arc::new(Mutex::new(options.wallet_connected));
        let wallet_balance = Arc::new(Mutex::new(0));
        let ops_log = Arc::new(Mutex::new(Vec::new()));

        let collab = Collaborators {
            security: Box::new(StrictSecurity {
                reject_with: options.reject_with,
            }),
            moderation: Box::new(Gate {
                block: options.block_moderation,
            }),
            pool: Box::new(TestPool {
                stats: pool_stats.clone(),
                next: 0,
                exhausted: options.pool_exhausted,
            }),
            analytics: Box::new(CountingAnalytics {
                events: analytics.clone(),
            }),
            payouts: Box::new(TestWallet {
                connected: wallet_connected.clone(),
                balance: wallet_balance.clone(),
            }),
            ops: Box::new(RecordingOps {
                log: ops_log.clone(),
            }),
        };

        let health_config = HealthConfig {
            shutdown_grace: Duration::ZERO,
            ..HealthConfig::default()
        };
        let mut supervisor = SystemSupervisor::new(
            options.stores,
            collab,
            BackupConfig::default(),
            health_config,
            RelocationConfig::default(),
        );
        supervisor.start();

        Rig {
            supervisor,
            pool_stats,
            analytics,
            wallet_connected,
            wallet_balance,
            ops_log,
        }
    }

    fn lamp() -> ItemSpec {
        ItemSpec::new("lamp", ItemTier::Basic, 5)
    }

    fn ada() -> OwnerRef {
        OwnerRef::new(1, "ada")
    }

    #[test]
    fn place_records_tracks_and_pools() {
        let mut r = rig(RigOptions::default());
        let id = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::new(1.0, 0.0, 2.0), Quat::IDENTITY)
            .unwrap();
        assert_eq!(r.supervisor.state(), SupervisorState::Operational);
        let obj = r.supervisor.ledger().get(id).unwrap();
        assert_eq!(obj.owner.name, "ada");
        assert_eq!(*r.analytics.lock().unwrap(), 1);
        assert_eq!(r.pool_stats.lock().unwrap().acquired, 1);
        assert_eq!(r.supervisor.ledger().change_backlog(), 1);
    }

    #[test]
    fn security_rejection_has_no_effect() {
        let mut r = rig(RigOptions {
            reject_with: Some(vec!["placement rate exceeded".into()]),
            ..RigOptions::default()
        });
        let err = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap_err();
        match err {
            PlaceError::Violation(v) => assert_eq!(v, vec!["placement rate exceeded".to_string()]),
            other => panic!("expected Violation, got: {other}"),
        }
        assert_eq!(r.supervisor.ledger().object_count(), 0);
        assert_eq!(r.pool_stats.lock().unwrap().acquired, 0);
        assert_eq!(*r.analytics.lock().unwrap(), 0);
    }

    #[test]
    fn moderation_block_surfaces_before_pooling() {
        let mut r = rig(RigOptions {
            block_moderation: true,
            ..RigOptions::default()
        });
        let err = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, PlaceError::ModerationBlocked));
        assert_eq!(r.pool_stats.lock().unwrap().acquired, 0);
    }

    #[test]
    fn pool_exhaustion_surfaces_and_leaves_ledger_untouched() {
        let mut r = rig(RigOptions {
            pool_exhausted: true,
            ..RigOptions::default()
        });
        let err = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, PlaceError::PoolUnavailable(_)));
        assert_eq!(r.supervisor.ledger().object_count(), 0);
    }

    #[test]
    fn remove_returns_backing_object_to_pool() {
        let mut r = rig(RigOptions::default());
        let id = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap();
        r.supervisor.remove_object(id, "owner request").unwrap();
        assert_eq!(r.supervisor.ledger().object_count(), 0);
        assert_eq!(r.pool_stats.lock().unwrap().released, 1);
    }

    #[test]
    fn remove_unknown_is_not_found_without_side_effects() {
        let mut r = rig(RigOptions::default());
        r.supervisor
            .place_object(&ada(), &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap();
        let err = r
            .supervisor
            .remove_object(PlacementId::new(), "typo")
            .unwrap_err();
        assert!(matches!(err, RemoveError::NotFound(_)));
        assert_eq!(r.supervisor.ledger().object_count(), 1);
        assert_eq!(r.pool_stats.lock().unwrap().released, 0);
    }

    #[test]
    fn enforce_zone_relocates_conflicting_placement() {
        let mut r = rig(RigOptions::default());
        let id = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap();
        r.supervisor.upsert_zone(ProtectedZone::new(
            "DevZone",
            ZoneBounds::new(Vec3::splat(-10.0), Vec3::splat(10.0)),
            "fountain",
        ));

        let tally = r.supervisor.enforce_zone("DevZone").unwrap();
        assert_eq!(tally.total, 1);
        assert_eq!(tally.relocated, 1);
        let moved = r.supervisor.ledger().get(id).unwrap();
        assert!(r
            .supervisor
            .ledger()
            .is_in_protected_zone(moved.transform.position)
            .is_none());
    }

    #[test]
    fn backup_then_recovery_roundtrips_world_state() {
        let mut r = rig(RigOptions::default());
        let keep = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::new(3.0, 0.0, 3.0), Quat::IDENTITY)
            .unwrap();
        assert!(r.supervisor.force_backup());

        // Later mutations that the recovery must roll back
        r.supervisor.remove_object(keep, "mistake").unwrap();
        let extra = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::new(9.0, 0.0, 9.0), Quat::IDENTITY)
            .unwrap();
        assert!(r.supervisor.ledger().get(keep).is_none());

        assert!(r.supervisor.force_recovery(None));
        assert!(r.supervisor.ledger().get(keep).is_some());
        assert!(r.supervisor.ledger().get(extra).is_none());
    }

    #[test]
    fn incremental_cycle_persists_changes_for_recovery() {
        let mut r = rig(RigOptions::default());
        assert!(r.supervisor.force_backup());
        let id = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::new(5.0, 0.0, 5.0), Quat::IDENTITY)
            .unwrap();
        r.supervisor.run_incremental_cycle();
        assert_eq!(r.supervisor.ledger().change_backlog(), 0);

        // Wipe the live world, then recover: full + incremental replay
        r.supervisor.remove_object(id, "wipe").unwrap();
        assert!(r.supervisor.force_recovery(None));
        assert!(r.supervisor.ledger().get(id).is_some());
    }

    #[test]
    fn healthy_system_reports_operational() {
        let mut r = rig(RigOptions::default());
        assert_eq!(r.supervisor.run_health_check(), HealthStatus::Operational);
        assert_eq!(r.supervisor.state(), SupervisorState::Operational);
        assert!(r.supervisor.subsystem_status("backup").is_some());
        assert_eq!(r.supervisor.status_map().len(), 4);
    }

    #[test]
    fn dead_store_chain_is_critical() {
        let mut r = rig(RigOptions {
            stores: offline_chain(3),
            ..RigOptions::default()
        });
        assert_eq!(r.supervisor.run_health_check(), HealthStatus::Critical);
        assert_eq!(r.supervisor.state(), SupervisorState::Critical);
        let record = r.supervisor.subsystem_status("stores").unwrap();
        assert_eq!(record.status, HealthStatus::Failed);
        assert_eq!(record.error_count, 1);
    }

    #[test]
    fn sustained_critical_failures_enter_emergency() {
        let mut r = rig(RigOptions {
            stores: offline_chain(3),
            ..RigOptions::default()
        });
        for _ in 0..6 {
            r.supervisor.run_health_check();
        }
        assert_eq!(r.supervisor.state(), SupervisorState::Emergency);
        let log = r.ops_log.lock().unwrap();
        assert!(log.iter().any(|e| e == "shed"));
        assert!(log.iter().any(|e| e.starts_with("notify:")));
    }

    #[test]
    fn runaway_critical_failures_shut_down() {
        let mut r = rig(RigOptions {
            stores: offline_chain(3),
            ..RigOptions::default()
        });
        for _ in 0..10 {
            r.supervisor.run_health_check();
        }
        assert_eq!(r.supervisor.state(), SupervisorState::ShuttingDown);
        let log = r.ops_log.lock().unwrap();
        assert!(log.iter().any(|e| e.starts_with("broadcast:")));
        assert_eq!(log.last().map(String::as_str), Some("disconnect"));

        drop(log);
        // Terminal: new placements are refused
        let err = r
            .supervisor
            .place_object(&ada(), &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, PlaceError::Unavailable));
    }

    #[test]
    fn offline_owner_credits_flow_through_connect() {
        let mut r = rig(RigOptions {
            wallet_connected: false,
            ..RigOptions::default()
        });
        let owner = ada();
        r.supervisor
            .place_object(&owner, &lamp(), Vec3::ZERO, Quat::IDENTITY)
            .unwrap();
        // A zone covering the entire scan range forces compensation
        r.supervisor.upsert_zone(ProtectedZone::new(
            "Everything",
            ZoneBounds::new(Vec3::splat(-500.0), Vec3::splat(500.0)),
            "expansion",
        ));
        let tally = r.supervisor.enforce_zone("Everything").unwrap();
        assert_eq!(tally.compensated, 1);
        assert_eq!(*r.wallet_balance.lock().unwrap(), 0);

        *r.wallet_connected.lock().unwrap() = true;
        let delivered = r.supervisor.connect_owner(owner.id);
        assert_eq!(delivered, 5);
        assert_eq!(*r.wallet_balance.lock().unwrap(), 5);
        // Applying twice does not double-pay
        assert_eq!(r.supervisor.connect_owner(owner.id), 0);
    }

    #[test]
    fn backlog_threshold_forces_incremental_flush() {
        let mut r = rig(RigOptions::default());
        let max_pending = BackupConfig::default().max_pending;
        for i in 0..max_pending {
            r.supervisor
                .place_object(
                    &ada(),
                    &lamp(),
                    Vec3::new(i as f32 * 20.0, 0.0, 0.0),
                    Quat::IDENTITY,
                )
                .unwrap();
        }
        assert_eq!(r.supervisor.ledger().change_backlog(), max_pending);
        r.supervisor.tick();
        assert_eq!(r.supervisor.ledger().change_backlog(), 0);
    }
}
