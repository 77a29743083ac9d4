use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Quat, Vec3};
use homestead_backup::{BackupConfig, DurableStore, FileStore, StoreChain};
use homestead_common::{ItemSpec, ItemTier, OwnerId, OwnerRef, PlacementId, ZoneBounds};
use homestead_ledger::{PlacedObject, ProtectedZone};
use homestead_resolver::{PayoutError, PayoutGateway, RelocationConfig};
use homestead_supervisor::{
    AnalyticsSink, Collaborators, HealthConfig, ModerationGate, ObjectPool, OpsChannel, PoolError,
    PoolHandle, SecurityValidator, SystemSupervisor,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "homestead-cli", about = "CLI driver for the homestead world core")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the redundant file stores
    #[arg(long, default_value = "homestead-data")]
    data_dir: PathBuf,

    /// Optional YAML config overriding backup/health/relocation tunables
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and configuration info
    Info,
    /// Run a scripted session: place objects, enforce a zone, take a backup
    Demo {
        /// Number of objects to place
        #[arg(short, long, default_value = "8")]
        placements: usize,
    },
    /// Probe subsystem health and print the status map
    Status,
    /// Restore the world from the latest (or a specific) full backup
    Recover {
        /// Snapshot version to restore instead of the latest
        #[arg(long)]
        version: Option<String>,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct AppConfig {
    backup: BackupConfig,
    health: HealthConfig,
    relocation: RelocationConfig,
}

/// Rejects placements outside the playable area.
struct BoundsValidator {
    limit: f32,
}

impl SecurityValidator for BoundsValidator {
    fn validate(
        &self,
        _requester: &OwnerRef,
        _item: &ItemSpec,
        position: Vec3,
        _rotation: Quat,
    ) -> Result<(), Vec<String>> {
        if position.abs().max_element() > self.limit {
            return Err(vec![format!(
                "position {position} outside the playable area"
            )]);
        }
        Ok(())
    }
}

struct OpenGate;

impl ModerationGate for OpenGate {
    fn check_placement(&self, _r: &OwnerRef, _intent: &str, _item: &ItemSpec) -> bool {
        true
    }
}

#[derive(Default)]
struct CountingPool {
    next: u64,
}

impl ObjectPool for CountingPool {
    fn acquire(&mut self, _item: &ItemSpec, _id: PlacementId) -> Result<PoolHandle, PoolError> {
        self.next += 1;
        Ok(PoolHandle(self.next))
    }
    fn release(&mut self, handle: PoolHandle, _placement: Option<&PlacedObject>) {
        tracing::debug!(handle = handle.0, "pool handle released");
    }
}

struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn track_placement(&mut self, requester: &OwnerRef, item: &ItemSpec, position: Vec3) {
        tracing::debug!(owner = %requester.name, item = %item.item_id, %position, "placement tracked");
    }
}

#[derive(Default)]
struct LocalWallet {
    total_paid: u64,
}

impl PayoutGateway for LocalWallet {
    fn is_connected(&self, _owner: OwnerId) -> bool {
        true
    }
    fn deposit(&mut self, owner: OwnerId, amount: u64) -> Result<(), PayoutError> {
        self.total_paid += amount;
        tracing::info!(owner = owner.0, amount, "compensation paid");
        Ok(())
    }
}

struct TerminalOps;

impl OpsChannel for TerminalOps {
    fn notify_operators(&mut self, message: &str) {
        tracing::warn!(message, "operator notification");
    }
    fn shed_load(&mut self) {
        tracing::warn!("load shedding requested");
    }
    fn broadcast(&mut self, message: &str) {
        println!("[broadcast] {message}");
    }
    fn disconnect_all(&mut self) {
        println!("[sessions] all sessions disconnected");
    }
}

fn open_stores(data_dir: &PathBuf) -> anyhow::Result<StoreChain> {
    let mut stores: StoreChain = Vec::new();
    for i in 1..=3 {
        let path = data_dir.join(format!("store-{i}"));
        let store = FileStore::open(format!("store-{i}"), &path)
            .with_context(|| format!("opening store at {}", path.display()))?;
        stores.push(Box::new(store) as Box<dyn DurableStore>);
    }
    Ok(stores)
}

fn build_supervisor(cli: &Cli) -> anyhow::Result<SystemSupervisor> {
    let config: AppConfig = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str(&text).context("parsing config")?
        }
        None => AppConfig::default(),
    };

    let collab = Collaborators {
        security: Box::new(BoundsValidator { limit: 10_000.0 }),
        moderation: Box::new(OpenGate),
        pool: Box::new(CountingPool::default()),
        analytics: Box::new(LogAnalytics),
        payouts: Box::new(LocalWallet::default()),
        ops: Box::new(TerminalOps),
    };

    let mut supervisor = SystemSupervisor::new(
        open_stores(&cli.data_dir)?,
        collab,
        config.backup,
        config.health,
        config.relocation,
    );
    supervisor.start();
    Ok(supervisor)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match &cli.command {
        Commands::Info => {
            println!("homestead-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("data dir: {}", cli.data_dir.display());
            let defaults = AppConfig::default();
            println!(
                "backup: incremental every {:?}, full every {:?}, quorum {}",
                defaults.backup.incremental_interval,
                defaults.backup.full_interval,
                defaults.backup.quorum
            );
            println!(
                "health: check every {:?}, emergency threshold {}",
                defaults.health.check_interval, defaults.health.emergency_threshold
            );
        }
        Commands::Demo { placements } => {
            let mut supervisor = build_supervisor(&cli)?;
            println!("Demo session: placing {placements} objects");

            let owner = OwnerRef::new(1, "demo-player");
            let item = ItemSpec::new("garden-lamp", ItemTier::Basic, 5);
            for i in 0..*placements {
                let position = Vec3::new((i % 4) as f32 * 6.0, 0.0, (i / 4) as f32 * 6.0);
                supervisor.place_object(&owner, &item, position, Quat::IDENTITY)?;
            }
            println!("World now holds {} objects", supervisor.ledger().object_count());

            supervisor.upsert_zone(ProtectedZone::new(
                "town-square",
                ZoneBounds::new(Vec3::new(-2.0, -5.0, -2.0), Vec3::new(8.0, 5.0, 8.0)),
                "the new fountain plaza",
            ));
            let tally = supervisor.enforce_zone("town-square")?;
            println!(
                "Zone enforcement: {} conflicting, {} relocated, {} compensated, {} failed",
                tally.total, tally.relocated, tally.compensated, tally.failed
            );

            let durable = supervisor.force_backup();
            println!("Full backup durable: {durable}");

            supervisor.run_health_check();
            println!("Overall status: {:?}", supervisor.overall_status());
        }
        Commands::Status => {
            let mut supervisor = build_supervisor(&cli)?;
            supervisor.run_health_check();
            println!("Overall: {:?}", supervisor.overall_status());
            for (name, record) in supervisor.status_map() {
                println!(
                    "  {name}: {:?} (priority {:?}, errors {})",
                    record.status, record.priority, record.error_count
                );
            }
            println!("Objects in world: {}", supervisor.ledger().object_count());
        }
        Commands::Recover { version } => {
            let mut supervisor = build_supervisor(&cli)?;
            if let Some(version) = version {
                let ok = supervisor.force_recovery(Some(version.as_str()));
                println!("Recovery from {version}: {}", if ok { "ok" } else { "failed" });
            }
            println!("Objects in world: {}", supervisor.ledger().object_count());
        }
    }

    Ok(())
}
