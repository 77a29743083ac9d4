//! System supervisor: the single entry point for mutating world state, and
//! the health-driven orchestrator over ledger, resolver, and backup.
//!
//! # Invariants
//! - All placement mutations flow through [`SystemSupervisor`]; no other
//!   path touches the ledger.
//! - The placement pipeline is fail-fast with no partial effect: a pooled
//!   object acquired for a placement that cannot be recorded is released.
//! - Repeated critical failures escalate through the state machine instead
//!   of crashing the process.

pub mod collab;
pub mod health;
pub mod supervisor;
pub mod ticker;

pub use collab::{
    AnalyticsSink, Collaborators, ModerationGate, ObjectPool, OpsChannel, PoolError, PoolHandle,
    SecurityValidator,
};
pub use health::{HealthConfig, HealthMonitor, HealthPriority, HealthRecord, HealthStatus};
pub use supervisor::{PlaceError, RemoveError, SupervisorError, SupervisorState, SystemSupervisor};
pub use ticker::Ticker;
