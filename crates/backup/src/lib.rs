//! Backup and recovery: ledger snapshots written to a chain of independent
//! key-value stores.
//!
//! # Invariants
//! - Snapshots are immutable and carry a content checksum verified on load.
//! - A full snapshot counts as durable only once a write quorum is reached.
//! - Incremental delivery is at-least-once; the pending change queue is
//!   cleared only on a confirmed write.
//! - Recovery is single-flight and never touches the live ledger until a
//!   validated full snapshot has been decoded.

pub mod coordinator;
pub mod snapshot;
pub mod store;

pub use coordinator::{
    BackupConfig, BackupCoordinator, BackupError, BackupState, EmergencyReport, RecoveryReport,
};
pub use snapshot::{Snapshot, SnapshotKind};
pub use store::{from_cbor, to_cbor, DurableStore, FileStore, MemoryStore, StoreChain, StoreError};
