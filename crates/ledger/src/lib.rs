//! Placement ledger: the authoritative record of player-placed objects and
//! protected development zones.
//!
//! # Invariants
//! - All mutations flow through explicit operations; every mutation appends
//!   exactly one [`ChangeRecord`] to the pending queue.
//! - Placement ids are unique for their lifetime; collisions fail closed.
//! - Restore paths (`restore_object`, `replace_all`, `apply_change`) never
//!   emit change records.

pub mod change;
pub mod ledger;
pub mod object;
pub mod zone;

pub use change::{ChangeKind, ChangeRecord};
pub use ledger::{LedgerError, PlacementLedger};
pub use object::PlacedObject;
pub use zone::ProtectedZone;
