//! Conflict resolution between player placements and protected development
//! zones.
//!
//! Three ordered strategies: relocate the object to a clear spot, compensate
//! the owner and remove it, or report failure. An object is never deleted
//! without successful compensation.

pub mod compensation;
pub mod credits;
pub mod relocation;
pub mod resolver;

pub use compensation::{compensation_amount, PayoutError, PayoutGateway};
pub use relocation::RelocationConfig;
pub use resolver::{ConflictResolver, ResolveError, ZoneEnforcement};
