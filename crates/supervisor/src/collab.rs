//! External collaborator contracts consumed by the supervisor.
//!
//! All of these live outside the world core (anti-exploit heuristics,
//! moderation, instance pooling, analytics, operations tooling) and are
//! injected at construction. The core only depends on these traits.

use glam::{Quat, Vec3};
use homestead_common::{ItemSpec, OwnerRef, PlacementId};
use homestead_ledger::PlacedObject;
use homestead_resolver::PayoutGateway;

/// Anti-exploit validation, consumed as a pass/fail check. On rejection the
/// violations are surfaced to the caller and never auto-retried.
pub trait SecurityValidator {
    fn validate(
        &self,
        requester: &OwnerRef,
        item: &ItemSpec,
        position: Vec3,
        rotation: Quat,
    ) -> Result<(), Vec<String>>;
}

/// Content moderation gate for placement intents.
pub trait ModerationGate {
    fn check_placement(&self, requester: &OwnerRef, intent: &str, item: &ItemSpec) -> bool;
}

/// Handle to a pooled backing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(pub u64);

#[derive(Debug, thiserror::Error)]
#[error("object pool could not supply `{item_id}`: {reason}")]
pub struct PoolError {
    pub item_id: String,
    pub reason: String,
}

/// Supplies and reclaims the backing object representation for placements.
pub trait ObjectPool {
    fn acquire(&mut self, item: &ItemSpec, id: PlacementId) -> Result<PoolHandle, PoolError>;
    /// Return a handle to the pool. `placement` is the final object state
    /// when known, `None` when a pipeline rolled back before recording.
    fn release(&mut self, handle: PoolHandle, placement: Option<&PlacedObject>);
}

/// Fire-and-forget analytics sink; failures are the sink's problem.
pub trait AnalyticsSink {
    fn track_placement(&mut self, requester: &OwnerRef, item: &ItemSpec, position: Vec3);
}

/// Operations hooks used by emergency escalation and shutdown.
pub trait OpsChannel {
    fn notify_operators(&mut self, message: &str);
    /// Load-shedding hook on the external optimization collaborator.
    fn shed_load(&mut self);
    fn broadcast(&mut self, message: &str);
    fn disconnect_all(&mut self);
}

/// The full collaborator set injected into the supervisor.
pub struct Collaborators {
    pub security: Box<dyn SecurityValidator>,
    pub moderation: Box<dyn ModerationGate>,
    pub pool: Box<dyn ObjectPool>,
    pub analytics: Box<dyn AnalyticsSink>,
    pub payouts: Box<dyn PayoutGateway>,
    pub ops: Box<dyn OpsChannel>,
}
