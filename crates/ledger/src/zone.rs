use glam::Vec3;
use homestead_common::ZoneBounds;
use serde::{Deserialize, Serialize};

/// A region temporarily reserved for planned development.
///
/// Zones are created by an external planning action and activated when work
/// begins; placements conflicting with an active zone are resolved by the
/// conflict resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedZone {
    pub name: String,
    pub bounds: ZoneBounds,
    pub active: bool,
    pub planned_feature: String,
}

impl ProtectedZone {
    pub fn new(
        name: impl Into<String>,
        bounds: ZoneBounds,
        planned_feature: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            bounds,
            active: false,
            planned_feature: planned_feature.into(),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.bounds.contains(p)
    }
}
