use glam::Vec3;
use homestead_ledger::{PlacedObject, PlacementLedger};
use serde::{Deserialize, Serialize};

/// Tunables for the expanding radial relocation scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocationConfig {
    pub start_radius: f32,
    pub radius_step: f32,
    pub max_radius: f32,
    pub angle_step_deg: f32,
    /// No other placement may sit within this distance of a candidate.
    pub safety_buffer: f32,
}

impl Default for RelocationConfig {
    fn default() -> Self {
        Self {
            start_radius: 50.0,
            radius_step: 10.0,
            max_radius: 200.0,
            angle_step_deg: 30.0,
            safety_buffer: 5.0,
        }
    }
}

/// Find a clear position for `obj` near its current location.
///
/// Scans candidate positions on expanding rings around the object: radius
/// ascending from `start_radius` in `radius_step` increments up to
/// `max_radius`, angle ascending 0°..360° in `angle_step_deg` steps. The
/// first candidate outside every active zone with no other placement inside
/// the safety buffer wins, which makes the search deterministic for a given
/// ledger state. Returns `None` when the scan is exhausted.
pub fn find_slot(
    ledger: &PlacementLedger,
    obj: &PlacedObject,
    config: &RelocationConfig,
) -> Option<Vec3> {
    let origin = obj.transform.position;
    let mut radius = config.start_radius;
    while radius <= config.max_radius {
        let mut angle = 0.0f32;
        while angle < 360.0 {
            let rad = angle.to_radians();
            let candidate = origin + Vec3::new(radius * rad.cos(), 0.0, radius * rad.sin());
            if is_clear(ledger, obj, candidate, config.safety_buffer) {
                return Some(candidate);
            }
            angle += config.angle_step_deg;
        }
        radius += config.radius_step;
    }
    None
}

fn is_clear(ledger: &PlacementLedger, obj: &PlacedObject, candidate: Vec3, buffer: f32) -> bool {
    if ledger.is_in_protected_zone(candidate).is_some() {
        return false;
    }
    let half = Vec3::splat(buffer);
    ledger
        .query_region(candidate - half, candidate + half)
        .iter()
        .all(|other| other.id == obj.id)
}
