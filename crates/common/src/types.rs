use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a placed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacementId(pub Uuid);

impl PlacementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlacementId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable identifier of a player account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct OwnerId(pub u64);

/// A player reference as carried on placements: id plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: OwnerId,
    pub name: String,
}

impl OwnerRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: OwnerId(id),
            name: name.into(),
        }
    }
}

/// Catalog tier of an item, driving its compensation multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemTier {
    Basic,
    Level1,
    Level2,
    Rare,
    Exclusive,
}

impl ItemTier {
    /// Compensation multiplier applied to an item's base value.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Basic => 1.0,
            Self::Level1 => 1.1,
            Self::Level2 => 1.2,
            Self::Rare => 1.5,
            Self::Exclusive => 2.0,
        }
    }
}

/// Catalog entry describing a placeable item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub item_id: String,
    pub display_name: String,
    pub tier: ItemTier,
    /// Currency value used as the compensation base.
    pub base_value: u64,
}

impl ItemSpec {
    pub fn new(item_id: impl Into<String>, tier: ItemTier, base_value: u64) -> Self {
        let item_id = item_id.into();
        Self {
            display_name: item_id.clone(),
            item_id,
            tier,
            base_value,
        }
    }
}

/// Spatial transform of a placement: position and rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Axis-aligned box used for protected zones and region queries.
///
/// Containment is inclusive on every axis, so objects sitting exactly on a
/// boundary plane count as inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl ZoneBounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Whether two boxes overlap (inclusive).
    pub fn intersects(&self, other: &ZoneBounds) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Grow the box by `margin` units on every side.
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_id_uniqueness() {
        let a = PlacementId::new();
        let b = PlacementId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn tier_multipliers() {
        assert_eq!(ItemTier::Basic.multiplier(), 1.0);
        assert_eq!(ItemTier::Level1.multiplier(), 1.1);
        assert_eq!(ItemTier::Level2.multiplier(), 1.2);
        assert_eq!(ItemTier::Rare.multiplier(), 1.5);
        assert_eq!(ItemTier::Exclusive.multiplier(), 2.0);
    }

    #[test]
    fn bounds_containment_is_inclusive() {
        let b = ZoneBounds::new(Vec3::ZERO, Vec3::new(10.0, 10.0, 10.0));
        assert!(b.contains(Vec3::ZERO));
        assert!(b.contains(Vec3::new(10.0, 10.0, 10.0)));
        assert!(b.contains(Vec3::new(5.0, 0.0, 10.0)));
        assert!(!b.contains(Vec3::new(10.1, 0.0, 0.0)));
        assert!(!b.contains(Vec3::new(-0.1, 0.0, 0.0)));
    }

    #[test]
    fn bounds_normalize_swapped_corners() {
        let b = ZoneBounds::new(Vec3::new(10.0, 0.0, 10.0), Vec3::new(-10.0, 5.0, -10.0));
        assert!(b.contains(Vec3::ZERO));
        assert_eq!(b.min, Vec3::new(-10.0, 0.0, -10.0));
    }

    #[test]
    fn bounds_intersection() {
        let a = ZoneBounds::new(Vec3::ZERO, Vec3::splat(10.0));
        let b = ZoneBounds::new(Vec3::splat(10.0), Vec3::splat(20.0));
        let c = ZoneBounds::new(Vec3::splat(10.5), Vec3::splat(20.0));
        assert!(a.intersects(&b)); // touching counts
        assert!(!a.intersects(&c));
    }

    #[test]
    fn bounds_expanded() {
        let b = ZoneBounds::new(Vec3::ZERO, Vec3::splat(10.0)).expanded(5.0);
        assert!(b.contains(Vec3::new(-5.0, -5.0, -5.0)));
        assert!(b.contains(Vec3::splat(15.0)));
        assert!(!b.contains(Vec3::splat(15.1)));
    }
}
