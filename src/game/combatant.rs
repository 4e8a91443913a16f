//! Combatant
//!
//! One side of a duel: identity, weapon, position, facing and hit points.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::geometry::{classify_direction, normalize_degrees, Direction};
use crate::game::weapon::{WeaponId, WeaponParameters};

/// Role identifier assigned by the server for one match.
pub type RoleId = i64;

/// Combatant errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CombatantError {
    /// Damage must be non-negative.
    #[error("Negative damage: {0}")]
    NegativeDamage(f64),
}

/// State of a single combatant in the match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Combatant {
    /// Server-assigned role id
    pub id: RoleId,

    /// Name shown above the body
    pub display_name: String,

    /// Equipped weapon
    pub weapon_id: WeaponId,

    /// Current position in world units
    pub position: Vec2,

    /// Facing angle, degrees in `[0, 360)`
    pub facing_deg: f64,

    hit_points: f64,
    max_hit_points: f64,
    alive: bool,
}

impl Combatant {
    /// Create a combatant at full health.
    pub fn new(id: RoleId, display_name: impl Into<String>, weapon: &WeaponParameters, position: Vec2) -> Self {
        let max = weapon.hit_points.max(0.0);
        Self {
            id,
            display_name: display_name.into(),
            weapon_id: weapon.id,
            position,
            facing_deg: 0.0,
            hit_points: max,
            max_hit_points: max,
            alive: max > 0.0,
        }
    }

    /// Current hit points.
    #[inline]
    pub fn hit_points(&self) -> f64 {
        self.hit_points
    }

    /// Maximum hit points (the weapon's hit points).
    #[inline]
    pub fn max_hit_points(&self) -> f64 {
        self.max_hit_points
    }

    /// Is the combatant still standing?
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Apply damage, clamping at zero. Returns the new hit points.
    pub fn apply_damage(&mut self, amount: f64) -> Result<f64, CombatantError> {
        if amount < 0.0 || amount.is_nan() {
            return Err(CombatantError::NegativeDamage(amount));
        }
        self.set_hit_points(self.hit_points - amount);
        Ok(self.hit_points)
    }

    /// Move to a new position.
    pub fn move_to(&mut self, point: Vec2) {
        self.position = point;
    }

    /// Face a new direction.
    pub fn set_facing(&mut self, angle_deg: f64) {
        self.facing_deg = normalize_degrees(angle_deg);
    }

    /// Facing octant.
    pub fn direction(&self) -> Direction {
        classify_direction(self.facing_deg)
    }

    /// Apply an authoritative snapshot from the server.
    ///
    /// Returns the previous hit points when they changed.
    pub fn sync_from_wire(&mut self, position: Vec2, facing_deg: f64, hit_points: f64) -> Option<f64> {
        self.move_to(position);
        self.set_facing(facing_deg);

        let old = self.hit_points;
        self.set_hit_points(hit_points);
        (self.hit_points != old).then_some(old)
    }

    fn set_hit_points(&mut self, value: f64) {
        self.hit_points = value.clamp(0.0, self.max_hit_points);
        self.alive = self.hit_points > 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::weapon::test_catalog;

    fn knife_fighter() -> Combatant {
        let catalog = test_catalog();
        Combatant::new(7, "kai", catalog.get_by_id(3).unwrap(), Vec2::ZERO)
    }

    #[test]
    fn test_new_at_full_health() {
        let c = knife_fighter();
        assert_eq!(c.hit_points(), 5.0);
        assert_eq!(c.max_hit_points(), 5.0);
        assert!(c.is_alive());
        assert_eq!(c.weapon_id, 3);
    }

    #[test]
    fn test_overkill_clamps_to_zero() {
        let mut c = knife_fighter();
        c.apply_damage(4.0).unwrap();
        assert_eq!(c.hit_points(), 1.0);

        let hp = c.apply_damage(2.0).unwrap();
        assert_eq!(hp, 0.0);
        assert_eq!(c.hit_points(), 0.0);
        assert!(!c.is_alive());
    }

    #[test]
    fn test_negative_damage_rejected() {
        let mut c = knife_fighter();
        assert_eq!(c.apply_damage(-1.0), Err(CombatantError::NegativeDamage(-1.0)));
        assert_eq!(c.hit_points(), 5.0);
    }

    #[test]
    fn test_zero_damage_is_noop() {
        let mut c = knife_fighter();
        assert_eq!(c.apply_damage(0.0), Ok(5.0));
        assert!(c.is_alive());
    }

    #[test]
    fn test_facing_normalized() {
        let mut c = knife_fighter();
        c.set_facing(-90.0);
        assert_eq!(c.facing_deg, 270.0);
        assert_eq!(c.direction(), Direction::Down);
    }

    #[test]
    fn test_sync_from_wire() {
        let mut c = knife_fighter();
        assert_eq!(c.sync_from_wire(Vec2::new(3.0, 4.0), 45.0, 3.5), Some(5.0));
        assert_eq!(c.position, Vec2::new(3.0, 4.0));
        assert_eq!(c.hit_points(), 3.5);

        // Same hp: no change reported
        assert_eq!(c.sync_from_wire(Vec2::new(3.0, 4.0), 45.0, 3.5), None);

        // Server values are clamped to the invariant range
        assert_eq!(c.sync_from_wire(Vec2::ZERO, 0.0, 99.0), Some(3.5));
        assert_eq!(c.hit_points(), 5.0);
        c.sync_from_wire(Vec2::ZERO, 0.0, -3.0);
        assert_eq!(c.hit_points(), 0.0);
        assert!(!c.is_alive());
    }
}
