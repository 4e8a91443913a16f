//! Weapon Catalog
//!
//! Immutable rule table: weapon id → move radius, attack power, hit points
//! and attack sector. Loaded once at startup, then shared read-only
//! (`Arc<WeaponCatalog>`) by every match.
//!
//! Radii are stored in base units; multiply by the configured base number
//! to get world distances.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::vec2::Vec2;
use crate::game::geometry::{sector_intersects_rect, Quad};

/// Weapon identifier (the server's `weaponType`).
pub type WeaponId = u32;

/// Weapon family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponKind {
    /// Broad sword, wide short arc
    Blade,
    /// Sword, narrower arc
    Sword,
    /// Spear, ring at medium range
    Spear,
    /// Knife, short and fast
    Knife,
    /// Bow, ring at long range
    Bow,
    /// Any kind this client does not know by name
    #[serde(other)]
    Other,
}

/// Attack reach of a weapon in its local frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttackSector {
    /// Inner radius (0 = full disc sector)
    pub inner_radius: f64,
    /// Outer radius
    pub outer_radius: f64,
    /// Start angle, degrees (0° = unrotated facing)
    pub start_angle_deg: f64,
    /// End angle, degrees
    pub end_angle_deg: f64,
}

impl AttackSector {
    /// Angular width in degrees.
    #[inline]
    pub fn span(&self) -> f64 {
        self.end_angle_deg - self.start_angle_deg
    }

    /// `start < end`, span below a full turn, radii ordered and non-negative.
    pub fn is_valid(&self) -> bool {
        self.start_angle_deg < self.end_angle_deg
            && self.span() < 360.0
            && self.inner_radius >= 0.0
            && self.inner_radius <= self.outer_radius
    }

    /// Same sector with radii multiplied by `base` (base units → world).
    pub fn scaled(&self, base: f64) -> Self {
        Self {
            inner_radius: self.inner_radius * base,
            outer_radius: self.outer_radius * base,
            ..*self
        }
    }

    /// Does this sector, placed at `center` and rotated by `facing_deg`,
    /// overlap `rect`? Facing is subtracted from the local angles.
    pub fn hits(&self, center: Vec2, facing_deg: f64, rect: &Quad) -> bool {
        sector_intersects_rect(
            center,
            self.inner_radius,
            self.outer_radius,
            self.start_angle_deg - facing_deg,
            self.end_angle_deg - facing_deg,
            rect,
        )
    }
}

/// Rules for one weapon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeaponParameters {
    /// Weapon identifier
    pub id: WeaponId,
    /// Weapon family
    pub kind: WeaponKind,
    /// Move radius in base units
    pub move_radius: f64,
    /// Damage dealt per hit
    pub attack_power: f64,
    /// Starting (and maximum) hit points
    pub hit_points: f64,
    /// Attack reach in base units
    pub sector: AttackSector,
}

/// One row of the weapon config file, using the file's field names.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeaponRow {
    id: WeaponId,
    #[serde(rename = "type")]
    kind: WeaponKind,
    move_range: f64,
    attack: f64,
    inner_radius: f64,
    outer_radius: f64,
    start_angle: f64,
    end_angle: f64,
    hp: f64,
}

impl From<WeaponRow> for WeaponParameters {
    fn from(row: WeaponRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            move_radius: row.move_range,
            attack_power: row.attack,
            hit_points: row.hp,
            sector: AttackSector {
                inner_radius: row.inner_radius,
                outer_radius: row.outer_radius,
                start_angle_deg: row.start_angle,
                end_angle_deg: row.end_angle,
            },
        }
    }
}

/// Catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The top-level value is not an array of rows.
    #[error("Malformed weapon table: expected an array of rows, got {0}")]
    NotASequence(&'static str),

    /// The config file could not be read.
    #[error("Failed to read weapon table {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// The config file is not valid JSON.
    #[error("Weapon table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Lookup before any table was loaded.
    #[error("Weapon table not loaded")]
    NotLoaded,

    /// Unknown weapon id.
    #[error("Weapon {0} not found")]
    NotFound(WeaponId),
}

/// Immutable weapon lookup table.
#[derive(Clone, Debug, Default)]
pub struct WeaponCatalog {
    weapons: BTreeMap<WeaponId, WeaponParameters>,
    loaded: bool,
}

impl WeaponCatalog {
    /// Create an empty, unloaded catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from parsed rows.
    pub fn from_rows(rows: &Value) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        catalog.load(rows)?;
        Ok(catalog)
    }

    /// Build a catalog from a JSON file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rows: Value = serde_json::from_str(&text)?;
        Self::from_rows(&rows)
    }

    /// Replace the table with `rows`.
    ///
    /// Fails only when `rows` is not an array. Rows with missing or
    /// mistyped fields, or an invalid sector, are skipped with a warning.
    /// Returns the number of weapons loaded.
    pub fn load(&mut self, rows: &Value) -> Result<usize, CatalogError> {
        let rows = rows.as_array().ok_or(CatalogError::NotASequence(json_kind(rows)))?;

        let mut weapons = BTreeMap::new();
        for (index, row) in rows.iter().enumerate() {
            let row: WeaponRow = match serde_json::from_value(row.clone()) {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping weapon row {}: {}", index, e);
                    continue;
                }
            };

            let weapon = WeaponParameters::from(row);
            if !weapon.sector.is_valid() {
                warn!("Skipping weapon {}: invalid sector {:?}", weapon.id, weapon.sector);
                continue;
            }
            if weapons.insert(weapon.id, weapon).is_some() {
                warn!("Duplicate weapon id at row {}, keeping the later row", index);
            }
        }

        info!("Weapon table loaded: {} of {} rows", weapons.len(), rows.len());
        self.weapons = weapons;
        self.loaded = true;
        Ok(self.weapons.len())
    }

    /// Look up a weapon.
    pub fn get_by_id(&self, id: WeaponId) -> Result<&WeaponParameters, CatalogError> {
        if !self.loaded {
            return Err(CatalogError::NotLoaded);
        }
        self.weapons.get(&id).ok_or(CatalogError::NotFound(id))
    }

    /// Whether `load` has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Number of weapons.
    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    /// True if no weapons are loaded.
    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }

    /// All weapons, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &WeaponParameters> {
        self.weapons.values()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Standard five-weapon table, for tests across the crate.
#[cfg(test)]
pub(crate) fn test_catalog() -> WeaponCatalog {
    let rows = serde_json::json!([
        { "id": 0, "type": "blade", "moveRange": 3, "attack": 1,   "innerRadius": 0, "outerRadius": 1.5, "startAngle": 0, "endAngle": 90, "hp": 5 },
        { "id": 1, "type": "sword", "moveRange": 3, "attack": 1.5, "innerRadius": 0, "outerRadius": 1.5, "startAngle": 0, "endAngle": 60, "hp": 5 },
        { "id": 2, "type": "spear", "moveRange": 2, "attack": 1,   "innerRadius": 4, "outerRadius": 5,   "startAngle": 0, "endAngle": 45, "hp": 5 },
        { "id": 3, "type": "knife", "moveRange": 4, "attack": 2,   "innerRadius": 0, "outerRadius": 1,   "startAngle": 0, "endAngle": 90, "hp": 5 },
        { "id": 4, "type": "bow",   "moveRange": 4, "attack": 1,   "innerRadius": 3, "outerRadius": 7,   "startAngle": 0, "endAngle": 45, "hp": 5 }
    ]);
    WeaponCatalog::from_rows(&rows).expect("test rows are well-formed")
}
