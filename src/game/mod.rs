//! Game Logic Module
//!
//! Combat rules for one duel, independent of the network.
//!
//! ## Module Structure
//!
//! - `weapon`: Weapon rule table
//! - `geometry`: Sector/rectangle hit tests and direction octants
//! - `combatant`: One side of the duel
//! - `state`: Round phases and the countdown
//! - `turn`: Turn state machine
//! - `events`: What a turn-machine call produced

pub mod weapon;
pub mod geometry;
pub mod combatant;
pub mod state;
pub mod turn;
pub mod events;

// Re-export key types
pub use weapon::{AttackSector, CatalogError, WeaponCatalog, WeaponId, WeaponKind, WeaponParameters};
pub use geometry::{classify_direction, sector_intersects_rect, Direction, Quad};
pub use combatant::{Combatant, CombatantError, RoleId};
pub use state::{BattlePhase, Countdown};
pub use turn::{HitReport, ResolutionMode, TurnError, TurnStateMachine};
pub use events::{TurnEvent, TurnUpdate};
