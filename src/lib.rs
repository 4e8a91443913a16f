//! # Duel Client
//!
//! Combat core and network client for a turn-based, two-player sector duel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       DUEL CLIENT                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── fixed.rs    - Wire scale for float <-> integer fields   │
//! │  └── vec2.rs     - 2D float vector                           │
//! │                                                              │
//! │  game/           - Combat rules (no I/O)                     │
//! │  ├── weapon.rs   - Weapon table and attack sectors           │
//! │  ├── geometry.rs - Sector/rectangle hit tests                │
//! │  ├── combatant.rs- One side of the duel                      │
//! │  ├── state.rs    - Round phases and countdown                │
//! │  ├── turn.rs     - Turn state machine                        │
//! │  └── events.rs   - Events and outbound requests              │
//! │                                                              │
//! │  network/        - Connection to the duel server             │
//! │  ├── protocol.rs - JSON messages keyed by integer id         │
//! │  ├── bus.rs      - Topic listeners with owner cleanup        │
//! │  ├── transport.rs- WebSocket task                            │
//! │  ├── session.rs  - Connect/reconnect and request slots       │
//! │  └── client.rs   - Session + bus + active match              │
//! │                                                              │
//! │  config.rs       - JSON tables and environment settings      │
//! │  autoplay.rs     - Command choice for the headless client    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounds
//!
//! Each round is PREPARE → WAIT_COMMAND → WAIT_ACTION, then either back to
//! WAIT_COMMAND or END. The server owns the outcome by default; its
//! broadcasts overwrite local state. [`game::ResolutionMode::Local`] resolves
//! rounds with the local hit test instead.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod autoplay;
pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, GameConfig, ServerEndpoint, ServerRegistry, Settings};
pub use core::fixed::{WireInt, WireScale, DEFAULT_WIRE_SCALE};
pub use core::vec2::Vec2;
pub use game::{BattlePhase, Combatant, RoleId, TurnEvent, TurnStateMachine, WeaponCatalog};
pub use network::{DuelClient, NetSession, WsTransport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
