//! Network Layer
//!
//! WebSocket client for the duel server. Everything here runs on the
//! control loop except the transport task, which only forwards frames.

pub mod protocol;
pub mod bus;
pub mod transport;
pub mod session;
pub mod client;

pub use protocol::{ClientMessage, ServerMessage, MessageCode, ProtocolError, RoleMessage};
pub use bus::{BusEvent, BusTopic, EventBus, ListenerId, OwnerId};
pub use transport::{Transport, TransportError, TransportEvent, WsTransport};
pub use session::{NetSession, RequestSlots, SessionConfig, SessionError, SessionState};
pub use client::{ClientError, DuelClient};
