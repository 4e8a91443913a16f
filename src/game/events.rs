//! Turn Events
//!
//! What a turn-machine call produced: notifications for the host and the
//! messages to send to the server.

use serde::{Serialize, Deserialize};

use crate::game::combatant::RoleId;
use crate::game::state::BattlePhase;
use crate::network::protocol::ClientMessage;

/// Notification for the host (UI, logs, the auto-player).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TurnEvent {
    /// Phase transition
    PhaseChanged {
        /// Phase left
        from: BattlePhase,
        /// Phase entered
        to: BattlePhase,
    },

    /// A combatant's hit points changed
    HitPointsChanged {
        /// Combatant
        role: RoleId,
        /// Hit points before
        old: f64,
        /// Hit points after
        new: f64,
    },

    /// Displayed countdown changed
    CountdownChanged(u32),

    /// Match reached its terminal phase
    MatchEnded {
        /// `None` for a draw or an unknown winner
        winner: Option<RoleId>,
    },

    /// User-visible round-level problem
    Notice(String),
}

/// Result of one turn-machine call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnUpdate {
    /// Events generated by this call, in order
    pub events: Vec<TurnEvent>,
    /// Messages to send to the server, in order
    pub outbound: Vec<ClientMessage>,
}

impl TurnUpdate {
    /// Nothing happened.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.outbound.is_empty()
    }

    /// Append another update.
    pub fn merge(&mut self, other: TurnUpdate) {
        self.events.extend(other.events);
        self.outbound.extend(other.outbound);
    }

    /// Did the match end during this call?
    pub fn match_ended(&self) -> bool {
        self.events.iter().any(|e| matches!(e, TurnEvent::MatchEnded { .. }))
    }

    pub(crate) fn push(&mut self, event: TurnEvent) {
        self.events.push(event);
    }

    pub(crate) fn send(&mut self, message: ClientMessage) {
        self.outbound.push(message);
    }
}
