//! Battle State Definitions
//!
//! Round phases as the server numbers them, and the seconds countdown
//! shown during the command and action windows.

use std::fmt;

use serde::{Serialize, Deserialize};

// =============================================================================
// BATTLE PHASE
// =============================================================================

/// Round phase. Wire values are the server's `battleState`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum BattlePhase {
    /// Match created, roles not yet assigned
    #[default]
    Prepare = 0,
    /// Players choose a destination and facing
    WaitCommand = 1,
    /// Commands submitted, actions playing out
    Action = 2,
    /// Waiting for the opponent or the round result
    WaitAction = 3,
    /// Match over
    End = 4,
}

impl BattlePhase {
    /// Wire value.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Is this the terminal phase?
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == BattlePhase::End
    }
}

/// Unknown `battleState` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown battle phase: {0}")]
pub struct UnknownPhase(pub u8);

impl TryFrom<u8> for BattlePhase {
    type Error = UnknownPhase;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BattlePhase::Prepare),
            1 => Ok(BattlePhase::WaitCommand),
            2 => Ok(BattlePhase::Action),
            3 => Ok(BattlePhase::WaitAction),
            4 => Ok(BattlePhase::End),
            other => Err(UnknownPhase(other)),
        }
    }
}

impl From<BattlePhase> for u8 {
    fn from(phase: BattlePhase) -> u8 {
        phase.as_u8()
    }
}

impl fmt::Display for BattlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BattlePhase::Prepare => "PREPARE",
            BattlePhase::WaitCommand => "WAIT_COMMAND",
            BattlePhase::Action => "ACTION",
            BattlePhase::WaitAction => "WAIT_ACTION",
            BattlePhase::End => "END",
        };
        f.write_str(name)
    }
}

// =============================================================================
// COUNTDOWN
// =============================================================================

/// Tolerance for whole-second detection in the accumulator.
const SECOND_EPSILON: f64 = 1e-9;

/// Whole-second countdown driven by frame deltas.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Countdown {
    remaining: u32,
    accumulator: f64,
}

impl Countdown {
    /// Start at `seconds` with an empty accumulator.
    pub fn new(seconds: u32) -> Self {
        Self { remaining: seconds, accumulator: 0.0 }
    }

    /// Restart at `seconds`.
    pub fn reset(&mut self, seconds: u32) {
        *self = Self::new(seconds);
    }

    /// Seconds left.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Has the countdown reached zero?
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    /// Add `dt` seconds. Each whole second accumulated takes one off the
    /// countdown, never below zero. Returns the number of seconds consumed.
    pub fn advance(&mut self, dt: f64) -> u32 {
        if dt.is_nan() || dt <= 0.0 {
            return 0;
        }

        self.accumulator += dt;
        let mut consumed = 0;
        while self.accumulator + SECOND_EPSILON >= 1.0 {
            self.accumulator -= 1.0;
            self.remaining = self.remaining.saturating_sub(1);
            consumed += 1;
        }
        self.accumulator = self.accumulator.max(0.0);
        consumed
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_wire_values() {
        assert_eq!(BattlePhase::Prepare.as_u8(), 0);
        assert_eq!(BattlePhase::End.as_u8(), 4);
        assert_eq!(BattlePhase::try_from(3), Ok(BattlePhase::WaitAction));
        assert_eq!(BattlePhase::try_from(5), Err(UnknownPhase(5)));
    }

    #[test]
    fn test_phase_serde_as_integer() {
        let json = serde_json::to_string(&BattlePhase::Action).unwrap();
        assert_eq!(json, "2");
        let phase: BattlePhase = serde_json::from_str("1").unwrap();
        assert_eq!(phase, BattlePhase::WaitCommand);
        assert!(serde_json::from_str::<BattlePhase>("9").is_err());
    }

    #[test]
    fn test_countdown_uneven_frames() {
        let mut countdown = Countdown::new(10);
        for dt in [0.25, 0.5, 0.75, 0.125, 0.375, 0.5, 0.5] {
            countdown.advance(dt);
        }
        assert_eq!(countdown.remaining(), 7);
    }

    #[test]
    fn test_countdown_never_negative() {
        let mut countdown = Countdown::new(2);
        assert_eq!(countdown.advance(5.0), 5);
        assert_eq!(countdown.remaining(), 0);
        assert!(countdown.is_expired());
    }

    #[test]
    fn test_countdown_ignores_bad_deltas() {
        let mut countdown = Countdown::new(3);
        assert_eq!(countdown.advance(-1.0), 0);
        assert_eq!(countdown.advance(f64::NAN), 0);
        assert_eq!(countdown.remaining(), 3);
    }

    #[test]
    fn test_countdown_reset_clears_accumulator() {
        let mut countdown = Countdown::new(5);
        countdown.advance(0.9);
        countdown.reset(5);
        countdown.advance(0.2);
        assert_eq!(countdown.remaining(), 5);
    }
}
