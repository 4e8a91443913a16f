//! Wire Fixed-Point Scaling
//!
//! Positions, facing angles and hit points cross the wire as integers:
//! the float value multiplied by a configured scale factor and floored.
//! The receiver divides by the same factor to recover the float.
//!
//! ## Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  encode:  wire = floor(value * scale)      (i64)            │
//! │  decode:  value = wire / scale             (f64)            │
//! │                                                             │
//! │  scale = 1000  →  precision 0.001 units                     │
//! │  loss per round-trip is in [0, 1/scale)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Encoding floors, as the server does.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Integer representation of a scaled float on the wire.
pub type WireInt = i64;

/// Scale factor used when none is configured.
pub const DEFAULT_WIRE_SCALE: u32 = 1000;

/// Float-to-integer scale factor shared by both ends of the connection.
///
/// Deserializing rejects zero; [`WireScale::new`] clamps it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct WireScale(u32);

/// A zero scale factor was supplied where one must be given explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("wire scale factor must be positive")]
pub struct ZeroWireScale;

impl WireScale {
    /// Create a scale factor. Zero is treated as one so decoding never divides by zero.
    pub const fn new(factor: u32) -> Self {
        if factor == 0 {
            Self(1)
        } else {
            Self(factor)
        }
    }

    /// Raw multiplier.
    #[inline]
    pub const fn factor(self) -> u32 {
        self.0
    }

    /// Smallest representable step after decoding.
    #[inline]
    pub fn precision(self) -> f64 {
        1.0 / self.0 as f64
    }

    /// Float → wire integer (floor).
    #[inline]
    pub fn encode(self, value: f64) -> WireInt {
        (value * self.0 as f64).floor() as WireInt
    }

    /// Wire integer → float.
    #[inline]
    pub fn decode(self, wire: WireInt) -> f64 {
        wire as f64 / self.0 as f64
    }
}

impl Default for WireScale {
    fn default() -> Self {
        Self::new(DEFAULT_WIRE_SCALE)
    }
}

impl TryFrom<u32> for WireScale {
    type Error = ZeroWireScale;

    fn try_from(factor: u32) -> Result<Self, Self::Error> {
        if factor == 0 {
            Err(ZeroWireScale)
        } else {
            Ok(Self(factor))
        }
    }
}

impl From<WireScale> for u32 {
    fn from(scale: WireScale) -> Self {
        scale.0
    }
}

impl fmt::Debug for WireScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireScale(x{})", self.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_floors() {
        let scale = WireScale::new(1000);
        assert_eq!(scale.encode(1.0), 1000);
        assert_eq!(scale.encode(0.0009), 0);
        // Floor goes toward negative infinity, not toward zero
        assert_eq!(scale.encode(-0.0005), -1);
        assert_eq!(scale.encode(-2.5), -2500);
    }

    #[test]
    fn test_decode() {
        let scale = WireScale::new(1000);
        assert_eq!(scale.decode(1500), 1.5);
        assert_eq!(scale.decode(-6700), -6.7);
    }

    #[test]
    fn test_roundtrip_loss_is_bounded() {
        let scale = WireScale::new(1000);
        for value in [12.345, -6.7, 271.2, 0.0, -0.0001, 359.9999] {
            let decoded = scale.decode(scale.encode(value));
            let loss = value - decoded;
            // Floor never overshoots, and never loses a full step
            assert!(loss >= -1e-9, "decoded {} above original {}", decoded, value);
            assert!(loss <= scale.precision() + 1e-9, "loss {} too large for {}", loss, value);
        }
    }

    #[test]
    fn test_zero_factor_is_clamped() {
        let scale = WireScale::new(0);
        assert_eq!(scale.factor(), 1);
        assert_eq!(scale.decode(7), 7.0);
    }

    #[test]
    fn test_serde_as_plain_integer() {
        let json = serde_json::to_string(&WireScale::new(100)).unwrap();
        assert_eq!(json, "100");
        let parsed: WireScale = serde_json::from_str("250").unwrap();
        assert_eq!(parsed.factor(), 250);
        assert!(serde_json::from_str::<WireScale>("0").is_err());
        assert_eq!(WireScale::try_from(0), Err(ZeroWireScale));
    }
}
