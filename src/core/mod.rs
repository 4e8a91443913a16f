//! Core primitives.
//!
//! Float vectors for geometry and the fixed-point scale used on the wire.

pub mod fixed;
pub mod vec2;

// Re-export core types
pub use fixed::{WireInt, WireScale, DEFAULT_WIRE_SCALE};
pub use vec2::Vec2;
