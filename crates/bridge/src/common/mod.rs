//! Common types shared across the bridge.
//!
//! This module provides:
//! 1. **Time:** The `Tick` unit and millisecond conversion.
//! 2. **Constants:** Protocol and memory-map constants.
//! 3. **Errors:** The session-level `BridgeError` and the `Phase` it failed in.

/// Protocol and memory-map constants.
pub mod constants;

/// Session-level error type.
pub mod error;

/// Simulator time unit.
pub mod tick;

pub use error::{BridgeError, Phase};
pub use tick::{Tick, ms_to_ticks};
