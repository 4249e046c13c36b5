//! System-on-Chip (SoC) components.
//!
//! This module organizes the simulated hardware the firmware talks to: the
//! bridge IO peripheral, the system controller, the bus that routes MMIO and
//! the board that wires them together.

/// Board assembly.
pub mod builder;

/// Memory-mapped I/O device implementations.
pub mod devices;

/// System bus interconnect and routing.
pub mod interconnect;

/// Device trait definitions for MMIO access.
pub mod traits;

pub use builder::Board;
