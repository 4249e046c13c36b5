//! Run-ahead co-simulation bridge.
//!
//! This crate keeps a cycle-accurate MCU simulator and an external physics runtime in lockstep.
//! It is organised as follows:
//! 1. **Transport:** Length-prefixed messages over Unix domain sockets.
//! 2. **SoC:** The interrupt-driven `BridgeIo` peripheral, a power-off controller and the bus that routes MMIO.
//! 3. **Simulation:** The `HardwareSimulator` collaborator interface and an event-driven reference simulator running firmware models.
//! 4. **Scheduler:** The run-ahead loop that bounds how far the simulator may run ahead of the external runtime.
//! 5. **Sessions:** Direct server setup and the multiplexer that pairs simulator instances with external clients.
//!
//! The transport relies on `std::os::unix`, so the crate targets Unix hosts only.

/// Common types and constants (ticks, protocol constants, bridge errors).
pub mod common;
/// Bridge configuration (defaults, hierarchical config structures, JSON loading).
pub mod config;
/// Run-ahead scheduler (window bookkeeping, payload diagnostics, exchange loop).
pub mod scheduler;
/// Session establishment (direct listen, multiplexer registration and routing).
pub mod session;
/// Hardware simulator interface, reference simulator and firmware models.
pub mod sim;
/// System-on-chip model (bus, devices, board assembly).
pub mod soc;
/// Bridge run statistics.
pub mod stats;
/// Message transport (wire format, sockets, errors).
pub mod transport;

/// Root configuration type; use `BridgeConfig::default()` or load from JSON.
pub use crate::config::BridgeConfig;
/// Run-ahead scheduler; construct with `Scheduler::new` and drive with `run`.
pub use crate::scheduler::Scheduler;
/// Simulator-side session handle.
pub use crate::session::Session;
/// Reference hardware simulator.
pub use crate::sim::FirmwareSimulator;
/// Collaborator interface the scheduler drives.
pub use crate::sim::HardwareSimulator;
/// Unit of exchange between the bridge and the external runtime.
pub use crate::transport::{Command, Message};
