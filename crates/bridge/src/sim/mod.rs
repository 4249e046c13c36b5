//! Hardware simulator interface and reference implementation.
//!
//! This module defines what the scheduler needs from a hardware simulator and provides one that
//! runs without an external cycle-accurate model. It contains:
//! 1. **Interface:** The `HardwareSimulator` trait and the exhaustive `ExitCause` of an advance.
//! 2. **Reference simulator:** `FirmwareSimulator`, an event-driven board model that runs a firmware interrupt handler.
//! 3. **Firmware models:** The bump controller and a loopback handler.

use thiserror::Error;

use crate::common::Tick;
use crate::soc::devices::BridgeIo;

/// Firmware models run by the reference simulator.
pub mod firmware;

/// Event-driven reference simulator.
pub mod simulator;

pub use firmware::{BumpController, Firmware, FirmwareFault, Loopback};
pub use simulator::FirmwareSimulator;

/// Why an advance returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitCause {
    /// The tick budget ran out.
    WindowBoundary,
    /// The bridge IO device signaled done before (or exactly at) the end of the budget.
    DeviceDone,
    /// The firmware ended the simulation.
    Terminal {
        /// Exit code reported by the firmware.
        code: u32,
    },
}

/// Result of one advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitEvent {
    /// Why the advance stopped.
    pub cause: ExitCause,
    /// Ticks simulated by this advance.
    pub elapsed: Tick,
}

/// Errors raised by a hardware simulator.
#[derive(Debug, Error)]
pub enum SimError {
    /// The firmware could not service the bridge IO interrupt.
    #[error("firmware '{firmware}' faulted at tick {tick}: {reason}")]
    Firmware {
        /// Firmware name.
        firmware: String,
        /// Tick at which the handler ran.
        tick: Tick,
        /// Fault description.
        reason: String,
    },
}

/// A hardware simulator the scheduler can drive in bounded windows.
///
/// Implementations must stop no later than `ticks` after the current tick, and
/// must stop early when the bridge IO device signals done. A done signal at
/// exactly the end of the budget is reported as [`ExitCause::DeviceDone`].
pub trait HardwareSimulator {
    /// Simulates at most `ticks` ticks.
    fn advance(&mut self, ticks: Tick) -> Result<ExitEvent, SimError>;

    /// Returns the current simulated time.
    fn current_tick(&self) -> Tick;

    /// Returns the bridge IO device for host-side control.
    fn bridge_io(&mut self) -> &mut BridgeIo;
}
