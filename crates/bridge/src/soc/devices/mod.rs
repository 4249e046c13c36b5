//! Memory-Mapped IO Devices.
//!
//! This module contains the devices the firmware reaches over the bus: the
//! interrupt-driven bridge IO peripheral that carries compute requests and
//! the system controller used to end the simulation.

/// Interrupt-driven bridge IO peripheral.
pub mod bridge_io;

/// System Controller (power-off and failure reporting).
pub mod syscon;

pub use bridge_io::{BridgeIo, DeviceError, DeviceState};
pub use syscon::{ExitRequest, SysCon};

pub use crate::soc::traits::Device;
