//! Board construction.
//!
//! This module assembles the MCU board the firmware runs against. It performs:
//! 1. **Bus setup:** Creates the interconnect and registers the SysCon on it.
//! 2. **Bridge placement:** Keeps the bridge IO peripheral typed so the scheduler can drive its state machine.
//! 3. **MMIO routing:** Sends firmware accesses to the bridge or the bus by address.

use crate::config::DeviceConfig;
use crate::soc::devices::{BridgeIo, Device, ExitRequest, SysCon};
use crate::soc::interconnect::Bus;

/// Simulated board: bus, bridge IO peripheral and exit flag.
#[derive(Debug)]
pub struct Board {
    /// Interconnect for the remaining MMIO devices.
    pub bus: Bus,
    bridge: BridgeIo,
    exit_request: ExitRequest,
}

impl Board {
    /// Builds a board from the device configuration.
    pub fn new(config: &DeviceConfig) -> Self {
        let exit_request = ExitRequest::new();
        let mut bus = Bus::new();
        bus.add_device(Box::new(SysCon::new(
            config.syscon_base,
            exit_request.clone(),
        )));

        Self {
            bus,
            bridge: BridgeIo::from_config(config),
            exit_request,
        }
    }

    /// Returns the bridge IO peripheral.
    pub const fn bridge_io(&self) -> &BridgeIo {
        &self.bridge
    }

    /// Returns the bridge IO peripheral for host-side control.
    pub const fn bridge_io_mut(&mut self) -> &mut BridgeIo {
        &mut self.bridge
    }

    /// Returns the exit flag shared with the SysCon.
    pub const fn exit_request(&self) -> &ExitRequest {
        &self.exit_request
    }

    /// Returns the exit code requested by the firmware, if any.
    pub fn check_exit(&self) -> Option<u32> {
        self.exit_request.pending()
    }

    /// Returns the bitmask of asserted interrupt lines.
    pub fn irq_lines(&self) -> u64 {
        let mut mask = self.bus.irq_lines();
        if self.bridge.irq_asserted() {
            if let Some(id) = self.bridge.get_irq_id().filter(|id| *id < 64) {
                mask |= 1 << id;
            }
        }
        mask
    }

    /// Reads one byte at a physical address.
    pub fn read_u8(&mut self, paddr: u64) -> u8 {
        if self.bridge.contains(paddr) {
            let base = self.bridge.base_addr();
            self.bridge.read_u8(paddr - base)
        } else {
            self.bus.read_u8(paddr)
        }
    }

    /// Reads a little-endian word at a physical address.
    pub fn read_u32(&mut self, paddr: u64) -> u32 {
        if self.bridge.contains(paddr) {
            let base = self.bridge.base_addr();
            self.bridge.read_u32(paddr - base)
        } else {
            self.bus.read_u32(paddr)
        }
    }

    /// Writes one byte at a physical address.
    pub fn write_u8(&mut self, paddr: u64, val: u8) {
        if self.bridge.contains(paddr) {
            let base = self.bridge.base_addr();
            self.bridge.write_u8(paddr - base, val);
        } else {
            self.bus.write_u8(paddr, val);
        }
    }

    /// Writes a little-endian word at a physical address.
    pub fn write_u32(&mut self, paddr: u64, val: u32) {
        if self.bridge.contains(paddr) {
            let base = self.bridge.base_addr();
            self.bridge.write_u32(paddr - base, val);
        } else {
            self.bus.write_u32(paddr, val);
        }
    }

    /// Reads `buf.len()` bytes starting at `paddr`.
    pub fn read_bytes(&mut self, paddr: u64, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_u8(paddr + i as u64);
        }
    }

    /// Writes `data` starting at `paddr`.
    pub fn write_bytes(&mut self, paddr: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.write_u8(paddr + i as u64, *byte);
        }
    }
}
