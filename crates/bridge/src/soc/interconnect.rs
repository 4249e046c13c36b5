//! System interconnect (bus) for MMIO access.
//!
//! This module implements the bus that routes physical address accesses to devices. It provides:
//! 1. **Device registration:** Devices are added by address range and sorted for lookup.
//! 2. **Access routing:** Read/write by address with a last-device hint.
//! 3. **IRQ aggregation:** Asserted device lines are collected into a pending mask.

use super::devices::Device;

/// System bus connecting the firmware's view of memory to devices.
pub struct Bus {
    /// Registered MMIO devices, sorted by base address.
    devices: Vec<Box<dyn Device>>,
    last_device_idx: usize,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.devices.iter().map(|d| (d.name(), d.address_range())))
            .finish()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Creates an empty bus; add devices with `add_device`.
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            last_device_idx: 0,
        }
    }

    /// Registers a device on the bus; devices are sorted by base address for lookup.
    pub fn add_device(&mut self, dev: Box<dyn Device>) {
        self.devices.push(dev);
        self.devices.sort_by_key(|d| d.address_range().0);
        self.last_device_idx = 0;
    }

    /// Returns the number of registered devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Returns whether the given physical address is backed by any device.
    pub fn is_valid_address(&self, paddr: u64) -> bool {
        self.devices.iter().any(|dev| contains(dev.address_range(), paddr))
    }

    /// Returns a bitmask of asserted interrupt lines (IDs below 64).
    pub fn irq_lines(&self) -> u64 {
        self.devices
            .iter()
            .filter(|dev| dev.irq_asserted())
            .filter_map(|dev| dev.get_irq_id())
            .filter(|id| *id < 64)
            .fold(0u64, |mask, id| mask | (1 << id))
    }

    fn find_device(&mut self, paddr: u64) -> Option<(&mut Box<dyn Device>, u64)> {
        if self.last_device_idx < self.devices.len() {
            let (start, size) = self.devices[self.last_device_idx].address_range();
            if contains((start, size), paddr) {
                return Some((&mut self.devices[self.last_device_idx], paddr - start));
            }
        }

        let idx = self
            .devices
            .iter()
            .position(|dev| contains(dev.address_range(), paddr))?;
        self.last_device_idx = idx;
        let start = self.devices[idx].address_range().0;
        Some((&mut self.devices[idx], paddr - start))
    }

    /// Reads one byte at the given physical address; returns 0 if no device claims the address.
    pub fn read_u8(&mut self, paddr: u64) -> u8 {
        self.find_device(paddr)
            .map_or(0, |(dev, offset)| dev.read_u8(offset))
    }
    /// Reads four bytes (little-endian) at the given physical address; returns 0 if unclaimed.
    pub fn read_u32(&mut self, paddr: u64) -> u32 {
        self.find_device(paddr)
            .map_or(0, |(dev, offset)| dev.read_u32(offset))
    }
    /// Writes one byte at the given physical address; no-op if no device claims it.
    pub fn write_u8(&mut self, paddr: u64, val: u8) {
        if let Some((dev, offset)) = self.find_device(paddr) {
            dev.write_u8(offset, val);
        }
    }
    /// Writes four bytes (little-endian) at the given physical address; no-op if unclaimed.
    pub fn write_u32(&mut self, paddr: u64, val: u32) {
        if let Some((dev, offset)) = self.find_device(paddr) {
            dev.write_u32(offset, val);
        }
    }
}

const fn contains((start, size): (u64, u64), paddr: u64) -> bool {
    paddr >= start && paddr - start < size
}
