//! System Controller (SysCon).
//!
//! A simple memory-mapped device the firmware writes to in order to end the
//! simulation. A terminal write is recorded in a shared [`ExitRequest`] which
//! the simulator polls while advancing.
//!
//! # Registers
//!
//! * `0x00`: Command Register (Write Only)
//!   * `0x5555`: Power Off (exit code 0)
//!   * `0x7777`: Reset (simulated as exit code 0)
//!   * `0x3333`: Failure; bits 16..32 carry the exit code (1 if zero)

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::soc::devices::Device;

/// Power-off command.
pub const POWER_OFF: u32 = 0x5555;
/// Reset command, treated as a clean exit.
pub const RESET: u32 = 0x7777;
/// Failure command; the upper half-word holds the exit code.
pub const FAIL: u32 = 0x3333;

/// Size of the SysCon MMIO window.
pub const SYSCON_SIZE: u64 = 0x1000;

const NO_EXIT: u64 = u64::MAX;

/// Shared exit flag written by the SysCon and read by the simulator.
#[derive(Clone, Debug)]
pub struct ExitRequest(Arc<AtomicU64>);

impl Default for ExitRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitRequest {
    /// Creates a flag with no exit requested.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(NO_EXIT)))
    }

    /// Records a request to exit with `code`.
    pub fn request(&self, code: u32) {
        self.0.store(u64::from(code), Ordering::Release);
    }

    /// Returns the requested exit code, if any.
    pub fn pending(&self) -> Option<u32> {
        match self.0.load(Ordering::Acquire) {
            NO_EXIT => None,
            code => Some(code as u32),
        }
    }

    /// Withdraws a pending request.
    pub fn clear(&self) {
        self.0.store(NO_EXIT, Ordering::Release);
    }
}

/// SysCon device structure.
#[derive(Debug)]
pub struct SysCon {
    base_addr: u64,
    exit: ExitRequest,
}

impl SysCon {
    /// Creates a SysCon at `base_addr` reporting into `exit`.
    pub const fn new(base_addr: u64, exit: ExitRequest) -> Self {
        Self { base_addr, exit }
    }
}

impl Device for SysCon {
    fn name(&self) -> &str {
        "SysCon"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base_addr, SYSCON_SIZE)
    }

    fn read_u8(&mut self, _offset: u64) -> u8 {
        0
    }

    fn read_u32(&mut self, _offset: u64) -> u32 {
        0
    }

    fn write_u8(&mut self, _offset: u64, _val: u8) {}

    /// Interprets the command register; other offsets are ignored.
    fn write_u32(&mut self, offset: u64, val: u32) {
        if offset != 0 {
            return;
        }
        match val & 0xFFFF {
            POWER_OFF => {
                info!("SysCon poweroff signal received");
                self.exit.request(0);
            }
            RESET => {
                info!("SysCon reset signal received (simulated as exit)");
                self.exit.request(0);
            }
            FAIL => {
                let code = match val >> 16 {
                    0 => 1,
                    code => code,
                };
                warn!(code, "SysCon failure signal received");
                self.exit.request(code);
            }
            _ => {}
        }
    }
}
