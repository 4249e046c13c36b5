//! Event-driven reference simulator.
//!
//! Time jumps between the events that matter to the bridge: the firmware
//! acknowledging the bridge IO interrupt and its handler completing
//! `service_latency` ticks later. Between events the board is idle.

use tracing::{debug, info, trace};

use super::{ExitCause, ExitEvent, Firmware, HardwareSimulator, SimError};
use crate::common::Tick;
use crate::config::{DeviceConfig, FirmwareConfig};
use crate::soc::Board;
use crate::soc::devices::bridge_io::GO_OFFSET;
use crate::soc::devices::{BridgeIo, Device};

/// Reference [`HardwareSimulator`] running a [`Firmware`] against a [`Board`].
#[derive(Debug)]
pub struct FirmwareSimulator {
    board: Board,
    firmware: Box<dyn Firmware>,
    now: Tick,
    service_latency: Tick,
    service_due: Option<Tick>,
    serviced: u64,
}

impl FirmwareSimulator {
    /// Creates a simulator at tick 0.
    pub fn new(board: Board, firmware: Box<dyn Firmware>, service_latency: Tick) -> Self {
        Self {
            board,
            firmware,
            now: 0,
            service_latency,
            service_due: None,
            serviced: 0,
        }
    }

    /// Builds the board from `device` and takes the service latency from `firmware_config`.
    pub fn from_config(
        device: &DeviceConfig,
        firmware_config: &FirmwareConfig,
        firmware: Box<dyn Firmware>,
    ) -> Self {
        Self::new(
            Board::new(device),
            firmware,
            firmware_config.service_latency_ticks,
        )
    }

    /// Returns the board.
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Returns the board for direct MMIO access.
    pub const fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    /// Returns the number of interrupts the firmware has serviced.
    pub const fn serviced(&self) -> u64 {
        self.serviced
    }

    /// Returns the tick at which the pending handler completes, if one is running.
    pub const fn service_due(&self) -> Option<Tick> {
        self.service_due
    }

    fn bridge_irq_pending(&self) -> bool {
        self.board
            .bridge_io()
            .get_irq_id()
            .filter(|id| *id < 64)
            .is_some_and(|id| self.board.irq_lines() & (1 << id) != 0)
    }

    fn service(&mut self) -> Result<(), SimError> {
        trace!(tick = self.now, firmware = self.firmware.name(), "running interrupt handler");
        self.firmware
            .on_interrupt(&mut self.board)
            .map_err(|fault| SimError::Firmware {
                firmware: self.firmware.name().to_string(),
                tick: self.now,
                reason: fault.to_string(),
            })?;
        self.serviced += 1;
        Ok(())
    }
}

impl HardwareSimulator for FirmwareSimulator {
    fn advance(&mut self, ticks: Tick) -> Result<ExitEvent, SimError> {
        let start = self.now;
        let deadline = start.saturating_add(ticks);

        loop {
            if let Some(code) = self.board.check_exit() {
                info!(tick = self.now, code, "firmware requested exit");
                return Ok(ExitEvent {
                    cause: ExitCause::Terminal { code },
                    elapsed: self.now - start,
                });
            }

            if self.board.bridge_io_mut().take_done_event() {
                return Ok(ExitEvent {
                    cause: ExitCause::DeviceDone,
                    elapsed: self.now - start,
                });
            }

            if self.service_due.is_none() && self.bridge_irq_pending() {
                let go = self.board.bridge_io().base_addr() + GO_OFFSET;
                self.board.write_u32(go, 0);
                let due = self.now.saturating_add(self.service_latency);
                debug!(tick = self.now, due, "bridge IO interrupt acknowledged");
                self.service_due = Some(due);
            }

            match self.service_due {
                Some(due) if due <= deadline => {
                    self.now = due;
                    self.service_due = None;
                    self.service()?;
                }
                _ => {
                    self.now = deadline;
                    return Ok(ExitEvent {
                        cause: ExitCause::WindowBoundary,
                        elapsed: self.now - start,
                    });
                }
            }
        }
    }

    fn current_tick(&self) -> Tick {
        self.now
    }

    fn bridge_io(&mut self) -> &mut BridgeIo {
        self.board.bridge_io_mut()
    }
}
