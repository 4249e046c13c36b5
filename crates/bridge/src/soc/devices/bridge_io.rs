//! Bridge IO peripheral.
//!
//! The single point of contact between the simulated firmware and the external
//! runtime. The scheduler fills the input buffer and raises the interrupt; the
//! firmware acknowledges it, computes, writes the output buffer and sets the
//! done flag, which ends the current simulator advance early.
//!
//! # State Machine
//!
//! ```text
//! Idle --raise_interrupt--> InterruptPending --GO <- 0--> Computing
//! InterruptPending | Computing --DONE <- 1--> DoneSignaled
//! DoneSignaled --clear_interrupt--> Idle
//! ```
//!
//! Host-side transitions that do not appear above are rejected with
//! [`DeviceError::IllegalTransition`] instead of silently succeeding.
//!
//! # Registers
//!
//! * `0x00`: GO. Reads 1 while the interrupt is pending; writing 0 acknowledges it.
//! * `0x04`: DONE. Reads the done flag; writing 1 signals completion.
//! * `0x08`: INPUT_START. Absolute address of the input buffer (read only).
//! * `0x0C`: INPUT_SIZE. Bytes of valid input (read only).
//! * `0x10`: OUTPUT_START. Absolute address of the output buffer (read only).
//! * `0x14`: OUTPUT_SIZE. Size of the result, written by the firmware.
//! * `0x100`: Input buffer, followed directly by the output buffer.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DeviceConfig;
use crate::soc::devices::Device;

/// Offset of the GO (interrupt pending / acknowledge) register.
pub const GO_OFFSET: u64 = 0x00;
/// Offset of the DONE register.
pub const DONE_OFFSET: u64 = 0x04;
/// Offset of the INPUT_START register.
pub const INPUT_START_OFFSET: u64 = 0x08;
/// Offset of the INPUT_SIZE register.
pub const INPUT_SIZE_OFFSET: u64 = 0x0C;
/// Offset of the OUTPUT_START register.
pub const OUTPUT_START_OFFSET: u64 = 0x10;
/// Offset of the OUTPUT_SIZE register.
pub const OUTPUT_SIZE_OFFSET: u64 = 0x14;
/// Offset of the first data buffer.
pub const DATA_OFFSET: u64 = 0x100;

/// Handshake state of the bridge IO device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// No pending work, no interrupt.
    Idle,
    /// Input populated and interrupt raised; firmware has not acknowledged yet.
    InterruptPending,
    /// Firmware acknowledged the interrupt and has not signaled completion.
    Computing,
    /// Firmware set the done flag; waiting for the scheduler to clear.
    DoneSignaled,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::InterruptPending => write!(f, "INTERRUPT_PENDING"),
            Self::Computing => write!(f, "COMPUTING"),
            Self::DoneSignaled => write!(f, "DONE_SIGNALED"),
        }
    }
}

/// Host-side contract violations of the bridge IO device.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The firmware owns the input buffer.
    #[error("input buffer is in use by the firmware (state {0})")]
    Busy(DeviceState),

    /// The input does not fit the buffer.
    #[error("input of {len} bytes exceeds the {capacity} byte input buffer")]
    InputTooLarge {
        /// Offered input length.
        len: usize,
        /// Buffer capacity.
        capacity: usize,
    },

    /// The operation is not valid in the current state.
    #[error("{operation} is not allowed in state {state}")]
    IllegalTransition {
        /// Rejected operation.
        operation: &'static str,
        /// State the device was in.
        state: DeviceState,
    },
}

/// Interrupt-driven bridge IO peripheral.
#[derive(Clone, Debug)]
pub struct BridgeIo {
    base_addr: u64,
    irq_id: u32,
    state: DeviceState,
    input: Vec<u8>,
    input_size: usize,
    output: Vec<u8>,
    output_size: usize,
    done: bool,
    done_event: bool,
}

impl BridgeIo {
    /// Creates a device with the given buffer capacities.
    pub fn new(base_addr: u64, input_capacity: usize, output_capacity: usize, irq_id: u32) -> Self {
        Self {
            base_addr,
            irq_id,
            state: DeviceState::Idle,
            input: vec![0; input_capacity],
            input_size: 0,
            output: vec![0; output_capacity],
            output_size: 0,
            done: false,
            done_event: false,
        }
    }

    /// Creates a device from the board's device configuration.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            config.base_addr,
            config.input_buffer_size,
            config.output_buffer_size,
            config.irq_id,
        )
    }

    /// Returns the base physical address.
    pub const fn base_addr(&self) -> u64 {
        self.base_addr
    }

    /// Returns the current handshake state.
    pub const fn state(&self) -> DeviceState {
        self.state
    }

    /// Returns the input buffer capacity.
    pub fn input_capacity(&self) -> usize {
        self.input.len()
    }

    /// Returns the output buffer capacity.
    pub fn output_capacity(&self) -> usize {
        self.output.len()
    }

    /// Returns `true` if `paddr` falls inside this device's MMIO window.
    pub fn contains(&self, paddr: u64) -> bool {
        let (base, size) = self.window();
        paddr >= base && paddr - base < size
    }

    fn window(&self) -> (u64, u64) {
        (
            self.base_addr,
            DATA_OFFSET + self.input.len() as u64 + self.output.len() as u64,
        )
    }

    fn output_offset(&self) -> u64 {
        DATA_OFFSET + self.input.len() as u64
    }

    /// Replaces the input buffer contents.
    ///
    /// Fails without touching the buffer while the firmware is computing or if
    /// `data` exceeds the buffer capacity.
    pub fn update_input_data(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        if self.state == DeviceState::Computing {
            return Err(DeviceError::Busy(self.state));
        }
        if data.len() > self.input.len() {
            return Err(DeviceError::InputTooLarge {
                len: data.len(),
                capacity: self.input.len(),
            });
        }
        self.input[..data.len()].copy_from_slice(data);
        self.input[data.len()..].fill(0);
        self.input_size = data.len();
        Ok(())
    }

    /// Raises the interrupt line. Only valid from `Idle`.
    ///
    /// Clears the done flag and the reported output size of the previous job.
    pub fn raise_interrupt(&mut self) -> Result<(), DeviceError> {
        if self.state != DeviceState::Idle {
            return Err(DeviceError::IllegalTransition {
                operation: "raise_interrupt",
                state: self.state,
            });
        }
        self.done = false;
        self.done_event = false;
        self.output_size = 0;
        self.state = DeviceState::InterruptPending;
        debug!(input_size = self.input_size, "bridge IO interrupt raised");
        Ok(())
    }

    /// Lowers the interrupt line after completion. Only valid from `DoneSignaled`.
    ///
    /// The done flag and output stay readable until the next `raise_interrupt`.
    pub fn clear_interrupt(&mut self) -> Result<(), DeviceError> {
        if self.state != DeviceState::DoneSignaled {
            return Err(DeviceError::IllegalTransition {
                operation: "clear_interrupt",
                state: self.state,
            });
        }
        self.state = DeviceState::Idle;
        Ok(())
    }

    /// Returns the done flag.
    pub const fn if_done(&self) -> bool {
        self.done
    }

    /// Returns the output buffer truncated to the reported output size.
    pub fn output_data(&self) -> &[u8] {
        &self.output[..self.output_data_size()]
    }

    /// Returns the reported output size, clamped to the buffer capacity.
    pub fn output_data_size(&self) -> usize {
        self.output_size.min(self.output.len())
    }

    /// Returns the valid part of the input buffer.
    pub fn input_data(&self) -> &[u8] {
        &self.input[..self.input_size]
    }

    /// Consumes the completion event raised by the firmware's DONE write.
    pub const fn take_done_event(&mut self) -> bool {
        let event = self.done_event;
        self.done_event = false;
        event
    }

    fn acknowledge(&mut self) {
        if self.state == DeviceState::InterruptPending {
            self.state = DeviceState::Computing;
        }
    }

    fn signal_done(&mut self) {
        match self.state {
            DeviceState::InterruptPending | DeviceState::Computing => {
                self.state = DeviceState::DoneSignaled;
                self.done = true;
                self.done_event = true;
                debug!(output_size = self.output_size, "bridge IO signaled done");
            }
            state => warn!(%state, "firmware wrote DONE without a pending job; ignored"),
        }
    }

    fn read_register(&self, offset: u64) -> u32 {
        match offset {
            GO_OFFSET => u32::from(self.state == DeviceState::InterruptPending),
            DONE_OFFSET => u32::from(self.done),
            INPUT_START_OFFSET => (self.base_addr + DATA_OFFSET) as u32,
            INPUT_SIZE_OFFSET => self.input_size as u32,
            OUTPUT_START_OFFSET => (self.base_addr + self.output_offset()) as u32,
            OUTPUT_SIZE_OFFSET => self.output_size as u32,
            _ => 0,
        }
    }

    fn write_register(&mut self, offset: u64, val: u32) {
        match offset {
            GO_OFFSET if val == 0 => self.acknowledge(),
            DONE_OFFSET if val != 0 => self.signal_done(),
            OUTPUT_SIZE_OFFSET => self.output_size = val as usize,
            _ => {}
        }
    }

    fn data_byte(&self, offset: u64) -> u8 {
        let idx = (offset - DATA_OFFSET) as usize;
        if idx < self.input.len() {
            self.input[idx]
        } else {
            self.output.get(idx - self.input.len()).copied().unwrap_or(0)
        }
    }

    fn write_output_byte(&mut self, offset: u64, val: u8) {
        let out = self.output_offset();
        if offset >= out {
            if let Some(byte) = self.output.get_mut((offset - out) as usize) {
                *byte = val;
            }
        }
    }
}

impl Device for BridgeIo {
    fn name(&self) -> &str {
        "BridgeIO"
    }

    fn address_range(&self) -> (u64, u64) {
        self.window()
    }

    fn read_u8(&mut self, offset: u64) -> u8 {
        if offset >= DATA_OFFSET {
            self.data_byte(offset)
        } else {
            let word = self.read_register(offset & !3);
            (word >> ((offset & 3) * 8)) as u8
        }
    }

    fn read_u32(&mut self, offset: u64) -> u32 {
        if offset >= DATA_OFFSET {
            let bytes = [0, 1, 2, 3].map(|i| self.data_byte(offset + i));
            u32::from_le_bytes(bytes)
        } else {
            self.read_register(offset)
        }
    }

    /// Byte writes reach the output buffer only; registers take word writes.
    fn write_u8(&mut self, offset: u64, val: u8) {
        if offset >= DATA_OFFSET {
            self.write_output_byte(offset, val);
        }
    }

    fn write_u32(&mut self, offset: u64, val: u32) {
        if offset >= DATA_OFFSET {
            for (i, byte) in val.to_le_bytes().into_iter().enumerate() {
                self.write_output_byte(offset + i as u64, byte);
            }
        } else {
            self.write_register(offset, val);
        }
    }

    fn irq_asserted(&self) -> bool {
        self.state == DeviceState::InterruptPending
    }

    fn get_irq_id(&self) -> Option<u32> {
        Some(self.irq_id)
    }
}
