//! Firmware models.
//!
//! A firmware model is the bridge IO interrupt handler of the MCU program. It
//! sees the board only through MMIO: it reads the buffer addresses from the
//! device registers, computes, writes its result to the output buffer,
//! records the result size and sets DONE.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::config::{DeviceConfig, FirmwareConfig};
use crate::soc::Board;
use crate::soc::devices::bridge_io::{
    DONE_OFFSET, INPUT_SIZE_OFFSET, INPUT_START_OFFSET, OUTPUT_SIZE_OFFSET, OUTPUT_START_OFFSET,
};
use crate::soc::devices::syscon::POWER_OFF;

/// A handler could not complete.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FirmwareFault(pub String);

/// Bridge IO interrupt handler of an MCU program.
pub trait Firmware: Send + fmt::Debug {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Services one bridge IO interrupt.
    fn on_interrupt(&mut self, board: &mut Board) -> Result<(), FirmwareFault>;
}

/// Buffer addresses the firmware reads from the device registers.
struct Buffers {
    input_start: u64,
    input_size: usize,
    output_start: u64,
}

impl Buffers {
    fn read(board: &mut Board, base: u64) -> Self {
        Self {
            input_start: u64::from(board.read_u32(base + INPUT_START_OFFSET)),
            input_size: board.read_u32(base + INPUT_SIZE_OFFSET) as usize,
            output_start: u64::from(board.read_u32(base + OUTPUT_START_OFFSET)),
        }
    }
}

fn finish(board: &mut Board, base: u64, output_size: usize) {
    board.write_u32(base + OUTPUT_SIZE_OFFSET, output_size as u32);
    board.write_u32(base + DONE_OFFSET, 1);
}

/// Bumper-driven wheel controller.
///
/// The request's first `i32` is the bumper state. After a bump the robot
/// backs up for the first half of the hold period and turns for the second;
/// otherwise it drives straight at full speed. The response is the left and
/// right wheel velocities as two `i32` values.
#[derive(Debug)]
pub struct BumpController {
    base: u64,
    syscon_base: u64,
    max_velocity: i32,
    bump_hold: u32,
    bump_count: u32,
    jobs: u64,
    shutdown_after: Option<u64>,
}

impl BumpController {
    /// Size of the velocity pair written to the output buffer.
    pub const OUTPUT_SIZE: usize = 8;

    /// Creates a controller for the device layout in `device`.
    pub const fn new(config: &FirmwareConfig, device: &DeviceConfig) -> Self {
        Self {
            base: device.base_addr,
            syscon_base: device.syscon_base,
            max_velocity: config.max_velocity,
            bump_hold: config.bump_hold,
            bump_count: 0,
            jobs: 0,
            shutdown_after: config.shutdown_after,
        }
    }

    /// Returns the velocities for one bumper sample and advances the hold counter.
    pub const fn velocities(&mut self, bumped: bool) -> (i32, i32) {
        if bumped {
            self.bump_count = self.bump_hold;
        }
        if self.bump_count == 0 {
            return (self.max_velocity, self.max_velocity);
        }
        let wheels = if self.bump_count >= self.bump_hold / 2 {
            (-self.max_velocity, -self.max_velocity)
        } else {
            (-self.max_velocity / 2, self.max_velocity)
        };
        self.bump_count -= 1;
        wheels
    }

    /// Returns the number of requests handled.
    pub const fn jobs(&self) -> u64 {
        self.jobs
    }
}

impl Firmware for BumpController {
    fn name(&self) -> &str {
        "bump-controller"
    }

    fn on_interrupt(&mut self, board: &mut Board) -> Result<(), FirmwareFault> {
        let capacity = board.bridge_io().output_capacity();
        if capacity < Self::OUTPUT_SIZE {
            return Err(FirmwareFault(format!(
                "output buffer of {capacity} bytes cannot hold the velocity pair"
            )));
        }

        let buffers = Buffers::read(board, self.base);
        let bumped = board.read_u32(buffers.input_start) != 0;
        let (left, right) = self.velocities(bumped);
        debug!(
            input_size = buffers.input_size,
            bumped, left, right, "bump controller output"
        );

        board.write_u32(buffers.output_start, left as u32);
        board.write_u32(buffers.output_start + 4, right as u32);
        finish(board, self.base, Self::OUTPUT_SIZE);

        self.jobs += 1;
        if self.shutdown_after.is_some_and(|limit| self.jobs >= limit) {
            board.write_u32(self.syscon_base, POWER_OFF);
        }
        Ok(())
    }
}

/// Echoes the request back as the response.
#[derive(Debug)]
pub struct Loopback {
    base: u64,
}

impl Loopback {
    /// Creates a loopback handler for the device at `base`.
    pub const fn new(base: u64) -> Self {
        Self { base }
    }
}

impl Firmware for Loopback {
    fn name(&self) -> &str {
        "loopback"
    }

    fn on_interrupt(&mut self, board: &mut Board) -> Result<(), FirmwareFault> {
        let buffers = Buffers::read(board, self.base);
        let capacity = board.bridge_io().output_capacity();
        if buffers.input_size > capacity {
            return Err(FirmwareFault(format!(
                "input of {} bytes does not fit the {capacity} byte output buffer",
                buffers.input_size
            )));
        }

        let mut data = vec![0u8; buffers.input_size];
        board.read_bytes(buffers.input_start, &mut data);
        board.write_bytes(buffers.output_start, &data);
        finish(board, self.base, data.len());
        Ok(())
    }
}
