//! # Firmware Model Tests
//!
//! The bump controller's velocity schedule and both handlers run against a
//! board through MMIO.

use cosim_bridge::config::{DeviceConfig, FirmwareConfig};
use cosim_bridge::sim::{BumpController, Firmware, FirmwareFault, Loopback};
use cosim_bridge::soc::Board;
use cosim_bridge::soc::devices::DeviceState;
use cosim_bridge::scheduler::payload::decode_i32s;
use pretty_assertions::assert_eq;

fn controller() -> BumpController {
    BumpController::new(&FirmwareConfig::default(), &DeviceConfig::default())
}

fn pending_board(device: &DeviceConfig, input: &[u8]) -> Board {
    let mut board = Board::new(device);
    board.bridge_io_mut().update_input_data(input).unwrap();
    board.bridge_io_mut().raise_interrupt().unwrap();
    board
}

#[test]
fn test_straight_without_bump() {
    let mut fw = controller();
    assert_eq!(fw.velocities(false), (10, 10));
    assert_eq!(fw.velocities(false), (10, 10));
}

#[test]
fn test_bump_backs_up_then_turns() {
    let mut fw = controller();
    let schedule: Vec<(i32, i32)> = (0..16).map(|i| fw.velocities(i == 0)).collect();

    // Hold of 15: counts 15..=7 back up, 6..=1 turn, then straight again.
    assert!(schedule[..9].iter().all(|&v| v == (-10, -10)));
    assert!(schedule[9..15].iter().all(|&v| v == (-5, 10)));
    assert_eq!(schedule[15], (10, 10));
}

#[test]
fn test_new_bump_restarts_hold() {
    let mut fw = controller();
    for _ in 0..12 {
        let _ = fw.velocities(false);
    }
    let _ = fw.velocities(true);
    for _ in 0..10 {
        let _ = fw.velocities(false);
    }
    assert_eq!(fw.velocities(true), (-10, -10));
}

#[test]
fn test_bump_handler_writes_velocity_pair() {
    let device = DeviceConfig::default();
    let mut board = pending_board(&device, &1i32.to_le_bytes());
    let mut fw = controller();

    fw.on_interrupt(&mut board).unwrap();

    let io = board.bridge_io();
    assert_eq!(io.state(), DeviceState::DoneSignaled);
    assert_eq!(io.output_data_size(), BumpController::OUTPUT_SIZE);
    assert_eq!(decode_i32s(io.output_data()).unwrap(), vec![-10, -10]);
    assert_eq!(fw.jobs(), 1);
    assert_eq!(board.check_exit(), None);
}

#[test]
fn test_bump_handler_powers_off_after_limit() {
    let device = DeviceConfig::default();
    let config = FirmwareConfig {
        shutdown_after: Some(2),
        ..FirmwareConfig::default()
    };
    let mut fw = BumpController::new(&config, &device);

    let mut board = pending_board(&device, &[0; 4]);
    fw.on_interrupt(&mut board).unwrap();
    assert_eq!(board.check_exit(), None);

    board.bridge_io_mut().clear_interrupt().unwrap();
    board.bridge_io_mut().raise_interrupt().unwrap();
    fw.on_interrupt(&mut board).unwrap();
    assert_eq!(board.check_exit(), Some(0));
}

#[test]
fn test_bump_handler_needs_room_for_output() {
    let device = DeviceConfig {
        output_buffer_size: 7,
        ..DeviceConfig::default()
    };
    let mut board = pending_board(&device, &[0; 4]);
    let mut fw = BumpController::new(&FirmwareConfig::default(), &device);
    let err: FirmwareFault = fw.on_interrupt(&mut board).unwrap_err();
    assert!(err.to_string().contains("7 bytes"));
    assert_eq!(board.bridge_io().state(), DeviceState::InterruptPending);
}

#[test]
fn test_loopback_echoes_input() {
    let device = DeviceConfig::default();
    let mut board = pending_board(&device, b"hello, world");
    let mut fw = Loopback::new(device.base_addr);

    fw.on_interrupt(&mut board).unwrap();
    assert_eq!(board.bridge_io().output_data(), b"hello, world");
    assert_eq!(fw.name(), "loopback");
}

#[test]
fn test_loopback_rejects_oversized_input() {
    let device = DeviceConfig {
        input_buffer_size: 16,
        output_buffer_size: 8,
        ..DeviceConfig::default()
    };
    let mut board = pending_board(&device, &[1; 12]);
    let mut fw = Loopback::new(device.base_addr);
    assert!(fw.on_interrupt(&mut board).is_err());
}
