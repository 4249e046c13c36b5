//! # Bridge IO Tests
//!
//! Covers the host-side state machine (update, raise, clear), the firmware
//! side reached through MMIO registers, and the output truncation rules.

use cosim_bridge::soc::devices::bridge_io::{
    DATA_OFFSET, DONE_OFFSET, GO_OFFSET, INPUT_SIZE_OFFSET, INPUT_START_OFFSET,
    OUTPUT_SIZE_OFFSET, OUTPUT_START_OFFSET,
};
use cosim_bridge::soc::devices::{BridgeIo, Device, DeviceError, DeviceState};
use pretty_assertions::assert_eq;
use rstest::rstest;

const BASE: u64 = 0x8800_0000;
const CAP: usize = 16;

fn device() -> BridgeIo {
    BridgeIo::new(BASE, CAP, CAP, 37)
}

fn device_in(state: DeviceState) -> BridgeIo {
    let mut io = device();
    if state == DeviceState::Idle {
        return io;
    }
    io.raise_interrupt().unwrap();
    if state == DeviceState::InterruptPending {
        return io;
    }
    io.write_u32(GO_OFFSET, 0);
    if state == DeviceState::Computing {
        return io;
    }
    io.write_u32(DONE_OFFSET, 1);
    io
}

/// Firmware writes `data` to the output buffer, records its size and signals done.
fn complete(io: &mut BridgeIo, data: &[u8]) {
    let out = u64::from(io.read_u32(OUTPUT_START_OFFSET)) - BASE;
    io.write_bytes(out, data);
    io.write_u32(OUTPUT_SIZE_OFFSET, data.len() as u32);
    io.write_u32(DONE_OFFSET, 1);
}

#[test]
fn test_starts_idle() {
    let mut io = device();
    assert_eq!(io.state(), DeviceState::Idle);
    assert!(!io.if_done());
    assert!(!io.irq_asserted());
    assert_eq!(io.output_data_size(), 0);
    assert!(io.input_data().is_empty());
    assert!(!io.take_done_event());
}

#[test]
fn test_full_handshake() {
    let mut io = device();
    io.update_input_data(&[1, 2, 3, 4]).unwrap();
    io.raise_interrupt().unwrap();
    assert_eq!(io.state(), DeviceState::InterruptPending);
    assert!(io.irq_asserted());
    assert_eq!(io.read_u32(GO_OFFSET), 1);

    io.write_u32(GO_OFFSET, 0);
    assert_eq!(io.state(), DeviceState::Computing);
    assert!(!io.irq_asserted());
    assert_eq!(io.read_u32(GO_OFFSET), 0);

    complete(&mut io, &[9, 8, 7]);
    assert_eq!(io.state(), DeviceState::DoneSignaled);
    assert!(io.if_done());
    assert!(io.take_done_event());
    assert!(!io.take_done_event());
    assert_eq!(io.output_data(), &[9, 8, 7]);

    io.clear_interrupt().unwrap();
    assert_eq!(io.state(), DeviceState::Idle);
    assert!(io.if_done());
    assert_eq!(io.output_data(), &[9, 8, 7]);
}

#[test]
fn test_update_input_while_computing_is_rejected_without_mutation() {
    let mut io = device();
    io.update_input_data(&[1, 1, 1, 1]).unwrap();
    io.raise_interrupt().unwrap();
    io.write_u32(GO_OFFSET, 0);

    assert_eq!(
        io.update_input_data(&[2, 2]),
        Err(DeviceError::Busy(DeviceState::Computing))
    );
    assert_eq!(io.input_data(), &[1, 1, 1, 1]);
    assert_eq!(io.read_u32(DATA_OFFSET), 0x0101_0101);
}

#[rstest]
#[case(DeviceState::Idle)]
#[case(DeviceState::InterruptPending)]
#[case(DeviceState::DoneSignaled)]
fn test_update_input_allowed_outside_computing(#[case] state: DeviceState) {
    let mut io = device_in(state);
    io.update_input_data(&[5; 4]).unwrap();
    assert_eq!(io.input_data(), &[5; 4]);
    assert_eq!(io.state(), state);
}

#[test]
fn test_input_too_large() {
    let mut io = device();
    assert_eq!(
        io.update_input_data(&[0; CAP + 1]),
        Err(DeviceError::InputTooLarge {
            len: CAP + 1,
            capacity: CAP
        })
    );
    assert!(io.input_data().is_empty());
}

#[test]
fn test_shorter_input_clears_stale_bytes() {
    let mut io = device();
    io.update_input_data(&[0xFF; 8]).unwrap();
    io.update_input_data(&[1, 2]).unwrap();
    assert_eq!(io.read_u32(INPUT_SIZE_OFFSET), 2);
    assert_eq!(io.read_u32(DATA_OFFSET), 0x0000_0201);
    assert_eq!(io.read_u32(DATA_OFFSET + 4), 0);
}

#[rstest]
#[case(DeviceState::Idle)]
#[case(DeviceState::InterruptPending)]
#[case(DeviceState::Computing)]
fn test_clear_outside_done_signaled_is_rejected(#[case] state: DeviceState) {
    let mut io = device_in(state);
    assert_eq!(
        io.clear_interrupt(),
        Err(DeviceError::IllegalTransition {
            operation: "clear_interrupt",
            state
        })
    );
    assert_eq!(io.state(), state);
}

#[rstest]
#[case(DeviceState::InterruptPending)]
#[case(DeviceState::Computing)]
#[case(DeviceState::DoneSignaled)]
fn test_raise_outside_idle_is_rejected(#[case] state: DeviceState) {
    let mut io = device_in(state);
    assert!(matches!(
        io.raise_interrupt(),
        Err(DeviceError::IllegalTransition { operation: "raise_interrupt", .. })
    ));
    assert_eq!(io.state(), state);
}

#[test]
fn test_raise_resets_done_and_output_size() {
    let mut io = device();
    io.raise_interrupt().unwrap();
    complete(&mut io, &[1, 2, 3, 4]);
    io.clear_interrupt().unwrap();

    io.raise_interrupt().unwrap();
    assert!(!io.if_done());
    assert_eq!(io.output_data_size(), 0);
    assert!(io.output_data().is_empty());
}

#[test]
fn test_done_from_interrupt_pending_without_ack() {
    let mut io = device_in(DeviceState::InterruptPending);
    io.write_u32(DONE_OFFSET, 1);
    assert_eq!(io.state(), DeviceState::DoneSignaled);
    assert!(io.take_done_event());
}

#[test]
fn test_done_without_job_is_ignored() {
    let mut io = device();
    io.write_u32(DONE_OFFSET, 1);
    assert_eq!(io.state(), DeviceState::Idle);
    assert!(!io.if_done());
    assert!(!io.take_done_event());
}

#[test]
fn test_ack_only_from_interrupt_pending() {
    let mut io = device();
    io.write_u32(GO_OFFSET, 0);
    assert_eq!(io.state(), DeviceState::Idle);

    let mut io = device_in(DeviceState::InterruptPending);
    io.write_u32(GO_OFFSET, 1);
    assert_eq!(io.state(), DeviceState::InterruptPending);
}

#[test]
fn test_output_size_clamped_to_capacity() {
    let mut io = device_in(DeviceState::Computing);
    io.write_u32(OUTPUT_SIZE_OFFSET, 1000);
    io.write_u32(DONE_OFFSET, 1);
    assert_eq!(io.read_u32(OUTPUT_SIZE_OFFSET), 1000);
    assert_eq!(io.output_data_size(), CAP);
    assert_eq!(io.output_data().len(), CAP);
}

#[test]
fn test_register_layout() {
    let mut io = device();
    io.update_input_data(&[0; 6]).unwrap();
    assert_eq!(u64::from(io.read_u32(INPUT_START_OFFSET)), BASE + DATA_OFFSET);
    assert_eq!(io.read_u32(INPUT_SIZE_OFFSET), 6);
    assert_eq!(
        u64::from(io.read_u32(OUTPUT_START_OFFSET)),
        BASE + DATA_OFFSET + CAP as u64
    );
    assert_eq!(io.address_range(), (BASE, DATA_OFFSET + 2 * CAP as u64));
    assert_eq!(io.get_irq_id(), Some(37));
    assert_eq!(io.name(), "BridgeIO");
}

#[test]
fn test_register_byte_reads() {
    let mut io = device();
    io.update_input_data(&[0; 3]).unwrap();
    assert_eq!(io.read_u8(INPUT_SIZE_OFFSET), 3);
    assert_eq!(io.read_u8(INPUT_SIZE_OFFSET + 1), 0);
}

#[test]
fn test_input_window_is_read_only() {
    let mut io = device();
    io.update_input_data(&[1, 2, 3, 4]).unwrap();
    io.write_u32(DATA_OFFSET, 0xFFFF_FFFF);
    io.write_u8(DATA_OFFSET + 1, 0xFF);
    assert_eq!(io.input_data(), &[1, 2, 3, 4]);
}

#[test]
fn test_output_window_little_endian() {
    let mut io = device_in(DeviceState::Computing);
    let out = DATA_OFFSET + CAP as u64;
    io.write_u32(out, (-10i32) as u32);
    io.write_u32(OUTPUT_SIZE_OFFSET, 4);
    io.write_u32(DONE_OFFSET, 1);
    assert_eq!(io.output_data(), &(-10i32).to_le_bytes());
    assert_eq!(io.read_u32(out), (-10i32) as u32);
}

#[test]
fn test_state_display() {
    assert_eq!(DeviceState::InterruptPending.to_string(), "INTERRUPT_PENDING");
    assert_eq!(DeviceState::DoneSignaled.to_string(), "DONE_SIGNALED");
}
