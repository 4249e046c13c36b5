//! Protocol and memory-map constants.
//!
//! Values that are part of the wire contract or of the firmware's view of the
//! device. Tunable values live in [`crate::config`].

/// Simulator ticks per millisecond of external-runtime time (1 tick = 1 ps).
pub const TICKS_PER_MS: u64 = 1_000_000_000;

/// Bytes in a frame header: 4-byte command tag plus 4-byte payload length.
pub const FRAME_HEADER_LEN: usize = 8;

/// Largest payload accepted by default (1 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Base physical address of the bridge IO device in the original board layout.
pub const BRIDGE_IO_BASE: u64 = 0x8800_0000;

/// Interrupt id of the bridge IO line (GIC SPI 5, i.e. 32 + 5).
pub const BRIDGE_IO_IRQ: u32 = 37;

/// Default capacity of each bridge IO data buffer.
pub const BRIDGE_IO_BUFFER_SIZE: usize = 256;

/// Base physical address of the system controller.
pub const SYSCON_BASE: u64 = 0x0010_0000;

/// Suffix appended to rendezvous names to form socket file names.
pub const SOCKET_SUFFIX: &str = ".sock";
