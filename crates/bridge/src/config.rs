//! Configuration system for the co-simulation bridge.
//!
//! This module defines all configuration structures used to parameterize a
//! bridge deployment. It provides:
//! 1. **Defaults:** Baseline constants (socket directory, tick scale, device layout, routes).
//! 2. **Structures:** Hierarchical config for session, transport, scheduler, device, firmware and multiplexer.
//! 3. **Loading:** JSON parsing with per-field defaults and a validation pass.
//!
//! Configuration is supplied as JSON (`cosim --config bridge.json`) or use `BridgeConfig::default()`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::common::constants::{
    BRIDGE_IO_BASE, BRIDGE_IO_BUFFER_SIZE, BRIDGE_IO_IRQ, DEFAULT_MAX_PAYLOAD, SYSCON_BASE,
    TICKS_PER_MS,
};
use crate::soc::devices::bridge_io::DATA_OFFSET;
use crate::soc::devices::syscon::SYSCON_SIZE;
use crate::transport::{TransportError, socket_path};

/// Default configuration constants for the bridge.
mod defaults {
    /// Session name of a lone simulator instance; matches the first helper route.
    pub const SESSION_NAME: &str = "gem5-0";

    /// Directory under the system temp dir holding rendezvous sockets.
    pub const SOCKET_SUBDIR: &str = "cosim-bridge";

    /// Rendezvous name of the multiplexer.
    pub const MUX_NAME: &str = "bridge-helper";

    /// Zero bytes sent back while no result is available (two `i32` velocities).
    pub const PLACEHOLDER_SIZE: usize = 8;

    /// Width of one payload element for length diagnostics (one `f64`).
    pub const ELEMENT_WIDTH: usize = 8;

    /// Ticks between the firmware seeing the interrupt and finishing its handler (1 ms).
    pub const SERVICE_LATENCY_TICKS: u64 = 1_000_000_000;

    /// Wheel velocity limit of the bump controller.
    pub const MAX_VELOCITY: i32 = 10;

    /// Jobs the bump controller keeps reacting to a single bump.
    pub const BUMP_HOLD: u32 = 15;

    /// Longest wait for a request at a window boundary (one minute).
    pub const EXCHANGE_TIMEOUT_MS: u64 = 60_000;

    /// Time a multiplexer connection has to send its registration.
    pub const REGISTRATION_TIMEOUT_MS: u64 = 5_000;

    /// Interval at which the multiplexer polls for connections and shutdown.
    pub const POLL_INTERVAL_MS: u64 = 10;

    /// Client identity to server name pairs of the stock two-robot world.
    pub const ROUTES: [(&str, &str); 2] = [("R0", "gem5-0"), ("R1", "gem5-1")];
}

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The JSON does not match the configuration schema.
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration structure for the bridge.
///
/// Every section and field is optional in JSON; missing values take their
/// defaults.
///
/// # Examples
///
/// ```
/// use cosim_bridge::config::BridgeConfig;
///
/// let json = r#"{
///     "session": { "name": "gem5-1" },
///     "scheduler": { "exchange_timeout_ms": 2000, "placeholder_size": 16 },
///     "mux": { "routes": { "R1": "gem5-1" } }
/// }"#;
///
/// let config = BridgeConfig::from_json_str(json).unwrap();
/// assert_eq!(config.session.name, "gem5-1");
/// assert_eq!(config.scheduler.placeholder_size, 16);
/// assert_eq!(config.mux.routes.len(), 1);
/// assert_eq!(config.device.input_buffer_size, 256);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Session naming and rendezvous location
    pub session: SessionConfig,
    /// Message transport limits
    pub transport: TransportConfig,
    /// Run-ahead scheduler behavior
    pub scheduler: SchedulerConfig,
    /// Bridge IO device layout
    pub device: DeviceConfig,
    /// Reference firmware model
    pub firmware: FirmwareConfig,
    /// Session multiplexer
    pub mux: MuxConfig,
}

impl BridgeConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks values that would make the bridge misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        check_name(&self.session.name)?;
        check_name(&self.session.mux_name)?;

        if self.scheduler.tick_scale == 0 {
            return invalid("scheduler.tick_scale must be positive".into());
        }
        if self.scheduler.element_width == 0 {
            return invalid("scheduler.element_width must be positive".into());
        }
        if self.scheduler.placeholder_size > self.transport.max_payload {
            return invalid(format!(
                "scheduler.placeholder_size {} exceeds transport.max_payload {}",
                self.scheduler.placeholder_size, self.transport.max_payload
            ));
        }
        if self.device.input_buffer_size == 0 || self.device.output_buffer_size == 0 {
            return invalid("device buffers must hold at least one byte".into());
        }
        if self.scheduler.exchange_timeout_ms == 0 {
            return invalid("scheduler.exchange_timeout_ms must be positive".into());
        }
        let device = &self.device;
        let bridge_span = DATA_OFFSET
            .saturating_add(device.input_buffer_size as u64)
            .saturating_add(device.output_buffer_size as u64);
        if !fits_below_4gib(device.base_addr, bridge_span) {
            return invalid(format!(
                "device.base_addr {:#x} with {bridge_span:#x} bytes does not fit in 32-bit MMIO",
                device.base_addr
            ));
        }
        if !fits_below_4gib(device.syscon_base, SYSCON_SIZE) {
            return invalid(format!(
                "device.syscon_base {:#x} does not fit in 32-bit MMIO",
                device.syscon_base
            ));
        }
        if self.mux.poll_interval_ms == 0 {
            return invalid("mux.poll_interval_ms must be positive".into());
        }

        let mut servers: BTreeMap<&str, &str> = BTreeMap::new();
        for (client, server) in &self.mux.routes {
            check_name(client)?;
            check_name(server)?;
            if let Some(other) = servers.insert(server, client) {
                return invalid(format!(
                    "server '{server}' is routed from both '{other}' and '{client}'"
                ));
            }
        }
        Ok(())
    }

    /// Returns the socket path of the multiplexer.
    pub fn mux_socket_path(&self) -> Result<PathBuf, TransportError> {
        socket_path(&self.session.socket_dir, &self.session.mux_name)
    }
}

fn check_name(name: &str) -> Result<(), ConfigError> {
    socket_path(Path::new(""), name)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Firmware sees device addresses through 32-bit registers.
fn fits_below_4gib(base: u64, len: u64) -> bool {
    base.checked_add(len).is_some_and(|end| end <= 1 << 32)
}

fn millis(ms: Option<u64>) -> Option<Duration> {
    ms.map(Duration::from_millis)
}

/// Session naming and rendezvous location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name this simulator instance registers or listens under
    pub name: String,
    /// Directory holding the rendezvous sockets
    pub socket_dir: PathBuf,
    /// Rendezvous name of the multiplexer
    pub mux_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: defaults::SESSION_NAME.to_string(),
            socket_dir: std::env::temp_dir().join(defaults::SOCKET_SUBDIR),
            mux_name: defaults::MUX_NAME.to_string(),
        }
    }
}

/// Message transport limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest payload a connection accepts, in bytes
    pub max_payload: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Run-ahead scheduler behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Simulator ticks per millisecond of external time
    pub tick_scale: u64,
    /// How long to wait for `INIT`; `None` waits forever
    pub handshake_timeout_ms: Option<u64>,
    /// Extra `INIT` waits after a handshake timeout
    pub handshake_retries: u32,
    /// How long to wait for a request at a window boundary
    pub exchange_timeout_ms: u64,
    /// Length of the zero-filled response sent while no result exists
    pub placeholder_size: usize,
    /// Element width used to sanity-check request lengths
    pub element_width: usize,
}

impl SchedulerConfig {
    /// Returns the handshake timeout.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        millis(self.handshake_timeout_ms)
    }

    /// Returns the steady-state receive timeout.
    pub const fn exchange_timeout(&self) -> Duration {
        Duration::from_millis(self.exchange_timeout_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_scale: TICKS_PER_MS,
            handshake_timeout_ms: None,
            handshake_retries: 0,
            exchange_timeout_ms: defaults::EXCHANGE_TIMEOUT_MS,
            placeholder_size: defaults::PLACEHOLDER_SIZE,
            element_width: defaults::ELEMENT_WIDTH,
        }
    }
}

/// Bridge IO device layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Base physical address of the bridge IO device
    pub base_addr: u64,
    /// Input buffer capacity in bytes
    pub input_buffer_size: usize,
    /// Output buffer capacity in bytes
    pub output_buffer_size: usize,
    /// Interrupt id of the bridge IO line
    pub irq_id: u32,
    /// Base physical address of the system controller
    pub syscon_base: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_addr: BRIDGE_IO_BASE,
            input_buffer_size: BRIDGE_IO_BUFFER_SIZE,
            output_buffer_size: BRIDGE_IO_BUFFER_SIZE,
            irq_id: BRIDGE_IO_IRQ,
            syscon_base: SYSCON_BASE,
        }
    }
}

/// Reference firmware model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Ticks from interrupt acknowledge to handler completion
    pub service_latency_ticks: u64,
    /// Wheel velocity limit of the bump controller
    pub max_velocity: i32,
    /// Jobs a single bump keeps the controller reacting
    pub bump_hold: u32,
    /// Power off through the SysCon after this many jobs
    pub shutdown_after: Option<u64>,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            service_latency_ticks: defaults::SERVICE_LATENCY_TICKS,
            max_velocity: defaults::MAX_VELOCITY,
            bump_hold: defaults::BUMP_HOLD,
            shutdown_after: None,
        }
    }
}

/// Session multiplexer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Client identity to server name
    pub routes: BTreeMap<String, String>,
    /// Time a connection has to send its registration
    pub registration_timeout_ms: u64,
    /// Accept loop polling interval
    pub poll_interval_ms: u64,
}

impl MuxConfig {
    /// Returns the registration timeout.
    pub const fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    /// Returns the accept loop polling interval.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            routes: defaults::ROUTES
                .iter()
                .map(|(client, server)| ((*client).to_string(), (*server).to_string()))
                .collect(),
            registration_timeout_ms: defaults::REGISTRATION_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}
