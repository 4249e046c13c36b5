//! Bridge run statistics.
//!
//! This module tracks what a scheduler loop did over its lifetime. It provides:
//! 1. **Progress:** Windows completed, exchanges performed and ticks simulated.
//! 2. **Responses:** Result vs placeholder replies.
//! 3. **Device traffic:** Interrupts raised, early completions and inputs held back while busy.
//! 4. **Diagnostics:** Request payloads that did not fit the element width or the input buffer.

use std::fmt;
use std::time::Instant;

use tracing::info;

use crate::common::Tick;

/// Counters collected by one scheduler loop.
#[derive(Clone, Debug)]
pub struct BridgeStats {
    start_time: Instant,
    /// Window boundaries reached.
    pub windows: u64,
    /// Request/response exchanges with the external runtime.
    pub exchanges: u64,
    /// Responses that carried device output.
    pub result_responses: u64,
    /// Responses that carried the zero placeholder.
    pub placeholder_responses: u64,
    /// Interrupts raised on the bridge IO device.
    pub interrupts_raised: u64,
    /// Advances cut short by the device signaling done.
    pub early_completions: u64,
    /// Request payloads held back because the device was busy.
    pub deferred_inputs: u64,
    /// Held payloads replaced by a newer one before delivery.
    pub superseded_inputs: u64,
    /// Request payloads whose length was not a multiple of the element width.
    pub malformed_payloads: u64,
    /// Request payloads dropped for exceeding the device input buffer.
    pub oversized_inputs: u64,
    /// Simulator ticks covered by the loop.
    pub simulated_ticks: Tick,
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            windows: 0,
            exchanges: 0,
            result_responses: 0,
            placeholder_responses: 0,
            interrupts_raised: 0,
            early_completions: 0,
            deferred_inputs: 0,
            superseded_inputs: 0,
            malformed_payloads: 0,
            oversized_inputs: 0,
            simulated_ticks: 0,
        }
    }
}

impl BridgeStats {
    /// Logs the counters at info level under the given session.
    pub fn log_summary(&self, session: &str) {
        info!(
            session,
            windows = self.windows,
            exchanges = self.exchanges,
            result_responses = self.result_responses,
            placeholder_responses = self.placeholder_responses,
            interrupts_raised = self.interrupts_raised,
            early_completions = self.early_completions,
            deferred_inputs = self.deferred_inputs,
            malformed_payloads = self.malformed_payloads,
            oversized_inputs = self.oversized_inputs,
            simulated_ticks = self.simulated_ticks,
            host_seconds = self.start_time.elapsed().as_secs_f64(),
            "bridge statistics"
        );
    }
}

impl fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.start_time.elapsed().as_secs_f64();
        let exchanges = self.exchanges.max(1);
        writeln!(f, "==========================================================")?;
        writeln!(f, "BRIDGE STATISTICS")?;
        writeln!(f, "==========================================================")?;
        writeln!(f, "host_seconds             {seconds:.4} s")?;
        writeln!(f, "sim_ticks                {}", self.simulated_ticks)?;
        writeln!(f, "windows                  {}", self.windows)?;
        writeln!(f, "exchanges                {}", self.exchanges)?;
        writeln!(f, "----------------------------------------------------------")?;
        writeln!(
            f,
            "  responses.result       {} ({:.2}%)",
            self.result_responses,
            (self.result_responses as f64 / exchanges as f64) * 100.0
        )?;
        writeln!(
            f,
            "  responses.placeholder  {} ({:.2}%)",
            self.placeholder_responses,
            (self.placeholder_responses as f64 / exchanges as f64) * 100.0
        )?;
        writeln!(f, "  device.interrupts      {}", self.interrupts_raised)?;
        writeln!(f, "  device.early_done      {}", self.early_completions)?;
        writeln!(f, "  input.deferred         {}", self.deferred_inputs)?;
        writeln!(f, "  input.superseded       {}", self.superseded_inputs)?;
        writeln!(f, "  input.malformed        {}", self.malformed_payloads)?;
        write!(f, "  input.oversized        {}", self.oversized_inputs)
    }
}
