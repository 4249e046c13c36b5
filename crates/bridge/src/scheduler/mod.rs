//! Run-ahead scheduler.
//!
//! Drives one hardware simulator against one external runtime. The simulator
//! runs ahead in windows of at most `W` ticks; at every window boundary the
//! scheduler blocks for the next request, answers it with exactly one
//! `COMPUTE_RESPONSE` and restarts the window. When the firmware signals done
//! inside a window the scheduler clears the device and resumes for only the
//! remainder, so exchanges are never more than `W` ticks apart.
//!
//! Requests that arrive while the firmware is still working on the previous
//! one are held by the scheduler (the most recent wins) and delivered at the
//! first boundary where the device is idle again. The device buffer is never
//! written while the firmware owns it.

use tracing::{debug, error, info, info_span, trace, warn};

use crate::common::{BridgeError, Phase, Tick};
use crate::config::SchedulerConfig;
use crate::sim::{ExitCause, HardwareSimulator};
use crate::soc::devices::{DeviceError, DeviceState};
use crate::stats::BridgeStats;
use crate::transport::{Command, Exchange, Message, TransportError};

/// Request payload diagnostics.
pub mod payload;

/// Run-ahead window bookkeeping.
pub mod window;

pub use payload::MalformedPayload;
pub use window::Window;

/// How a session ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The firmware requested an exit; `DONE` was sent to the peer.
    FirmwareExit {
        /// Exit code reported by the firmware.
        code: u32,
    },
    /// The peer sent `DONE`.
    PeerDone,
}

/// Outcome of one scheduler step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The loop continues.
    Continue,
    /// The session ended.
    Finished(Termination),
}

/// Summary returned by [`Scheduler::run`].
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Session name.
    pub session: String,
    /// How the session ended.
    pub termination: Termination,
    /// Simulator tick at the end of the session.
    pub final_tick: Tick,
    /// Counters collected over the session.
    pub stats: BridgeStats,
}

/// Run-ahead scheduler for one session.
#[derive(Debug)]
pub struct Scheduler<S, C> {
    session: String,
    sim: S,
    channel: C,
    config: SchedulerConfig,
    window: Option<Window>,
    held_input: Option<Vec<u8>>,
    stats: BridgeStats,
}

impl<S: HardwareSimulator, C: Exchange> Scheduler<S, C> {
    /// Creates a scheduler for `session`; call [`Scheduler::run`] to start it.
    pub fn new(session: impl Into<String>, sim: S, channel: C, config: SchedulerConfig) -> Self {
        Self {
            session: session.into(),
            sim,
            channel,
            config,
            window: None,
            held_input: None,
            stats: BridgeStats::default(),
        }
    }

    /// Returns the session name.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Returns the current window, once the handshake has completed.
    pub const fn window(&self) -> Option<Window> {
        self.window
    }

    /// Returns the payload held back while the device is busy.
    pub fn held_input(&self) -> Option<&[u8]> {
        self.held_input.as_deref()
    }

    /// Returns the counters collected so far.
    pub const fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Returns the hardware simulator.
    pub const fn simulator(&self) -> &S {
        &self.sim
    }

    /// Returns the hardware simulator mutably.
    pub const fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    /// Returns the channel to the external runtime.
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Runs the handshake and the exchange loop until the session ends.
    pub fn run(&mut self) -> Result<RunSummary, BridgeError> {
        let span = info_span!("bridge", session = %self.session);
        let _guard = span.enter();

        let outcome = self.handshake().and_then(|_| loop {
            match self.step()? {
                Step::Continue => {}
                Step::Finished(termination) => break Ok(termination),
            }
        });

        self.stats.log_summary(&self.session);
        match outcome {
            Ok(termination) => {
                let final_tick = self.sim.current_tick();
                info!(?termination, final_tick, "session finished");
                Ok(RunSummary {
                    session: self.session.clone(),
                    termination,
                    final_tick,
                    stats: self.stats.clone(),
                })
            }
            Err(e) => {
                error!(phase = %e.phase(), "{e}");
                Err(e)
            }
        }
    }

    /// Waits for `INIT` and configures the window; returns its length in ticks.
    ///
    /// Timeouts are retried `handshake_retries` times; any other transport
    /// failure is fatal.
    pub fn handshake(&mut self) -> Result<Tick, BridgeError> {
        let timeout = self.config.handshake_timeout();
        let mut retries_left = self.config.handshake_retries;
        let message = loop {
            match self.channel.receive(timeout) {
                Ok(message) => break message,
                Err(e) if e.is_timeout() && retries_left > 0 => {
                    retries_left -= 1;
                    warn!(retries_left, "no INIT yet; waiting again");
                }
                Err(source) => return Err(self.transport_error(Phase::Handshake, source)),
            }
        };

        if message.command != Command::Init {
            return Err(BridgeError::Handshake {
                session: self.session.clone(),
                phase: Phase::Handshake,
                reason: format!("expected INIT, received {}", message.command),
            });
        }
        let window = self.parse_window(&message.data, Phase::Handshake)?;
        info!(window_ticks = window.length(), "run-ahead window configured");
        self.window = Some(window);
        Ok(window.length())
    }

    /// Runs one advance and handles its exit cause.
    ///
    /// A used-up window goes straight to the boundary exchange without
    /// advancing.
    pub fn step(&mut self) -> Result<Step, BridgeError> {
        let Some(window) = self.window else {
            return Err(BridgeError::Handshake {
                session: self.session.clone(),
                phase: Phase::Handshake,
                reason: "no window configured; INIT has not been received".to_string(),
            });
        };

        let budget = window.remaining(self.sim.current_tick());
        if budget == 0 {
            return self.on_window_boundary();
        }

        trace!(tick = self.sim.current_tick(), budget, "advancing");
        let event = self
            .sim
            .advance(budget)
            .map_err(|source| BridgeError::Simulator {
                session: self.session.clone(),
                source,
            })?;
        self.stats.simulated_ticks += event.elapsed;

        match event.cause {
            ExitCause::WindowBoundary => self.on_window_boundary(),
            ExitCause::DeviceDone => self.on_device_done(),
            ExitCause::Terminal { code } => Ok(self.finish(code)),
        }
    }

    /// Decodes an `INIT` payload into a window starting at the current tick.
    fn parse_window(&self, data: &[u8], phase: Phase) -> Result<Window, BridgeError> {
        let Some(&[a, b, c, d]) = data.first_chunk::<4>() else {
            return Err(BridgeError::Handshake {
                session: self.session.clone(),
                phase,
                reason: format!("INIT payload of {} bytes is shorter than 4", data.len()),
            });
        };
        let millis = i32::from_le_bytes([a, b, c, d]);
        if data.len() > 4 {
            debug!(extra = data.len() - 4, "ignoring trailing INIT bytes");
        }

        let now = self.sim.current_tick();
        Window::from_millis(millis, self.config.tick_scale, now).ok_or_else(|| {
            BridgeError::InvalidWindow {
                session: self.session.clone(),
                phase,
                millis: i64::from(millis),
            }
        })
    }

    /// Applies an `INIT` received at a window boundary; an unusable one leaves the window as is.
    fn reconfigure_window(&mut self, data: &[u8]) {
        match self.parse_window(data, Phase::SteadyState) {
            Ok(parsed) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(parsed.length());
                }
                info!(window_ticks = parsed.length(), "run-ahead window reconfigured");
            }
            Err(e) => warn!(error = %e, "keeping the current window"),
        }
    }

    fn on_window_boundary(&mut self) -> Result<Step, BridgeError> {
        self.stats.windows += 1;
        if self.sim.bridge_io().state() == DeviceState::DoneSignaled {
            self.sim
                .bridge_io()
                .clear_interrupt()
                .map_err(|e| self.device_error(e))?;
        }

        let request = self
            .channel
            .receive(Some(self.config.exchange_timeout()))
            .map_err(|source| self.transport_error(Phase::SteadyState, source))?;

        let incoming = match request.command {
            Command::Done => {
                info!(tick = self.sim.current_tick(), "peer finished the session");
                return Ok(Step::Finished(Termination::PeerDone));
            }
            Command::ComputeRequest => {
                self.inspect(&request.data);
                Some(request.data)
            }
            Command::Init => {
                self.reconfigure_window(&request.data);
                None
            }
            other => {
                warn!(command = %other, "unexpected command at window boundary; replying anyway");
                None
            }
        };

        let reply = self.compose_reply();
        self.accept_request(incoming)?;
        self.channel
            .send(&Message::compute_response(reply))
            .map_err(|source| self.transport_error(Phase::SteadyState, source))?;
        self.stats.exchanges += 1;

        let now = self.sim.current_tick();
        if let Some(window) = self.window.as_mut() {
            window.restart(now);
        }
        debug!(tick = now, "window boundary exchange complete");
        Ok(Step::Continue)
    }

    fn on_device_done(&mut self) -> Result<Step, BridgeError> {
        self.stats.early_completions += 1;
        self.sim
            .bridge_io()
            .clear_interrupt()
            .map_err(|e| self.device_error(e))?;

        let now = self.sim.current_tick();
        let remaining = self.window.map_or(0, |w| w.remaining(now));
        debug!(tick = now, remaining, "device done; resuming for the rest of the window");
        Ok(Step::Continue)
    }

    fn finish(&mut self, code: u32) -> Step {
        match self.channel.send(&Message::done()) {
            Ok(()) => {}
            Err(e) if e.is_disconnect() => debug!("peer already gone; DONE not delivered"),
            Err(e) => warn!(error = %e, "could not notify peer of the exit"),
        }
        Step::Finished(Termination::FirmwareExit { code })
    }

    fn inspect(&mut self, data: &[u8]) {
        let width = self.config.element_width;
        if let Err(e) = payload::check_element_width(data, width) {
            self.stats.malformed_payloads += 1;
            warn!(%e, "forwarding request bytes unchanged");
        }
        trace!(payload = %payload::describe(data, width), "request payload");
    }

    fn compose_reply(&mut self) -> Vec<u8> {
        let io = self.sim.bridge_io();
        if io.if_done() {
            self.stats.result_responses += 1;
            io.output_data().to_vec()
        } else {
            self.stats.placeholder_responses += 1;
            vec![0; self.config.placeholder_size]
        }
    }

    /// Delivers a request payload to the device, or holds it while the device is busy.
    ///
    /// A payload-less request picks up the held payload; an empty
    /// `COMPUTE_REQUEST` still raises the interrupt on an idle device. A
    /// payload larger than the input buffer is dropped and the request is
    /// treated as payload-less.
    fn accept_request(&mut self, incoming: Option<Vec<u8>>) -> Result<(), BridgeError> {
        let capacity = self.sim.bridge_io().input_capacity();
        let incoming = match incoming {
            Some(data) if data.len() > capacity => {
                self.stats.oversized_inputs += 1;
                warn!(len = data.len(), capacity, "request exceeds the input buffer; not delivered");
                None
            }
            other => other,
        };

        let held = self.held_input.take();
        let (input, fresh) = match incoming {
            Some(data) if !data.is_empty() => {
                if held.is_some() {
                    self.stats.superseded_inputs += 1;
                }
                (data, true)
            }
            Some(empty) => held.map_or((empty, true), |held| (held, false)),
            None => match held {
                Some(held) => (held, false),
                None => return Ok(()),
            },
        };

        let state = self.sim.bridge_io().state();
        if state != DeviceState::Idle {
            if !input.is_empty() {
                if fresh {
                    self.stats.deferred_inputs += 1;
                }
                debug!(%state, len = input.len(), "device busy; holding request payload");
                self.held_input = Some(input);
            }
            return Ok(());
        }

        let io = self.sim.bridge_io();
        let delivered = io
            .update_input_data(&input)
            .and_then(|()| io.raise_interrupt());
        delivered.map_err(|e| self.device_error(e))?;
        self.stats.interrupts_raised += 1;
        Ok(())
    }

    fn transport_error(&self, phase: Phase, source: TransportError) -> BridgeError {
        BridgeError::Transport {
            session: self.session.clone(),
            phase,
            source,
        }
    }

    fn device_error(&self, source: DeviceError) -> BridgeError {
        BridgeError::Device {
            session: self.session.clone(),
            phase: Phase::SteadyState,
            source,
        }
    }
}
