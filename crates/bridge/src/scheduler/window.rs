//! Run-ahead window bookkeeping.

use crate::common::{Tick, ms_to_ticks};

/// The span of simulated time the hardware simulator may run before the
/// next exchange with the external runtime.
///
/// The remaining budget is always derived from `length` and `start`, so an
/// early stop inside the window never grows the next exchange interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    length: Tick,
    start: Tick,
}

impl Window {
    /// Creates a window of `length` ticks starting at `start`.
    pub const fn new(length: Tick, start: Tick) -> Self {
        Self { length, start }
    }

    /// Creates a window from a length in milliseconds as sent in `INIT`.
    ///
    /// Returns `None` for non-positive lengths or lengths that overflow a [`Tick`].
    pub const fn from_millis(ms: i32, tick_scale: u64, start: Tick) -> Option<Self> {
        if ms <= 0 {
            return None;
        }
        match ms_to_ticks(ms as u64, tick_scale) {
            Some(length) if length > 0 => Some(Self::new(length, start)),
            _ => None,
        }
    }

    /// Returns the window length in ticks.
    pub const fn length(&self) -> Tick {
        self.length
    }

    /// Returns the tick at which the window started.
    pub const fn start(&self) -> Tick {
        self.start
    }

    /// Returns the ticks consumed at `now`.
    pub const fn elapsed(&self, now: Tick) -> Tick {
        now.saturating_sub(self.start)
    }

    /// Returns the budget left at `now`; zero once the window is used up.
    pub const fn remaining(&self, now: Tick) -> Tick {
        self.length.saturating_sub(self.elapsed(now))
    }

    /// Starts the next window at `now`.
    pub const fn restart(&mut self, now: Tick) {
        self.start = now;
    }

    /// Changes the length, keeping the start.
    pub const fn resize(&mut self, length: Tick) {
        self.length = length;
    }
}
