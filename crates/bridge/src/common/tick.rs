//! Simulator time.

/// Simulator time unit. The hardware simulator counts picoseconds.
pub type Tick = u64;

/// Converts an external-runtime duration in milliseconds to ticks.
///
/// Returns `None` when the product does not fit in a [`Tick`].
pub const fn ms_to_ticks(ms: u64, ticks_per_ms: u64) -> Option<Tick> {
    ms.checked_mul(ticks_per_ms)
}
