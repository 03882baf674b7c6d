//! Cadence gating and detector timestamps.

/// Lets a cycle through only when `min_interval_ms` has passed since the
/// last cycle that ran. Ticks in between are dropped, which decouples
/// detection cost from the rate the loop is woken at.
#[derive(Debug, Clone)]
pub struct CadenceGate {
    min_interval_ms: f64,
    last_run_ms: Option<f64>,
}

impl CadenceGate {
    #[must_use]
    pub const fn new(min_interval_ms: f64) -> Self {
        Self {
            min_interval_ms,
            last_run_ms: None,
        }
    }

    /// Whether a cycle at `now_ms` may run. The first check always passes.
    #[must_use]
    pub fn is_open(&self, now_ms: f64) -> bool {
        self.last_run_ms
            .map_or(true, |last| now_ms - last >= self.min_interval_ms)
    }

    /// Record that a cycle ran at `now_ms`
    pub fn mark(&mut self, now_ms: f64) {
        self.last_run_ms = Some(now_ms);
    }
}

/// Strictly increasing millisecond timestamps for video-mode inference
#[derive(Debug, Clone, Default)]
pub struct TimestampSequence {
    last: Option<u64>,
}

impl TimestampSequence {
    /// Timestamp for a cycle at `now_ms`, bumped past the previous one if
    /// the clock did not advance by a whole millisecond
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn next(&mut self, now_ms: f64) -> u64 {
        let candidate = if now_ms.is_finite() { now_ms.max(0.0).round() as u64 } else { 0 };
        let ts = match self.last {
            Some(last) if candidate <= last => last + 1,
            _ => candidate,
        };
        self.last = Some(ts);
        ts
    }
}
