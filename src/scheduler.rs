//! Tick sources for the cooperative loops.
//!
//! A loop asks its scheduler for the next tick only after finishing the
//! previous unit of work, which keeps at most one cycle in flight. Ticks
//! carry a timestamp in milliseconds since the scheduler started.

use crate::constants::MS_PER_SECOND;
use crate::{Error, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Source of loop ticks
#[allow(async_fn_in_trait)]
pub trait FrameScheduler {
    /// Wait for the next tick. `None` ends the loop.
    async fn next_tick(&mut self) -> Option<f64>;
}

/// Fixed-rate scheduler backed by a tokio interval
pub struct IntervalScheduler {
    interval: Interval,
    origin: Instant,
}

impl IntervalScheduler {
    /// Tick `hz` times per second; late ticks are skipped, not bunched
    pub fn from_hz(hz: f64) -> Result<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(Error::InvalidInput(format!("Tick rate must be positive, got {hz}")));
        }
        Ok(Self::new(Duration::from_secs_f64(1.0 / hz)))
    }

    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            origin: Instant::now(),
        }
    }
}

impl FrameScheduler for IntervalScheduler {
    async fn next_tick(&mut self) -> Option<f64> {
        let at = self.interval.tick().await;
        Some(at.saturating_duration_since(self.origin).as_secs_f64() * MS_PER_SECOND)
    }
}

/// Scheduler driven by explicit timestamps, for simulated clocks
pub struct ManualScheduler {
    rx: mpsc::UnboundedReceiver<f64>,
}

/// Feeding side of a [`ManualScheduler`]
#[derive(Clone)]
pub struct ManualClock {
    tx: mpsc::UnboundedSender<f64>,
}

impl ManualScheduler {
    /// Create a scheduler and the clock that feeds it
    pub fn channel() -> (ManualClock, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ManualClock { tx }, Self { rx })
    }

    /// Scheduler that yields the given ticks and then ends
    pub fn from_ticks<I: IntoIterator<Item = f64>>(ticks: I) -> Self {
        let (clock, scheduler) = Self::channel();
        for tick in ticks {
            clock.tick(tick);
        }
        scheduler
    }

    /// Ticks spaced `step_ms` apart, starting at zero
    #[allow(clippy::cast_precision_loss)]
    pub fn every(step_ms: f64, count: usize) -> Self {
        Self::from_ticks((0..count).map(|i| i as f64 * step_ms))
    }
}

impl ManualClock {
    /// Queue a tick. Returns false once the scheduler is gone.
    pub fn tick(&self, now_ms: f64) -> bool {
        self.tx.send(now_ms).is_ok()
    }
}

impl FrameScheduler for ManualScheduler {
    async fn next_tick(&mut self) -> Option<f64> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_scheduler_drains_then_ends() {
        let mut scheduler = ManualScheduler::every(5.0, 3);
        assert_eq!(scheduler.next_tick().await, Some(0.0));
        assert_eq!(scheduler.next_tick().await, Some(5.0));
        assert_eq!(scheduler.next_tick().await, Some(10.0));
        assert_eq!(scheduler.next_tick().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_scheduler_advances() {
        let mut scheduler = IntervalScheduler::from_hz(50.0).unwrap();
        let first = scheduler.next_tick().await.unwrap();
        let second = scheduler.next_tick().await.unwrap();
        assert!(first < 1.0);
        assert!(second - first >= 19.0);
    }

    #[test]
    fn test_interval_rejects_zero_rate() {
        assert!(IntervalScheduler::from_hz(0.0).is_err());
        assert!(IntervalScheduler::from_hz(f64::NAN).is_err());
    }
}
