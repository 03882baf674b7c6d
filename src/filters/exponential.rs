use super::{PointFilter, Smoothing, SmoothingState};
use nalgebra::Vector3;

/// Exponential smoothing with an independent divisor per axis.
///
/// Each update moves the state `1/k` of the way towards the sample:
/// `state += (sample - state) / k`. The state starts at the configured
/// initial value rather than the first sample, so the first few outputs
/// ramp in from that value.
pub struct ExponentialFilter {
    divisors: Smoothing,
    initial: SmoothingState,
    state: SmoothingState,
}

impl ExponentialFilter {
    /// Create a new exponential filter
    ///
    /// # Panics
    ///
    /// Panics if any divisor is below 1 or not finite
    #[must_use]
    pub fn new(divisors: Smoothing, initial: SmoothingState) -> Self {
        assert!(divisors.validate().is_ok(), "Divisor must be >= 1");
        Self {
            divisors,
            initial,
            state: initial,
        }
    }

    /// Current divisors
    #[must_use]
    pub const fn divisors(&self) -> Smoothing {
        self.divisors
    }

    fn step(state: f64, sample: f64, k: f64) -> f64 {
        state + (sample - state) / k
    }
}

impl PointFilter for ExponentialFilter {
    fn update(&mut self, sample: Option<Vector3<f64>>) -> SmoothingState {
        if let Some(sample) = sample {
            self.state = SmoothingState::new(
                Self::step(self.state.xs, sample.x, self.divisors.x),
                Self::step(self.state.ys, sample.y, self.divisors.y),
                Self::step(self.state.zs, sample.z, self.divisors.z),
            );
        }
        self.state
    }

    fn retune(&mut self, smoothing: &Smoothing) {
        let pick = |new: f64, old: f64| if new.is_finite() { new.max(1.0) } else { old };
        self.divisors = Smoothing {
            x: pick(smoothing.x, self.divisors.x),
            y: pick(smoothing.y, self.divisors.y),
            z: pick(smoothing.z, self.divisors.z),
        };
    }

    fn state(&self) -> SmoothingState {
        self.state
    }

    fn reset(&mut self) {
        self.state = self.initial;
    }

    fn name(&self) -> &str {
        "ExponentialFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_filter() {
        let mut filter = ExponentialFilter::new(Smoothing::uniform(2.0), SmoothingState::default());

        // Starts from the initial value, not the first sample
        let s1 = filter.update(Some(Vector3::new(10.0, 20.0, 30.0)));
        assert_eq!(s1, SmoothingState::new(5.0, 10.0, 15.0));

        let s2 = filter.update(Some(Vector3::new(10.0, 20.0, 30.0)));
        assert_eq!(s2, SmoothingState::new(7.5, 15.0, 22.5));
    }

    #[test]
    fn test_unit_divisor_snaps() {
        let mut filter = ExponentialFilter::new(Smoothing::uniform(1.0), SmoothingState::new(1.0, 1.0, 1.0));
        let state = filter.update(Some(Vector3::new(-4.0, 0.5, 9.0)));
        assert_eq!(state, SmoothingState::new(-4.0, 0.5, 9.0));
    }

    #[test]
    fn test_axes_are_independent() {
        let smoothing = Smoothing { x: 1.0, y: 2.0, z: 4.0 };
        let mut filter = ExponentialFilter::new(smoothing, SmoothingState::default());
        let state = filter.update(Some(Vector3::new(8.0, 8.0, 8.0)));
        assert_eq!(state, SmoothingState::new(8.0, 4.0, 2.0));
    }

    #[test]
    fn test_retune_clamps_and_ignores_nan() {
        let mut filter = ExponentialFilter::new(Smoothing::uniform(4.0), SmoothingState::default());
        filter.retune(&Smoothing { x: 0.2, y: f64::NAN, z: 6.0 });
        assert_eq!(filter.divisors(), Smoothing { x: 1.0, y: 4.0, z: 6.0 });
    }
}
