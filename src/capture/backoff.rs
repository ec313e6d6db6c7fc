use std::time::Duration;

use super::change_detection::ChangeDecision;

const MIN_BASE: Duration = Duration::from_millis(1);

/// Adaptive tick interval: stretches by 1.5x while the screen is static,
/// grows linearly on errors, and snaps back to `base` on any real change.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// `base` is at least 1 ms so a zero interval cannot spin the loop.
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(MIN_BASE);
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }

    pub fn record(&mut self, decision: &ChangeDecision) {
        match decision {
            ChangeDecision::Significant { .. } | ChangeDecision::FirstFrame => {
                self.current = self.base;
            }
            ChangeDecision::Insignificant { .. } => {
                let next_ms = (self.current.as_millis() as f64 * 1.5).round() as u64;
                self.current = Duration::from_millis(next_ms).min(self.max);
            }
        }
    }

    pub fn on_error(&mut self) {
        self.current = (self.current + self.base).min(self.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATIC: ChangeDecision = ChangeDecision::Insignificant {
        histogram_delta: 0.0,
        ssim_score: 1.0,
    };

    #[test]
    fn stretches_on_static_frames_until_capped() {
        let mut b = Backoff::new(Duration::from_millis(1000), Duration::from_millis(3000));
        b.record(&STATIC);
        assert_eq!(b.current_delay(), Duration::from_millis(1500));
        b.record(&STATIC);
        assert_eq!(b.current_delay(), Duration::from_millis(2250));
        b.record(&STATIC);
        assert_eq!(b.current_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn resets_on_change() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));
        b.record(&STATIC);
        b.on_error();
        assert_eq!(b.current_delay(), Duration::from_millis(250));
        b.record(&ChangeDecision::Significant { histogram_delta: 0.5, ssim_score: 0.1 });
        assert_eq!(b.current_delay(), Duration::from_millis(100));
    }

    #[test]
    fn max_below_base_is_clamped() {
        let mut b = Backoff::new(Duration::from_millis(500), Duration::from_millis(10));
        b.on_error();
        assert_eq!(b.current_delay(), Duration::from_millis(500));
    }

    #[test]
    fn zero_base_is_raised_to_one_millisecond() {
        let mut b = Backoff::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(b.current_delay(), Duration::from_millis(1));
        b.record(&STATIC);
        b.record(&STATIC);
        assert_eq!(b.current_delay(), Duration::from_millis(1));
        b.on_error();
        assert_eq!(b.current_delay(), Duration::from_millis(1));
    }
}
