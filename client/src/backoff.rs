//! Full-jitter exponential backoff for reconnect attempts.

use rand::Rng;
use std::time::Duration;

/// Tuning for [`Backoff`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub min: u32,
    pub max: u32,
    pub unit: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: 10,
            unit: Duration::from_millis(100),
        }
    }
}

/// Attempt counter bounded to `[min, max]`
///
/// The delay after a failure is `unit * floor(random * 2^counter)`, so the
/// worst case is bounded by `unit * 2^max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    counter: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let max = config.max.max(config.min);
        let config = BackoffConfig { max, ..config };
        Self {
            counter: config.min,
            config,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Largest delay this backoff can ever produce
    pub fn ceiling(&self) -> Duration {
        self.config.unit.saturating_mul(1u32 << self.config.max.min(31))
    }

    pub fn reset(&mut self) {
        self.counter = self.config.min;
    }

    /// Records a failed attempt and returns how long to wait before the next
    pub fn fail(&mut self) -> Duration {
        self.fail_with(&mut rand::thread_rng())
    }

    pub fn fail_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        self.counter = (self.counter + 1).min(self.config.max);
        self.delay_with(rng)
    }

    /// Samples a delay for the current counter without changing it
    pub fn delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let window = f64::from(1u32 << self.counter.min(31));
        let steps = (rng.gen::<f64>() * window).floor() as u32;
        self.config.unit.saturating_mul(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> BackoffConfig {
        BackoffConfig {
            min: 0,
            max: 10,
            unit: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_delays_stay_within_ceiling() {
        let mut backoff = Backoff::new(config());
        let ceiling = Duration::from_millis(100 * 1024);
        assert_eq!(backoff.ceiling(), ceiling);

        for _ in 0..1000 {
            let delay = backoff.fail();
            assert!(delay <= ceiling, "delay {delay:?} above ceiling");
        }
        assert_eq!(backoff.counter(), 10);
    }

    #[test]
    fn test_single_failure_after_reset() {
        let mut backoff = Backoff::new(config());
        for _ in 0..5 {
            backoff.fail();
        }
        backoff.reset();
        assert_eq!(backoff.counter(), 0);

        let delay = backoff.fail();
        assert!(delay < Duration::from_millis(200));
        assert_eq!(backoff.counter(), 1);
    }

    #[test]
    fn test_delay_is_a_whole_number_of_units() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut backoff = Backoff::new(config());
        for _ in 0..50 {
            let delay = backoff.fail_with(&mut rng);
            assert_eq!(delay.as_millis() % 100, 0);
        }
    }

    #[test]
    fn test_counter_respects_min() {
        let mut backoff = Backoff::new(BackoffConfig {
            min: 3,
            max: 4,
            unit: Duration::from_millis(10),
        });
        assert_eq!(backoff.counter(), 3);
        backoff.fail();
        backoff.fail();
        backoff.fail();
        assert_eq!(backoff.counter(), 4);
        backoff.reset();
        assert_eq!(backoff.counter(), 3);
    }

    #[test]
    fn test_zero_counter_never_waits() {
        let backoff = Backoff::new(config());
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(backoff.delay_with(&mut rng), Duration::ZERO);
        }
    }
}
