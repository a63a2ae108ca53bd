use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter, used by transport-level reconnects (base 1s,
/// factor 2, cap 60s, 30% jitter). Not used for task retry, which is a fixed
/// `retryDelayMs` on the task model — this is purely for listener reconnection loops.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    factor: f64,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, factor: f64, max: Duration, jitter: f64) -> Self {
        Self { base, factor, max, jitter }
    }

    /// The standard transport-reconnect policy.
    pub fn transport_default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(60), 0.3)
    }

    /// `attempt` is 0-based (first retry after the initial failure is attempt 0).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = exp.min(self.max.as_secs_f64());
        let jitter_range = capped * self.jitter;
        let jittered = if jitter_range > 0.0 {
            let delta = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped + delta).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_up_to_cap() {
        let b = Backoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(60), 0.0);
        assert_eq!(b.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(b.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(b.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(b.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_non_negative() {
        let b = Backoff::transport_default();
        for attempt in 0..10 {
            assert!(b.delay_for_attempt(attempt).as_secs_f64() >= 0.0);
        }
    }
}
