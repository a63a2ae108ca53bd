use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Tracks the last time each key fired and reports whether enough of `window` has
/// elapsed to fire again. Used by the (external) file watcher to coalesce bursts of
/// filesystem events into a single re-run; kept synchronous and timer-free here so this
/// crate doesn't need an async runtime dependency.
#[derive(Debug, Default)]
pub struct Debouncer<K: Eq + Hash> {
    last_fired: HashMap<K, Instant>,
}

impl<K: Eq + Hash> Debouncer<K> {
    pub fn new() -> Self {
        Self {
            last_fired: HashMap::new(),
        }
    }

    /// Returns `true` (and records `now`) if `key` is allowed to fire: either it has
    /// never fired, or `window` has elapsed since its last firing.
    pub fn should_fire(&mut self, key: K, now: Instant, window: Duration) -> bool {
        let allowed = match self.last_fired.get(&key) {
            Some(last) => now.duration_since(*last) >= window,
            None => true,
        };
        if allowed {
            self.last_fired.insert(key, now);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_fires() {
        let mut d: Debouncer<&str> = Debouncer::new();
        assert!(d.should_fire("a", Instant::now(), Duration::from_millis(500)));
    }

    #[test]
    fn rapid_second_call_is_suppressed() {
        let mut d: Debouncer<&str> = Debouncer::new();
        let t0 = Instant::now();
        assert!(d.should_fire("a", t0, Duration::from_millis(500)));
        assert!(!d.should_fire("a", t0 + Duration::from_millis(10), Duration::from_millis(500)));
    }

    #[test]
    fn fires_again_after_window() {
        let mut d: Debouncer<&str> = Debouncer::new();
        let t0 = Instant::now();
        assert!(d.should_fire("a", t0, Duration::from_millis(500)));
        assert!(d.should_fire("a", t0 + Duration::from_millis(600), Duration::from_millis(500)));
    }
}
