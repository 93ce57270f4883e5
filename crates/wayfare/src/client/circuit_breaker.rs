use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Failures before the general-purpose client opens a breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// How long an open breaker stays open after its last failure
pub const DEFAULT_RESET_WINDOW: Duration = Duration::from_secs(60);

/// Snapshot of one key's breaker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerState {
    /// Consecutive terminal failures
    pub failures: u32,
    /// When the last failure was recorded
    pub last_failure: Instant,
    /// Requests fail fast while set
    pub open: bool,
}

/// Per-key circuit breakers
///
/// A key has no state until its first failure and loses it again on
/// success or reset. An open breaker closes on its own once the reset
/// window has passed since the last failure.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    states: Arc<DashMap<String, BreakerState>>,
    failure_threshold: u32,
    reset_window: Duration,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_WINDOW)
    }
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, reset_window: Duration) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            failure_threshold: failure_threshold.max(1),
            reset_window,
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn reset_window(&self) -> Duration {
        self.reset_window
    }

    fn window_elapsed(&self, state: &BreakerState) -> bool {
        state.last_failure.elapsed() > self.reset_window
    }

    /// Check if we can execute a request for `key`
    ///
    /// Closes (and forgets) an open breaker whose window has elapsed.
    pub fn allow_request(&self, key: &str) -> bool {
        // Drop the map guard before removing
        let expired = match self.states.get(key) {
            None => return true,
            Some(state) if !state.open => return true,
            Some(state) => self.window_elapsed(&state),
        };

        if expired {
            self.states.remove(key);
            debug!(target: "wayfare", key = %key, "Circuit breaker reset window elapsed");
        }
        expired
    }

    /// Whether `key` would currently fail fast
    pub fn is_open(&self, key: &str) -> bool {
        self.states
            .get(key)
            .map(|state| state.open && !self.window_elapsed(&state))
            .unwrap_or(false)
    }

    /// Report a terminal failure
    ///
    /// Returns `true` if this failure opened the breaker.
    pub fn record_failure(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.states.entry(key.to_string()).or_insert(BreakerState {
            failures: 0,
            last_failure: now,
            open: false,
        });
        state.failures += 1;
        state.last_failure = now;

        let opened = !state.open && state.failures >= self.failure_threshold;
        if opened {
            state.open = true;
        }
        opened
    }

    /// Report success
    pub fn record_success(&self, key: &str) {
        self.states.remove(key);
    }

    /// Manually close a breaker
    ///
    /// Returns `true` if the key had any state.
    pub fn reset(&self, key: &str) -> bool {
        self.states.remove(key).is_some()
    }

    /// Forget every breaker
    pub fn clear(&self) {
        self.states.clear();
    }

    /// Current state for `key`
    pub fn state(&self, key: &str) -> Option<BreakerState> {
        self.states.get(key).map(|state| *state)
    }

    /// Number of breakers currently failing fast
    pub fn open_count(&self) -> usize {
        self.states
            .iter()
            .filter(|state| state.open && !self.window_elapsed(&state))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let breakers = BreakerRegistry::default();
        for _ in 0..4 {
            assert!(!breakers.record_failure("poi"));
            assert!(breakers.allow_request("poi"));
        }
        assert!(breakers.record_failure("poi"));
        assert!(!breakers.allow_request("poi"));
        assert!(breakers.is_open("poi"));
        assert_eq!(breakers.open_count(), 1);

        // Other keys are unaffected
        assert!(breakers.allow_request("events"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_after_reset_window() {
        let breakers = BreakerRegistry::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            breakers.record_failure("maps");
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!breakers.allow_request("maps"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!breakers.is_open("maps"));
        assert!(breakers.allow_request("maps"));
        assert!(breakers.state("maps").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_forgets_failures() {
        let breakers = BreakerRegistry::default();
        for _ in 0..4 {
            breakers.record_failure("weather");
        }
        breakers.record_success("weather");
        assert!(breakers.state("weather").is_none());

        // Count starts over
        assert!(!breakers.record_failure("weather"));
        assert_eq!(breakers.state("weather").unwrap().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reset() {
        let breakers = BreakerRegistry::new(1, DEFAULT_RESET_WINDOW);
        assert!(breakers.record_failure("k"));
        assert!(breakers.reset("k"));
        assert!(!breakers.reset("k"));
        assert!(breakers.allow_request("k"));
    }
}
