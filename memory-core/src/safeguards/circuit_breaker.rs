//! Per-session circuit breaker.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Breaker state for one session.
#[derive(Debug, Clone, Copy)]
struct SessionState {
    consecutive_empty: u32,
    tripped_at: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            consecutive_empty: 0,
            tripped_at: None,
        }
    }
}

/// Trips per session after too many consecutive empty recalls, blocking
/// recall for a cooldown window.
pub struct CircuitBreaker {
    sessions: Mutex<HashMap<String, SessionState>>,
    max_consecutive_empty: u32,
    cooldown_ms: u64,
}

impl CircuitBreaker {
    /// Construct a breaker from safeguard configuration.
    #[must_use]
    pub fn new(max_consecutive_empty: u32, cooldown_ms: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_consecutive_empty,
            cooldown_ms,
        }
    }

    /// Whether recall should be blocked for `session` right now. Auto-resets
    /// the session to closed if the cooldown has elapsed.
    #[must_use]
    pub fn is_tripped(&self, session: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session.to_string()).or_default();
        if let Some(tripped_at) = state.tripped_at {
            let elapsed = (Utc::now() - tripped_at).num_milliseconds().max(0) as u64;
            if elapsed >= self.cooldown_ms {
                state.tripped_at = None;
                state.consecutive_empty = 0;
                false
            } else {
                true
            }
        } else {
            false
        }
    }

    /// Record the outcome of a recall for `session`: a non-empty result
    /// resets the counter; an empty result increments it and trips the
    /// breaker once the threshold is reached.
    pub fn record_outcome(&self, session: &str, was_empty: bool) {
        let mut sessions = self.sessions.lock();
        let state = sessions.entry(session.to_string()).or_default();
        if was_empty {
            state.consecutive_empty += 1;
            if state.consecutive_empty >= self.max_consecutive_empty && state.tripped_at.is_none() {
                state.tripped_at = Some(Utc::now());
            }
        } else {
            state.consecutive_empty = 0;
            state.tripped_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_max_consecutive_empty() {
        let breaker = CircuitBreaker::new(5, 5 * 60 * 1000);
        for _ in 0..5 {
            assert!(!breaker.is_tripped("s1"));
            breaker.record_outcome("s1", true);
        }
        assert!(breaker.is_tripped("s1"));
    }

    #[test]
    fn non_empty_result_resets_counter() {
        let breaker = CircuitBreaker::new(3, 5 * 60 * 1000);
        breaker.record_outcome("s1", true);
        breaker.record_outcome("s1", true);
        breaker.record_outcome("s1", false);
        breaker.record_outcome("s1", true);
        breaker.record_outcome("s1", true);
        assert!(!breaker.is_tripped("s1"));
    }

    #[test]
    fn sessions_are_independent() {
        let breaker = CircuitBreaker::new(1, 5 * 60 * 1000);
        breaker.record_outcome("s1", true);
        assert!(breaker.is_tripped("s1"));
        assert!(!breaker.is_tripped("s2"));
    }
}
