//! Metrics snapshot and transition-based alerts.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

/// A monitored alert condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertCondition {
    /// Session token budget utilization crossed the high-watermark.
    SessionBudgetHigh,
    /// Turn token budget utilization crossed the high-watermark.
    TurnBudgetHigh,
    /// The circuit breaker tripped for a session.
    CircuitBreakerTripped,
}

/// One emitted alert.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Which condition fired.
    pub condition: AlertCondition,
    /// The session the alert applies to.
    pub session: String,
}

type ListenerFn = Box<dyn Fn(&Alert) + Send + Sync>;

/// Tracks `(condition, session)` active/inactive state and emits an alert
/// only on the `inactive -> active` transition; listeners run in isolation
/// so one panicking/erroring listener cannot suppress the others.
pub struct MetricsMonitor {
    active: Mutex<HashMap<(AlertCondition, String), bool>>,
    history: Mutex<VecDeque<Alert>>,
    listeners: Mutex<Vec<ListenerFn>>,
    high_watermark: f32,
    history_cap: usize,
}

impl MetricsMonitor {
    /// Construct a monitor with the given budget-utilization high-watermark
    /// (default 0.8) and alert history cap (default 100).
    #[must_use]
    pub fn new(high_watermark: f32) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            listeners: Mutex::new(Vec::new()),
            high_watermark,
            history_cap: 100,
        }
    }

    /// Register a listener invoked on every emitted alert. A listener
    /// panic is caught so other listeners still run.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Evaluate budget utilizations and circuit breaker state for `session`,
    /// emitting alerts on any `inactive -> active` transition.
    pub fn observe(
        &self,
        session: &str,
        session_utilization: f32,
        turn_utilization: f32,
        circuit_breaker_tripped: bool,
    ) {
        self.evaluate(
            AlertCondition::SessionBudgetHigh,
            session,
            session_utilization >= self.high_watermark,
        );
        self.evaluate(
            AlertCondition::TurnBudgetHigh,
            session,
            turn_utilization >= self.high_watermark,
        );
        self.evaluate(
            AlertCondition::CircuitBreakerTripped,
            session,
            circuit_breaker_tripped,
        );
    }

    fn evaluate(&self, condition: AlertCondition, session: &str, is_active: bool) {
        let key = (condition, session.to_string());
        let mut active = self.active.lock();
        let was_active = active.get(&key).copied().unwrap_or(false);
        active.insert(key, is_active);
        drop(active);

        if is_active && !was_active {
            self.emit(Alert {
                condition,
                session: session.to_string(),
            });
        }
    }

    fn emit(&self, alert: Alert) {
        {
            let mut history = self.history.lock();
            history.push_back(alert.clone());
            while history.len() > self.history_cap {
                history.pop_front();
            }
        }
        for listener in self.listeners.lock().iter() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&alert)));
            if let Err(e) = result {
                tracing::warn!(panic = ?e, "alert listener panicked, continuing");
            }
        }
    }

    /// Snapshot of emitted alerts, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Alert> {
        self.history.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn emits_only_on_transition() {
        let monitor = MetricsMonitor::new(0.8);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        monitor.add_listener(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        monitor.observe("s1", 0.9, 0.1, false); // session_budget_high: inactive->active, fires
        monitor.observe("s1", 0.95, 0.1, false); // still active, no refire
        monitor.observe("s1", 0.5, 0.1, false); // active->inactive, clears
        monitor.observe("s1", 0.9, 0.1, false); // inactive->active again, fires

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_panic_does_not_block_others() {
        let monitor = MetricsMonitor::new(0.8);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        monitor.add_listener(|_| panic!("boom"));
        monitor.add_listener(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        monitor.observe("s1", 0.9, 0.1, false);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn history_is_capped() {
        let monitor = MetricsMonitor::new(0.0);
        for i in 0..150 {
            monitor.observe(&format!("s{i}"), 1.0, 0.0, false);
        }
        assert_eq!(monitor.history().len(), 100);
    }
}
