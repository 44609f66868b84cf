//! The safeguard stack (component J), centralized behind a
//! single [`Safeguards::pre_gate`] / [`Safeguards::post_gate`] entry point
//! so [`crate::memory::MemoryService`] doesn't scatter cross-cutting state.

pub mod budget;
pub mod circuit_breaker;
pub mod metrics;
pub mod session_dedup;
pub mod trigger;
pub mod truncate;

pub use budget::{BudgetDecision, TokenBudget};
pub use circuit_breaker::CircuitBreaker;
pub use metrics::{Alert, AlertCondition, MetricsMonitor};
pub use session_dedup::{IdentityKey, SessionDedup};
pub use trigger::SmartTrigger;

use crate::types::{RecallHit, SafeguardConfig, SkipReason};

/// Centralizes the safeguard stack's fixed application order: smart trigger
/// → circuit breaker → snippet truncator → token budget → session dedup →
/// metrics/alerts.
pub struct Safeguards {
    trigger: SmartTrigger,
    circuit_breaker: CircuitBreaker,
    budget: TokenBudget,
    session_dedup: SessionDedup,
    metrics: MetricsMonitor,
    max_tokens_per_snippet: u32,
}

impl Safeguards {
    /// Construct the full safeguard stack from configuration.
    #[must_use]
    pub fn new(config: SafeguardConfig) -> Self {
        Self {
            trigger: SmartTrigger::new(
                config.smart_trigger_min_query_length,
                config.smart_trigger_skip_emoji_only,
            ),
            circuit_breaker: CircuitBreaker::new(
                config.circuit_breaker_max_empty,
                config.circuit_breaker_cooldown_ms,
            ),
            budget: TokenBudget::new(
                config.per_recall_cap,
                config.per_turn_cap,
                config.per_session_cap,
                config.turn_max_age_ms,
                config.turn_tracking_max_count,
            ),
            session_dedup: SessionDedup::new(
                config.session_dedup_max_sessions,
                config.session_dedup_cooldown_ms,
            ),
            metrics: MetricsMonitor::new(0.8),
            max_tokens_per_snippet: config.max_tokens_per_snippet,
        }
    }

    /// Register an alert listener.
    pub fn add_alert_listener<F>(&self, listener: F)
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.metrics.add_listener(listener);
    }

    /// Steps 1–2: evaluate whether `query` should be skipped for `session`
    /// before any retrieval work happens.
    #[must_use]
    pub fn pre_gate(&self, query: &str, session: &str) -> Option<SkipReason> {
        if self.trigger.should_skip(query) {
            return Some(SkipReason::SmartTrigger);
        }
        if self.circuit_breaker.is_tripped(session) {
            return Some(SkipReason::CircuitBreaker);
        }
        None
    }

    /// Steps 3–6: truncate snippets, enforce the token budget (stopping at
    /// the first result that would exceed any cap), suppress
    /// session-duplicate results, update the circuit breaker with this
    /// recall's outcome, and evaluate alert transitions.
    ///
    /// `identity_key_for` builds each hit's session-dedup identity key.
    #[must_use]
    pub fn post_gate(
        &self,
        session: &str,
        turn_id: &str,
        hits: Vec<RecallHit>,
        identity_key_for: impl Fn(&RecallHit) -> IdentityKey,
    ) -> Vec<RecallHit> {
        let mut accepted = Vec::with_capacity(hits.len());
        let mut recall_tokens = 0u32;

        for mut hit in hits {
            let (truncated, tokens) =
                truncate::truncate_snippet(&hit.memory.content, self.max_tokens_per_snippet);

            match self
                .budget
                .admit(recall_tokens, tokens, turn_id, session)
            {
                BudgetDecision::Reject => break,
                BudgetDecision::Accept => {}
            }
            recall_tokens += tokens;

            let key = identity_key_for(&hit);
            if self.session_dedup.check_and_record(session, key) {
                continue;
            }

            hit.memory.content = truncated;
            accepted.push(hit);
        }

        self.circuit_breaker
            .record_outcome(session, accepted.is_empty());
        self.metrics.observe(
            session,
            self.budget.session_utilization(session),
            self.budget.turn_utilization(turn_id),
            self.circuit_breaker.is_tripped(session),
        );

        accepted
    }

    /// Current alert history, oldest first.
    #[must_use]
    pub fn alert_history(&self) -> Vec<Alert> {
        self.metrics.history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryEntry, RetrievalMethod, Scope, SourceType};
    use chrono::Utc;
    use uuid::Uuid;

    fn hit(content: &str) -> RecallHit {
        RecallHit {
            memory: MemoryEntry {
                id: Uuid::new_v4(),
                content: content.to_string(),
                embedding: None,
                source_instance: "test".to_string(),
                source_type: SourceType::Deliberate,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                tags: Default::default(),
                context: None,
                confidence: 1.0,
                supersedes: None,
                scope: Scope::Personal,
                workspace_id: None,
                user_id: None,
                model_id: None,
            },
            similarity_score: 0.9,
            retrieval_time_ms: 0,
            retrieval_method: RetrievalMethod::Vector,
        }
    }

    #[test]
    fn pre_gate_skips_trivial_query() {
        let safeguards = Safeguards::new(SafeguardConfig::default());
        assert_eq!(
            safeguards.pre_gate("hi", "s1"),
            Some(SkipReason::SmartTrigger)
        );
    }

    #[test]
    fn pre_gate_allows_real_query() {
        let safeguards = Safeguards::new(SafeguardConfig::default());
        assert_eq!(safeguards.pre_gate("how does auth work", "s1"), None);
    }

    #[test]
    fn post_gate_truncates_and_dedups() {
        let safeguards = Safeguards::new(SafeguardConfig::default());
        let h = hit("Auth service uses JWT with RS256");
        let key = |_h: &RecallHit| IdentityKey::from_lines("mem", 0, 0);
        let out = safeguards.post_gate("s1", "t1", vec![h.clone()], key);
        assert_eq!(out.len(), 1);
        let out2 = safeguards.post_gate("s1", "t1", vec![h], key);
        assert_eq!(out2.len(), 0, "same identity key within cooldown must be suppressed");
    }
}
