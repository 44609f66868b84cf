//! Token budget.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

struct TurnUsage {
    tokens: u32,
    last_seen: DateTime<Utc>,
}

struct SessionUsage {
    tokens: u32,
}

/// Three-tier token budget: per-recall, per-turn, per-session. Iterates
/// candidate snippets in relevance order and stops accepting once any cap
/// would be exceeded, rather than skipping ahead to cheaper results.
pub struct TokenBudget {
    per_recall_cap: u32,
    per_turn_cap: u32,
    per_session_cap: u32,
    turn_max_age_ms: u64,
    turn_tracking_max_count: usize,
    turns: Mutex<HashMap<String, TurnUsage>>,
    sessions: Mutex<HashMap<String, SessionUsage>>,
}

/// Outcome of applying the budget to one candidate snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// Snippet fits within all three caps; it was accepted and accounted.
    Accept,
    /// Snippet would exceed a cap; recall should stop here.
    Reject,
}

impl TokenBudget {
    /// Construct a budget tracker from safeguard configuration.
    #[must_use]
    pub fn new(
        per_recall_cap: u32,
        per_turn_cap: u32,
        per_session_cap: u32,
        turn_max_age_ms: u64,
        turn_tracking_max_count: usize,
    ) -> Self {
        Self {
            per_recall_cap,
            per_turn_cap,
            per_session_cap,
            turn_max_age_ms,
            turn_tracking_max_count,
            turns: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit `tokens` more against `recall_tokens_so_far`, `turn_id`,
    /// and `session_id`. On `Accept`, the turn/session counters are updated.
    pub fn admit(
        &self,
        recall_tokens_so_far: u32,
        tokens: u32,
        turn_id: &str,
        session_id: &str,
    ) -> BudgetDecision {
        if recall_tokens_so_far + tokens > self.per_recall_cap {
            return BudgetDecision::Reject;
        }

        self.cleanup_turns();

        let mut turns = self.turns.lock();
        let turn_tokens = turns.get(turn_id).map_or(0, |t| t.tokens);
        if turn_tokens + tokens > self.per_turn_cap {
            return BudgetDecision::Reject;
        }

        let mut sessions = self.sessions.lock();
        let session_tokens = sessions.get(session_id).map_or(0, |s| s.tokens);
        if session_tokens + tokens > self.per_session_cap {
            return BudgetDecision::Reject;
        }

        turns
            .entry(turn_id.to_string())
            .and_modify(|t| {
                t.tokens += tokens;
                t.last_seen = Utc::now();
            })
            .or_insert(TurnUsage {
                tokens,
                last_seen: Utc::now(),
            });
        sessions
            .entry(session_id.to_string())
            .and_modify(|s| s.tokens += tokens)
            .or_insert(SessionUsage { tokens });

        BudgetDecision::Accept
    }

    /// Utilization of the per-turn cap, in `[0, 1]`.
    #[must_use]
    pub fn turn_utilization(&self, turn_id: &str) -> f32 {
        let turns = self.turns.lock();
        let tokens = turns.get(turn_id).map_or(0, |t| t.tokens);
        tokens as f32 / self.per_turn_cap as f32
    }

    /// Utilization of the per-session cap, in `[0, 1]`.
    #[must_use]
    pub fn session_utilization(&self, session_id: &str) -> f32 {
        let sessions = self.sessions.lock();
        let tokens = sessions.get(session_id).map_or(0, |s| s.tokens);
        tokens as f32 / self.per_session_cap as f32
    }

    /// Prune turns by count (keep the most recent `turn_tracking_max_count`)
    /// and by age (`turn_max_age_ms`).
    fn cleanup_turns(&self) {
        let mut turns = self.turns.lock();
        let now = Utc::now();
        turns.retain(|_, usage| {
            (now - usage.last_seen).num_milliseconds().max(0) as u64 <= self.turn_max_age_ms
        });
        if turns.len() > self.turn_tracking_max_count {
            let mut entries: Vec<(String, DateTime<Utc>)> = turns
                .iter()
                .map(|(k, v)| (k.clone(), v.last_seen))
                .collect();
            entries.sort_by_key(|(_, last_seen)| *last_seen);
            let excess = entries.len() - self.turn_tracking_max_count;
            for (key, _) in entries.into_iter().take(excess) {
                turns.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_within_all_caps() {
        let budget = TokenBudget::new(20, 50, 100, 30 * 60 * 1000, 200);
        assert_eq!(budget.admit(0, 15, "t1", "s1"), BudgetDecision::Accept);
    }

    #[test]
    fn rejects_when_recall_cap_exceeded() {
        let budget = TokenBudget::new(20, 50, 100, 30 * 60 * 1000, 200);
        assert_eq!(budget.admit(15, 10, "t1", "s1"), BudgetDecision::Reject);
    }

    #[test]
    fn rejects_when_turn_cap_exceeded() {
        let budget = TokenBudget::new(1000, 20, 1000, 30 * 60 * 1000, 200);
        assert_eq!(budget.admit(0, 15, "t1", "s1"), BudgetDecision::Accept);
        assert_eq!(budget.admit(0, 10, "t1", "s1"), BudgetDecision::Reject);
    }

    #[test]
    fn budget_truncation_scenario_from_spec() {
        // per_recall_cap=20, max_tokens_per_snippet=100, 5 results of ~15
        // tokens each -> exactly 1 accepted, 15 tokens recorded.
        let budget = TokenBudget::new(20, 1000, 1000, 30 * 60 * 1000, 200);
        let mut accepted = 0;
        let mut recorded = 0;
        for _ in 0..5 {
            if budget.admit(recorded, 15, "t1", "s1") == BudgetDecision::Accept {
                accepted += 1;
                recorded += 15;
            } else {
                break;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(recorded, 15);
    }
}
