//! Query expander.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::storage::LearnedStatePersistence;
use crate::types::LearnedConfig;

const STOPWORDS: &[&str] = &[
    "what", "who", "when", "where", "how", "the", "is", "are", "do", "does", "did", "can", "my",
    "a", "an", "for", "and", "that", "this",
];

static WHAT_IS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^what\s+(?:is\s+)?(?:my|the)\s+(.+?)\??$").expect("regex"));
static WHAT_DO_I: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^what\s+(.+?)\s+do\s+i\s+(.+?)\??$").expect("regex")
});
static WHO_IS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^who\s+(?:is\s+)?(?:my|the)\s+(.+?)\??$").expect("regex"));
static WHEN_IS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^when\s+(?:is|do|does|did)\s+(?:my|the)\s+(.+?)\??$").expect("regex")
});
static WHERE_IS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^where\s+(?:is|do|does|did)\s+(?:my|the|i)\s+(.+?)\??$").expect("regex")
});
static HOW_DO_I: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^how\s+(?:do|does|did|can)\s+i\s+(.+?)\??$").expect("regex")
});
static IMPERATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:get|find|show|list|recall|tell me)\s+(?:me\s+)?(?:my|the)\s+(.+?)\??$")
        .expect("regex")
});

/// Closed seed map for synonym expansion.
const SYNONYM_SEEDS: &[(&str, &[&str])] = &[
    ("medical care", &["doctor", "clinic", "health"]),
    ("life partner", &["spouse", "husband", "wife"]),
    ("code editor", &["ide", "vim", "vscode"]),
];

/// Generates up to `max_variants` query rewrites from a single
/// natural-language query.
pub struct QueryExpander {
    persistence: Option<Arc<dyn LearnedStatePersistence>>,
    max_variants: usize,
}

impl QueryExpander {
    /// Construct an expander, optionally backed by learned-expansion
    /// persistence.
    #[must_use]
    pub fn new(persistence: Option<Arc<dyn LearnedStatePersistence>>, config: LearnedConfig) -> Self {
        Self {
            persistence,
            max_variants: config.expander_max_variants,
        }
    }

    /// Expand `query` into at most [`Self::max_variants`] variants,
    /// including `query` itself as the first element.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let mut variants = Vec::with_capacity(self.max_variants);
        variants.push(query.to_string());

        if let Some(x) = wh_rule_expand(query) {
            for v in x {
                push_unique(&mut variants, v);
            }
        }

        for (phrase, synonyms) in SYNONYM_SEEDS {
            if query.to_lowercase().contains(phrase) {
                for syn in *synonyms {
                    push_unique(&mut variants, (*syn).to_string());
                }
                let substituted = query.to_lowercase().replacen(phrase, "", 1);
                push_unique(&mut variants, substituted.trim().to_string());
            }
        }

        if let Some(persistence) = &self.persistence {
            let normalized = crate::learned::cache::normalize(query);
            match persistence.learned_expansions(&normalized).await {
                Ok(learned) => {
                    for exp in learned.into_iter().take(5) {
                        push_unique(&mut variants, exp.variant);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "learned expansion lookup failed, continuing without it");
                }
            }
        }

        push_unique(&mut variants, keyword_fallback(query));

        variants.truncate(self.max_variants);
        variants
    }
}

fn push_unique(variants: &mut Vec<String>, candidate: String) {
    if candidate.is_empty() {
        return;
    }
    if !variants.iter().any(|v| v.eq_ignore_ascii_case(&candidate)) {
        variants.push(candidate);
    }
}

/// Apply the first matching wh-rule; returns `None` if no rule fires.
fn wh_rule_expand(query: &str) -> Option<Vec<String>> {
    let trimmed = query.trim();
    if let Some(caps) = WHAT_IS.captures(trimmed) {
        let x = caps[1].trim().to_string();
        return Some(vec![
            x.clone(),
            format!("my {x}"),
            format!("{x} preference"),
            format!("favorite {x}"),
        ]);
    }
    if let Some(caps) = WHAT_DO_I.captures(trimmed) {
        let x = caps[1].trim().to_string();
        let y = caps[2].trim().to_string();
        return Some(vec![
            format!("{x} {y}"),
            format!("{x} preference"),
            format!("my {x}"),
            x,
        ]);
    }
    if let Some(caps) = WHO_IS.captures(trimmed) {
        let x = caps[1].trim().to_string();
        return Some(vec![format!("my {x}"), format!("{x} name"), x]);
    }
    if let Some(caps) = WHEN_IS.captures(trimmed) {
        let x = caps[1].trim().to_string();
        return Some(vec![
            format!("{x} date"),
            format!("{x} time"),
            format!("{x} schedule"),
            x,
        ]);
    }
    if let Some(caps) = WHERE_IS.captures(trimmed) {
        let x = caps[1].trim().to_string();
        return Some(vec![
            format!("{x} location"),
            format!("{x} address"),
            format!("{x} place"),
            x,
        ]);
    }
    if let Some(caps) = HOW_DO_I.captures(trimmed) {
        let x = caps[1].trim().to_string();
        return Some(vec![
            format!("{x} instructions"),
            format!("{x} method"),
            format!("how to {x}"),
            x,
        ]);
    }
    if let Some(caps) = IMPERATIVE.captures(trimmed) {
        let x = caps[1].trim().to_string();
        return Some(vec![x.clone(), format!("my {x}"), format!("{x} details")]);
    }
    None
}

/// Tokens of length > 3 not in the stopword set, joined with spaces.
fn keyword_fallback(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expand_always_includes_original_first() {
        let expander = QueryExpander::new(None, LearnedConfig::default());
        let variants = expander.expand("What is my timezone?").await;
        assert_eq!(variants[0], "What is my timezone?");
    }

    #[tokio::test]
    async fn expand_never_exceeds_max_variants() {
        let expander = QueryExpander::new(None, LearnedConfig::default());
        let variants = expander
            .expand("What do I prefer for my code editor workflow today?")
            .await;
        assert!(variants.len() <= 8);
    }

    #[test]
    fn what_is_rule_fires() {
        let variants = wh_rule_expand("What is my timezone?").unwrap();
        assert!(variants.contains(&"timezone".to_string()));
        assert!(variants.contains(&"my timezone".to_string()));
    }

    #[test]
    fn how_do_i_rule_fires() {
        let variants = wh_rule_expand("How do I deploy the service?").unwrap();
        assert!(variants.iter().any(|v| v.contains("instructions")));
    }

    #[tokio::test]
    async fn synonym_expansion_adds_seed_terms() {
        let expander = QueryExpander::new(None, LearnedConfig::default());
        let variants = expander.expand("who is my life partner").await;
        assert!(variants.iter().any(|v| v == "spouse"));
    }
}
