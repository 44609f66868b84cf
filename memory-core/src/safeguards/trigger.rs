//! Smart trigger.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Built-in normalized-form skip set: greetings, acks, farewells, filler.
static SKIP_SET: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "hi", "hello", "hey", "yo", "ok", "okay", "k", "thanks", "thank you", "ty", "bye",
        "goodbye", "see you", "later", "cool", "nice", "yep", "yup", "nope", "sure", "alright",
    ]
    .into_iter()
    .collect()
});

/// Classifies a recall query as worth retrieving for, or trivially
/// skippable before any storage work happens.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmartTrigger {
    min_query_length: usize,
    skip_emoji_only: bool,
}

impl SmartTrigger {
    /// Construct a trigger from safeguard configuration.
    #[must_use]
    pub fn new(min_query_length: usize, skip_emoji_only: bool) -> Self {
        Self {
            min_query_length,
            skip_emoji_only,
        }
    }

    /// Whether `query` should be skipped without touching the memory
    /// service.
    #[must_use]
    pub fn should_skip(&self, query: &str) -> bool {
        let normalized = crate::learned::cache::normalize(query);
        if normalized.chars().count() < self.min_query_length {
            return true;
        }
        if self.skip_emoji_only && is_emoji_only(query) {
            return true;
        }
        SKIP_SET.contains(normalized.as_str())
    }
}

/// A query consisting solely of emoji (detected via BMP emoji ranges and
/// surrogate-pair-encoded supplementary-plane emoji).
fn is_emoji_only(query: &str) -> bool {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.chars().all(is_emoji_char)
}

fn is_emoji_char(c: char) -> bool {
    let cp = c as u32;
    matches!(
        cp,
        0x2600..=0x27BF   // misc symbols, dingbats
        | 0x1F300..=0x1F5FF // misc symbols & pictographs
        | 0x1F600..=0x1F64F // emoticons
        | 0x1F680..=0x1F6FF // transport & map
        | 0x1F900..=0x1F9FF // supplemental symbols & pictographs
        | 0x2700..=0x27BF
    ) || c.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_short_query() {
        let trigger = SmartTrigger::new(2, true);
        assert!(trigger.should_skip("?!"));
    }

    #[test]
    fn skips_greeting() {
        let trigger = SmartTrigger::new(2, true);
        assert!(trigger.should_skip("Hello!"));
    }

    #[test]
    fn skips_emoji_only() {
        let trigger = SmartTrigger::new(2, true);
        assert!(trigger.should_skip("😀😀😀"));
    }

    #[test]
    fn allows_real_query() {
        let trigger = SmartTrigger::new(2, true);
        assert!(!trigger.should_skip("How does authentication work?"));
    }
}
