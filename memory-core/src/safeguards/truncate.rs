//! Snippet truncator.

/// Approximate token count for `text`: `ceil(word_count * 0.75)`. Any
/// estimator in this shape is acceptable as long as downstream budget
/// invariants hold; this one avoids a tokenizer dependency.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let word_count = text.split_whitespace().count();
    ((word_count as f64) * 0.75).ceil() as u32
}

/// Truncate `text` to at most `max_tokens`, word-bounded, appending `"..."`
/// if truncation occurred. Returns `(truncated_text, token_count)`.
#[must_use]
pub fn truncate_snippet(text: &str, max_tokens: u32) -> (String, u32) {
    let total = estimate_tokens(text);
    if total <= max_tokens {
        return (text.to_string(), total);
    }
    let max_words = ((f64::from(max_tokens)) / 0.75).floor().max(1.0) as usize;
    let words: Vec<&str> = text.split_whitespace().collect();
    let kept: Vec<&str> = words.into_iter().take(max_words).collect();
    let truncated = format!("{}...", kept.join(" "));
    let tokens = estimate_tokens(&truncated).min(max_tokens);
    (truncated, tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        let (text, tokens) = truncate_snippet("auth service uses jwt", 100);
        assert_eq!(text, "auth service uses jwt");
        assert_eq!(tokens, 3);
    }

    #[test]
    fn long_text_is_truncated_with_ellipsis() {
        let long = "word ".repeat(200);
        let (text, tokens) = truncate_snippet(&long, 10);
        assert!(text.ends_with("..."));
        assert!(tokens <= 10);
    }

    #[test]
    fn estimate_matches_spec_formula() {
        assert_eq!(estimate_tokens("one two three four"), 3);
        assert_eq!(estimate_tokens("one two three"), 3);
    }
}
