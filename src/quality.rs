//! Heuristic chunk quality scoring.
//!
//! Pure function from chunk text to a score in `[0, 1]`. The heuristic
//! rewards mathematical content and domain keyword density, and penalizes
//! very short fragments:
//!
//! - base 0.5
//! - +0.2 if the chunk contains operator characters (`= + - * / ( )`)
//! - +0.1 per matched keyword from the configured domain list (uncapped;
//!   only the final clamp bounds it)
//! - −0.3 if the chunk is under 100 characters
//!
//! The keyword list is injected configuration, not a module-level global, so
//! different deployments can score for different domains.

use crate::models::clamp01;

const OPERATOR_CHARS: &[char] = &['=', '+', '-', '*', '/', '(', ')'];

/// Minimum chunk length (chars) before the short-content penalty applies.
const SHORT_CHUNK_THRESHOLD: usize = 100;

/// Score a chunk against the configured domain keywords.
pub fn score_chunk(text: &str, keywords: &[String]) -> f64 {
    let mut score = 0.5;

    if text.chars().any(|c| OPERATOR_CHARS.contains(&c)) {
        score += 0.2;
    }

    let lower = text.to_lowercase();
    let matched = keywords
        .iter()
        .filter(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
        .count();
    score += matched as f64 * 0.1;

    if text.chars().count() < SHORT_CHUNK_THRESHOLD {
        score -= 0.3;
    }

    clamp01(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        ["strategy", "trading", "risk", "investment", "volatility"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn long_filler() -> String {
        "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod \
         tempor incididunt ut labore et dolore magna aliqua"
            .to_string()
    }

    #[test]
    fn plain_long_text_scores_base() {
        let score = score_chunk(&long_filler(), &keywords());
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mathematical_content_raises_score() {
        let text = format!("{} where E = mc2", long_filler());
        let score = score_chunk(&text, &keywords());
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn keywords_add_a_tenth_each() {
        let text = format!("{} trading strategy under risk", long_filler());
        let score = score_chunk(&text, &keywords());
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let text = format!("{} TRADING", long_filler());
        let score = score_chunk(&text, &keywords());
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn short_chunks_are_penalized() {
        let score = score_chunk("tiny fragment", &keywords());
        assert!((score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_to_unit_interval() {
        // Five keywords + math on a long chunk: 0.5 + 0.2 + 0.5 = 1.2 → 1.0
        let text = format!(
            "{} trading strategy risk investment volatility = x",
            long_filler()
        );
        assert_eq!(score_chunk(&text, &keywords()), 1.0);

        // Short and keyword-free stays at the floor, never below zero.
        let score = score_chunk("", &[]);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn empty_keyword_list_is_valid() {
        let score = score_chunk(&long_filler(), &[]);
        assert!((score - 0.5).abs() < 1e-9);
    }
}
