//! Token estimation heuristics.
//!
//! Two estimators are in play. Chunk splitting and truncation budgets use
//! the coarse 4-bytes-per-token rule. Outbound estimates (deciding when to
//! summarize) use `bytes × 2 / 5` with a 1.2× safety margin — counting
//! bytes rather than characters makes CJK text weigh roughly three times
//! an ASCII character, which tracks how tokenizers treat it.

use picoclaw_core::Message;

/// Safety margin applied to outbound token estimates.
pub const SAFETY_MARGIN: f64 = 1.2;

/// Coarse estimate: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

/// Outbound estimate for a batch of messages, with the safety margin applied.
pub fn estimate_outbound_tokens(messages: &[Message]) -> usize {
    let total_bytes: usize = messages.iter().map(|m| m.content.len()).sum();
    let estimated = total_bytes * 2 / 5;
    (estimated as f64 * SAFETY_MARGIN) as usize
}

/// Coarse estimate over a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_bytes_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_bytes_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn outbound_estimate_applies_margin() {
        // 1000 bytes → 400 base tokens → 480 with margin
        let msg = Message::user("a".repeat(1000));
        assert_eq!(estimate_outbound_tokens(&[msg]), 480);
    }

    #[test]
    fn cjk_text_weighs_more_per_char() {
        let ascii = Message::user("a".repeat(10));
        let cjk = Message::user("语".repeat(10));
        assert!(estimate_outbound_tokens(&[cjk]) > estimate_outbound_tokens(&[ascii]));
    }
}
