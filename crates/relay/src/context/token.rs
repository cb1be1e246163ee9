//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, counted in
//! Unicode scalar values so non-Latin email bodies are not over-counted.

use mailmate_core::Turn;

/// Role name, delimiters and formatting markers in the wire format.
const TURN_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for a single turn including per-message overhead.
pub fn estimate_turn_tokens(turn: &Turn) -> usize {
    TURN_OVERHEAD + estimate_tokens(turn.text())
}

/// Estimate tokens for a slice of turns.
pub fn estimate_turns_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(estimate_turn_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 4 chars, 12 bytes
        assert_eq!(estimate_tokens("日本語文"), 1);
    }

    #[test]
    fn turn_includes_overhead() {
        let turn = Turn::user("test"); // 1 token + 4 overhead
        assert_eq!(estimate_turn_tokens(&turn), 5);
    }

    #[test]
    fn multiple_turns() {
        let turns = vec![
            Turn::user("hello"),     // 2 + 4 = 6
            Turn::assistant("test"), // 1 + 4 = 5
        ];
        assert_eq!(estimate_turns_tokens(&turns), 11);
    }
}
