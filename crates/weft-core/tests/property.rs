//! Property-based invariants of the parse pipeline.

use proptest::prelude::*;
use weft_core::template::{lex, to_placeholder_sql, TokenKind};
use weft_core::types::position_at;

proptest! {
    /// Token spans partition the input: contiguous, in order, and
    /// summing to the input length — for arbitrary input, including
    /// unclosed delimiters.
    #[test]
    fn lex_spans_partition_input(body in "[a-zA-Z0-9,.(){}*\\n '_-]{0,120}") {
        let (tokens, _) = lex(&body);
        let mut cursor = 0usize;
        for token in &tokens {
            prop_assert_eq!(token.span.start, cursor);
            cursor = token.span.end;
        }
        prop_assert_eq!(cursor, body.len());
        let total: usize = tokens.iter().map(|t| t.span.len()).sum();
        prop_assert_eq!(total, body.len());
    }

    /// Placeholder substitution never changes the line count, so SQL
    /// diagnostics keep their line numbers.
    #[test]
    fn placeholder_preserves_line_count(body in "[a-zA-Z0-9,.(){}*\\n '_-]{0,120}") {
        let substituted = to_placeholder_sql(&body);
        prop_assert_eq!(
            substituted.matches('\n').count(),
            body.matches('\n').count()
        );
    }

    /// Placeholder substitution is idempotent: a substituted body has
    /// no delimiters left, so substituting again is the identity.
    #[test]
    fn placeholder_is_idempotent(body in "[a-zA-Z0-9,.() \\n'_-]{0,80}") {
        let once = to_placeholder_sql(&body);
        let twice = to_placeholder_sql(&once);
        prop_assert_eq!(once, twice);
    }

    /// Text tokens reproduce their input bytes exactly.
    #[test]
    fn text_tokens_are_verbatim(body in "[a-zA-Z0-9,. \\n]{0,80}") {
        let (tokens, errors) = lex(&body);
        prop_assert!(errors.is_empty());
        for token in &tokens {
            prop_assert_eq!(&token.kind, &TokenKind::Text);
        }
    }

    /// `position_at` is monotone in the offset and clamps at the end.
    #[test]
    fn position_at_is_monotone(body in "[a-z\\n]{0,60}", a in 0usize..80, b in 0usize..80) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(position_at(&body, lo) <= position_at(&body, hi));
        prop_assert_eq!(position_at(&body, body.len()), position_at(&body, body.len() + 10));
    }
}
