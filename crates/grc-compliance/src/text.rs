//! Character-set canonicalization shared by the validator and normalizer.

/// Canonicalize a prose value: strip control characters other than
/// newline, carriage return, and tab, then trim surrounding whitespace.
pub fn canonical_prose(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whether a value fits the short-token character set: alphanumerics,
/// spaces, and common punctuation.
pub fn is_short_token(value: &str) -> bool {
    value.chars().all(|c| {
        c.is_alphanumeric()
            || c == ' '
            || matches!(
                c,
                '-' | '_' | '.' | ',' | '/' | '&' | '(' | ')' | '\'' | ':' | '+' | '#'
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_controls_but_keeps_layout() {
        assert_eq!(canonical_prose("  a\u{0000}b\n\tc\r\n "), "ab\n\tc");
    }

    #[test]
    fn keeps_unicode_text() {
        assert_eq!(canonical_prose("Zugriffsprotokollierung für Admins"), "Zugriffsprotokollierung für Admins");
    }

    #[test]
    fn short_tokens_reject_markup() {
        assert!(is_short_token("Operational Risk (IT)"));
        assert!(!is_short_token("<script>"));
        assert!(!is_short_token("a\nb"));
    }
}
