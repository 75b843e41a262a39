//! Small text helpers shared across the workspace.

/// Truncate a string to at most `max_chars` characters, appending `…`
/// when anything was cut. Operates on character boundaries.
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// Collapse newlines (and surrounding spacing) into single spaces.
pub fn collapse_newlines(s: &str) -> String {
    s.split(['\n', '\r'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_string_unchanged() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn truncate_long_string() {
        let out = truncate_str("hello world", 6);
        assert_eq!(out, "hello…");
        assert_eq!(out.chars().count(), 6);
    }

    #[test]
    fn truncate_multibyte_safe() {
        let out = truncate_str("héllöwörld", 4);
        assert_eq!(out.chars().count(), 4);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn collapse_newlines_basic() {
        assert_eq!(collapse_newlines("a\nb\r\nc"), "a b c");
    }

    #[test]
    fn collapse_newlines_trims_and_drops_blanks() {
        assert_eq!(collapse_newlines("a  \n\n  b\n"), "a b");
        assert_eq!(collapse_newlines("plain"), "plain");
    }
}
