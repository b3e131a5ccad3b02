//! Content normalization.
//!
//! Raw extracted text (OCR output, copy-pasted bodies, scraped passages)
//! arrives with control characters, stray symbols, and irregular whitespace.
//! [`normalize_content`] reduces it to clean UTF-8: whitespace runs collapse
//! to a single space and any character outside the allowed set is dropped.
//!
//! Pure and deterministic. An empty result is valid output — the caller
//! decides whether to skip downstream processing.

/// Punctuation and operator characters preserved by normalization.
///
/// Mathematical operators are deliberately included: downstream quality
/// scoring rewards chunks that contain equations.
const ALLOWED_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '(', ')', '+', '-', '*', '/', '=', '<', '>', '"', '\'', '%', '&',
    '_', '[', ']', '^',
];

/// Normalize raw text: collapse whitespace, strip characters outside the
/// allowed set, trim the ends.
pub fn normalize_content(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !is_allowed(c) {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    out
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || ALLOWED_PUNCTUATION.contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(
            normalize_content("hello   world\n\n\nagain\t\tnow"),
            "hello world again now"
        );
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(normalize_content("a\u{0}b\u{7}c\u{1b}[0m"), "abc[0m");
    }

    #[test]
    fn keeps_math_and_punctuation() {
        let text = "P(x) = a*b + c/d, where x > 0; 100%";
        assert_eq!(normalize_content(text), text);
    }

    #[test]
    fn trims_leading_and_trailing_whitespace() {
        assert_eq!(normalize_content("  padded  "), "padded");
    }

    #[test]
    fn empty_and_symbol_only_input_yields_empty() {
        assert_eq!(normalize_content(""), "");
        assert_eq!(normalize_content("\u{1}\u{2}\u{3}"), "");
        assert_eq!(normalize_content("   \n\t  "), "");
    }

    #[test]
    fn preserves_non_ascii_letters() {
        assert_eq!(normalize_content("volatilité  implicite"), "volatilité implicite");
    }

    #[test]
    fn deterministic() {
        let raw = "x  =\u{0} 1 +\n2";
        assert_eq!(normalize_content(raw), normalize_content(raw));
    }
}
