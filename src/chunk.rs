//! Overlapping sliding-window text chunker.
//!
//! Splits normalized text into fixed-size character windows with a
//! configurable overlap. A window that would split a word is trimmed back to
//! the last space, provided that space lies past 80% of the window's length.
//!
//! The window start always advances by `chunk_size - overlap`, computed from
//! the *untrimmed* window. When a window is trimmed, the characters between
//! the trim point and the next window start are neither re-emitted nor
//! re-covered by the overlap — a small amount of character drift at chunk
//! boundaries. This stepping is intentional and pinned by the property tests
//! below; do not "fix" it by advancing from the trim point.

/// Chunking parameters. `chunk_size` and `overlap` are in characters;
/// `chunk_size` must be strictly greater than `overlap` (validated at config
/// load).
#[derive(Debug, Clone)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chunk_length: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
            min_chunk_length: 50,
        }
    }
}

/// An emitted chunk together with the character offset of the window it was
/// cut from. The offset is the *window* start, not the trimmed text start.
#[derive(Debug, Clone)]
pub struct ChunkWindow {
    pub window_start: usize,
    pub text: String,
}

/// Split `text` into ordered, zero-indexed chunk strings.
pub fn chunk_text(text: &str, params: &ChunkParams) -> Vec<String> {
    chunk_windows(text, params)
        .into_iter()
        .map(|w| w.text)
        .collect()
}

/// Split `text` into chunks, keeping each chunk's window offset.
pub fn chunk_windows(text: &str, params: &ChunkParams) -> Vec<ChunkWindow> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = params.chunk_size.saturating_sub(params.overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + params.chunk_size).min(chars.len());
        let window = &chars[start..end];

        // Trim to the last space if it sits past 80% of this window.
        let cut = match last_space_index(window) {
            Some(idx) if (idx as f64) > (window.len() as f64) * 0.8 => idx,
            _ => window.len(),
        };

        let piece: String = window[..cut].iter().collect();
        let piece = piece.trim();
        if piece.chars().count() >= params.min_chunk_length {
            chunks.push(ChunkWindow {
                window_start: start,
                text: piece.to_string(),
            });
        }

        // Fixed stepping, regardless of where the trim landed.
        start += step;
    }

    chunks
}

fn last_space_index(window: &[char]) -> Option<usize> {
    window.iter().rposition(|&c| c == ' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// A body of space-separated words with a predictable layout.
    fn word_soup(total_chars: usize) -> String {
        let mut s = String::new();
        let mut i = 0usize;
        while s.chars().count() < total_chars {
            s.push_str(&format!("word{i} "));
            i += 1;
        }
        s.chars().take(total_chars).collect()
    }

    #[test]
    fn short_text_below_minimum_is_discarded() {
        let params = ChunkParams::default();
        assert!(chunk_text("too short", &params).is_empty());
        assert!(chunk_text("", &params).is_empty());
    }

    #[test]
    fn text_at_minimum_is_kept() {
        let params = ChunkParams {
            chunk_size: 100,
            overlap: 10,
            min_chunk_length: 10,
        };
        let chunks = chunk_text("exactly ten chars or more here", &params);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn twenty_five_hundred_chars_yield_three_chunks() {
        // Window starts at 0, 900, 1800; the last window is 700 chars.
        let text = word_soup(2500);
        let params = ChunkParams::default();
        let chunks = chunk_text(&text, &params);

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
        }
    }

    #[test]
    fn consecutive_windows_overlap_by_the_configured_amount() {
        let text = word_soup(3000);
        let params = ChunkParams::default();
        let windows = chunk_windows(&text, &params);

        for pair in windows.windows(2) {
            assert_eq!(
                pair[1].window_start - pair[0].window_start,
                params.chunk_size - params.overlap
            );
        }
    }

    #[test]
    fn word_boundary_trim_shortens_the_chunk() {
        // A single space placed at 90% of the window forces the trim path.
        let mut text: String = "x".repeat(900);
        text.push(' ');
        text.push_str(&"y".repeat(1099));
        let params = ChunkParams::default();
        let windows = chunk_windows(&text, &params);

        // First window [0, 1000) has its last space at index 900 (> 800).
        assert_eq!(windows[0].text.chars().count(), 900);
        // The next window still starts at 900, not at the trim point.
        assert_eq!(windows[1].window_start, 900);
    }

    #[test]
    fn trim_drift_can_drop_characters() {
        // Space at index 850 of the first window; trim emits chars [0, 850),
        // the next window starts at 900 — chars 850..900 are dropped. The
        // stepping is literal, so this is the documented behavior.
        let mut text: String = "a".repeat(850);
        text.push(' ');
        text.push_str(&"b".repeat(1149));
        let params = ChunkParams::default();
        let windows = chunk_windows(&text, &params);

        assert_eq!(windows[0].text.chars().count(), 850);
        assert_eq!(windows[1].window_start, 900);
        let dropped = windows[1].window_start - windows[0].text.chars().count();
        assert_eq!(dropped, 50);
        // Drift is bounded by 20% of the window.
        assert!(dropped <= params.chunk_size / 5);
    }

    proptest! {
        /// Every non-final chunk fits in `chunk_size` and window starts
        /// advance by exactly the fixed step — the stepping never follows
        /// the trim point.
        #[test]
        fn stepping_is_literal(
            total in 200usize..4000,
            chunk_size in 80usize..600,
            overlap in 0usize..60,
        ) {
            prop_assume!(chunk_size > overlap);
            let text = word_soup(total);
            let params = ChunkParams { chunk_size, overlap, min_chunk_length: 1 };
            let windows = chunk_windows(&text, &params);
            let step = chunk_size - overlap;

            for w in &windows {
                prop_assert!(w.text.chars().count() <= chunk_size);
                prop_assert_eq!(w.window_start % step, 0);
            }
            for pair in windows.windows(2) {
                prop_assert_eq!(pair[1].window_start - pair[0].window_start, step);
            }
        }

        /// Boundary drift from trimming never exceeds 20% of the window:
        /// a trim only happens past 80% of the window, so the characters a
        /// trim can orphan are at most the remaining fifth.
        #[test]
        fn drift_is_bounded(
            total in 500usize..4000,
            chunk_size in 100usize..600,
            overlap in 0usize..60,
        ) {
            prop_assume!(chunk_size > overlap);
            let text = word_soup(total);
            let params = ChunkParams { chunk_size, overlap, min_chunk_length: 1 };
            let windows = chunk_windows(&text, &params);

            for pair in windows.windows(2) {
                let emitted_end = pair[0].window_start + pair[0].text.chars().count();
                let gap = pair[1].window_start.saturating_sub(emitted_end);
                prop_assert!(gap <= chunk_size / 5 + 1);
            }
        }
    }
}
