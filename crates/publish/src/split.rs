//! Splitting over-long posts into a primary segment and one reply.
//!
//! Lengths are counted in Unicode scalar values.

/// Maximum units per post.
pub const POST_LIMIT: usize = 280;

const CONTINUATION_MARKER: &str = "...";
/// Longest primary segment before the marker is appended.
const PRIMARY_BUDGET: usize = POST_LIMIT - CONTINUATION_MARKER.len();
/// Fallback cut when no break point fits.
const HARD_CUT: usize = PRIMARY_BUDGET - CONTINUATION_MARKER.len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPost {
    /// First post, carrying the continuation marker when split.
    pub primary: String,
    /// Reply text; empty when no reply should be posted.
    pub secondary: String,
    /// The remainder did not fit in one reply and was discarded.
    pub dropped: bool,
}

/// Split `text` for posting. Text within [`POST_LIMIT`] comes back unchanged.
///
/// Otherwise the primary segment ends at the last sentence or paragraph break
/// that keeps it within budget, or is hard-cut when no break fits.
pub fn split_post(text: &str) -> SplitPost {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= POST_LIMIT {
        return SplitPost {
            primary: text.to_string(),
            secondary: String::new(),
            dropped: false,
        };
    }

    tracing::debug!(len = chars.len(), "splitting over-long post");

    let at_break = break_points(&chars)
        .into_iter()
        .filter(|&p| p <= PRIMARY_BUDGET)
        .max()
        .map(|pos| segments(&chars, pos))
        .filter(|(primary, _)| !primary.is_empty());

    let (mut primary, secondary) = at_break.unwrap_or_else(|| segments(&chars, HARD_CUT));
    primary.push_str(CONTINUATION_MARKER);

    if secondary.chars().count() > POST_LIMIT {
        tracing::info!("remainder still too long for a reply, discarding it");
        return SplitPost {
            primary,
            secondary: String::new(),
            dropped: true,
        };
    }

    SplitPost {
        primary,
        secondary,
        dropped: false,
    }
}

/// Positions just after ". ", "! ", "? " or a newline.
fn break_points(chars: &[char]) -> Vec<usize> {
    let mut points = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        match c {
            '.' | '!' | '?' if chars.get(i + 1) == Some(&' ') => points.push(i + 2),
            '\n' => points.push(i + 1),
            _ => {}
        }
    }
    points
}

fn segments(chars: &[char], at: usize) -> (String, String) {
    let head: String = chars[..at].iter().collect();
    let tail: String = chars[at..].iter().collect();
    (head.trim().to_string(), tail.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        let text = "a".repeat(280);
        let split = split_post(&text);
        assert_eq!(split.primary, text);
        assert!(split.secondary.is_empty());
        assert!(!split.dropped);
    }

    #[test]
    fn test_unbroken_300_units() {
        let text = "x".repeat(300);
        let split = split_post(&text);
        assert!(split.primary.chars().count() <= POST_LIMIT);
        assert!(split.primary.ends_with("..."));
        assert_eq!(split.primary.chars().count(), 274 + 3);
        assert!(!split.secondary.is_empty());
        assert!(split.secondary.chars().count() <= POST_LIMIT);
        assert_eq!(split.secondary.chars().count(), 26);
    }

    #[test]
    fn test_splits_at_last_sentence_break() {
        let first = format!("{}.", "a".repeat(150));
        let second = format!("{}!", "b".repeat(100));
        let rest = "c".repeat(60);
        let text = format!("{first} {second} {rest}");

        let split = split_post(&text);
        assert_eq!(split.primary, format!("{first} {second}..."));
        assert_eq!(split.secondary, rest);
    }

    #[test]
    fn test_paragraph_break_counts() {
        let text = format!("{}\n{}", "a".repeat(200), "b".repeat(100));
        let split = split_post(&text);
        assert_eq!(split.primary, format!("{}...", "a".repeat(200)));
        assert_eq!(split.secondary, "b".repeat(100));
    }

    #[test]
    fn test_overlong_remainder_is_dropped() {
        let text = format!("{}. {}", "a".repeat(10), "b".repeat(400));
        let split = split_post(&text);
        assert_eq!(split.primary, format!("{}....", "a".repeat(10)));
        assert!(split.secondary.is_empty());
        assert!(split.dropped);
    }

    #[test]
    fn test_counts_unicode_scalars() {
        let text = "é".repeat(281);
        let split = split_post(&text);
        assert_eq!(split.primary.chars().count(), 277);
        assert_eq!(split.secondary.chars().count(), 7);
    }
}
