use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapses runs of whitespace and trims the ends.
pub fn normalize_transcript(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Transcript state for a single recognition invocation.
///
/// Interim text is display-only. The first final result commits and freezes the buffer:
/// neither later interim results nor a second final can replace it.
#[derive(Debug, Default, Clone)]
pub struct TranscriptBuffer {
    interim: String,
    committed: Option<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the update was dropped because a final result already landed.
    pub fn push_interim(&mut self, text: &str) -> bool {
        if self.committed.is_some() {
            return false;
        }
        self.interim = normalize_transcript(text);
        true
    }

    /// Commits the final transcript. Empty results and repeated finals are refused.
    pub fn commit(&mut self, text: &str) -> Option<&str> {
        if self.committed.is_some() {
            return None;
        }
        let text = normalize_transcript(text);
        if text.is_empty() {
            return None;
        }
        self.interim.clear();
        self.committed = Some(text);
        self.committed.as_deref()
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn committed(&self) -> Option<&str> {
        self.committed.as_deref()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_buffer() {
        let mut buffer = TranscriptBuffer::new();

        assert!(buffer.push_interim("apple"));
        assert!(buffer.push_interim("apple  chair"));
        assert_eq!(buffer.interim(), "apple chair");
        assert_eq!(buffer.committed(), None);

        assert_eq!(buffer.commit(" apple chair blue "), Some("apple chair blue"));
        assert_eq!(buffer.interim(), "");

        // Late interim from the same invocation is dropped
        assert!(!buffer.push_interim("apple"));
        assert_eq!(buffer.committed(), Some("apple chair blue"));
        assert_eq!(buffer.commit("something else"), None);
    }

    #[test]
    fn empty_final_is_not_committed() {
        let mut buffer = TranscriptBuffer::new();
        assert_eq!(buffer.commit("   "), None);
        assert_eq!(buffer.committed(), None);
    }

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(normalize_transcript("  seven\n\tgarden  "), "seven garden");
    }
}
