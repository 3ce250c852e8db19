//! Bounded chat transcript fed by the hub, the host frame, and the
//! widget's own sends.

use chrono::{DateTime, Utc};

/// Transcript cap; the oldest lines fall off first.
pub const MAX_TRANSCRIPT_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAuthor {
    /// Relayed by the hub from another participant.
    Server,
    /// Forwarded in from the host frame.
    Host,
    /// Sent from this widget.
    Me,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub author: ChatAuthor,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ChatTranscript {
    entries: Vec<ChatEntry>,
}

impl ChatTranscript {
    pub fn push(&mut self, author: ChatAuthor, text: impl Into<String>) {
        self.entries.push(ChatEntry {
            author,
            text: text.into(),
            at: Utc::now(),
        });
        if self.entries.len() > MAX_TRANSCRIPT_LEN {
            let excess = self.entries.len() - MAX_TRANSCRIPT_LEN;
            self.entries.drain(..excess);
        }
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_trims_oldest_lines_at_the_cap() {
        let mut transcript = ChatTranscript::default();
        for i in 0..MAX_TRANSCRIPT_LEN + 10 {
            transcript.push(ChatAuthor::Server, format!("line {i}"));
        }
        assert_eq!(transcript.len(), MAX_TRANSCRIPT_LEN);
        assert_eq!(transcript.entries()[0].text, "line 10");
    }

    #[test]
    fn entries_keep_their_author() {
        let mut transcript = ChatTranscript::default();
        transcript.push(ChatAuthor::Me, "gg");
        transcript.push(ChatAuthor::Host, "welcome");
        assert_eq!(transcript.entries()[0].author, ChatAuthor::Me);
        assert_eq!(transcript.entries()[1].author, ChatAuthor::Host);
    }
}
