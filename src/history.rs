//! Append-only log of formatted chat lines, replayed to joiners.

use crate::error::SendError;
use crate::session::Session;

#[derive(Debug, Default)]
pub struct History {
    entries: Vec<String>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, formatted: String) {
        self.entries.push(formatted);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry in order, each followed by a newline
    pub fn render(&self) -> String {
        let mut chunk = String::with_capacity(self.entries.iter().map(|e| e.len() + 1).sum());
        for entry in &self.entries {
            chunk.push_str(entry);
            chunk.push('\n');
        }
        chunk
    }

    /// Write every entry, in order, to `session`
    ///
    /// The whole log goes out as one queued chunk so a long history never
    /// overflows the session's queue.
    pub fn replay(&self, session: &Session) -> Result<(), SendError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        session.deliver(self.render())
    }
}
