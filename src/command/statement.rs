//! Statement accumulation
//!
//! Lines are appended until the evaluator accepts the text as a complete
//! statement; the statement is then handed out and the buffer cleared.

/// Text collected for the statement being read
#[derive(Debug, Default)]
pub struct StatementBuffer {
    text: String,
}

impl StatementBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line; return the statement once `is_complete` accepts it
    pub fn push_line<F>(&mut self, line: &[u8], is_complete: F) -> Option<String>
    where
        F: FnOnce(&str) -> bool,
    {
        self.text.push_str(&String::from_utf8_lossy(line));
        if is_complete(&self.text) {
            Some(std::mem::take(&mut self.text))
        } else {
            None
        }
    }

    /// Whether part of a statement is waiting for more lines
    pub fn is_pending(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn pending(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}
