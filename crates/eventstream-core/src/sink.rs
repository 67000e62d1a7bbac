//! Append-only output buffer shared by concurrent partition handlers.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Ordered, thread-safe line buffer backing a session's output.
///
/// Appends from one partition handler keep their relative order; lines from
/// different partitions interleave in arrival order.
#[derive(Debug, Default)]
pub struct ResultSink {
    lines: Mutex<Vec<String>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, line: impl Into<String>) {
        self.lines().push(line.into());
    }

    pub fn clear(&self) {
        self.lines().clear();
    }

    pub fn len(&self) -> usize {
        self.lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    /// Copies the buffer as it stands; later appends do not affect the snapshot.
    pub fn snapshot(&self) -> SessionResult {
        SessionResult {
            lines: self.lines().clone(),
        }
    }
}

/// Output of one session run, in arrival order. Immutable once returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    lines: Vec<String>,
}

impl SessionResult {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Every line terminated by a newline, the plain-text body the readers reply with.
    pub fn to_text(&self) -> String {
        let mut text = String::with_capacity(self.lines.iter().map(|l| l.len() + 1).sum());
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

impl fmt::Display for SessionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
