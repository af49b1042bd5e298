// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Merged, append-only output log

use std::sync::{Arc, Mutex, MutexGuard};

/// Append-only text buffer shared between the output drains and whoever
/// polls it. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // A panicking drain cannot leave the string half-written
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a chunk exactly as received
    pub fn append(&self, chunk: &str) {
        self.lock().push_str(chunk);
    }

    /// Append a chunk on a line of its own
    pub fn append_line(&self, line: &str) {
        let mut buf = self.lock();
        if !buf.is_empty() && !buf.ends_with('\n') {
            buf.push('\n');
        }
        buf.push_str(line);
        buf.push('\n');
    }

    /// Current length in bytes, usable as a mark for [`LogBuffer::since`]
    pub fn mark(&self) -> usize {
        self.lock().len()
    }

    /// Everything appended after `mark`
    pub fn since(&self, mark: usize) -> String {
        let buf = self.lock();
        buf.get(mark..).unwrap_or_default().to_string()
    }

    /// Whether the text appended after `mark` contains `needle`
    pub fn contains_since(&self, mark: usize, needle: &str) -> bool {
        let buf = self.lock();
        buf.get(mark..).is_some_and(|tail| tail.contains(needle))
    }

    /// Full contents
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_arrival_order() {
        let log = LogBuffer::new();
        log.append("a");
        log.append("b\n");
        log.append("c");
        assert_eq!(log.snapshot(), "ab\nc");
    }

    #[test]
    fn test_append_line_starts_new_line() {
        let log = LogBuffer::new();
        log.append("partial");
        log.append_line("ssh Completed!");
        assert_eq!(log.snapshot(), "partial\nssh Completed!\n");
    }

    #[test]
    fn test_contains_since_ignores_older_text() {
        let log = LogBuffer::new();
        log.append_line("scp Completed!");
        let mark = log.mark();
        assert!(!log.contains_since(mark, "scp Completed!"));

        log.append_line("scp Completed!");
        assert!(log.contains_since(mark, "scp Completed!"));
        assert_eq!(log.since(mark), "scp Completed!\n");
    }

    #[test]
    fn test_clones_share_buffer() {
        let log = LogBuffer::new();
        let other = log.clone();
        other.append("x");
        assert!(!log.is_empty());
    }
}
