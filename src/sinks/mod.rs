// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Collaborator interfaces
//!
//! The engine never draws anything itself. It streams tool output to a
//! [`LogSink`], ticks a [`ProgressSink`] once per finished stage and raises
//! user-facing warnings through a [`NotificationSink`]. The embedding
//! application decides what those look like.

mod console;

pub use console::{ConsoleNotifier, ProgressBarSink};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Receives tool output as it arrives
pub trait LogSink: Send + Sync {
    fn append(&self, chunk: &str);
}

/// Receives one tick per unit of finished work
pub trait ProgressSink: Send + Sync {
    fn tick(&self);
}

/// Receives user-facing warnings
pub trait NotificationSink: Send + Sync {
    fn warn(&self, title: &str, message: &str);
}

/// The set of collaborators an engine is built with
#[derive(Clone)]
pub struct Collaborators {
    pub log: Arc<dyn LogSink>,
    pub progress: Arc<dyn ProgressSink>,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Collaborators {
    pub fn new(
        log: Arc<dyn LogSink>,
        progress: Arc<dyn ProgressSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            log,
            progress,
            notifier,
        }
    }

    /// Collaborators that discard everything
    pub fn silent() -> Self {
        let sink = Arc::new(NullSink);
        Self::new(sink.clone(), sink.clone(), sink)
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::silent()
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn append(&self, _chunk: &str) {}
}

impl ProgressSink for NullSink {
    fn tick(&self) {}
}

impl NotificationSink for NullSink {
    fn warn(&self, _title: &str, _message: &str) {}
}

/// Forwards tool output to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn append(&self, chunk: &str) {
        for line in chunk.lines().filter(|l| !l.trim().is_empty()) {
            tracing::debug!(target: "medflow::tool", "{}", line);
        }
    }
}

/// Counts ticks; useful to embedders that poll instead of render
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicUsize,
}

impl TickCounter {
    pub fn count(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl ProgressSink for TickCounter {
    fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps every warning it receives
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    warnings: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn warnings(&self) -> Vec<(String, String)> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for RecordingNotifier {
    fn warn(&self, title: &str, message: &str) {
        if let Ok(mut w) = self.warnings.lock() {
            w.push((title.to_string(), message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counter_counts() {
        let counter = TickCounter::default();
        counter.tick();
        counter.tick();
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::default();
        notifier.warn("a", "1");
        notifier.warn("b", "2");
        assert_eq!(
            notifier.warnings(),
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );
    }
}
