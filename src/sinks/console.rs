// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Terminal collaborators used by the command-line front end

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::{LogSink, NotificationSink, ProgressSink};

/// Progress bar that advances one step per finished stage
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    /// Create a bar for a known number of stages
    pub fn new(total: u64, message: &str) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.blue} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({elapsed})")
                .expect("Invalid progress bar template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .progress_chars("█▓░"),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ProgressBarSink {
    fn tick(&self) {
        self.bar.inc(1);
    }
}

/// Prints warnings to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn warn(&self, title: &str, message: &str) {
        eprintln!("  {} {}: {}", "⚠".yellow(), title.yellow().bold(), message);
    }
}

impl LogSink for ProgressBarSink {
    fn append(&self, chunk: &str) {
        for line in chunk.lines().filter(|l| !l.trim().is_empty()) {
            self.bar.println(format!("    {}", line.dimmed()));
        }
    }
}
