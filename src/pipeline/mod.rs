// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 medflow contributors

//! Pipeline definitions and sequencing
//!
//! This module defines stage templates, resolved pipelines and their
//! results, and the sequencer that runs them one stage at a time.

mod definition;
mod sequencer;

pub use definition::*;
pub use sequencer::PipelineSequencer;
