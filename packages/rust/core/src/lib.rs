//! Core pipeline orchestration for riskflow.
//!
//! This crate sequences the remote analysis stages of a session
//! (`PipelineController`), plays estimated progress while they run
//! (`ProgressReporter`), and saves stage outputs to disk (`report`).

pub mod pipeline;
pub mod progress;
pub mod report;

pub use pipeline::{PipelineController, PipelineScripts, Panels, StageOutcome, StageOutput};
pub use progress::{ProgressReporter, ProgressScript, ProgressSink, SilentProgress};
pub use report::{OutputKind, save_confirmation, save_output};
