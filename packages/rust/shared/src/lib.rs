//! Shared types, error model, and configuration for riskflow.
//!
//! This crate is the foundation depended on by all other riskflow crates.
//! It provides:
//! - [`RiskflowError`]: the unified error type
//! - Domain types ([`Session`], [`SessionState`], [`PipelineStage`], [`AnalysisText`], [`Document`])
//! - Configuration ([`AppConfig`], [`BackendSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, BackendSettings, OutputConfig, ProgressConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, RiskflowError};
pub use types::{
    AnalysisText, Document, Fallback, PipelineStage, RemoteStep, Session, SessionId, SessionState,
};
