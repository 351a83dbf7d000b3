//! Core domain types for a riskflow analysis session.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RiskflowError};

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for session identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new time-sortable session identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AnalysisText
// ---------------------------------------------------------------------------

/// Which response field a backend omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    SrsText,
    Summary,
    Features,
    Risks,
}

impl Fallback {
    /// Text shown (and forwarded downstream) in place of the missing field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SrsText => "No requirements text extracted",
            Self::Summary => "No summary generated",
            Self::Features => "No features extracted",
            Self::Risks => "No risks identified",
        }
    }
}

/// Text produced by a remote stage.
///
/// A 2xx response that lacks the expected field is a soft failure: it is
/// kept as [`AnalysisText::Missing`] so callers can tell it apart from a
/// genuine result, while [`AnalysisText::as_str`] still yields the fixed
/// fallback text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnalysisText {
    Produced(String),
    Missing(Fallback),
}

impl AnalysisText {
    /// Build from an optional response field.
    pub fn from_field(value: Option<String>, fallback: Fallback) -> Self {
        match value {
            Some(text) => Self::Produced(text),
            None => Self::Missing(fallback),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Produced(text) => text,
            Self::Missing(fallback) => fallback.as_str(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }
}

impl std::fmt::Display for AnalysisText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// An uploaded requirements document.
#[derive(Clone)]
pub struct Document {
    /// Project name sent with the summary request.
    pub project_name: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(project_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            project_name: project_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk. The project name is the file stem.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| RiskflowError::io(path, e))?;
        let project_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        Ok(Self {
            project_name,
            bytes,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("project_name", &self.project_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PipelineStage
// ---------------------------------------------------------------------------

/// Remote step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStep {
    Extraction,
    ReEvaluation,
    RiskAnalysis,
}

/// Where a session is in the analysis workflow.
///
/// `Idle → Summarizing → FeaturesExtracted → FeedbackLoop* → Approved → RisksAnalyzed`,
/// with `Failed` reachable from any remote step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Summarizing,
    FeaturesExtracted,
    FeedbackLoop,
    Approved,
    RisksAnalyzed,
    Failed { during: RemoteStep },
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Summarizing => write!(f, "summarizing"),
            Self::FeaturesExtracted => write!(f, "features extracted"),
            Self::FeedbackLoop => write!(f, "feedback loop"),
            Self::Approved => write!(f, "approved"),
            Self::RisksAnalyzed => write!(f, "risks analyzed"),
            Self::Failed { during } => write!(f, "failed ({during:?})"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Artifacts produced by each stage of one pipeline run.
///
/// `approved_features` is only written by [`SessionState::approve`], which
/// also makes it the current `feature_details`; later feedback rounds
/// replace `feature_details` but leave the approved snapshot untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    srs_content: Option<AnalysisText>,
    project_summary: Option<AnalysisText>,
    feature_details: Option<AnalysisText>,
    approved_features: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    risk_analysis: Option<AnalysisText>,
}

impl SessionState {
    pub fn srs_content(&self) -> Option<&AnalysisText> {
        self.srs_content.as_ref()
    }

    pub fn project_summary(&self) -> Option<&AnalysisText> {
        self.project_summary.as_ref()
    }

    pub fn feature_details(&self) -> Option<&AnalysisText> {
        self.feature_details.as_ref()
    }

    pub fn approved_features(&self) -> Option<&str> {
        self.approved_features.as_deref()
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn risk_analysis(&self) -> Option<&AnalysisText> {
        self.risk_analysis.as_ref()
    }

    /// Record the outputs of the summary and extraction stages.
    pub fn begin_run(
        &mut self,
        srs_content: AnalysisText,
        project_summary: AnalysisText,
        feature_details: AnalysisText,
    ) {
        *self = Self {
            srs_content: Some(srs_content),
            project_summary: Some(project_summary),
            feature_details: Some(feature_details),
            ..Self::default()
        };
    }

    /// Replace the live feature set (no history is kept).
    pub fn replace_features(&mut self, features: AnalysisText) {
        self.feature_details = Some(features);
    }

    /// Freeze `features` as the approved snapshot.
    pub fn approve(&mut self, features: &str) {
        self.feature_details = Some(AnalysisText::Produced(features.to_string()));
        self.approved_features = Some(features.to_string());
        self.approved_at = Some(Utc::now());
    }

    pub fn record_risks(&mut self, report: AnalysisText) {
        self.risk_analysis = Some(report);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One analysis run: its identity, stage and artifacts.
///
/// Every pipeline operation borrows the session mutably, so a session is
/// driven by one caller at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub stage: PipelineStage,
    pub state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            stage: PipelineStage::Idle,
            state: SessionState::default(),
        }
    }

    /// Drop every artifact and return to `Idle`.
    pub fn reset(&mut self) {
        self.state.clear();
        self.stage = PipelineStage::Idle;
    }

    pub fn has_features(&self) -> bool {
        self.state.feature_details.is_some()
    }

    pub fn is_approved(&self) -> bool {
        self.state.approved_features.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
