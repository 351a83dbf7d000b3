//! Analysis pipeline: upload → summary + features → feedback → approval → risks.
//!
//! [`PipelineController`] is the state machine that sequences the remote
//! stages of a [`Session`]. It validates each request locally before any
//! network traffic, runs remote calls through a [`ProgressReporter`], and
//! turns every failure into a [`StageOutput`] so nothing escapes to the
//! caller as an error.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use riskflow_client::RemoteAnalysisClient;
use riskflow_shared::{
    AnalysisText, Document, PipelineStage, ProgressConfig, RemoteStep, RiskflowError, Session,
};

use crate::progress::{CANCELLED_STATUS, ProgressReporter, ProgressScript, ProgressSink};
use crate::report::OutputKind;

pub const MSG_EMPTY_DOCUMENT: &str = "Please upload a requirements document first.";
pub const MSG_BLANK_FEEDBACK: &str = "Please provide feedback before re-evaluating features.";
pub const MSG_NO_FEATURES: &str = "Please extract features first.";
pub const MSG_NOTHING_TO_APPROVE: &str = "No features to approve.";
pub const MSG_APPROVAL_REQUIRED: &str = "Please approve the features before analyzing risks.";
pub const MSG_APPROVED: &str = "Features approved! You can now analyze risks.";

// ---------------------------------------------------------------------------
// Stage output
// ---------------------------------------------------------------------------

/// Which follow-up affordances the UI should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Panels {
    /// Feedback entry + approve action.
    pub feedback: bool,
    /// Risk-analysis action.
    pub risks: bool,
}

impl Panels {
    /// Affordances implied by the session's current artifacts.
    ///
    /// Feedback stays hidden while an approval stands, even if a later
    /// feedback round moved the stage back to `FeedbackLoop`.
    pub fn for_session(session: &Session) -> Self {
        if !session.has_features() {
            return Self::default();
        }
        Self {
            feedback: !session.is_approved(),
            risks: true,
        }
    }
}

/// How a pipeline operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The remote call returned the expected result.
    Completed,
    /// The remote call succeeded but omitted the expected field.
    Degraded,
    /// Local validation refused the request; nothing was sent.
    Rejected,
    /// The remote call failed.
    Failed,
    /// The remote call was cancelled.
    Cancelled,
}

/// What an operation hands back to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    /// Output field the text belongs in.
    pub kind: OutputKind,
    /// Result text, fallback text, or a user-facing error message.
    pub text: String,
    pub panels: Panels,
    /// Short status line.
    pub status: String,
    pub outcome: StageOutcome,
}

impl StageOutput {
    fn produced(kind: OutputKind, text: &AnalysisText, panels: Panels, status: &str) -> Self {
        let outcome = if text.is_missing() {
            StageOutcome::Degraded
        } else {
            StageOutcome::Completed
        };
        Self {
            kind,
            text: text.as_str().to_string(),
            panels,
            status: status.to_string(),
            outcome,
        }
    }

    fn rejected(kind: OutputKind, panels: Panels, message: &str) -> Self {
        Self {
            kind,
            text: message.to_string(),
            panels,
            status: message.to_string(),
            outcome: StageOutcome::Rejected,
        }
    }

    fn interrupted(
        kind: OutputKind,
        panels: Panels,
        action: &str,
        error: &RiskflowError,
    ) -> Self {
        match error {
            RiskflowError::Cancelled => Self {
                kind,
                text: CANCELLED_STATUS.to_string(),
                panels,
                status: CANCELLED_STATUS.to_string(),
                outcome: StageOutcome::Cancelled,
            },
            other => Self {
                kind,
                text: other.user_message(),
                panels,
                status: format!("{action} failed."),
                outcome: StageOutcome::Failed,
            },
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.outcome == StageOutcome::Rejected
    }
}

fn step_label(step: RemoteStep) -> &'static str {
    match step {
        RemoteStep::Extraction => "Feature extraction",
        RemoteStep::ReEvaluation => "Feature re-evaluation",
        RemoteStep::RiskAnalysis => "Risk analysis",
    }
}

// ---------------------------------------------------------------------------
// Scripts
// ---------------------------------------------------------------------------

/// One progress script per remote call site.
#[derive(Debug, Clone)]
pub struct PipelineScripts {
    pub summary: ProgressScript,
    pub extraction: ProgressScript,
    pub feedback: ProgressScript,
    pub risks: ProgressScript,
}

impl PipelineScripts {
    pub fn from_config(config: &ProgressConfig) -> Self {
        Self {
            summary: ProgressScript::summary(config.extraction_interval()),
            extraction: ProgressScript::extraction(config.extraction_interval()),
            feedback: ProgressScript::feedback(config.feedback_interval()),
            risks: ProgressScript::risks(config.risks_interval()),
        }
    }
}

impl Default for PipelineScripts {
    fn default() -> Self {
        Self::from_config(&ProgressConfig::default())
    }
}

// ---------------------------------------------------------------------------
// PipelineController
// ---------------------------------------------------------------------------

/// Sequences the remote stages of a session and enforces their ordering.
pub struct PipelineController {
    client: Arc<dyn RemoteAnalysisClient>,
    scripts: PipelineScripts,
}

impl PipelineController {
    pub fn new(client: Arc<dyn RemoteAnalysisClient>, scripts: PipelineScripts) -> Self {
        Self { client, scripts }
    }

    /// A fresh session in `Idle`.
    pub fn new_session(&self) -> Session {
        Session::new()
    }

    /// Upload a document and run summary generation + feature extraction.
    ///
    /// Always starts over: any artifacts from a previous run are dropped
    /// once the document passes validation.
    #[instrument(skip_all, fields(session = %session.id, project = %document.project_name))]
    pub async fn start_pipeline(
        &self,
        session: &mut Session,
        document: &Document,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> StageOutput {
        if document.is_empty() {
            return StageOutput::rejected(
                OutputKind::Features,
                Panels::for_session(session),
                MSG_EMPTY_DOCUMENT,
            );
        }

        session.reset();
        session.stage = PipelineStage::Summarizing;
        info!(bytes = document.bytes.len(), "pipeline started");

        let client = Arc::clone(&self.client);
        let doc = document.clone();
        let result = ProgressReporter::new(&self.scripts.extraction, progress)
            .run(
                async move { client.generate_summary_and_extract_features(&doc).await },
                cancel,
            )
            .await;

        match result {
            Ok(extraction) => {
                let features = extraction.feature_details.clone();
                session.state.begin_run(
                    extraction.srs_content,
                    extraction.project_summary,
                    extraction.feature_details,
                );
                session.stage = PipelineStage::FeaturesExtracted;
                info!(degraded = features.is_missing(), "features extracted");

                StageOutput::produced(
                    OutputKind::Features,
                    &features,
                    Panels::for_session(session),
                    self.scripts.extraction.done_status,
                )
            }
            Err(e) => {
                if matches!(e, RiskflowError::Cancelled) {
                    session.stage = PipelineStage::Idle;
                }
                self.record_failure(session, RemoteStep::Extraction, OutputKind::Features, e)
            }
        }
    }

    /// Revise the feature list with free-text feedback.
    ///
    /// `current_features` is the feature text as the user currently sees it;
    /// when blank the session's live feature list is used instead.
    #[instrument(skip_all, fields(session = %session.id))]
    pub async fn submit_feedback(
        &self,
        session: &mut Session,
        feedback: &str,
        current_features: &str,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> StageOutput {
        if !session.has_features() {
            return StageOutput::rejected(
                OutputKind::Features,
                Panels::for_session(session),
                MSG_NO_FEATURES,
            );
        }
        if feedback.trim().is_empty() {
            return StageOutput::rejected(
                OutputKind::Features,
                Panels::for_session(session),
                MSG_BLANK_FEEDBACK,
            );
        }

        let previous = if current_features.trim().is_empty() {
            session
                .state
                .feature_details()
                .map(|f| f.as_str().to_string())
                .unwrap_or_default()
        } else {
            current_features.to_string()
        };
        let (srs, summary) = run_context(session);
        let feedback = feedback.to_string();
        let client = Arc::clone(&self.client);

        let result = ProgressReporter::new(&self.scripts.feedback, progress)
            .run(
                async move {
                    client
                        .re_evaluate_features(&srs, &summary, &previous, &feedback)
                        .await
                },
                cancel,
            )
            .await;

        match result {
            Ok(features) => {
                session.state.replace_features(features.clone());
                session.stage = PipelineStage::FeedbackLoop;
                info!(degraded = features.is_missing(), "features re-evaluated");

                StageOutput::produced(
                    OutputKind::Features,
                    &features,
                    Panels::for_session(session),
                    self.scripts.feedback.done_status,
                )
            }
            Err(e) => {
                self.record_failure(session, RemoteStep::ReEvaluation, OutputKind::Features, e)
            }
        }
    }

    /// Freeze `current_features` as the input to risk analysis. Local only.
    ///
    /// Approving again replaces the snapshot. An unedited fallback text is
    /// not a feature list and cannot be approved.
    pub fn approve_features(&self, session: &mut Session, current_features: &str) -> StageOutput {
        let unedited_fallback = session
            .state
            .feature_details()
            .is_some_and(|f| f.is_missing() && f.as_str() == current_features.trim());

        if !session.has_features() || current_features.trim().is_empty() || unedited_fallback {
            return StageOutput::rejected(
                OutputKind::Features,
                Panels::for_session(session),
                MSG_NOTHING_TO_APPROVE,
            );
        }

        session.state.approve(current_features);
        session.stage = PipelineStage::Approved;
        info!(session = %session.id, "features approved");

        StageOutput {
            kind: OutputKind::Features,
            text: current_features.to_string(),
            panels: Panels::for_session(session),
            status: MSG_APPROVED.to_string(),
            outcome: StageOutcome::Completed,
        }
    }

    /// Request a risk report for the approved feature snapshot.
    ///
    /// The snapshot is used as-is even if feedback has changed the live
    /// feature list since approval.
    #[instrument(skip_all, fields(session = %session.id))]
    pub async fn analyze_risks(
        &self,
        session: &mut Session,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> StageOutput {
        let Some(approved) = session.state.approved_features().map(str::to_string) else {
            return StageOutput::rejected(
                OutputKind::Risks,
                Panels::for_session(session),
                MSG_APPROVAL_REQUIRED,
            );
        };

        if session.state.feature_details().map(AnalysisText::as_str) != Some(approved.as_str()) {
            warn!("feature list changed since approval; analyzing the approved snapshot");
        }

        let (srs, summary) = run_context(session);
        let client = Arc::clone(&self.client);

        let result = ProgressReporter::new(&self.scripts.risks, progress)
            .run(
                async move { client.analyze_risks(&approved, &srs, &summary).await },
                cancel,
            )
            .await;

        match result {
            Ok(report) => {
                session.state.record_risks(report.clone());
                session.stage = PipelineStage::RisksAnalyzed;
                info!(degraded = report.is_missing(), "risk analysis complete");

                StageOutput::produced(
                    OutputKind::Risks,
                    &report,
                    Panels::for_session(session),
                    self.scripts.risks.done_status,
                )
            }
            Err(e) => {
                self.record_failure(session, RemoteStep::RiskAnalysis, OutputKind::Risks, e)
            }
        }
    }

    /// Generate a project summary without starting a pipeline run.
    #[instrument(skip_all, fields(project = %document.project_name))]
    pub async fn summarize(
        &self,
        document: &Document,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> StageOutput {
        if document.is_empty() {
            return StageOutput::rejected(
                OutputKind::Summary,
                Panels::default(),
                MSG_EMPTY_DOCUMENT,
            );
        }

        let client = Arc::clone(&self.client);
        let doc = document.clone();
        let result = ProgressReporter::new(&self.scripts.summary, progress)
            .run(async move { client.generate_summary(&doc).await }, cancel)
            .await;

        match result {
            Ok(summary) => StageOutput::produced(
                OutputKind::Summary,
                &summary.project_summary,
                Panels::default(),
                self.scripts.summary.done_status,
            ),
            Err(e) => {
                warn!(error = %e, "summary generation failed");
                StageOutput::interrupted(
                    OutputKind::Summary,
                    Panels::default(),
                    "Summary generation",
                    &e,
                )
            }
        }
    }

    /// Record a failed or cancelled remote step on the session.
    ///
    /// Cancellation leaves the stage alone; any other error moves the
    /// session to `Failed`. Artifacts from earlier stages are kept so the
    /// same action can be retried.
    fn record_failure(
        &self,
        session: &mut Session,
        step: RemoteStep,
        kind: OutputKind,
        error: RiskflowError,
    ) -> StageOutput {
        match &error {
            RiskflowError::Cancelled => info!(?step, "stage cancelled"),
            other => {
                warn!(?step, error = %other, "stage failed");
                session.stage = PipelineStage::Failed { during: step };
            }
        }
        StageOutput::interrupted(kind, Panels::for_session(session), step_label(step), &error)
    }
}

/// Owned copies of the run's requirements text and summary.
fn run_context(session: &Session) -> (String, String) {
    let text = |t: Option<&AnalysisText>| t.map(|t| t.as_str().to_string()).unwrap_or_default();
    (
        text(session.state.srs_content()),
        text(session.state.project_summary()),
    )
}
