//! Client for the remote document-analysis service.
//!
//! The backend exposes four JSON-over-HTTP operations: summary generation,
//! feature extraction, feature re-evaluation and risk analysis. Each call is
//! a single request with no retries; a failed attempt surfaces immediately.
//! A 2xx response that omits the expected field degrades to
//! [`AnalysisText::Missing`] instead of failing.

mod http;

use async_trait::async_trait;
use riskflow_shared::{AnalysisText, Document, Result};

pub use http::HttpAnalysisClient;

/// Output of the summary stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResult {
    /// Full requirements text extracted from the document.
    pub srs_content: AnalysisText,
    /// Generated project summary.
    pub project_summary: AnalysisText,
}

/// Output of the summary + extraction stages run back to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub srs_content: AnalysisText,
    pub project_summary: AnalysisText,
    pub feature_details: AnalysisText,
}

/// The remote analysis operations the pipeline depends on.
#[async_trait]
pub trait RemoteAnalysisClient: Send + Sync {
    /// Upload a document and get back its text and a project summary.
    async fn generate_summary(&self, document: &Document) -> Result<SummaryResult>;

    /// Derive the feature list from requirements text and its summary.
    async fn extract_features(
        &self,
        srs_content: &str,
        project_summary: &str,
    ) -> Result<AnalysisText>;

    /// Revise a feature list given free-text feedback.
    async fn re_evaluate_features(
        &self,
        srs_content: &str,
        project_summary: &str,
        previous_features: &str,
        feedback: &str,
    ) -> Result<AnalysisText>;

    /// Produce a risk report for an approved feature list.
    async fn analyze_risks(
        &self,
        approved_features: &str,
        srs_content: &str,
        project_summary: &str,
    ) -> Result<AnalysisText>;

    /// Summary generation followed by feature extraction.
    ///
    /// Extraction is not attempted when summary generation fails.
    async fn generate_summary_and_extract_features(
        &self,
        document: &Document,
    ) -> Result<ExtractionResult> {
        let summary = self.generate_summary(document).await?;
        let feature_details = self
            .extract_features(
                summary.srs_content.as_str(),
                summary.project_summary.as_str(),
            )
            .await?;

        Ok(ExtractionResult {
            srs_content: summary.srs_content,
            project_summary: summary.project_summary,
            feature_details,
        })
    }
}
