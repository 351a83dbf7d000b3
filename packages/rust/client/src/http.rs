//! reqwest implementation of [`RemoteAnalysisClient`].

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use riskflow_shared::{
    AnalysisText, BackendSettings, Document, Fallback, Result, RiskflowError,
};

use crate::{RemoteAnalysisClient, SummaryResult};

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("riskflow/", env!("CARGO_PKG_VERSION"));

const SUMMARY_PATH: &str = "/summary/generate";
const EXTRACT_PATH: &str = "/features/extract";
const RE_EVALUATE_PATH: &str = "/features/re-evaluate";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    content: String,
    project_name: &'a str,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    srs_content: &'a str,
    project_summary: &'a str,
}

#[derive(Debug, Serialize)]
struct ReEvaluateRequest<'a> {
    srs_content: &'a str,
    project_summary: &'a str,
    previous_features: &'a str,
    user_feedback: &'a str,
}

#[derive(Debug, Serialize)]
struct RisksRequest<'a> {
    features: &'a str,
    srs_content: &'a str,
    project_summary: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    srs_text: Option<Value>,
    #[serde(default)]
    project_summary: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FeaturesResponse {
    #[serde(default)]
    feature_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RisksResponse {
    #[serde(default)]
    risk_analysis: Option<Value>,
}

/// Turn a response field into display text.
///
/// Strings pass through, `null` and blank strings count as absent, and
/// structured values are pretty-printed JSON.
fn field_text(value: Option<Value>, fallback: Fallback) -> AnalysisText {
    let text = match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => serde_json::to_string_pretty(&other).ok(),
    };
    if text.is_none() {
        warn!(field = ?fallback, "response field missing, using fallback text");
    }
    AnalysisText::from_field(text, fallback)
}

// ---------------------------------------------------------------------------
// HttpAnalysisClient
// ---------------------------------------------------------------------------

/// Talks to the analysis backend over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    client: Client,
    base_url: Url,
    risks_path: String,
}

impl HttpAnalysisClient {
    /// Build a client with the configured base URL and deadline.
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            RiskflowError::Network(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            risks_path: settings.risks_path.clone(),
        })
    }

    /// Append an endpoint path to the base URL, keeping any base path prefix.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| RiskflowError::config(format!("invalid endpoint '{path}': {e}")))
    }

    /// POST a JSON body and decode a JSON object response.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "sending request");

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RiskflowError::Network(format!("{url}: request timed out"))
                } else {
                    RiskflowError::Network(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "backend returned an error status");
            return Err(RiskflowError::remote(path, status.as_u16(), text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RiskflowError::Network(format!("{url}: failed to read body: {e}")))?;

        serde_json::from_slice(&bytes).map_err(|e| RiskflowError::Decode {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteAnalysisClient for HttpAnalysisClient {
    #[instrument(skip_all, fields(project = %document.project_name, bytes = document.bytes.len()))]
    async fn generate_summary(&self, document: &Document) -> Result<SummaryResult> {
        let request = SummaryRequest {
            content: BASE64.encode(&document.bytes),
            project_name: &document.project_name,
        };
        let response: SummaryResponse = self.post_json(SUMMARY_PATH, &request).await?;

        info!("summary generated");
        Ok(SummaryResult {
            srs_content: field_text(response.srs_text, Fallback::SrsText),
            project_summary: field_text(response.project_summary, Fallback::Summary),
        })
    }

    #[instrument(skip_all)]
    async fn extract_features(
        &self,
        srs_content: &str,
        project_summary: &str,
    ) -> Result<AnalysisText> {
        let request = ExtractRequest {
            srs_content,
            project_summary,
        };
        let response: FeaturesResponse = self.post_json(EXTRACT_PATH, &request).await?;

        info!("features extracted");
        Ok(field_text(response.feature_details, Fallback::Features))
    }

    #[instrument(skip_all, fields(feedback_len = feedback.len()))]
    async fn re_evaluate_features(
        &self,
        srs_content: &str,
        project_summary: &str,
        previous_features: &str,
        feedback: &str,
    ) -> Result<AnalysisText> {
        let request = ReEvaluateRequest {
            srs_content,
            project_summary,
            previous_features,
            user_feedback: feedback,
        };
        let response: FeaturesResponse = self.post_json(RE_EVALUATE_PATH, &request).await?;

        info!("features re-evaluated");
        Ok(field_text(response.feature_details, Fallback::Features))
    }

    #[instrument(skip_all)]
    async fn analyze_risks(
        &self,
        approved_features: &str,
        srs_content: &str,
        project_summary: &str,
    ) -> Result<AnalysisText> {
        let request = RisksRequest {
            features: approved_features,
            srs_content,
            project_summary,
        };
        let response: RisksResponse = self.post_json(&self.risks_path, &request).await?;

        info!("risk analysis received");
        Ok(field_text(response.risk_analysis, Fallback::Risks))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(base: &str) -> BackendSettings {
        BackendSettings {
            base_url: Url::parse(base).unwrap(),
            risks_path: "/risks/analyze".into(),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    fn client_for(server: &MockServer) -> HttpAnalysisClient {
        HttpAnalysisClient::new(&settings(&server.uri())).unwrap()
    }

    #[test]
    fn endpoint_keeps_base_prefix() {
        let client = HttpAnalysisClient::new(&settings("http://analysis.local/backend/")).unwrap();
        assert_eq!(
            client.endpoint("/features/extract").unwrap().as_str(),
            "http://analysis.local/backend/features/extract"
        );

        let client = HttpAnalysisClient::new(&settings("http://localhost:8000")).unwrap();
        assert_eq!(
            client.endpoint(SUMMARY_PATH).unwrap().as_str(),
            "http://localhost:8000/summary/generate"
        );
    }

    #[test]
    fn structured_fields_are_pretty_printed() {
        let text = field_text(Some(json!(["F1", "F2"])), Fallback::Features);
        assert_eq!(text.as_str(), "[\n  \"F1\",\n  \"F2\"\n]");

        let text = field_text(Some(Value::Null), Fallback::Risks);
        assert_eq!(text, AnalysisText::Missing(Fallback::Risks));

        let text = field_text(Some(json!("  \n")), Fallback::Features);
        assert_eq!(text, AnalysisText::Missing(Fallback::Features));
    }

    #[tokio::test]
    async fn summary_sends_base64_document() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/summary/generate"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "content": "JVBERi0xLjcgcmVxdWlyZW1lbnRz",
                "project_name": "payments",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "srs_text": "The system shall accept card payments.",
                "project_summary": "A payments platform.",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let doc = Document::new("payments", b"%PDF-1.7 requirements".to_vec());
        let result = client_for(&server).generate_summary(&doc).await.unwrap();

        assert_eq!(
            result.srs_content,
            AnalysisText::Produced("The system shall accept card payments.".into())
        );
        assert_eq!(result.project_summary.as_str(), "A payments platform.");
    }

    #[tokio::test]
    async fn missing_summary_degrades() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/summary/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "srs_text": "srs" })))
            .mount(&server)
            .await;

        let doc = Document::new("p", b"x".to_vec());
        let result = client_for(&server).generate_summary(&doc).await.unwrap();

        assert_eq!(result.project_summary, AnalysisText::Missing(Fallback::Summary));
        assert_eq!(result.project_summary.as_str(), "No summary generated");
    }

    #[tokio::test]
    async fn extract_features_request_shape() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/features/extract"))
            .and(body_json(json!({
                "srs_content": "srs",
                "project_summary": "summary",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "feature_details": "F1, F2" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let features = client_for(&server)
            .extract_features("srs", "summary")
            .await
            .unwrap();
        assert_eq!(features, AnalysisText::Produced("F1, F2".into()));
    }

    #[tokio::test]
    async fn re_evaluate_sends_feedback() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/features/re-evaluate"))
            .and(body_json(json!({
                "srs_content": "srs",
                "project_summary": "summary",
                "previous_features": "F1, F2",
                "user_feedback": "add F3",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "feature_details": "F1, F2, F3" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let features = client_for(&server)
            .re_evaluate_features("srs", "summary", "F1, F2", "add F3")
            .await
            .unwrap();
        assert_eq!(features.as_str(), "F1, F2, F3");
    }

    #[tokio::test]
    async fn analyze_risks_uses_configured_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/risks/analyze"))
            .and(body_json(json!({
                "features": "F1",
                "srs_content": "srs",
                "project_summary": "summary",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut s = settings(&server.uri());
        s.risks_path = "/api/risks/analyze".into();
        let client = HttpAnalysisClient::new(&s).unwrap();

        let report = client.analyze_risks("F1", "srs", "summary").await.unwrap();
        assert_eq!(report, AnalysisText::Missing(Fallback::Risks));
        assert_eq!(report.as_str(), "No risks identified");
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/risks/analyze"))
            .respond_with(ResponseTemplate::new(500).set_body_string("agent crashed"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .analyze_risks("F1", "srs", "summary")
            .await
            .unwrap_err();

        match &err {
            RiskflowError::Remote {
                endpoint,
                status,
                body,
            } => {
                assert_eq!(endpoint, "/risks/analyze");
                assert_eq!(*status, 500);
                assert_eq!(body, "agent crashed");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
        assert!(err.user_message().contains("Response text: agent crashed"));
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/features/extract"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .extract_features("srs", "summary")
            .await
            .unwrap_err();
        assert!(matches!(err, RiskflowError::Decode { .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        // Nothing listens on port 1
        let client = HttpAnalysisClient::new(&settings("http://127.0.0.1:1")).unwrap();
        let err = client.extract_features("srs", "summary").await.unwrap_err();
        assert!(matches!(err, RiskflowError::Network(_)));
        assert!(err.user_message().starts_with("API Error:"));
    }

    #[tokio::test]
    async fn combined_call_runs_both_stages() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/summary/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "srs_text": "srs",
                "project_summary": "summary",
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/features/extract"))
            .and(body_json(json!({
                "srs_content": "srs",
                "project_summary": "summary",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "feature_details": "F1, F2" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let doc = Document::new("doc", b"pdf".to_vec());
        let result = client_for(&server)
            .generate_summary_and_extract_features(&doc)
            .await
            .unwrap();

        assert_eq!(result.srs_content.as_str(), "srs");
        assert_eq!(result.project_summary.as_str(), "summary");
        assert_eq!(result.feature_details.as_str(), "F1, F2");
    }

    #[tokio::test]
    async fn combined_call_stops_after_summary_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/summary/generate"))
            .respond_with(ResponseTemplate::new(422).set_body_string("not a PDF"))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/features/extract"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let doc = Document::new("doc", b"txt".to_vec());
        let err = client_for(&server)
            .generate_summary_and_extract_features(&doc)
            .await
            .unwrap_err();
        assert!(matches!(err, RiskflowError::Remote { status: 422, .. }));
    }
}
