//! Practice service client.
//!
//! The service exposes four endpoints under the configured base URL:
//!
//! | Endpoint      | Method | Purpose                                    |
//! |---------------|--------|--------------------------------------------|
//! | `/generate/`  | POST   | Stream of newline-delimited JSON events     |
//! | `/check/`     | POST   | Grade one answer                           |
//! | `/feedback/`  | POST   | Session summary                            |
//! | `/log_error/` | POST   | Record a client-side failure               |
//!
//! [`PracticeApi`] is the seam the fetcher, grader and reporter depend on.
//! [`HttpPracticeApi`] implements it over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{PracticeError, Result};
use crate::grading::Verdict;
use crate::session::AnswerRecord;

/// Exercise generation endpoint.
pub const GENERATE_PATH: &str = "/generate/";
/// Answer grading endpoint.
pub const CHECK_PATH: &str = "/check/";
/// Session summary endpoint.
pub const FEEDBACK_PATH: &str = "/feedback/";
/// Error log endpoint.
pub const LOG_ERROR_PATH: &str = "/log_error/";

/// Raw byte chunks of the generation response, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

// ============================================================================
// Wire types
// ============================================================================

/// Body of a generation request.
#[derive(Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Subject to generate exercises for.
    pub topic: String,
    /// Learner credential.
    pub api_key: String,
}

impl std::fmt::Debug for GenerateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerateRequest")
            .field("topic", &self.topic)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Body of a grading request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckAnswerRequest {
    /// Question text.
    pub question: String,
    /// The learner's answer.
    pub user_answer: String,
    /// Expected answer, when the exercise has one.
    pub correct_answer: Option<String>,
    /// Learner credential.
    pub api_key: String,
}

impl std::fmt::Debug for CheckAnswerRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckAnswerRequest")
            .field("question", &self.question)
            .field("user_answer", &self.user_answer)
            .field("correct_answer", &self.correct_answer)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Body of a session summary request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFeedbackRequest {
    /// Every answer record of the session, in order.
    pub results: Vec<AnswerRecord>,
    /// Learner credential.
    pub api_key: String,
}

impl std::fmt::Debug for SessionFeedbackRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFeedbackRequest")
            .field("results", &self.results.len())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Response of the session summary endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFeedbackResponse {
    /// Coaching text for the whole session.
    pub feedback: String,
}

/// Body sent to the error log endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error message.
    pub error: String,
    /// Error chain, outermost first.
    pub stack: Option<String>,
    /// Where in the session the error happened.
    #[serde(rename = "componentStack")]
    pub component_stack: Option<String>,
}

// ============================================================================
// Client trait
// ============================================================================

/// Operations of the practice service.
#[async_trait]
pub trait PracticeApi: Send + Sync {
    /// Opens the generation stream for a topic.
    ///
    /// Fails only if the request cannot be issued or the service rejects it.
    /// Failures while reading the body surface as stream items.
    async fn open_generation(&self, request: &GenerateRequest) -> Result<ByteStream>;

    /// Grades one answer.
    async fn check_answer(&self, request: &CheckAnswerRequest) -> Result<Verdict>;

    /// Requests the coaching summary for a finished session.
    async fn session_feedback(&self, request: &SessionFeedbackRequest) -> Result<String>;

    /// Records a client-side failure with the service.
    async fn report_error(&self, report: &ErrorReport) -> Result<()>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// `reqwest`-backed practice service client.
#[derive(Debug, Clone)]
pub struct HttpPracticeApi {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpPracticeApi {
    /// Creates a client from the tool configuration.
    ///
    /// The connect timeout applies to every request. The request timeout
    /// applies to grading, summary and error log requests only, so a slow
    /// generation stream is never cut off.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Connection` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| PracticeError::http("client", &e))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        path: &'static str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url(path))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| PracticeError::http(path, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PracticeError::service_status(path, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl PracticeApi for HttpPracticeApi {
    async fn open_generation(&self, request: &GenerateRequest) -> Result<ByteStream> {
        debug!(url = %self.url(GENERATE_PATH), topic = %request.topic, "opening generation stream");

        let response = self
            .client
            .post(self.url(GENERATE_PATH))
            .json(request)
            .send()
            .await
            .map_err(|e| PracticeError::http(GENERATE_PATH, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PracticeError::service_status(GENERATE_PATH, status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| PracticeError::http(GENERATE_PATH, &e))
            })
            .boxed())
    }

    async fn check_answer(&self, request: &CheckAnswerRequest) -> Result<Verdict> {
        self.post_json(CHECK_PATH, request)
            .await?
            .json::<Verdict>()
            .await
            .map_err(|e| PracticeError::http(CHECK_PATH, &e))
    }

    async fn session_feedback(&self, request: &SessionFeedbackRequest) -> Result<String> {
        let response = self
            .post_json(FEEDBACK_PATH, request)
            .await?
            .json::<SessionFeedbackResponse>()
            .await
            .map_err(|e| PracticeError::http(FEEDBACK_PATH, &e))?;
        Ok(response.feedback)
    }

    async fn report_error(&self, report: &ErrorReport) -> Result<()> {
        self.post_json(LOG_ERROR_PATH, report).await?;
        Ok(())
    }
}

// ============================================================================
// Scripted implementation for unit tests
// ============================================================================


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::exercise::ExerciseKind;

    #[test]
    fn test_check_request_wire_shape() {
        let request = CheckAnswerRequest {
            question: "Wat is 'house'?".to_string(),
            user_answer: "huis".to_string(),
            correct_answer: Some("huis".to_string()),
            api_key: "key".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["user_answer"], "huis");
        assert_eq!(json["correct_answer"], "huis");
        assert_eq!(json["api_key"], "key");
    }

    #[test]
    fn test_feedback_request_wire_shape() {
        let request = SessionFeedbackRequest {
            results: vec![AnswerRecord {
                question: "Q".to_string(),
                kind: ExerciseKind::FillInBlank,
                is_correct: false,
            }],
            api_key: "key".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["results"][0]["type"], "fill_in_blank");
        assert_eq!(json["results"][0]["is_correct"], false);
    }

    #[test]
    fn test_error_report_uses_component_stack_name() {
        let report = ErrorReport {
            error: "boom".to_string(),
            stack: None,
            component_stack: Some("phase=loading".to_string()),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["componentStack"], "phase=loading");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let request = GenerateRequest {
            topic: "Dutch".to_string(),
            api_key: "sk-secret".to_string(),
        };
        assert!(!format!("{request:?}").contains("sk-secret"));
    }

    #[test]
    fn test_http_api_strips_trailing_slash() {
        let config = Config {
            server_url: "http://localhost:9/api/".to_string(),
            ..Config::default()
        };
        let api = HttpPracticeApi::new(&config).unwrap();
        assert_eq!(api.url(CHECK_PATH), "http://localhost:9/api/check/");
    }
}
