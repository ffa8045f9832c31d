//! Answer grading and session summaries.
//!
//! Grading never fails from the caller's point of view. A failed request
//! degrades to a fixed verdict or summary, logged with `degraded = true`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{CheckAnswerRequest, PracticeApi, SessionFeedbackRequest};
use crate::error::{PracticeError, Result};
use crate::exercise::Exercise;
use crate::interaction::Answer;
use crate::session::AnswerRecord;

/// Feedback for a completed matching exercise.
pub const MATCHING_SUCCESS_FEEDBACK: &str = "Great job matching all pairs!";
/// Feedback when the grading request fails.
pub const GRADING_FALLBACK_FEEDBACK: &str = "Error checking answer. Please try again.";
/// Summary when the summary request fails.
pub const SUMMARY_FALLBACK: &str = "Great job completing the session!";

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// The grading service.
    #[default]
    Remote,
    /// Decided locally for a self-validating exercise.
    SelfChecked,
    /// Substituted after the grading request failed.
    Fallback,
}

/// The grading outcome for one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the answer was correct.
    pub is_correct: bool,
    /// Feedback shown to the learner.
    pub feedback: String,
    /// Origin of the verdict. Not part of the wire format.
    #[serde(skip)]
    pub source: VerdictSource,
}

impl Verdict {
    /// A verdict as returned by the grading service.
    #[must_use]
    pub fn remote(is_correct: bool, feedback: impl Into<String>) -> Self {
        Self {
            is_correct,
            feedback: feedback.into(),
            source: VerdictSource::Remote,
        }
    }

    /// The verdict for a completed matching exercise.
    #[must_use]
    pub fn self_checked() -> Self {
        Self {
            is_correct: true,
            feedback: MATCHING_SUCCESS_FEEDBACK.to_string(),
            source: VerdictSource::SelfChecked,
        }
    }

    /// The verdict used when grading fails.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            is_correct: false,
            feedback: GRADING_FALLBACK_FEEDBACK.to_string(),
            source: VerdictSource::Fallback,
        }
    }

    /// Returns `true` if this verdict was substituted for a failed request.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.source, VerdictSource::Fallback)
    }
}

/// A session summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Coaching text.
    pub text: String,
    /// `true` if `text` is the fallback message.
    pub degraded: bool,
}

impl Summary {
    /// The summary used when the summary request fails or is skipped.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            text: SUMMARY_FALLBACK.to_string(),
            degraded: true,
        }
    }
}

/// Turns answers into verdicts and results into a summary.
#[derive(Clone)]
pub struct GradingClient {
    api: Arc<dyn PracticeApi>,
}

impl std::fmt::Debug for GradingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingClient").finish_non_exhaustive()
    }
}

impl GradingClient {
    /// Creates a grading client over the given service.
    #[must_use]
    pub fn new(api: Arc<dyn PracticeApi>) -> Self {
        Self { api }
    }

    /// Grades an answer, degrading to [`Verdict::fallback`] on failure.
    ///
    /// Self-validating exercises are decided locally with no request.
    pub async fn grade(&self, exercise: &Exercise, answer: &Answer, credential: &str) -> Verdict {
        match self.try_grade(exercise, answer, credential).await {
            Ok(verdict) => verdict,
            Err(error) => {
                warn!(id = exercise.id, kind = %exercise.kind(), %error, degraded = true, "grading failed, using fallback verdict");
                Verdict::fallback()
            }
        }
    }

    /// Grades an answer without degrading.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::GradingService` wrapping the request failure.
    pub async fn try_grade(
        &self,
        exercise: &Exercise,
        answer: &Answer,
        credential: &str,
    ) -> Result<Verdict> {
        let kind = exercise.kind();
        if exercise.is_self_validating() {
            debug!(id = exercise.id, %kind, "self-validating exercise, skipping grading request");
            return Ok(Verdict::self_checked());
        }

        let request = CheckAnswerRequest {
            question: exercise.question.clone(),
            user_answer: answer.as_str().to_string(),
            correct_answer: exercise.correct_answer().map(str::to_string),
            api_key: credential.to_string(),
        };

        let verdict = self
            .api
            .check_answer(&request)
            .await
            .map_err(|error| PracticeError::grading(&error))?;
        debug!(id = exercise.id, %kind, is_correct = verdict.is_correct, "answer graded");
        Ok(Verdict {
            source: VerdictSource::Remote,
            ..verdict
        })
    }

    /// Requests the summary for a finished session, degrading to
    /// [`Summary::fallback`] on failure.
    pub async fn summarize(&self, results: &[AnswerRecord], credential: &str) -> Summary {
        match self.try_summarize(results, credential).await {
            Ok(text) => Summary {
                text,
                degraded: false,
            },
            Err(error) => {
                warn!(%error, degraded = true, "summary failed, using fallback summary");
                Summary::fallback()
            }
        }
    }

    /// Requests the summary text without degrading.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::SummaryService` wrapping the request failure.
    pub async fn try_summarize(&self, results: &[AnswerRecord], credential: &str) -> Result<String> {
        let request = SessionFeedbackRequest {
            results: results.to_vec(),
            api_key: credential.to_string(),
        };

        self.api
            .session_feedback(&request)
            .await
            .map_err(|error| PracticeError::summary(&error))
    }
}
