//! Practice Session Report Generation
//!
//! This crate provides types and utilities for generating reports from a
//! finished practice session. Reports can be serialized to JSON for
//! programmatic access or rendered to Markdown for the learner.
//!
//! # Types
//!
//! - [`Report`] - The complete report structure
//! - [`ReportSummary`] - Score, status and duration
//! - [`ResultEntry`] - The outcome of one question
//! - [`KindBreakdown`] - Score per exercise kind
//! - [`LogEntry`] - A generation status message
//!
//! # Generators
//!
//! - [`ReportGenerator`] - Builds a [`Report`] from raw session data
//! - [`json::JsonGenerator`] - Generate JSON reports with compact or pretty formatting
//! - [`MarkdownGenerator`] - Generate human-readable Markdown reports
//!
//! # Example
//!
//! ```rust
//! use practice_report::{QuestionKind, ReportGenerator, ReportInput, ReportStatus, ResultInput};
//! use practice_report::json::JsonGenerator;
//!
//! let input = ReportInput {
//!     topic: "Dutch nouns".to_string(),
//!     status: ReportStatus::Completed,
//!     total_exercises: 2,
//!     results: vec![
//!         ResultInput::new("Wat is 'house'?", QuestionKind::MultipleChoice, true),
//!         ResultInput::new("De _____ slaapt.", QuestionKind::FillInBlank, false),
//!     ],
//!     ..ReportInput::default()
//! };
//!
//! let report = ReportGenerator::new(input).generate();
//! assert_eq!(report.summary.score_percent, 50);
//!
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("Dutch nouns"));
//! ```

mod generator;
pub mod json;
mod markdown;

pub use generator::{ReportGenerator, ReportInput, ResultInput};
pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the Markdown report.
pub const MARKDOWN_FILE_NAME: &str = "practice-report.md";
/// File name of the JSON report.
pub const JSON_FILE_NAME: &str = "practice-report.json";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Rounds `part / whole` to the nearest whole percent, halves up. Zero when
/// `whole` is zero.
#[must_use]
pub fn score_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = part.min(whole);
    u32::try_from((200 * part + whole) / (2 * whole)).unwrap_or(100)
}

// ============================================================================
// Report Status (local copy to avoid cross-crate dependency)
// ============================================================================

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Every exercise was answered.
    #[default]
    Completed,
    /// The learner left before the last exercise.
    Incomplete,
    /// Generation failed before any exercise was shown.
    Errored,
}

impl ReportStatus {
    /// Returns `true` if the session was completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns a human-readable description of the status.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Completed => "Session completed",
            Self::Incomplete => "Session ended early",
            Self::Errored => "Exercise generation failed",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Question Kind (local copy to avoid cross-crate dependency)
// ============================================================================

/// Kind of a question in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Pick one option.
    MultipleChoice,
    /// Type the missing word.
    FillInBlank,
    /// Pair terms with definitions.
    Matching,
    /// Free-form answer.
    #[default]
    FreeText,
}

impl QuestionKind {
    /// Returns a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "Multiple choice",
            Self::FillInBlank => "Fill in the blank",
            Self::Matching => "Matching",
            Self::FreeText => "Free text",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Report
// ============================================================================

/// Complete practice session report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    /// Session topic.
    pub topic: String,

    /// Score, status and duration.
    pub summary: ReportSummary,

    /// One entry per answered question, in order.
    pub results: Vec<ResultEntry>,

    /// Score per exercise kind, in order of first appearance.
    pub breakdown: Vec<KindBreakdown>,

    /// Coaching summary from the service.
    pub coach_feedback: Option<String>,

    /// Status messages received while exercises were generated.
    pub generation_log: Vec<LogEntry>,
}

impl Report {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    /// Serializes the report to JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Returns the questions answered incorrectly.
    #[must_use]
    pub fn missed(&self) -> Vec<&ResultEntry> {
        self.results.iter().filter(|r| !r.is_correct).collect()
    }
}

// ============================================================================
// ReportBuilder
// ============================================================================

/// Builder for constructing [`Report`] instances.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    topic: Option<String>,
    summary: Option<ReportSummary>,
    results: Vec<ResultEntry>,
    breakdown: Vec<KindBreakdown>,
    coach_feedback: Option<String>,
    generation_log: Vec<LogEntry>,
}

impl ReportBuilder {
    /// Sets the topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the report summary.
    #[must_use]
    pub const fn summary(mut self, summary: ReportSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Adds a result entry.
    #[must_use]
    pub fn result(mut self, entry: ResultEntry) -> Self {
        self.results.push(entry);
        self
    }

    /// Sets all result entries at once.
    #[must_use]
    pub fn results(mut self, results: Vec<ResultEntry>) -> Self {
        self.results = results;
        self
    }

    /// Sets the per-kind breakdown.
    #[must_use]
    pub fn breakdown(mut self, breakdown: Vec<KindBreakdown>) -> Self {
        self.breakdown = breakdown;
        self
    }

    /// Sets the coaching summary.
    #[must_use]
    pub fn coach_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.coach_feedback = Some(feedback.into());
        self
    }

    /// Adds a generation log entry.
    #[must_use]
    pub fn log_entry(mut self, entry: LogEntry) -> Self {
        self.generation_log.push(entry);
        self
    }

    /// Sets the complete generation log.
    #[must_use]
    pub fn generation_log(mut self, log: Vec<LogEntry>) -> Self {
        self.generation_log = log;
        self
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if required fields are missing.
    pub fn build(self) -> Result<Report> {
        let topic = self
            .topic
            .ok_or_else(|| ReportError::InvalidData("topic is required".to_string()))?;

        let summary = self
            .summary
            .ok_or_else(|| ReportError::InvalidData("summary is required".to_string()))?;

        if summary.correct > summary.total {
            return Err(ReportError::InvalidData(format!(
                "{} correct answers out of {} exercises",
                summary.correct, summary.total
            )));
        }

        Ok(Report {
            topic,
            summary,
            results: self.results,
            breakdown: self.breakdown,
            coach_feedback: self.coach_feedback,
            generation_log: self.generation_log,
        })
    }
}

// ============================================================================
// ReportSummary
// ============================================================================

/// High-level summary of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// How the session ended.
    pub status: ReportStatus,

    /// Rounded score over all exercises.
    pub score_percent: u32,

    /// Correct answers.
    pub correct: usize,

    /// Exercises in the session.
    pub total: usize,

    /// Session duration in seconds.
    pub duration_seconds: u64,
}

// ============================================================================
// ResultEntry
// ============================================================================

/// The outcome of one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// 1-based question number.
    pub number: usize,

    /// Question text.
    pub question: String,

    /// Exercise kind.
    pub kind: QuestionKind,

    /// Whether the answer was correct.
    pub is_correct: bool,
}

// ============================================================================
// KindBreakdown
// ============================================================================

/// Score for one exercise kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindBreakdown {
    /// Exercise kind.
    pub kind: QuestionKind,

    /// Correct answers of this kind.
    pub correct: usize,

    /// Answered questions of this kind.
    pub total: usize,
}

impl KindBreakdown {
    /// Rounded score for this kind.
    #[must_use]
    pub fn percent(&self) -> u32 {
        score_percent(self.correct, self.total)
    }
}

// ============================================================================
// LogEntry
// ============================================================================

/// A timestamped generation status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the message arrived.
    pub timestamp: DateTime<Utc>,

    /// The message.
    pub message: String,
}

impl LogEntry {
    /// Creates a log entry stamped now.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    /// Creates a log entry with a specific timestamp.
    #[must_use]
    pub fn at_time(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn summary(correct: usize, total: usize) -> ReportSummary {
        ReportSummary {
            status: ReportStatus::Completed,
            score_percent: score_percent(correct, total),
            correct,
            total,
            duration_seconds: 90,
        }
    }

    #[test]
    fn test_score_percent() {
        assert_eq!(score_percent(2, 3), 67);
        assert_eq!(score_percent(0, 0), 0);
        assert_eq!(score_percent(5, 5), 100);
    }

    #[test]
    fn test_report_status_display() {
        assert_eq!(ReportStatus::Completed.to_string(), "Session completed");
        assert_eq!(ReportStatus::Errored.to_string(), "Exercise generation failed");
        assert!(!ReportStatus::Incomplete.is_success());
    }

    #[test]
    fn test_question_kind_serialization() {
        let json = serde_json::to_string(&QuestionKind::FillInBlank).unwrap();
        assert_eq!(json, r#""fill_in_blank""#);
        assert_eq!(QuestionKind::Matching.to_string(), "Matching");
    }

    #[test]
    fn test_report_builder() {
        let report = Report::builder()
            .topic("Dutch nouns")
            .summary(summary(1, 2))
            .result(ResultEntry {
                number: 1,
                question: "Q1".to_string(),
                kind: QuestionKind::FreeText,
                is_correct: true,
            })
            .result(ResultEntry {
                number: 2,
                question: "Q2".to_string(),
                kind: QuestionKind::FreeText,
                is_correct: false,
            })
            .coach_feedback("Practise articles.")
            .log_entry(LogEntry::new("Generating..."))
            .build()
            .unwrap();

        assert_eq!(report.topic, "Dutch nouns");
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.missed().len(), 1);
        assert_eq!(report.generation_log.len(), 1);
    }

    #[test]
    fn test_report_builder_missing_required_fields() {
        let err = Report::builder().summary(summary(0, 0)).build().unwrap_err();
        assert!(err.to_string().contains("topic is required"));

        let err = Report::builder().topic("t").build().unwrap_err();
        assert!(err.to_string().contains("summary is required"));
    }

    #[test]
    fn test_report_builder_rejects_impossible_score() {
        let bad = ReportSummary {
            correct: 3,
            total: 2,
            ..ReportSummary::default()
        };
        assert!(Report::builder().topic("t").summary(bad).build().is_err());
    }

    #[test]
    fn test_kind_breakdown_percent() {
        let breakdown = KindBreakdown {
            kind: QuestionKind::Matching,
            correct: 1,
            total: 3,
        };
        assert_eq!(breakdown.percent(), 33);
    }

    #[test]
    fn test_report_serialization() {
        let report = Report::builder()
            .topic("Spanish verbs")
            .summary(summary(2, 3))
            .build()
            .unwrap();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"topic\": \"Spanish verbs\""));
        assert!(json.contains("\"score_percent\": 67"));
        assert!(json.contains("\"status\": \"completed\""));
    }
}
