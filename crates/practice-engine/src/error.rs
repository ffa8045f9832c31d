//! Error types for the practice session engine.
//!
//! This module defines the error hierarchy for every engine operation,
//! including configuration loading, exercise ingestion, the generation
//! stream, grading and summary requests, and session state transitions.

use std::path::PathBuf;

/// A specialized `Result` type for practice engine operations.
pub type Result<T> = std::result::Result<T, PracticeError>;

/// Errors that can occur while running a practice session.
///
/// Only [`PracticeError::Connection`] and [`PracticeError::ServiceStatus`]
/// raised during generation halt a session. Grading and summary failures are
/// absorbed by the grading client and degrade to fallback values.
#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your practice.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// A topic or credential was neither supplied nor found in the stored state.
    #[error("No {field} available for the session\n\nSuggestion: Pass the {field} explicitly or start a session once so it is remembered")]
    MissingSessionInput {
        /// Which input is missing ("topic" or "api key").
        field: &'static str,
    },

    /// The persisted session file contains malformed JSON.
    #[error("Corrupted state file '{path}': {message}\n\nSuggestion: Remove the state file to start fresh")]
    StateFileCorrupted {
        /// Path to the corrupted state file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    // ========================================================================
    // Ingestion Errors
    // ========================================================================
    /// An exercise received from the generation service violates its variant's shape.
    #[error("Invalid exercise {id}: {reason}")]
    InvalidExercise {
        /// Identifier of the rejected exercise.
        id: u64,
        /// Why the exercise was rejected.
        reason: String,
    },

    /// A single stream line could not be parsed. Never fatal.
    #[error("Unparseable stream line ({len} bytes): {message}")]
    StreamParse {
        /// Length of the dropped line in bytes.
        len: usize,
        /// Parser error message.
        message: String,
    },

    // ========================================================================
    // Service Errors
    // ========================================================================
    /// The request to the practice service could not be completed.
    #[error("Connection error ({kind}) on '{endpoint}': {message}\n\nSuggestion: {suggestion}")]
    Connection {
        /// Category of the transport failure.
        kind: ConnectionErrorKind,
        /// Endpoint path that failed.
        endpoint: String,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The practice service answered with a non-success status.
    #[error("Service returned HTTP {status} for '{endpoint}'")]
    ServiceStatus {
        /// Endpoint path that failed.
        endpoint: String,
        /// HTTP status code.
        status: u16,
    },

    /// The grading endpoint failed. Degrades to an incorrect verdict.
    #[error("Grading service error: {message}")]
    GradingService {
        /// Underlying failure description.
        message: String,
    },

    /// The session-feedback endpoint failed. Degrades to a fixed message.
    #[error("Summary service error: {message}")]
    SummaryService {
        /// Underlying failure description.
        message: String,
    },

    // ========================================================================
    // Report Errors
    // ========================================================================
    /// Failed to write the report to disk.
    #[error("Failed to write report to '{path}': {message}\n\nSuggestion: Check write permissions and available disk space")]
    ReportWriteError {
        /// Path where the report was to be written.
        path: PathBuf,
        /// Description of the write failure.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current phase.
        from: String,
        /// The attempted operation or target phase.
        to: String,
    },
}

/// Categories of transport failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The server could not be reached.
    Network,
    /// The request or connect attempt timed out.
    Timeout,
    /// The response body could not be decoded.
    Decode,
    /// The generation stream ended before a terminal event.
    ClosedEarly,
}

impl std::fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Decode => write!(f, "decode"),
            Self::ClosedEarly => write!(f, "closed_early"),
        }
    }
}

impl ConnectionErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Network => "Check that the practice server is running and the serverUrl is correct",
            Self::Timeout => "Retry, or raise requestTimeoutSecs in your practice.json",
            Self::Decode => "The server sent an unexpected response; check the server version",
            Self::ClosedEarly => "The server closed the stream early; try again or pick a different topic",
        }
    }

    /// Classifies a `reqwest` error.
    #[must_use]
    pub fn of(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() || error.is_body() {
            Self::Decode
        } else {
            Self::Network
        }
    }
}

impl PracticeError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingSessionInput` error.
    #[must_use]
    pub const fn missing_input(field: &'static str) -> Self {
        Self::MissingSessionInput { field }
    }

    /// Creates a new `StateFileCorrupted` error.
    #[must_use]
    pub fn state_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StateFileCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidExercise` error.
    #[must_use]
    pub fn invalid_exercise(id: u64, reason: impl Into<String>) -> Self {
        Self::InvalidExercise {
            id,
            reason: reason.into(),
        }
    }

    /// Creates a new `StreamParse` error for a dropped line.
    #[must_use]
    pub fn stream_parse(len: usize, message: impl Into<String>) -> Self {
        Self::StreamParse {
            len,
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error with automatic suggestion based on kind.
    #[must_use]
    pub fn connection(
        kind: ConnectionErrorKind,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Connection {
            kind,
            endpoint: endpoint.into(),
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a `Connection` error from a `reqwest` failure.
    #[must_use]
    pub fn http(endpoint: impl Into<String>, error: &reqwest::Error) -> Self {
        Self::connection(ConnectionErrorKind::of(error), endpoint, error.to_string())
    }

    /// Creates a new `ServiceStatus` error.
    #[must_use]
    pub fn service_status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::ServiceStatus {
            endpoint: endpoint.into(),
            status,
        }
    }

    /// Wraps a failed grading request as `GradingService`.
    #[must_use]
    pub fn grading(error: &Self) -> Self {
        Self::GradingService {
            message: error.to_string(),
        }
    }

    /// Wraps a failed session-feedback request as `SummaryService`.
    #[must_use]
    pub fn summary(error: &Self) -> Self {
        Self::SummaryService {
            message: error.to_string(),
        }
    }

    /// Creates a new `ReportWriteError`.
    #[must_use]
    pub fn report_write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ReportWriteError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Connection { kind, .. } => {
                matches!(kind, ConnectionErrorKind::Network | ConnectionErrorKind::Timeout)
            }
            Self::ServiceStatus { status, .. } => *status >= 500,
            Self::GradingService { .. } | Self::SummaryService { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this error is fatal and requires immediate termination.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::MissingSessionInput { .. }
                | Self::StateFileCorrupted { .. }
        )
    }

    /// Returns the message shown to the learner when generation fails.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Connection { .. } | Self::ServiceStatus { .. } => {
                format!("Failed to connect to server. {self}")
            }
            other => other.to_string(),
        }
    }
}
