//! Configuration types for the practice session engine.
//!
//! [`Config`] holds the tool-level settings loaded from `practice.json`.
//! [`SessionConfig`] holds the inputs of a single session: the topic and the
//! learner's credential.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PracticeError, Result};
use crate::store::SessionStore;

/// The default config file name.
const CONFIG_FILE_NAME: &str = "practice.json";

/// Default base URL of the practice service.
fn default_server_url() -> String {
    "http://localhost:8000/api".to_string()
}

/// Default connect timeout in seconds.
const fn default_connect_timeout() -> u64 {
    10
}

/// Default timeout in seconds for grading and summary requests.
const fn default_request_timeout() -> u64 {
    60
}

/// Default path of the persisted session fields.
fn default_state_file() -> String {
    ".practice/session.json".to_string()
}

/// Default output directory for reports.
fn default_output_dir() -> String {
    ".".to_string()
}

/// Default value for boolean options that default to true.
const fn default_true() -> bool {
    true
}

/// Main configuration for practice sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the practice service, without a trailing slash.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Connect timeout for every request in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout for grading and summary requests in seconds.
    /// The generation stream has no whole-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Path of the file holding the last topic and credential.
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Output directory for session reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Report format to write when a session completes.
    #[serde(default)]
    pub report_format: ReportFormat,

    /// Shuffle terms and definitions of matching exercises.
    #[serde(default = "default_true")]
    pub shuffle_matching: bool,

    /// Send unexpected failures to the service's error log endpoint.
    #[serde(default = "default_true")]
    pub report_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            state_file: default_state_file(),
            output_dir: default_output_dir(),
            report_format: ReportFormat::default(),
            shuffle_matching: default_true(),
            report_errors: default_true(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `practice.json`. If not found, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            PracticeError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `practice.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        Self::load_from_file(&config_path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::ConfigParseError` if the file exists but
    /// contains invalid JSON or an invalid report format.
    ///
    /// Returns `PracticeError::ConfigValidationError` if the values are
    /// invalid (e.g., zero timeouts, empty server URL).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(PracticeError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PracticeError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(PracticeError::config_validation(
                "serverUrl must not be empty",
                "Set serverUrl to the practice service base URL in your practice.json",
            ));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PracticeError::config_validation(
                format!("serverUrl '{url}' is not an http(s) URL"),
                "Use a URL such as http://localhost:8000/api",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(PracticeError::config_validation(
                "connectTimeoutSecs must be greater than 0",
                "Set connectTimeoutSecs to at least 1 second in your practice.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(PracticeError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your practice.json",
            ));
        }

        if self.state_file.trim().is_empty() {
            return Err(PracticeError::config_validation(
                "stateFile must not be empty",
                "Provide a valid state file path in your practice.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(PracticeError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your practice.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }

    /// Returns the server URL without trailing slashes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.server_url.trim().trim_end_matches('/')
    }
}

/// Report formats written at the end of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Markdown only (default).
    #[default]
    Markdown,
    /// JSON only.
    Json,
    /// Both Markdown and JSON.
    Both,
}

impl ReportFormat {
    /// Parses a string into a `ReportFormat`, case-insensitively.
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    /// Returns `true` if a Markdown report should be written.
    #[must_use]
    pub const fn includes_markdown(&self) -> bool {
        matches!(self, Self::Markdown | Self::Both)
    }

    /// Returns `true` if a JSON report should be written.
    #[must_use]
    pub const fn includes_json(&self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }
}

impl<'de> Deserialize<'de> for ReportFormat {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid report format '{s}': expected one of 'markdown', 'json', 'both'"
            ))
        })
    }
}

impl Serialize for ReportFormat {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Both => "both",
        };
        serializer.serialize_str(s)
    }
}

// ============================================================================
// Session inputs
// ============================================================================

/// The inputs of one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Subject the exercises are generated for.
    pub topic: String,
    /// Opaque credential passed to the service on every request.
    pub credential: String,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("topic", &self.topic)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl SessionConfig {
    /// Creates session inputs from explicit values.
    #[must_use]
    pub fn new(topic: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            credential: credential.into(),
        }
    }

    /// Resolves session inputs, preferring explicit values over stored ones.
    ///
    /// Blank values count as absent. The store is only read when a value is
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::MissingSessionInput` if a value is neither given
    /// nor stored, or the store's error if it has to be read and cannot be.
    pub fn resolve(
        topic: Option<String>,
        credential: Option<String>,
        store: &dyn SessionStore,
    ) -> Result<Self> {
        let (topic, credential) = match (non_blank(topic), non_blank(credential)) {
            (Some(topic), Some(credential)) => (topic, credential),
            (topic, credential) => {
                let stored = store.load()?;
                let topic = topic
                    .or_else(|| non_blank(stored.last_topic))
                    .ok_or_else(|| PracticeError::missing_input("topic"))?;
                let credential = credential
                    .or_else(|| non_blank(stored.api_key))
                    .ok_or_else(|| PracticeError::missing_input("api key"))?;
                (topic, credential)
            }
        };

        Ok(Self { topic, credential })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
