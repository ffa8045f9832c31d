//! Exercise types received from the generation service.
//!
//! The service sends a loose record per exercise ([`ExerciseRecord`]). Each
//! record is validated once at ingestion into an [`Exercise`], a closed variant
//! type in which every kind carries exactly the fields it needs.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PracticeError, Result};

/// Pattern for the blank marker in fill-in-blank questions.
pub const BLANK_PATTERN: &str = r"_{3,}";

// ============================================================================
// ExerciseKind
// ============================================================================

/// The structurally distinct exercise kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExerciseKind {
    /// Pick one option from a list.
    MultipleChoice,
    /// Type the word missing from a sentence.
    FillInBlank,
    /// Pair every term with its definition.
    Matching,
    /// Free-form answer. Also used for unknown kinds.
    #[default]
    FreeText,
}

impl ExerciseKind {
    /// Parses a kind tag case-insensitively. Unknown tags fall back to `FreeText`.
    fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "multiple_choice" => Self::MultipleChoice,
            "fill_in_blank" => Self::FillInBlank,
            "matching" => Self::Matching,
            _ => Self::FreeText,
        }
    }

    /// Returns the wire tag for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::FillInBlank => "fill_in_blank",
            Self::Matching => "matching",
            Self::FreeText => "free_text",
        }
    }

    /// Returns a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple choice",
            Self::FillInBlank => "fill in the blank",
            Self::Matching => "matching",
            Self::FreeText => "free text",
        }
    }

    /// Returns `true` if correctness is decided locally, without a grading call.
    ///
    /// # Examples
    ///
    /// ```
    /// use practice_engine::ExerciseKind;
    ///
    /// assert!(ExerciseKind::Matching.is_self_validating());
    /// assert!(!ExerciseKind::FillInBlank.is_self_validating());
    /// ```
    #[must_use]
    pub const fn is_self_validating(&self) -> bool {
        matches!(self, Self::Matching)
    }
}

impl std::fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExerciseKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str_case_insensitive(&s))
    }
}

impl Serialize for ExerciseKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Wire record
// ============================================================================

/// A term and its definition in a matching exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingPair {
    /// The term. Also the key that links it to its definition.
    pub term: String,
    /// The definition.
    pub definition: String,
}

impl MatchingPair {
    /// Creates a new pair.
    #[must_use]
    pub fn new(term: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            definition: definition.into(),
        }
    }
}

/// An exercise exactly as the generation service sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    /// Identifier assigned by the service.
    pub id: u64,

    /// Kind tag.
    #[serde(rename = "type", default)]
    pub kind: ExerciseKind,

    /// Question text.
    pub question: String,

    /// Expected answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    /// Options for multiple choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    /// Pairs for matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<MatchingPair>>,
}

// ============================================================================
// Exercise
// ============================================================================

/// A fill-in-blank question split around its single blank marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlankedSentence {
    /// Text before the blank.
    pub prefix: String,
    /// Text after the blank.
    pub suffix: String,
}

/// Per-kind payload of a validated exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExerciseBody {
    /// Non-empty option list and the expected option.
    MultipleChoice {
        /// Options in display order.
        options: Vec<String>,
        /// The expected option.
        answer: String,
    },
    /// Sentence with exactly one blank.
    FillInBlank {
        /// The question split around the blank.
        sentence: BlankedSentence,
        /// The missing word.
        answer: String,
    },
    /// Non-empty pair list with unique terms.
    Matching {
        /// Pairs in the order the service sent them.
        pairs: Vec<MatchingPair>,
    },
    /// Free-form question.
    FreeText {
        /// Reference answer, if the service provided one.
        answer: Option<String>,
    },
}

/// A validated exercise. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exercise {
    /// Identifier assigned by the service.
    pub id: u64,
    /// Question text as received.
    pub question: String,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub body: ExerciseBody,
}

impl Exercise {
    /// Returns the kind of this exercise.
    #[must_use]
    pub const fn kind(&self) -> ExerciseKind {
        match self.body {
            ExerciseBody::MultipleChoice { .. } => ExerciseKind::MultipleChoice,
            ExerciseBody::FillInBlank { .. } => ExerciseKind::FillInBlank,
            ExerciseBody::Matching { .. } => ExerciseKind::Matching,
            ExerciseBody::FreeText { .. } => ExerciseKind::FreeText,
        }
    }

    /// Returns `true` if this exercise is graded locally.
    #[must_use]
    pub const fn is_self_validating(&self) -> bool {
        self.kind().is_self_validating()
    }

    /// Returns the expected answer sent to the grading service.
    #[must_use]
    pub fn correct_answer(&self) -> Option<&str> {
        match &self.body {
            ExerciseBody::MultipleChoice { answer, .. } | ExerciseBody::FillInBlank { answer, .. } => {
                Some(answer)
            }
            ExerciseBody::FreeText { answer } => answer.as_deref(),
            ExerciseBody::Matching { .. } => None,
        }
    }
}

impl TryFrom<ExerciseRecord> for Exercise {
    type Error = PracticeError;

    fn try_from(record: ExerciseRecord) -> Result<Self> {
        let ExerciseRecord {
            id,
            kind,
            question,
            answer,
            options,
            pairs,
        } = record;

        let body = match kind {
            ExerciseKind::MultipleChoice => {
                let options = options.unwrap_or_default();
                if options.is_empty() {
                    return Err(PracticeError::invalid_exercise(id, "multiple choice without options"));
                }
                if options.iter().any(|o| o.trim().is_empty()) {
                    return Err(PracticeError::invalid_exercise(id, "multiple choice with a blank option"));
                }
                let answer = required_answer(id, answer)?;
                ExerciseBody::MultipleChoice { options, answer }
            }
            ExerciseKind::FillInBlank => {
                let sentence = split_blank(id, &question)?;
                let answer = required_answer(id, answer)?;
                ExerciseBody::FillInBlank { sentence, answer }
            }
            ExerciseKind::Matching => {
                let pairs = pairs.unwrap_or_default();
                validate_pairs(id, &pairs)?;
                ExerciseBody::Matching { pairs }
            }
            ExerciseKind::FreeText => ExerciseBody::FreeText { answer },
        };

        Ok(Self { id, question, body })
    }
}

fn required_answer(id: u64, answer: Option<String>) -> Result<String> {
    answer
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| PracticeError::invalid_exercise(id, "missing expected answer"))
}

fn validate_pairs(id: u64, pairs: &[MatchingPair]) -> Result<()> {
    if pairs.is_empty() {
        return Err(PracticeError::invalid_exercise(id, "matching without pairs"));
    }
    let mut seen = HashSet::new();
    for pair in pairs {
        if pair.term.trim().is_empty() {
            return Err(PracticeError::invalid_exercise(id, "matching pair with a blank term"));
        }
        if !seen.insert(pair.term.as_str()) {
            return Err(PracticeError::invalid_exercise(
                id,
                format!("duplicate matching term '{}'", pair.term),
            ));
        }
    }
    Ok(())
}

/// Splits a fill-in-blank question around its blank marker.
fn split_blank(id: u64, question: &str) -> Result<BlankedSentence> {
    let Ok(re) = Regex::new(BLANK_PATTERN) else {
        return Err(PracticeError::invalid_exercise(id, "blank pattern unavailable"));
    };

    let mut markers = re.find_iter(question);
    let (Some(marker), None) = (markers.next(), markers.next()) else {
        return Err(PracticeError::invalid_exercise(
            id,
            "fill in the blank needs exactly one blank marker",
        ));
    };

    Ok(BlankedSentence {
        prefix: question[..marker.start()].to_string(),
        suffix: question[marker.end()..].to_string(),
    })
}

/// Decodes and validates a batch of raw records, dropping the invalid ones.
///
/// Each record is decoded on its own, so a malformed record never takes the
/// rest of the batch with it. Order of the surviving exercises is preserved.
pub fn ingest(records: Vec<serde_json::Value>) -> Vec<Exercise> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(position, raw)| {
            let record = match ExerciseRecord::deserialize(raw) {
                Ok(record) => record,
                Err(error) => {
                    warn!(position, %error, "dropping malformed exercise record");
                    return None;
                }
            };
            match Exercise::try_from(record) {
                Ok(exercise) => Some(exercise),
                Err(error) => {
                    warn!(position, %error, "dropping invalid exercise");
                    None
                }
            }
        })
        .collect()
}
