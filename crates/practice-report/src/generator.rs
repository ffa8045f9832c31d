//! Builds a [`Report`] from raw session data.

use chrono::{DateTime, Utc};

use crate::{
    score_percent, KindBreakdown, LogEntry, QuestionKind, Report, ReportStatus, ReportSummary,
    ResultEntry,
};

/// One answered question as recorded by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultInput {
    /// Question text.
    pub question: String,
    /// Exercise kind.
    pub kind: QuestionKind,
    /// Whether the answer was correct.
    pub is_correct: bool,
}

impl ResultInput {
    /// Creates a result.
    #[must_use]
    pub fn new(question: impl Into<String>, kind: QuestionKind, is_correct: bool) -> Self {
        Self {
            question: question.into(),
            kind,
            is_correct,
        }
    }
}

/// Raw session data for a report.
#[derive(Debug, Clone)]
pub struct ReportInput {
    /// Session topic.
    pub topic: String,
    /// How the session ended.
    pub status: ReportStatus,
    /// Exercises in the session, answered or not.
    pub total_exercises: usize,
    /// Answered questions, in order.
    pub results: Vec<ResultInput>,
    /// Coaching summary, if one was produced.
    pub coach_feedback: Option<String>,
    /// Generation status messages.
    pub log: Vec<LogEntry>,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended.
    pub finished_at: DateTime<Utc>,
}

impl Default for ReportInput {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            topic: String::new(),
            status: ReportStatus::default(),
            total_exercises: 0,
            results: Vec::new(),
            coach_feedback: None,
            log: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }
}

/// Computes score, breakdown and duration for a report.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    input: ReportInput,
}

impl ReportGenerator {
    /// Creates a generator over the given session data.
    #[must_use]
    pub const fn new(input: ReportInput) -> Self {
        Self { input }
    }

    /// Generates the report.
    ///
    /// The score is taken over all exercises, so unanswered exercises of an
    /// incomplete session count as missed.
    #[must_use]
    pub fn generate(self) -> Report {
        let ReportInput {
            topic,
            status,
            total_exercises,
            results,
            coach_feedback,
            log,
            started_at,
            finished_at,
        } = self.input;

        let total = total_exercises.max(results.len());
        let correct = results.iter().filter(|r| r.is_correct).count();
        let duration_seconds =
            u64::try_from((finished_at - started_at).num_seconds()).unwrap_or(0);

        let breakdown = breakdown(&results);
        let results = results
            .into_iter()
            .enumerate()
            .map(|(i, r)| ResultEntry {
                number: i + 1,
                question: r.question,
                kind: r.kind,
                is_correct: r.is_correct,
            })
            .collect();

        Report {
            topic,
            summary: ReportSummary {
                status,
                score_percent: score_percent(correct, total),
                correct,
                total,
                duration_seconds,
            },
            results,
            breakdown,
            coach_feedback,
            generation_log: log,
        }
    }
}

/// Groups results by kind in order of first appearance.
fn breakdown(results: &[ResultInput]) -> Vec<KindBreakdown> {
    let mut rows: Vec<KindBreakdown> = Vec::new();
    for result in results {
        let row = if let Some(row) = rows.iter_mut().find(|row| row.kind == result.kind) {
            row
        } else {
            rows.push(KindBreakdown {
                kind: result.kind,
                correct: 0,
                total: 0,
            });
            let last = rows.len() - 1;
            &mut rows[last]
        };
        row.total += 1;
        if result.is_correct {
            row.correct += 1;
        }
    }
    rows
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn input(results: Vec<ResultInput>, total: usize) -> ReportInput {
        ReportInput {
            topic: "Dutch nouns".to_string(),
            total_exercises: total,
            results,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 4, 5).unwrap(),
            ..ReportInput::default()
        }
    }

    #[test]
    fn test_generate_computes_score_and_duration() {
        let report = ReportGenerator::new(input(
            vec![
                ResultInput::new("Q1", QuestionKind::MultipleChoice, true),
                ResultInput::new("Q2", QuestionKind::MultipleChoice, true),
                ResultInput::new("Q3", QuestionKind::FreeText, false),
            ],
            3,
        ))
        .generate();

        assert_eq!(report.summary.score_percent, 67);
        assert_eq!(report.summary.correct, 2);
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.duration_seconds, 245);
        assert_eq!(report.results[2].number, 3);
    }

    #[test]
    fn test_breakdown_keeps_first_seen_order() {
        let report = ReportGenerator::new(input(
            vec![
                ResultInput::new("Q1", QuestionKind::Matching, true),
                ResultInput::new("Q2", QuestionKind::FillInBlank, false),
                ResultInput::new("Q3", QuestionKind::Matching, true),
            ],
            3,
        ))
        .generate();

        let kinds: Vec<QuestionKind> = report.breakdown.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![QuestionKind::Matching, QuestionKind::FillInBlank]);
        assert_eq!(report.breakdown[0].correct, 2);
        assert_eq!(report.breakdown[1].percent(), 0);
    }

    #[test]
    fn test_empty_session_scores_zero() {
        let report = ReportGenerator::new(input(Vec::new(), 0)).generate();
        assert_eq!(report.summary.score_percent, 0);
        assert!(report.breakdown.is_empty());
    }

    #[test]
    fn test_incomplete_session_counts_unanswered_as_missed() {
        let mut data = input(vec![ResultInput::new("Q1", QuestionKind::FreeText, true)], 4);
        data.status = ReportStatus::Incomplete;
        let report = ReportGenerator::new(data).generate();
        assert_eq!(report.summary.score_percent, 25);
        assert_eq!(report.summary.status, ReportStatus::Incomplete);
    }
}
