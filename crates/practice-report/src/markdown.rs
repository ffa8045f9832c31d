//! Markdown report generation.
//!
//! [`MarkdownGenerator`] renders a [`Report`] as a human-readable document
//! with these sections:
//!
//! - A summary table with score, status and duration
//! - Scores per exercise kind
//! - One row per answered question
//! - The coaching summary
//! - The generation log
//!
//! # Example
//!
//! ```rust
//! use practice_report::{MarkdownGenerator, Report};
//!
//! let report = Report {
//!     topic: "Dutch nouns".to_string(),
//!     ..Report::default()
//! };
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Practice Report: Dutch nouns"));
//! ```

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{KindBreakdown, LogEntry, Report, ResultEntry};

/// Generates Markdown reports for finished sessions.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report, ending with a footer that
    /// carries the generation timestamp.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_body(&mut output);
        Self::write_footer(&mut output);

        output
    }

    fn write_body(&self, output: &mut String) {
        self.write_title(output);
        self.write_summary(output);
        self.write_breakdown(output);
        self.write_results(output);
        self.write_coach_feedback(output);
        self.write_generation_log(output);
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Practice Report: {}\n",
            escape_markdown(&self.report.topic)
        );
    }

    /// Writes the summary section with metrics table.
    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", summary.status.description());
        let _ = writeln!(
            output,
            "| Score | {}% ({} of {}) |",
            summary.score_percent, summary.correct, summary.total
        );
        let _ = writeln!(
            output,
            "| Answered | {} |",
            self.report.results.len()
        );
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(summary.duration_seconds)
        );
        let _ = writeln!(output);
    }

    fn write_breakdown(&self, output: &mut String) {
        if self.report.breakdown.is_empty() {
            return;
        }

        let _ = writeln!(output, "## By Exercise Type\n");
        let _ = writeln!(output, "| Type | Correct | Total | Score |");
        let _ = writeln!(output, "|------|---------|-------|-------|");
        for row in &self.report.breakdown {
            Self::write_breakdown_row(output, row);
        }
        let _ = writeln!(output);
    }

    fn write_breakdown_row(output: &mut String, row: &KindBreakdown) {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {}% |",
            row.kind.label(),
            row.correct,
            row.total,
            row.percent()
        );
    }

    fn write_results(&self, output: &mut String) {
        let _ = writeln!(output, "## Questions\n");

        if self.report.results.is_empty() {
            let _ = writeln!(output, "*No questions were answered.*\n");
            return;
        }

        let _ = writeln!(output, "| # | Question | Type | Result |");
        let _ = writeln!(output, "|---|----------|------|--------|");
        for entry in &self.report.results {
            Self::write_result_row(output, entry);
        }
        let _ = writeln!(output);
    }

    fn write_result_row(output: &mut String, entry: &ResultEntry) {
        let result = if entry.is_correct {
            "&#9989; Correct"
        } else {
            "&#10060; Incorrect"
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            entry.number,
            escape_markdown(&entry.question),
            entry.kind.label(),
            result
        );
    }

    fn write_coach_feedback(&self, output: &mut String) {
        let Some(feedback) = &self.report.coach_feedback else {
            return;
        };

        let _ = writeln!(output, "## Coach Feedback\n");
        for line in feedback.lines() {
            let _ = writeln!(output, "> {line}");
        }
        let _ = writeln!(output);
    }

    fn write_generation_log(&self, output: &mut String) {
        if self.report.generation_log.is_empty() {
            return;
        }

        let _ = writeln!(output, "## Generation Log\n");
        for entry in &self.report.generation_log {
            Self::write_log_entry(output, entry);
        }
        let _ = writeln!(output);
    }

    fn write_log_entry(output: &mut String, entry: &LogEntry) {
        let _ = writeln!(
            output,
            "- `{}` {}",
            entry.timestamp.format("%H:%M:%S"),
            escape_markdown(&entry.message)
        );
    }

    fn write_footer(output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&Utc::now());
        let _ = writeln!(output, "*Generated by practice at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a duration in seconds to a human-readable string.
///
/// Examples:
/// - 65 seconds -> "1m 5s"
/// - 3661 seconds -> "1h 1m 1s"
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes Markdown control characters so user text cannot break tables.
/// Newlines become `<br>`.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{QuestionKind, ReportStatus, ReportSummary};
    use chrono::TimeZone;

    fn sample_report() -> Report {
        Report {
            topic: "Dutch nouns".to_string(),
            summary: ReportSummary {
                status: ReportStatus::Completed,
                score_percent: 67,
                correct: 2,
                total: 3,
                duration_seconds: 332,
            },
            results: vec![
                ResultEntry {
                    number: 1,
                    question: "Wat is 'house'?".to_string(),
                    kind: QuestionKind::MultipleChoice,
                    is_correct: true,
                },
                ResultEntry {
                    number: 2,
                    question: "De _____ slaapt.".to_string(),
                    kind: QuestionKind::FillInBlank,
                    is_correct: false,
                },
                ResultEntry {
                    number: 3,
                    question: "Match the animals".to_string(),
                    kind: QuestionKind::Matching,
                    is_correct: true,
                },
            ],
            breakdown: vec![
                KindBreakdown {
                    kind: QuestionKind::MultipleChoice,
                    correct: 1,
                    total: 1,
                },
                KindBreakdown {
                    kind: QuestionKind::FillInBlank,
                    correct: 0,
                    total: 1,
                },
                KindBreakdown {
                    kind: QuestionKind::Matching,
                    correct: 1,
                    total: 1,
                },
            ],
            coach_feedback: Some("Solid start.\nReview de and het.".to_string()),
            generation_log: vec![
                LogEntry::at_time(
                    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
                    "Generating exercises...",
                ),
                LogEntry::at_time(
                    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 4).unwrap(),
                    "Validating exercises...",
                ),
            ],
        }
    }

    /// Generates markdown without the footer (which has dynamic timestamp).
    fn generate_without_footer(report: &Report) -> String {
        let mut output = String::new();
        MarkdownGenerator::new(report).write_body(&mut output);
        output
    }

    #[test]
    fn test_generate_contains_footer() {
        let markdown = MarkdownGenerator::new(&sample_report()).generate();
        assert!(markdown.contains("---\n*Generated by practice at "));
        assert!(markdown.trim_end().ends_with("UTC*"));
    }

    #[test]
    fn test_full_report_structure() {
        let markdown = generate_without_footer(&sample_report());
        insta::assert_snapshot!(markdown, @r"
        # Practice Report: Dutch nouns

        ## Summary

        | Metric | Value |
        |--------|-------|
        | Status | Session completed |
        | Score | 67% (2 of 3) |
        | Answered | 3 |
        | Duration | 5m 32s |

        ## By Exercise Type

        | Type | Correct | Total | Score |
        |------|---------|-------|-------|
        | Multiple choice | 1 | 1 | 100% |
        | Fill in the blank | 0 | 1 | 0% |
        | Matching | 1 | 1 | 100% |

        ## Questions

        | # | Question | Type | Result |
        |---|----------|------|--------|
        | 1 | Wat is 'house'? | Multiple choice | &#9989; Correct |
        | 2 | De \_\_\_\_\_ slaapt. | Fill in the blank | &#10060; Incorrect |
        | 3 | Match the animals | Matching | &#9989; Correct |

        ## Coach Feedback

        > Solid start.
        > Review de and het.

        ## Generation Log

        - `09:00:00` Generating exercises...
        - `09:00:04` Validating exercises...
        ");
    }

    #[test]
    fn test_empty_report_structure() {
        let report = Report {
            topic: "Klingon".to_string(),
            summary: ReportSummary {
                status: ReportStatus::Errored,
                ..ReportSummary::default()
            },
            ..Report::default()
        };
        let markdown = generate_without_footer(&report);

        assert!(markdown.contains("| Status | Exercise generation failed |"));
        assert!(markdown.contains("| Score | 0% (0 of 0) |"));
        assert!(markdown.contains("*No questions were answered.*"));
        assert!(!markdown.contains("## By Exercise Type"));
        assert!(!markdown.contains("## Coach Feedback"));
        assert!(!markdown.contains("## Generation Log"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(65), "1m 5s");
        assert_eq!(format_duration(3600), "1h");
        assert_eq!(format_duration(3661), "1h 1m 1s");
    }

    #[test]
    fn test_escape_markdown() {
        insta::assert_snapshot!(escape_markdown("a|b*c"), @r"a\|b\*c");
        assert_eq!(escape_markdown("line1\nline2"), "line1<br>line2");
        assert_eq!(escape_markdown("plain (text)"), "plain (text)");
    }
}
