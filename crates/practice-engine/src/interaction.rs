//! Per-exercise interaction state.
//!
//! An [`Interaction`] is created for the current exercise and consumes learner
//! [`Action`]s until it produces exactly one [`Answer`]. After that it
//! ignores every further action.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tracing::debug;

use crate::exercise::{Exercise, ExerciseBody, ExerciseKind, MatchingPair};

/// How long a wrong matching attempt stays flagged.
pub const WRONG_FLASH: Duration = Duration::from_secs(1);

/// A learner input applied to the current exercise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Pick the option at the given display position.
    ChooseOption(usize),
    /// Replace the text entry buffer.
    EditText(String),
    /// Submit the text entry buffer.
    SubmitText,
    /// Select the term at the given display position.
    SelectTerm(usize),
    /// Select the definition at the given display position.
    SelectDefinition(usize),
}

/// The single answer an interaction produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// A text answer to send to the grader.
    Text(String),
    /// All matching pairs were completed locally.
    SelfChecked,
}

impl Answer {
    /// Marker recorded for a completed matching exercise.
    pub const COMPLETED_MATCHING: &'static str = "Completed Matching";

    /// Returns the answer text as submitted.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::SelfChecked => Self::COMPLETED_MATCHING,
        }
    }
}

// ============================================================================
// Matching board
// ============================================================================

/// A definition card on the matching board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionCard {
    /// The term this definition belongs to.
    pub key: String,
    /// Display text.
    pub text: String,
}

/// Outcome of selecting a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The selected term and definition belong together.
    Matched,
    /// They do not. The definition is flagged and the term deselected.
    Mismatched,
    /// Nothing happened (no term selected, already matched, or bad position).
    Ignored,
}

/// Interactive state of a matching exercise.
///
/// Correctness is keyed on the term, never on display position, so the
/// layout may be shuffled freely.
#[derive(Debug, Clone)]
pub struct MatchingBoard {
    terms: Vec<String>,
    definitions: Vec<DefinitionCard>,
    matched: HashSet<String>,
    selected_term: Option<String>,
    wrong: Option<(String, Instant)>,
}

impl MatchingBoard {
    fn new(pairs: &[MatchingPair], shuffle: bool) -> Self {
        let mut terms: Vec<String> = pairs.iter().map(|p| p.term.clone()).collect();
        let mut definitions: Vec<DefinitionCard> = pairs
            .iter()
            .map(|p| DefinitionCard {
                key: p.term.clone(),
                text: p.definition.clone(),
            })
            .collect();

        if shuffle {
            let mut rng = rand::thread_rng();
            terms.shuffle(&mut rng);
            definitions.shuffle(&mut rng);
        }

        Self {
            terms,
            definitions,
            matched: HashSet::new(),
            selected_term: None,
            wrong: None,
        }
    }

    /// Terms in display order.
    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Definitions in display order.
    #[must_use]
    pub fn definitions(&self) -> &[DefinitionCard] {
        &self.definitions
    }

    /// The currently selected term, if any.
    #[must_use]
    pub fn selected_term(&self) -> Option<&str> {
        self.selected_term.as_deref()
    }

    /// Returns `true` if the pair keyed by `term` has been matched.
    #[must_use]
    pub fn is_matched(&self, term: &str) -> bool {
        self.matched.contains(term)
    }

    /// Number of matched pairs.
    #[must_use]
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    /// Returns `true` once every pair is matched.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.matched.len() == self.terms.len()
    }

    /// The key of the definition flagged by the last wrong attempt, while the
    /// flag is still showing.
    #[must_use]
    pub fn wrong_definition(&self) -> Option<&str> {
        self.wrong
            .as_ref()
            .filter(|(_, at)| at.elapsed() < WRONG_FLASH)
            .map(|(key, _)| key.as_str())
    }

    /// Selects the term at `position`. Matched terms cannot be selected.
    pub fn select_term(&mut self, position: usize) {
        let Some(term) = self.terms.get(position) else {
            return;
        };
        if self.matched.contains(term) {
            return;
        }
        self.selected_term = Some(term.clone());
        self.wrong = None;
    }

    /// Selects the definition at `position` against the selected term.
    pub fn select_definition(&mut self, position: usize) -> MatchOutcome {
        let Some(card) = self.definitions.get(position) else {
            return MatchOutcome::Ignored;
        };
        if self.matched.contains(&card.key) {
            return MatchOutcome::Ignored;
        }
        let Some(term) = self.selected_term.take() else {
            return MatchOutcome::Ignored;
        };

        if term == card.key {
            self.matched.insert(term);
            self.wrong = None;
            MatchOutcome::Matched
        } else {
            self.wrong = Some((card.key.clone(), Instant::now()));
            MatchOutcome::Mismatched
        }
    }
}

// ============================================================================
// Interaction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextPolicy {
    /// Trim and reject empty input.
    Trimmed,
    /// Pass input through unchanged.
    Raw,
}

#[derive(Debug, Clone)]
enum VariantState {
    Choice {
        options: Vec<String>,
        selected: Option<usize>,
    },
    Text {
        buffer: String,
        policy: TextPolicy,
    },
    Matching(MatchingBoard),
}

/// Render state of an interaction.
#[derive(Debug, Clone, Copy)]
pub enum InteractionView<'a> {
    /// Option list with the chosen position.
    Choice {
        /// Options in display order.
        options: &'a [String],
        /// Chosen position, once picked.
        selected: Option<usize>,
    },
    /// Text entry.
    Text {
        /// Current buffer.
        buffer: &'a str,
    },
    /// Matching board.
    Matching(&'a MatchingBoard),
}

/// Interaction state for the current exercise.
#[derive(Debug, Clone)]
pub struct Interaction {
    kind: ExerciseKind,
    state: VariantState,
    submitted: bool,
}

impl Interaction {
    /// Creates fresh interaction state for an exercise.
    #[must_use]
    pub fn new(exercise: &Exercise, shuffle_matching: bool) -> Self {
        let state = match &exercise.body {
            ExerciseBody::MultipleChoice { options, .. } => VariantState::Choice {
                options: options.clone(),
                selected: None,
            },
            ExerciseBody::FillInBlank { .. } => VariantState::Text {
                buffer: String::new(),
                policy: TextPolicy::Trimmed,
            },
            ExerciseBody::FreeText { .. } => VariantState::Text {
                buffer: String::new(),
                policy: TextPolicy::Raw,
            },
            ExerciseBody::Matching { pairs } => {
                VariantState::Matching(MatchingBoard::new(pairs, shuffle_matching))
            }
        };

        Self {
            kind: exercise.kind(),
            state,
            submitted: false,
        }
    }

    /// The kind of exercise being answered.
    #[must_use]
    pub const fn kind(&self) -> ExerciseKind {
        self.kind
    }

    /// Returns `true` once an answer has been produced.
    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Returns the current render state.
    #[must_use]
    pub fn view(&self) -> InteractionView<'_> {
        match &self.state {
            VariantState::Choice { options, selected } => InteractionView::Choice {
                options,
                selected: *selected,
            },
            VariantState::Text { buffer, .. } => InteractionView::Text { buffer },
            VariantState::Matching(board) => InteractionView::Matching(board),
        }
    }

    /// Applies a learner action.
    ///
    /// Returns the answer the first time the action completes the exercise.
    /// Actions that do not fit the exercise kind, and every action after the
    /// answer was produced, are ignored.
    pub fn apply(&mut self, action: Action) -> Option<Answer> {
        if self.submitted {
            debug!(kind = %self.kind, "ignoring action on answered exercise");
            return None;
        }

        let answer = match (&mut self.state, action) {
            (VariantState::Choice { options, selected }, Action::ChooseOption(position)) => {
                let option = options.get(position)?.clone();
                *selected = Some(position);
                Some(Answer::Text(option))
            }
            (VariantState::Text { buffer, .. }, Action::EditText(text)) => {
                *buffer = text;
                None
            }
            (VariantState::Text { buffer, policy }, Action::SubmitText) => match policy {
                TextPolicy::Trimmed => {
                    let trimmed = buffer.trim();
                    (!trimmed.is_empty()).then(|| Answer::Text(trimmed.to_string()))
                }
                TextPolicy::Raw => Some(Answer::Text(buffer.clone())),
            },
            (VariantState::Matching(board), Action::SelectTerm(position)) => {
                board.select_term(position);
                None
            }
            (VariantState::Matching(board), Action::SelectDefinition(position)) => {
                let outcome = board.select_definition(position);
                debug!(?outcome, matched = board.matched_count(), "definition selected");
                (outcome == MatchOutcome::Matched && board.is_complete())
                    .then_some(Answer::SelfChecked)
            }
            (_, action) => {
                debug!(kind = %self.kind, ?action, "action does not apply to exercise");
                None
            }
        };

        if answer.is_some() {
            self.submitted = true;
        }
        answer
    }
}
