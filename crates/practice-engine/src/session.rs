//! Session state and the controller that drives it.
//!
//! ```text
//! loading ──result──▶ active ──submit──▶ feedback ──advance──▶ active
//!    │                                       │
//!    └──error──▶ errored                     └──advance (last)──▶ complete
//! ```
//!
//! Every mutation goes through a [`SessionController`] method taking
//! `&mut self`, so submissions are serialized by construction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::PracticeApi;
use crate::config::SessionConfig;
use crate::error::{ConnectionErrorKind, PracticeError, Result};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::exercise::{Exercise, ExerciseKind};
use crate::fetcher::{FetchSignal, SessionFetcher};
use crate::grading::{GradingClient, Summary, Verdict};
use crate::interaction::{Action, Answer, Interaction};
use crate::store::SessionStore;

// ============================================================================
// Phase
// ============================================================================

/// Current phase of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the generation stream to deliver exercises.
    #[default]
    Loading,
    /// The current exercise is awaiting an answer.
    Active,
    /// The current exercise's verdict is showing.
    Feedback,
    /// Every exercise was answered and the summary is available.
    Complete,
    /// Generation failed.
    Errored,
}

impl Phase {
    /// Returns `true` for `Complete` and `Errored`.
    ///
    /// # Examples
    ///
    /// ```
    /// use practice_engine::Phase;
    ///
    /// assert!(Phase::Errored.is_terminal());
    /// assert!(!Phase::Feedback.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }

    /// Returns the phase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Feedback => "feedback",
            Self::Complete => "complete",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// The retained outcome of one answered exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Question text.
    pub question: String,
    /// Exercise kind.
    #[serde(rename = "type")]
    pub kind: ExerciseKind,
    /// Whether the answer was correct.
    pub is_correct: bool,
}

impl AnswerRecord {
    fn new(exercise: &Exercise, is_correct: bool) -> Self {
        Self {
            question: exercise.question.clone(),
            kind: exercise.kind(),
            is_correct,
        }
    }
}

/// A generation status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the message arrived.
    pub timestamp: DateTime<Utc>,
    /// The message.
    pub message: String,
}

/// Position within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// 1-based position of the current exercise.
    pub position: usize,
    /// Total exercises.
    pub total: usize,
    /// Rounded percentage of exercises passed.
    pub percent: u32,
}

/// Final score of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    /// Correct answers.
    pub correct: usize,
    /// Total exercises.
    pub total: usize,
    /// Rounded percentage.
    pub percent: u32,
}

/// Rounds `part / whole` to the nearest whole percent, halves up.
///
/// Returns 0 when `whole` is 0.
///
/// # Examples
///
/// ```
/// use practice_engine::score_percent;
///
/// assert_eq!(score_percent(2, 3), 67);
/// assert_eq!(score_percent(1, 8), 13);
/// assert_eq!(score_percent(0, 0), 0);
/// ```
#[must_use]
pub fn score_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = part.min(whole);
    u32::try_from((200 * part + whole) / (2 * whole)).unwrap_or(100)
}

// ============================================================================
// SessionState
// ============================================================================

/// Everything known about the running session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    /// Session topic.
    pub topic: String,
    /// Validated exercises in session order.
    pub exercises: Vec<Exercise>,
    /// Index of the current exercise.
    pub current_index: usize,
    /// One record per answered exercise, in order.
    pub results: Vec<AnswerRecord>,
    /// Current phase.
    pub phase: Phase,
    /// Verdict showing in `feedback`.
    pub pending_feedback: Option<Verdict>,
    /// Generation status messages.
    pub log: Vec<LogEntry>,
    /// Coaching summary once complete.
    pub ai_summary: Option<String>,
    /// Failure message once errored.
    pub error: Option<String>,
    /// Generation number of the request that fed this state.
    pub generation: u64,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Creates a fresh `loading` state.
    #[must_use]
    pub fn new(topic: impl Into<String>, generation: u64) -> Self {
        let now = Utc::now();
        Self {
            topic: topic.into(),
            exercises: Vec::new(),
            current_index: 0,
            results: Vec::new(),
            phase: Phase::Loading,
            pending_feedback: None,
            log: Vec::new(),
            ai_summary: None,
            error: None,
            generation,
            started_at: now,
            updated_at: now,
        }
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Returns the time between the start and the last change.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }

    /// Number of correct answers so far.
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_correct).count()
    }
}

// ============================================================================
// SessionController
// ============================================================================

/// Drives one session from generation to summary.
#[derive(Debug)]
pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    fetcher: SessionFetcher,
    grading: GradingClient,
    interaction: Option<Interaction>,
    broadcaster: EventBroadcaster,
    shuffle_matching: bool,
}

impl SessionController {
    /// Creates an idle controller. Call [`SessionController::start`] to begin.
    #[must_use]
    pub fn new(config: SessionConfig, api: Arc<dyn PracticeApi>) -> Self {
        let state = SessionState::new(config.topic.clone(), 0);
        Self {
            config,
            state,
            fetcher: SessionFetcher::new(Arc::clone(&api)),
            grading: GradingClient::new(api),
            interaction: None,
            broadcaster: EventBroadcaster::default(),
            shuffle_matching: true,
        }
    }

    /// Creates a controller from explicit inputs, falling back to the store.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::MissingSessionInput` if the topic or credential
    /// is unavailable, or the store's error.
    pub fn from_store(
        topic: Option<String>,
        credential: Option<String>,
        store: &dyn SessionStore,
        api: Arc<dyn PracticeApi>,
    ) -> Result<Self> {
        let config = SessionConfig::resolve(topic, credential, store)?;
        Ok(Self::new(config, api))
    }

    /// Publishes events on the given broadcaster.
    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: EventBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Enables or disables shuffling of matching layouts.
    #[must_use]
    pub const fn with_shuffle_matching(mut self, shuffle: bool) -> Self {
        self.shuffle_matching = shuffle;
        self
    }

    /// The session inputs.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read-only view of the session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    /// The exercise being answered or reviewed.
    #[must_use]
    pub fn current_exercise(&self) -> Option<&Exercise> {
        match self.state.phase {
            Phase::Active | Phase::Feedback => self.state.exercises.get(self.state.current_index),
            _ => None,
        }
    }

    /// Interaction state of the current exercise.
    #[must_use]
    pub const fn interaction(&self) -> Option<&Interaction> {
        self.interaction.as_ref()
    }

    /// Position within the session.
    #[must_use]
    pub fn progress(&self) -> Progress {
        let total = self.state.exercises.len();
        Progress {
            position: (self.state.current_index + 1).min(total),
            total,
            percent: score_percent(self.state.current_index, total),
        }
    }

    /// Score over all exercises.
    #[must_use]
    pub fn score(&self) -> Score {
        let total = self.state.exercises.len();
        let correct = self.state.correct_count();
        Score {
            correct,
            total,
            percent: score_percent(correct, total),
        }
    }

    /// Starts a new generation request with fresh state.
    ///
    /// Any request in flight is superseded and its events are discarded.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> u64 {
        let generation = self
            .fetcher
            .start(&self.config.topic, &self.config.credential);
        self.state = SessionState::new(self.config.topic.clone(), generation);
        self.interaction = None;

        info!(generation, topic = %self.config.topic, "session started");
        self.broadcaster
            .send(SessionEvent::started(self.config.topic.clone(), generation));
        generation
    }

    /// Consumes generation signals until the session leaves `loading`.
    ///
    /// Returns the new phase: `active`, `complete` (no exercises) or `errored`.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::InvalidStateTransition` if the session was never
    /// started or is not loading.
    pub async fn wait_until_ready(&mut self) -> Result<Phase> {
        if self.state.generation == 0 || self.state.phase != Phase::Loading {
            return Err(PracticeError::invalid_transition(self.state.phase, "ready"));
        }

        while self.state.phase == Phase::Loading {
            match self.fetcher.next_signal().await {
                Some(signal) => self.on_signal(signal),
                None => {
                    let error = PracticeError::connection(
                        ConnectionErrorKind::ClosedEarly,
                        crate::api::GENERATE_PATH,
                        "stream ended without a result",
                    );
                    self.fail(error.user_message());
                }
            }
        }

        if self.state.phase == Phase::Feedback {
            // An empty exercise list goes straight to the summary
            self.finish().await;
        }
        Ok(self.state.phase)
    }

    fn on_signal(&mut self, signal: FetchSignal) {
        if self.state.phase != Phase::Loading {
            debug!(phase = %self.state.phase, "ignoring generation signal outside loading");
            return;
        }

        match signal {
            FetchSignal::Status(message) => {
                debug!(generation = self.state.generation, %message, "generation status");
                self.state.log.push(LogEntry {
                    timestamp: Utc::now(),
                    message: message.clone(),
                });
                self.state.touch();
                self.broadcaster.send(SessionEvent::status(message));
            }
            FetchSignal::Ready(exercises) => {
                let total = exercises.len();
                self.interaction = exercises
                    .first()
                    .map(|exercise| Interaction::new(exercise, self.shuffle_matching));
                self.state.exercises = exercises;
                self.state.current_index = 0;
                // With nothing to answer, park in feedback until the summary is resolved
                self.state.phase = if total == 0 {
                    Phase::Feedback
                } else {
                    Phase::Active
                };
                self.state.touch();

                info!(generation = self.state.generation, total, "session ready");
                self.broadcaster.send(SessionEvent::ready(total));
            }
            FetchSignal::Failed(message) => self.fail(message),
        }
    }

    fn fail(&mut self, message: String) {
        warn!(generation = self.state.generation, %message, "session errored");
        self.state.phase = Phase::Errored;
        self.state.error = Some(message.clone());
        self.state.touch();
        self.broadcaster.send(SessionEvent::failed(message));
    }

    /// Applies a learner action to the current exercise.
    ///
    /// Returns the verdict when the action produced an answer. In `feedback`
    /// the call is a no-op returning `None`, so a repeated submission never
    /// records or grades twice.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::InvalidStateTransition` outside `active` and
    /// `feedback`.
    pub async fn interact(&mut self, action: Action) -> Result<Option<Verdict>> {
        match self.state.phase {
            Phase::Active => {}
            Phase::Feedback => {
                debug!(index = self.state.current_index, "exercise already graded, ignoring action");
                return Ok(None);
            }
            phase => return Err(PracticeError::invalid_transition(phase, "submit")),
        }

        let Some(interaction) = self.interaction.as_mut() else {
            return Err(PracticeError::invalid_transition(self.state.phase, "submit"));
        };
        let Some(answer) = interaction.apply(action) else {
            return Ok(None);
        };

        Ok(Some(self.grade(answer).await))
    }

    /// Sets the text buffer and submits it.
    ///
    /// # Errors
    ///
    /// Same as [`SessionController::interact`].
    pub async fn answer_text(&mut self, text: impl Into<String>) -> Result<Option<Verdict>> {
        if self.state.phase == Phase::Active {
            self.interact(Action::EditText(text.into())).await?;
        }
        self.interact(Action::SubmitText).await
    }

    async fn grade(&mut self, answer: Answer) -> Verdict {
        let index = self.state.current_index;
        let Some(exercise) = self.state.exercises.get(index) else {
            return Verdict::fallback();
        };

        let verdict = self
            .grading
            .grade(exercise, &answer, &self.config.credential)
            .await;
        let kind = exercise.kind();
        let record = AnswerRecord::new(exercise, verdict.is_correct);

        if self.state.results.len() == index {
            self.state.results.push(record);
        } else {
            warn!(index, recorded = self.state.results.len(), "result already recorded");
        }

        info!(
            index,
            %kind,
            is_correct = verdict.is_correct,
            degraded = verdict.is_degraded(),
            "answer graded"
        );
        self.broadcaster.send(SessionEvent::graded(
            index,
            kind,
            verdict.is_correct,
            verdict.source,
        ));

        self.state.pending_feedback = Some(verdict.clone());
        self.state.phase = Phase::Feedback;
        self.state.touch();
        verdict
    }

    /// Leaves `feedback` for the next exercise, or completes the session.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::InvalidStateTransition` outside `feedback`.
    pub async fn advance(&mut self) -> Result<Phase> {
        if self.state.phase != Phase::Feedback {
            return Err(PracticeError::invalid_transition(self.state.phase, "advance"));
        }

        self.state.pending_feedback = None;
        let next = self.state.current_index + 1;
        let total = self.state.exercises.len();

        if next < total {
            self.state.current_index = next;
            self.interaction = self
                .state
                .exercises
                .get(next)
                .map(|exercise| Interaction::new(exercise, self.shuffle_matching));
            self.state.phase = Phase::Active;
            self.state.touch();

            debug!(index = next, total, "advanced to next exercise");
            self.broadcaster.send(SessionEvent::advanced(next, total));
        } else {
            self.finish().await;
        }

        Ok(self.state.phase)
    }

    async fn finish(&mut self) {
        self.interaction = None;
        let summary = if self.state.results.is_empty() {
            debug!("no results to summarize, using fallback summary");
            Summary::fallback()
        } else {
            self.grading
                .summarize(&self.state.results, &self.config.credential)
                .await
        };

        self.state.ai_summary = Some(summary.text);
        self.state.phase = Phase::Complete;
        self.state.touch();

        let score = self.score();
        info!(
            correct = score.correct,
            total = score.total,
            percent = score.percent,
            degraded = summary.degraded,
            elapsed_secs = self.state.elapsed().num_seconds(),
            "session complete"
        );
        self.broadcaster.send(SessionEvent::completed(
            score.correct,
            score.total,
            score.percent,
            summary.degraded,
        ));
    }
}
