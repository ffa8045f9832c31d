//! Practice Session Engine
//!
//! Streams generated exercises from the practice service, drives the
//! per-exercise interaction, grades answers and aggregates the results of a
//! single-learner session.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod exercise;
pub mod fetcher;
pub mod grading;
pub mod interaction;
pub mod reporter;
pub mod session;
pub mod store;
pub mod stream;

pub use api::{
    ByteStream, CheckAnswerRequest, ErrorReport, GenerateRequest, HttpPracticeApi, PracticeApi,
    SessionFeedbackRequest, SessionFeedbackResponse,
};
pub use config::{Config, ReportFormat, SessionConfig};
pub use error::{ConnectionErrorKind, PracticeError, Result};
pub use events::{EventBroadcaster, SessionEvent};
pub use exercise::{
    BlankedSentence, Exercise, ExerciseBody, ExerciseKind, ExerciseRecord, MatchingPair,
};
pub use fetcher::{FetchSignal, SessionFetcher};
pub use grading::{GradingClient, Summary, Verdict, VerdictSource};
pub use interaction::{
    Action, Answer, DefinitionCard, Interaction, InteractionView, MatchOutcome, MatchingBoard,
};
pub use reporter::ErrorReporter;
pub use session::{
    score_percent, AnswerRecord, LogEntry, Phase, Progress, Score, SessionController,
    SessionState,
};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoredSession};
pub use stream::{StreamDecoder, StreamEvent};
