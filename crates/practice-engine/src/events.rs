//! Session event types and broadcasting.
//!
//! The controller publishes an event for every transition so observers (the
//! CLI, tests) can follow a session without polling its state.
//!
//! # Event Types
//!
//! - `started` - A generation request was issued
//! - `status` - The service reported generation progress
//! - `ready` - Exercises arrived and the first one is active
//! - `failed` - Generation failed; the session is errored
//! - `graded` - An answer was graded
//! - `advanced` - The next exercise became active
//! - `completed` - The session finished with a final score
//!
//! # Example
//!
//! ```no_run
//! use practice_engine::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::status("Generating exercises..."));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::exercise::ExerciseKind;
use crate::grading::VerdictSource;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedPayload {
    /// Session topic.
    pub topic: String,
    /// Generation number of the new request.
    pub generation: u64,
    /// When the request was issued.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// Progress message from the service.
    pub message: String,
}

/// Payload for the `ready` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    /// Number of exercises that passed validation.
    pub exercises: usize,
}

/// Payload for the `failed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPayload {
    /// Message shown to the learner.
    pub message: String,
}

/// Payload for the `graded` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedPayload {
    /// Index of the graded exercise.
    pub index: usize,
    /// Kind of the graded exercise.
    pub kind: ExerciseKind,
    /// Whether the answer was correct.
    pub is_correct: bool,
    /// Where the verdict came from.
    pub source: VerdictSource,
}

/// Payload for the `advanced` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedPayload {
    /// Index of the exercise that became active.
    pub index: usize,
    /// Total number of exercises.
    pub total: usize,
}

/// Payload for the `completed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPayload {
    /// Correct answers.
    pub correct: usize,
    /// Total exercises.
    pub total: usize,
    /// Rounded score percentage.
    pub percent: u32,
    /// `true` if the summary is the fallback message.
    pub summary_degraded: bool,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Session events.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A generation request was issued.
    Started(StartedPayload),
    /// Generation progress from the service.
    Status(StatusPayload),
    /// Exercises are available.
    Ready(ReadyPayload),
    /// Generation failed.
    Failed(FailedPayload),
    /// An answer was graded.
    Graded(GradedPayload),
    /// The next exercise became active.
    Advanced(AdvancedPayload),
    /// The session finished.
    Completed(CompletedPayload),
}

impl SessionEvent {
    /// Creates a `Started` event.
    #[must_use]
    pub fn started(topic: impl Into<String>, generation: u64) -> Self {
        Self::Started(StartedPayload {
            topic: topic.into(),
            generation,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `Status` event.
    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status(StatusPayload {
            message: message.into(),
        })
    }

    /// Creates a `Ready` event.
    #[must_use]
    pub const fn ready(exercises: usize) -> Self {
        Self::Ready(ReadyPayload { exercises })
    }

    /// Creates a `Failed` event.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(FailedPayload {
            message: message.into(),
        })
    }

    /// Creates a `Graded` event.
    #[must_use]
    pub const fn graded(
        index: usize,
        kind: ExerciseKind,
        is_correct: bool,
        source: VerdictSource,
    ) -> Self {
        Self::Graded(GradedPayload {
            index,
            kind,
            is_correct,
            source,
        })
    }

    /// Creates an `Advanced` event.
    #[must_use]
    pub const fn advanced(index: usize, total: usize) -> Self {
        Self::Advanced(AdvancedPayload { index, total })
    }

    /// Creates a `Completed` event.
    #[must_use]
    pub const fn completed(correct: usize, total: usize, percent: u32, summary_degraded: bool) -> Self {
        Self::Completed(CompletedPayload {
            correct,
            total,
            percent,
            summary_degraded,
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::Status(_) => "status",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
            Self::Graded(_) => "graded",
            Self::Advanced(_) => "advanced",
            Self::Completed(_) => "completed",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Events are not persisted for late subscribers.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// A subscriber that falls more than `capacity` events behind receives a
    /// `Lagged` error and misses events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning the number of receivers.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
