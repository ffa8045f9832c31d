//! Generation stream fetcher.
//!
//! Each [`SessionFetcher::start`] opens a new generation request and drains it
//! on a background task. Every signal the task emits carries the generation
//! number it was started with, and [`SessionFetcher::next_signal`] discards
//! signals from superseded generations, so a late result from an abandoned
//! request can never reach the session.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{GenerateRequest, PracticeApi, GENERATE_PATH};
use crate::error::{ConnectionErrorKind, PracticeError};
use crate::exercise::{ingest, Exercise};
use crate::stream::{StreamDecoder, StreamEvent};

/// What the generation stream reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSignal {
    /// Progress message.
    Status(String),
    /// Terminal success with the validated exercises.
    Ready(Vec<Exercise>),
    /// Terminal failure with a learner-facing message.
    Failed(String),
}

#[derive(Debug)]
enum Message {
    Signal(FetchSignal),
    /// The stream was fully drained.
    Closed,
}

#[derive(Debug)]
struct Tagged {
    generation: u64,
    message: Message,
}

/// Runs generation requests and reports their progress.
pub struct SessionFetcher {
    api: Arc<dyn PracticeApi>,
    generation: u64,
    sender: mpsc::UnboundedSender<Tagged>,
    receiver: mpsc::UnboundedReceiver<Tagged>,
    task: Option<JoinHandle<()>>,
    drained: bool,
}

impl std::fmt::Debug for SessionFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFetcher")
            .field("generation", &self.generation)
            .field("in_flight", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionFetcher {
    /// Creates an idle fetcher.
    #[must_use]
    pub fn new(api: Arc<dyn PracticeApi>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            api,
            generation: 0,
            sender,
            receiver,
            task: None,
            drained: true,
        }
    }

    /// Current generation number. Zero until the first start.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts a new generation request, superseding any in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, topic: &str, credential: &str) -> u64 {
        self.cancel();
        self.generation += 1;
        self.drained = false;

        let request = GenerateRequest {
            topic: topic.to_string(),
            api_key: credential.to_string(),
        };
        let api = Arc::clone(&self.api);
        let sender = self.sender.clone();
        let generation = self.generation;

        debug!(generation, "starting generation request");
        self.task = Some(tokio::spawn(drain_generation(api, request, generation, sender)));
        generation
    }

    /// Stops the in-flight request, if any. Its pending signals are discarded.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(generation = self.generation, "generation request cancelled");
        }
        self.drained = true;
    }

    /// Waits for the next signal of the current generation.
    ///
    /// Returns `None` once the current stream has been fully drained, or if
    /// nothing was started.
    pub async fn next_signal(&mut self) -> Option<FetchSignal> {
        while !self.drained {
            let tagged = self.receiver.recv().await?;
            if tagged.generation != self.generation {
                debug!(
                    stale = tagged.generation,
                    current = self.generation,
                    "discarding signal from superseded request"
                );
                continue;
            }
            match tagged.message {
                Message::Signal(signal) => return Some(signal),
                Message::Closed => {
                    self.drained = true;
                    self.task = None;
                }
            }
        }
        None
    }
}

impl Drop for SessionFetcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Drains one generation stream, emitting at most one terminal signal.
async fn drain_generation(
    api: Arc<dyn PracticeApi>,
    request: GenerateRequest,
    generation: u64,
    sender: mpsc::UnboundedSender<Tagged>,
) {
    let send = |message: Message| {
        // A closed channel means the fetcher is gone; keep draining regardless
        let _ = sender.send(Tagged {
            generation,
            message,
        });
    };

    let mut stream = match api.open_generation(&request).await {
        Ok(stream) => stream,
        Err(error) => {
            warn!(generation, %error, "generation request failed");
            send(Message::Signal(FetchSignal::Failed(error.user_message())));
            send(Message::Closed);
            return;
        }
    };

    let mut decoder = StreamDecoder::new();
    let mut terminal = TerminalGate::default();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                for event in decoder.feed(&bytes) {
                    if let Some(signal) = terminal.admit(generation, event) {
                        send(Message::Signal(signal));
                    }
                }
            }
            Err(error) => {
                warn!(generation, %error, "generation stream broke");
                if terminal.close() {
                    send(Message::Signal(FetchSignal::Failed(error.user_message())));
                }
                break;
            }
        }
    }

    if let Some(event) = decoder.finish() {
        if let Some(signal) = terminal.admit(generation, event) {
            send(Message::Signal(signal));
        }
    }

    if terminal.close() {
        let error = PracticeError::connection(
            ConnectionErrorKind::ClosedEarly,
            GENERATE_PATH,
            "stream ended without a result",
        );
        warn!(generation, %error, "generation stream closed early");
        send(Message::Signal(FetchSignal::Failed(error.user_message())));
    }

    debug!(
        generation,
        decoded = decoder.decoded_events(),
        dropped = decoder.dropped_lines(),
        "generation stream drained"
    );
    send(Message::Closed);
}

/// Lets through every event up to and including the first terminal one.
#[derive(Debug, Default)]
struct TerminalGate {
    seen: bool,
}

impl TerminalGate {
    fn admit(&mut self, generation: u64, event: StreamEvent) -> Option<FetchSignal> {
        if self.seen {
            debug!(generation, "ignoring event after terminal event");
            return None;
        }

        match event {
            StreamEvent::Status { message } => Some(FetchSignal::Status(message)),
            StreamEvent::Exercises { exercises } => {
                self.seen = true;
                let received = exercises.len();
                let exercises = ingest(exercises);
                info!(generation, received, accepted = exercises.len(), "exercises received");
                Some(FetchSignal::Ready(exercises))
            }
            StreamEvent::Error { message } => {
                self.seen = true;
                warn!(generation, %message, "generation service reported an error");
                Some(FetchSignal::Failed(message))
            }
        }
    }

    /// Marks the gate closed, returning `true` if no terminal event was seen.
    fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.seen, true)
    }
}
