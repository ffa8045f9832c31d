//! End-to-end session tests against an in-process mock practice service.
//!
//! The mock serves the generation endpoint as a chunked NDJSON stream so the
//! decoder sees real network framing through `HttpPracticeApi`.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use practice_engine::{
    Action, Config, ErrorReporter, HttpPracticeApi, Phase, PracticeApi, PracticeError,
    SessionConfig, SessionController, VerdictSource,
};
use serde_json::{json, Value};

const STATUS_GENERATING: &str = r#"{"type":"status","message":"Generating exercises..."}"#;
const STATUS_VALIDATING: &str = r#"{"type":"status","message":"Validating exercises..."}"#;

/// One exercise of every kind.
const FOUR_EXERCISES: &str = concat!(
    r#"{"type":"result","exercises":["#,
    r#"{"id":1,"type":"multiple_choice","question":"Wat is 'house'?","options":["boom","huis"],"answer":"huis"},"#,
    r#"{"id":2,"type":"fill_in_blank","question":"De _____ slaapt.","answer":"kat"},"#,
    r#"{"id":3,"type":"matching","question":"Match the animals","pairs":[{"term":"hond","definition":"dog"},{"term":"kat","definition":"cat"}]},"#,
    r#"{"id":4,"type":"free_text","question":"Vertaal 'tree'","answer":"boom"}"#,
    r#"]}"#
);

const ONE_EXERCISE: &str = r#"{"type":"result","exercises":[{"id":9,"type":"free_text","question":"Vertaal 'cat'","answer":"kat"}]}"#;

// ============================================================================
// Mock service
// ============================================================================

/// How the mock answers one generation request.
#[derive(Clone)]
enum Generation {
    /// Stream `body` in chunks of `chunk_size` bytes, pausing `delay` between chunks.
    Stream {
        body: String,
        chunk_size: usize,
        delay: Duration,
    },
    /// Respond with a bare HTTP status.
    Status(StatusCode),
}

impl Generation {
    fn lines(lines: &[&str], chunk_size: usize) -> Self {
        Self::Stream {
            body: ndjson(lines),
            chunk_size,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct MockService {
    /// Scripts for successive generation requests. The last one repeats.
    generations: Mutex<VecDeque<Generation>>,
    grading_fails: bool,
    feedback_fails: bool,
    check_requests: Mutex<Vec<Value>>,
    feedback_requests: Mutex<Vec<Value>>,
    error_reports: Mutex<Vec<Value>>,
}

impl MockService {
    fn with_generations(generations: Vec<Generation>) -> Self {
        Self {
            generations: Mutex::new(generations.into()),
            ..Self::default()
        }
    }

    fn next_generation(&self) -> Generation {
        let mut queue = self.generations.lock().expect("generation queue poisoned");
        if queue.len() > 1 {
            queue.pop_front().expect("queue is not empty")
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or(Generation::Status(StatusCode::NOT_FOUND))
        }
    }
}

fn ndjson(lines: &[&str]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}

async fn generate(State(service): State<Arc<MockService>>) -> Response {
    match service.next_generation() {
        Generation::Status(status) => status.into_response(),
        Generation::Stream {
            body,
            chunk_size,
            delay,
        } => {
            let chunks: Vec<Bytes> = body
                .into_bytes()
                .chunks(chunk_size.max(1))
                .map(Bytes::copy_from_slice)
                .collect();
            let stream = futures::stream::iter(chunks).then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, Infallible>(chunk)
            });
            (
                [(axum::http::header::CONTENT_TYPE, "application/x-ndjson")],
                Body::from_stream(stream),
            )
                .into_response()
        }
    }
}

async fn check(State(service): State<Arc<MockService>>, Json(body): Json<Value>) -> Response {
    service
        .check_requests
        .lock()
        .expect("check log poisoned")
        .push(body.clone());
    if service.grading_fails {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let is_correct = body["correct_answer"].as_str() == body["user_answer"].as_str();
    let feedback = if is_correct { "Goed zo!" } else { "Not quite." };
    Json(json!({ "is_correct": is_correct, "feedback": feedback })).into_response()
}

async fn feedback(State(service): State<Arc<MockService>>, Json(body): Json<Value>) -> Response {
    service
        .feedback_requests
        .lock()
        .expect("feedback log poisoned")
        .push(body);
    if service.feedback_fails {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({ "feedback": "Review the articles de and het." })).into_response()
}

async fn log_error(State(service): State<Arc<MockService>>, Json(body): Json<Value>) -> StatusCode {
    service
        .error_reports
        .lock()
        .expect("error log poisoned")
        .push(body);
    StatusCode::OK
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the mock service and returns a client pointed at it.
async fn spawn_mock(service: Arc<MockService>) -> Arc<dyn PracticeApi> {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = Router::new()
        .route("/api/generate/", post(generate))
        .route("/api/check/", post(check))
        .route("/api/feedback/", post(feedback))
        .route("/api/log_error/", post(log_error))
        .with_state(service);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    let config = Config {
        server_url: format!("http://{addr}/api/"),
        request_timeout_secs: 5,
        ..Config::default()
    };
    Arc::new(HttpPracticeApi::new(&config).expect("Failed to build client"))
}

fn controller(api: Arc<dyn PracticeApi>) -> SessionController {
    SessionController::new(SessionConfig::new("Dutch nouns", "test-key"), api)
        .with_shuffle_matching(false)
}

async fn ready(controller: &mut SessionController) -> Phase {
    controller.start();
    tokio::time::timeout(Duration::from_secs(10), controller.wait_until_ready())
        .await
        .expect("Timeout waiting for exercises")
        .expect("Session was not loading")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_full_session_over_one_byte_chunks() {
    let service = Arc::new(MockService::with_generations(vec![Generation::lines(
        &[STATUS_GENERATING, STATUS_VALIDATING, FOUR_EXERCISES],
        1,
    )]));
    let api = spawn_mock(Arc::clone(&service)).await;
    let mut controller = controller(api);
    let mut events = controller.subscribe();

    assert_eq!(ready(&mut controller).await, Phase::Active);
    assert_eq!(controller.state().exercises.len(), 4);
    let log: Vec<&str> = controller
        .state()
        .log
        .iter()
        .map(|entry| entry.message.as_str())
        .collect();
    assert_eq!(log, vec!["Generating exercises...", "Validating exercises..."]);

    // Multiple choice: "huis" is the second option
    let verdict = controller
        .interact(Action::ChooseOption(1))
        .await
        .expect("Submit failed")
        .expect("No verdict");
    assert!(verdict.is_correct);
    assert_eq!(verdict.source, VerdictSource::Remote);
    assert_eq!(controller.advance().await.expect("Advance failed"), Phase::Active);

    // Fill in the blank, wrong answer
    let verdict = controller
        .answer_text("  hond ")
        .await
        .expect("Submit failed")
        .expect("No verdict");
    assert!(!verdict.is_correct);
    controller.advance().await.expect("Advance failed");

    // Matching, one wrong attempt first
    controller.interact(Action::SelectTerm(0)).await.expect("Select failed");
    assert!(controller
        .interact(Action::SelectDefinition(1))
        .await
        .expect("Select failed")
        .is_none());
    controller.interact(Action::SelectTerm(0)).await.expect("Select failed");
    controller
        .interact(Action::SelectDefinition(0))
        .await
        .expect("Select failed");
    controller.interact(Action::SelectTerm(1)).await.expect("Select failed");
    let verdict = controller
        .interact(Action::SelectDefinition(1))
        .await
        .expect("Select failed")
        .expect("No verdict");
    assert_eq!(verdict.source, VerdictSource::SelfChecked);
    controller.advance().await.expect("Advance failed");

    // Free text
    controller
        .answer_text("boom")
        .await
        .expect("Submit failed")
        .expect("No verdict");
    assert_eq!(controller.advance().await.expect("Advance failed"), Phase::Complete);

    let score = controller.score();
    assert_eq!((score.correct, score.total, score.percent), (3, 4, 75));
    assert_eq!(
        controller.state().ai_summary.as_deref(),
        Some("Review the articles de and het.")
    );

    // Matching never reaches the grading service
    let checks = service.check_requests.lock().expect("check log poisoned");
    assert_eq!(checks.len(), 3);
    assert_eq!(checks[1]["user_answer"], "hond");
    assert_eq!(checks[0]["api_key"], "test-key");

    let feedback = service.feedback_requests.lock().expect("feedback log poisoned");
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0]["results"][2]["type"], "matching");
    assert_eq!(feedback[0]["results"][2]["is_correct"], true);

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.event_name());
    }
    assert_eq!(names.first(), Some(&"started"));
    assert_eq!(names.last(), Some(&"completed"));
    assert_eq!(names.iter().filter(|name| **name == "graded").count(), 4);
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let service = Arc::new(MockService::with_generations(vec![Generation::lines(
        &[
            STATUS_GENERATING,
            "not json at all",
            r#"{"type":"status""#,
            "",
            r#"{"type":"unknown","message":"?"}"#,
            ONE_EXERCISE,
        ],
        7,
    )]));
    let api = spawn_mock(service).await;
    let mut controller = controller(api);

    assert_eq!(ready(&mut controller).await, Phase::Active);
    assert_eq!(controller.state().exercises.len(), 1);
    assert_eq!(controller.state().log.len(), 1);
}

#[tokio::test]
async fn test_invalid_exercises_are_dropped() {
    let result = concat!(
        r#"{"type":"result","exercises":["#,
        r#"{"id":1,"type":"fill_in_blank","question":"No blank here","answer":"x"},"#,
        r#"{"id":2,"type":"multiple_choice","question":"Empty","options":[],"answer":"x"},"#,
        r#"{"id":3,"type":"FREE_TEXT","question":"Vertaal 'dog'"}"#,
        r#"]}"#
    );
    let service = Arc::new(MockService::with_generations(vec![Generation::lines(
        &[result],
        64,
    )]));
    let api = spawn_mock(service).await;
    let mut controller = controller(api);

    assert_eq!(ready(&mut controller).await, Phase::Active);
    assert_eq!(controller.state().exercises.len(), 1);
    assert_eq!(controller.state().exercises[0].id, 3);
}

#[tokio::test]
async fn test_grading_and_summary_failures_degrade() {
    let service = Arc::new(MockService {
        grading_fails: true,
        feedback_fails: true,
        ..MockService::with_generations(vec![Generation::lines(&[ONE_EXERCISE], 16)])
    });
    let api = spawn_mock(service).await;
    let mut controller = controller(api);

    assert_eq!(ready(&mut controller).await, Phase::Active);
    let verdict = controller
        .answer_text("kat")
        .await
        .expect("Submit failed")
        .expect("No verdict");
    assert!(!verdict.is_correct);
    assert!(verdict.is_degraded());
    assert_eq!(verdict.feedback, "Error checking answer. Please try again.");

    assert_eq!(controller.advance().await.expect("Advance failed"), Phase::Complete);
    assert_eq!(
        controller.state().ai_summary.as_deref(),
        Some("Great job completing the session!")
    );
    assert_eq!(controller.score().percent, 0);
}

#[tokio::test]
async fn test_generation_http_failure_errors_session() {
    let service = Arc::new(MockService::with_generations(vec![Generation::Status(
        StatusCode::INTERNAL_SERVER_ERROR,
    )]));
    let api = spawn_mock(service).await;
    let mut controller = controller(api);

    assert_eq!(ready(&mut controller).await, Phase::Errored);
    let error = controller.state().error.clone().expect("No error recorded");
    assert!(error.starts_with("Failed to connect to server."), "{error}");
    assert!(controller.state().exercises.is_empty());
}

#[tokio::test]
async fn test_generation_error_event_errors_session() {
    let service = Arc::new(MockService::with_generations(vec![Generation::lines(
        &[
            STATUS_GENERATING,
            r#"{"type":"error","message":"Topic not supported"}"#,
            ONE_EXERCISE,
        ],
        5,
    )]));
    let api = spawn_mock(service).await;
    let mut controller = controller(api);

    assert_eq!(ready(&mut controller).await, Phase::Errored);
    assert_eq!(
        controller.state().error.as_deref(),
        Some("Topic not supported")
    );

    // The result after the error must not revive the session
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.phase(), Phase::Errored);
    assert!(controller.state().exercises.is_empty());
}

#[tokio::test]
async fn test_empty_exercise_list_completes_without_summary_request() {
    let service = Arc::new(MockService::with_generations(vec![Generation::lines(
        &[r#"{"type":"result","exercises":[]}"#],
        8,
    )]));
    let api = spawn_mock(Arc::clone(&service)).await;
    let mut controller = controller(api);

    assert_eq!(ready(&mut controller).await, Phase::Complete);
    assert_eq!(controller.score().percent, 0);
    assert_eq!(
        controller.state().ai_summary.as_deref(),
        Some("Great job completing the session!")
    );
    assert!(service
        .feedback_requests
        .lock()
        .expect("feedback log poisoned")
        .is_empty());
}

#[tokio::test]
async fn test_restart_supersedes_slow_generation() {
    let stale = concat!(
        r#"{"type":"result","exercises":["#,
        r#"{"id":100,"type":"free_text","question":"Stale question"}"#,
        r#"]}"#
    );
    let service = Arc::new(MockService::with_generations(vec![
        Generation::Stream {
            body: ndjson(&[STATUS_GENERATING, stale]),
            chunk_size: 16,
            delay: Duration::from_millis(40),
        },
        Generation::lines(&[STATUS_VALIDATING, ONE_EXERCISE], 16),
    ]));
    let api = spawn_mock(service).await;
    let mut controller = controller(api);

    let first = controller.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = controller.start();
    assert!(second > first);

    let phase = tokio::time::timeout(Duration::from_secs(10), controller.wait_until_ready())
        .await
        .expect("Timeout waiting for exercises")
        .expect("Session was not loading");
    assert_eq!(phase, Phase::Active);
    assert_eq!(controller.state().generation, second);
    assert_eq!(controller.state().exercises[0].id, 9);

    let log: Vec<&str> = controller
        .state()
        .log
        .iter()
        .map(|entry| entry.message.as_str())
        .collect();
    assert_eq!(log, vec!["Validating exercises..."]);
}

#[tokio::test]
async fn test_error_reporter_delivers_report() {
    let service = Arc::new(MockService::default());
    let api = spawn_mock(Arc::clone(&service)).await;
    let reporter = ErrorReporter::new(api, true);

    let error = PracticeError::invalid_transition(Phase::Complete, "submit");
    let delivery = reporter
        .notify(&error, "exercise loop")
        .expect("Reporter is enabled");
    tokio::time::timeout(Duration::from_secs(5), delivery)
        .await
        .expect("Timeout delivering report")
        .expect("Delivery task panicked");

    let reports = service.error_reports.lock().expect("error log poisoned");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["componentStack"], "exercise loop");
    assert_eq!(reports[0]["error"], error.to_string());
}
