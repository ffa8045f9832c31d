//! Practice CLI
//!
//! Interactive terminal front end that runs one practice session.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use practice_engine::{
    Action, Config, ErrorReporter, Exercise, ExerciseBody, ExerciseKind, FileSessionStore,
    HttpPracticeApi, InteractionView, MatchingBoard, Phase, PracticeApi, PracticeError, ReportFormat,
    SessionConfig, SessionController, SessionEvent, SessionState, StoredSession, Verdict,
};
use practice_report::{
    json::JsonGenerator, LogEntry, MarkdownGenerator, QuestionKind, ReportGenerator, ReportInput,
    ReportStatus, ResultInput, JSON_FILE_NAME, MARKDOWN_FILE_NAME,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// How long to wait for a pending error report before exiting.
const ERROR_REPORT_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for the generation log to catch up once loading ends.
const LOG_FLUSH_GRACE: Duration = Duration::from_millis(500);

type InputLines = Lines<BufReader<Stdin>>;

/// Practice - Interactive language practice sessions
///
/// Generates exercises for a topic, grades each answer and writes a session
/// report when done.
#[derive(Parser, Debug)]
#[command(name = "practice")]
#[command(version, about, long_about = None)]
struct Args {
    /// Topic to practise (default: the last topic used)
    #[arg(value_name = "TOPIC")]
    topic: Option<String>,

    /// Path to configuration file (default: practice.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Base URL of the practice service
    #[arg(long, value_name = "URL")]
    server_url: Option<String>,

    /// Output directory for reports
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Report format: markdown, json or both
    #[arg(short, long, value_name = "FORMAT")]
    format: Option<String>,

    /// Credential for the practice service (default: the stored key)
    #[arg(long, env = "PRACTICE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Keep matching exercises in their original order
    #[arg(long)]
    no_shuffle: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");
    tracing::debug!(output_dir = ?args.output_dir, "Output directory");

    match run_session(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Runs one session from topic resolution to the written report.
async fn run_session(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(server_url) = args.server_url {
        config.server_url = server_url;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(format) = args.format.as_deref() {
        config.report_format = ReportFormat::from_str_case_insensitive(format).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown report format '{format}'\n\nSuggestion: Use one of markdown, json or both"
            )
        })?;
    }
    if args.no_shuffle {
        config.shuffle_matching = false;
    }

    // Re-validate after overrides
    config.validate()?;

    let store = FileSessionStore::new(&config.state_file);
    let session_config = SessionConfig::resolve(args.topic, args.api_key, &store)?;

    let api: Arc<dyn PracticeApi> = Arc::new(HttpPracticeApi::new(&config)?);
    let reporter = ErrorReporter::new(Arc::clone(&api), config.report_errors);

    let mut controller = SessionController::new(session_config.clone(), api)
        .with_shuffle_matching(config.shuffle_matching);

    println!("Practice session: {}", session_config.topic);
    println!();

    let printer = tokio::spawn(print_generation_log(controller.subscribe()));
    controller.start();
    let phase = controller.wait_until_ready().await?;
    // The printer exits on its own once it has seen the ready or failed event
    if tokio::time::timeout(LOG_FLUSH_GRACE, printer).await.is_err() {
        tracing::debug!("generation log printer did not finish");
    }

    if phase == Phase::Errored {
        let message = controller
            .state()
            .error
            .clone()
            .unwrap_or_else(|| "Exercise generation failed".to_string());
        write_reports(controller.state(), ReportStatus::Errored, &config)?;

        let error = anyhow::anyhow!("{message}");
        let source: &(dyn std::error::Error + 'static) = error.as_ref();
        if let Some(delivery) = reporter.notify(source, "exercise generation") {
            let _ = tokio::time::timeout(ERROR_REPORT_GRACE, delivery).await;
        }
        return Err(error);
    }

    remember_session(&store, &session_config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let status = drive_exercises(&mut controller, &mut lines).await?;

    print_summary(&controller, status);
    write_reports(controller.state(), status, &config)?;

    Ok(())
}

/// Loads configuration from the specified path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Stores the topic and credential for the next run.
fn remember_session(store: &FileSessionStore, session: &SessionConfig) {
    let stored = StoredSession {
        last_topic: Some(session.topic.clone()),
        api_key: Some(session.credential.clone()),
    };
    if let Err(e) = store.save(&stored) {
        tracing::warn!(
            path = %store.path().display(),
            error = %e,
            "could not remember session"
        );
    }
}

/// Prints generation status messages until exercises arrive.
async fn print_generation_log(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Status(payload)) => println!("  {}", payload.message),
            Ok(SessionEvent::Ready(payload)) => {
                println!();
                println!("{} exercises ready.", payload.exercises);
                return;
            }
            Ok(SessionEvent::Failed(_)) | Err(broadcast::error::RecvError::Closed) => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}

// ============================================================================
// Exercise loop
// ============================================================================

/// Presents exercises until the session completes or input ends.
async fn drive_exercises(
    controller: &mut SessionController,
    lines: &mut InputLines,
) -> anyhow::Result<ReportStatus> {
    loop {
        match controller.phase() {
            Phase::Active => {
                render_exercise(controller);
                let Some(line) = lines.next_line().await? else {
                    return Ok(ReportStatus::Incomplete);
                };
                if let Some(verdict) = apply_input(controller, line.trim_end_matches('\r')).await? {
                    print_verdict(&verdict);
                }
            }
            Phase::Feedback => {
                println!("Press Enter to continue...");
                if lines.next_line().await?.is_none() {
                    return Ok(ReportStatus::Incomplete);
                }
                controller.advance().await?;
            }
            phase => return Ok(terminal_status(phase).unwrap_or(ReportStatus::Errored)),
        }
    }
}

/// Maps a finished session phase to its report status.
fn terminal_status(phase: Phase) -> Option<ReportStatus> {
    phase.is_terminal().then_some(if phase == Phase::Complete {
        ReportStatus::Completed
    } else {
        ReportStatus::Errored
    })
}

/// Translates one input line into actions for the current exercise.
async fn apply_input(
    controller: &mut SessionController,
    line: &str,
) -> anyhow::Result<Option<Verdict>> {
    let Some(kind) = controller.current_exercise().map(Exercise::kind) else {
        return Ok(None);
    };

    let verdict = match kind {
        ExerciseKind::MultipleChoice => {
            let Some(position) = parse_position(line) else {
                println!("Enter the number of an option.");
                return Ok(None);
            };
            controller.interact(Action::ChooseOption(position)).await?
        }
        ExerciseKind::FillInBlank | ExerciseKind::FreeText => {
            controller.answer_text(line).await?
        }
        ExerciseKind::Matching => {
            let mut parts = line.split_whitespace().map(parse_position);
            let (Some(Some(term)), Some(Some(definition)), None) =
                (parts.next(), parts.next(), parts.next())
            else {
                println!("Enter a term number and a definition number, e.g. '1 3'.");
                return Ok(None);
            };
            controller.interact(Action::SelectTerm(term)).await?;
            controller
                .interact(Action::SelectDefinition(definition))
                .await?
        }
    };

    Ok(verdict)
}

/// Parses a 1-based number into a 0-based position.
fn parse_position(input: &str) -> Option<usize> {
    input.trim().parse::<usize>().ok()?.checked_sub(1)
}

// ============================================================================
// Rendering
// ============================================================================

fn render_exercise(controller: &SessionController) {
    let (Some(exercise), Some(interaction)) =
        (controller.current_exercise(), controller.interaction())
    else {
        return;
    };
    let progress = controller.progress();

    println!();
    println!(
        "Question {} of {} ({}%) - {}",
        progress.position,
        progress.total,
        progress.percent,
        exercise.kind().label()
    );

    match (&exercise.body, interaction.view()) {
        (ExerciseBody::FillInBlank { sentence, .. }, _) => {
            println!("  {}_____{}", sentence.prefix, sentence.suffix);
            println!("Type the missing word:");
        }
        (_, InteractionView::Choice { options, .. }) => {
            println!("  {}", exercise.question);
            for (i, option) in options.iter().enumerate() {
                println!("    {}. {option}", i + 1);
            }
            println!("Choose an option:");
        }
        (_, InteractionView::Text { .. }) => {
            println!("  {}", exercise.question);
            println!("Your answer:");
        }
        (_, InteractionView::Matching(board)) => {
            println!("  {}", exercise.question);
            render_board(board);
            println!("Match a term to a definition (e.g. '1 3'):");
        }
    }
}

fn render_board(board: &MatchingBoard) {
    println!("  Terms:");
    for (i, term) in board.terms().iter().enumerate() {
        let mark = if board.is_matched(term) { "x" } else { " " };
        println!("    [{mark}] {}. {term}", i + 1);
    }
    println!("  Definitions:");
    for (i, card) in board.definitions().iter().enumerate() {
        let mark = if board.is_matched(&card.key) {
            "x"
        } else if board.wrong_definition() == Some(card.key.as_str()) {
            "!"
        } else {
            " "
        };
        println!("    [{mark}] {}. {}", i + 1, card.text);
    }
    if board.wrong_definition().is_some() {
        println!("  Not a match, try again.");
    }
}

fn print_verdict(verdict: &Verdict) {
    let label = if verdict.is_correct {
        "Correct!"
    } else {
        "Incorrect."
    };
    println!();
    println!("{label} {}", verdict.feedback);
}

fn print_summary(controller: &SessionController, status: ReportStatus) {
    let score = controller.score();
    println!();
    println!("=== Session Summary ===");
    println!("Status: {status}");
    println!(
        "Score: {}% ({} of {} correct)",
        score.percent, score.correct, score.total
    );
    println!("Duration: {}", format_elapsed(controller.state().elapsed().num_seconds()));
    if let Some(summary) = &controller.state().ai_summary {
        println!();
        println!("{summary}");
    }
}

/// Formats a session duration in seconds as minutes and seconds.
fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}m {:02}s", secs / 60, secs % 60)
}

// ============================================================================
// Reports
// ============================================================================

/// Writes the report files selected in the configuration.
fn write_reports(state: &SessionState, status: ReportStatus, config: &Config) -> anyhow::Result<()> {
    let report = ReportGenerator::new(create_report_input(state, status)).generate();

    let output_dir = Path::new(&config.output_dir);
    std::fs::create_dir_all(output_dir)
        .map_err(|e| PracticeError::report_write(output_dir, e.to_string()))?;

    println!();
    if config.report_format.includes_markdown() {
        let md_path = output_dir.join(MARKDOWN_FILE_NAME);
        std::fs::write(&md_path, MarkdownGenerator::new(&report).generate())
            .map_err(|e| PracticeError::report_write(&md_path, e.to_string()))?;
        println!("Markdown report: {}", md_path.display());
    }
    if config.report_format.includes_json() {
        let json_path = output_dir.join(JSON_FILE_NAME);
        JsonGenerator::new(&report)
            .write_to_file(&json_path, true)
            .map_err(|e| PracticeError::report_write(&json_path, e.to_string()))?;
        println!("JSON report: {}", json_path.display());
    }

    let missed = report.missed();
    if !missed.is_empty() {
        println!();
        println!("Questions to review:");
        for entry in missed {
            println!("  {}. {}", entry.number, entry.question);
        }
    }

    Ok(())
}

/// Creates a `ReportInput` from the session state.
fn create_report_input(state: &SessionState, status: ReportStatus) -> ReportInput {
    ReportInput {
        topic: state.topic.clone(),
        status,
        total_exercises: state.exercises.len(),
        results: state
            .results
            .iter()
            .map(|r| ResultInput::new(r.question.clone(), convert_kind(r.kind), r.is_correct))
            .collect(),
        coach_feedback: state.ai_summary.clone(),
        log: state
            .log
            .iter()
            .map(|entry| LogEntry::at_time(entry.timestamp, entry.message.clone()))
            .collect(),
        started_at: state.started_at,
        finished_at: state.updated_at,
    }
}

/// Converts an engine `ExerciseKind` to a report `QuestionKind`.
const fn convert_kind(kind: ExerciseKind) -> QuestionKind {
    match kind {
        ExerciseKind::MultipleChoice => QuestionKind::MultipleChoice,
        ExerciseKind::FillInBlank => QuestionKind::FillInBlank,
        ExerciseKind::Matching => QuestionKind::Matching,
        ExerciseKind::FreeText => QuestionKind::FreeText,
    }
}
