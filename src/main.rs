//! speak-reader: reads a text file aloud and follows it as it is edited.

mod commands;
mod config;
mod diff;
mod error;
mod feedback;
mod history;
mod loader;
mod monitor;
mod player;
mod sequence;
mod service;
mod speech;
mod tracking;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::feedback::{FeedbackCatalog, FeedbackMode};
use crate::sequence::{RandomHistory, SequenceMode};
use crate::speech::{SpeechBackend, Speaker};
use crate::tracking::TrackingMode;

#[derive(Parser, Debug)]
#[command(name = "speak-reader", about = "Read a text file aloud, tracking edits as they happen")]
struct Args {
    /// Text file to read
    #[arg(required_unless_present = "history")]
    file: Option<PathBuf>,

    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to go when the file changes: none, backward, forward or restart
    #[arg(short, long)]
    tracking_mode: Option<TrackingMode>,

    /// Order of reading: normal, modified or random
    #[arg(short, long)]
    sequence_mode: Option<SequenceMode>,

    /// How much to say about changes: none, minimum or full
    #[arg(short = 'F', long)]
    feedback_mode: Option<FeedbackMode>,

    /// Restart reading on any reload, even without changes
    #[arg(long)]
    restart_on_touch: bool,

    /// Do not start reading after a change when stopped
    #[arg(long)]
    no_restart_after_change: bool,

    /// Stay silent about restarts that happen while stopped
    #[arg(long)]
    no_restarting_message_when_not_playing: bool,

    /// Stop after every line
    #[arg(long)]
    stop_after_each_line: bool,

    /// Quit when the end of the text is reached
    #[arg(long)]
    close_at_end: bool,

    /// Record speech instead of running the synthesizer
    #[arg(long)]
    dry_run: bool,

    /// Print the tracking history report for DATE (YYYY-MM-DD, default today) and exit
    #[arg(long, value_name = "DATE", num_args = 0..=1, default_missing_value = "today")]
    history: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(date) = &args.history {
        let store = history::HistoryStore::default_location().ok_or("no home directory for the history")?;
        println!("{}", store.generate_report(date));
        return Ok(());
    }
    let file = args.file.ok_or("no input file given")?;

    info!("speak-reader starting");

    let mut config = config::Config::load(args.config.as_deref());
    let tracking = &mut config.tracking;
    if let Some(mode) = args.tracking_mode {
        tracking.tracking_mode = mode;
    }
    if let Some(mode) = args.sequence_mode {
        tracking.sequence_mode = mode;
    }
    if let Some(mode) = args.feedback_mode {
        tracking.feedback_mode = mode;
    }
    tracking.restart_on_touch |= args.restart_on_touch;
    tracking.restart_after_change &= !args.no_restart_after_change;
    tracking.restarting_message_when_not_playing &= !args.no_restarting_message_when_not_playing;
    config.reading.stop_after_each_line |= args.stop_after_each_line;
    config.reading.close_at_end |= args.close_at_end;
    if args.dry_run {
        config.speech.backend = "transcript".into();
    }
    info!(
        "Tracking: {}, sequence: {}, feedback: {}",
        config.tracking.tracking_mode, config.tracking.sequence_mode, config.tracking.feedback_mode
    );

    // Built-in messages, then the language file, then config overrides
    let mut catalog = FeedbackCatalog::default();
    let mut voice = None;
    if let Some(path) = &config.language_file {
        let language = feedback::load_language_file(path)?;
        voice = language.voice;
        catalog = catalog.with_overrides(&language.messages)?;
    }
    let catalog = Arc::new(catalog.with_overrides(&config.feedback_messages)?);

    let source = loader::TextSource::new(&file, config.loader.separator.as_deref())?;
    let initial = source.load_initial().await?;
    info!("Loaded {} line(s) from {}", initial.lines.len(), file.display());

    let backend = SpeechBackend::from_config(&config.speech, voice);
    let reader = Arc::new(Speaker::new(backend.clone()));
    let feedback_speaker = Arc::new(Speaker::new(backend));

    let player = player::Player::new(
        player::PlayerOptions {
            sequence_mode: config.tracking.sequence_mode,
            stop_after_each_line: config.reading.stop_after_each_line,
            show_line_number: config.reading.show_line_number,
            show_total_lines: config.reading.show_total_lines,
            pause_before: Duration::from_millis(config.reading.pause_before_ms),
            pause_between: Duration::from_millis(config.reading.pause_between_ms),
            close_at_end: config.reading.close_at_end,
        },
        Arc::clone(&reader),
        Arc::new(RandomHistory::new(config.reading.random_history_length)),
    );

    // File monitor (background task)
    let mut watched = vec![file.clone()];
    watched.extend(config.monitor.extra_files.iter().cloned());
    let (reload_tx, reload_rx) = mpsc::channel(16);
    let (check_tx, check_rx) = mpsc::channel(4);
    let file_monitor =
        monitor::FileMonitor::new(watched, Duration::from_secs(config.monitor.interval_secs), reload_tx)?;
    tokio::spawn(file_monitor.run(check_rx));

    // Commands from stdin (background task)
    let (command_tx, command_rx) = mpsc::channel(16);
    tokio::spawn(commands::read_stdin(command_tx));

    let history = if config.history.enabled {
        history::HistoryStore::default_location()
    } else {
        None
    };

    let mut session = service::Session::new(
        player,
        source,
        reader,
        feedback_speaker,
        catalog,
        config.tracking,
        history,
        service::SessionChannels {
            commands: command_rx,
            reloads: reload_rx,
            check_files: check_tx,
        },
    );
    session.run(initial).await?;

    Ok(())
}
