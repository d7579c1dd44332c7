//! Session orchestration.
//!
//! One task owns the player and serializes everything that touches it:
//! user commands, finished utterances and file reloads. A reload runs the
//! tracking computation against the baseline captured before it, speaks
//! the resulting feedback, then hands the new text to the player.
//!
//! IDLE → RELOADING → FEEDBACK → IDLE

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::commands::Command;
use crate::error::Result;
use crate::feedback::{FeedbackCatalog, FeedbackMode};
use crate::history::{HistoryStore, TrackingRecord};
use crate::loader::{LoadedText, TextSource};
use crate::monitor::MonitorEvent;
use crate::player::Player;
use crate::speech::Speaker;
use crate::tracking::{self, Baseline, TrackingOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Reloading,
    Feedback,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Reloading => write!(f, "RELOADING"),
            Self::Feedback => write!(f, "FEEDBACK"),
        }
    }
}

/// Channels connecting the session to the command reader and the monitor.
pub struct SessionChannels {
    pub commands: mpsc::Receiver<Command>,
    pub reloads: mpsc::Receiver<MonitorEvent>,
    /// Asks the monitor for an immediate check.
    pub check_files: mpsc::Sender<()>,
}

/// Report from a spawned utterance back to the session.
#[derive(Debug)]
struct LineDone {
    epoch: u64,
    outcome: std::result::Result<bool, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedbackOutcome {
    Finished,
    /// The file changed again while the feedback was being spoken.
    Reloaded,
    /// A command arrived; it runs once the update is applied.
    Interrupted(Command),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    state: SessionState,
    player: Player,
    source: TextSource,
    reader: Arc<Speaker>,
    feedback: Arc<Speaker>,
    catalog: Arc<FeedbackCatalog>,
    options: TrackingOptions,
    baseline: Baseline,
    history: Option<HistoryStore>,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    reloads: mpsc::Receiver<MonitorEvent>,
    reloads_open: bool,
    check_files: mpsc::Sender<()>,
    line_tx: mpsc::Sender<LineDone>,
    line_rx: mpsc::Receiver<LineDone>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        player: Player,
        source: TextSource,
        reader: Arc<Speaker>,
        feedback: Arc<Speaker>,
        catalog: Arc<FeedbackCatalog>,
        options: TrackingOptions,
        history: Option<HistoryStore>,
        channels: SessionChannels,
    ) -> Self {
        let (line_tx, line_rx) = mpsc::channel(16);
        let baseline = Baseline::capture(
            player.state().clone(),
            player.running_and_not_paused(),
            Arc::clone(&catalog),
            options,
        );
        Self {
            state: SessionState::Idle,
            player,
            source,
            reader,
            feedback,
            catalog,
            options,
            baseline,
            history,
            commands: channels.commands,
            commands_open: true,
            reloads: channels.reloads,
            reloads_open: true,
            check_files: channels.check_files,
            line_tx,
            line_rx,
        }
    }

    #[cfg(test)]
    pub fn player(&self) -> &Player {
        &self.player
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("State: {} → {state}", self.state);
            self.state = state;
        }
    }

    /// Read `initial` and serve commands and reloads until quit.
    pub async fn run(&mut self, initial: LoadedText) -> Result<()> {
        self.player.first_load(initial.text, initial.lines);
        self.register_baseline();
        info!("Session ready: {} line(s) from {}", self.player.state().lines.len(), self.source.path().display());

        loop {
            self.start_next_line();
            tokio::select! {
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(Command::Quit) => break,
                    Some(command) => self.execute(command),
                    None => {
                        self.commands_open = false;
                        info!("Command input closed, press Ctrl+C to quit");
                    }
                },
                event = self.reloads.recv(), if self.reloads_open => match event {
                    Some(MonitorEvent::Changed(path)) => {
                        debug!("Reload triggered by {}", path.display());
                        if self.reload().await == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        self.reloads_open = false;
                        warn!("Monitor channel closed, changes will no longer be tracked");
                    }
                },
                Some(done) = self.line_rx.recv() => {
                    self.player.line_finished(done.epoch, done.outcome);
                    if self.player.reached_end() {
                        info!("End of the text reached, closing.");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        info!("Shutting down");
        self.player.stop();
        self.feedback.cancel_and_wait().await;
        self.reader.cancel_and_wait().await;
        Ok(())
    }

    /// Hand the player's next line to a speaking task.
    fn start_next_line(&mut self) {
        let Some(utterance) = self.player.next_utterance() else {
            return;
        };
        let speaker = Arc::clone(&self.reader);
        let tx = self.line_tx.clone();
        tokio::spawn(async move {
            if !utterance.delay.is_zero() {
                tokio::time::sleep(utterance.delay).await;
            }
            let outcome = speaker
                .speak_at(&utterance.text, utterance.epoch)
                .await
                .map(|result| {
                    debug!(
                        "Line {}: {} chars in {:.0}ms (cancelled: {})",
                        utterance.pointer + 1,
                        result.text_spoken.len(),
                        result.elapsed_ms,
                        result.cancelled
                    );
                    result.cancelled
                })
                .map_err(|e| e.to_string());
            let _ = tx
                .send(LineDone {
                    epoch: utterance.epoch,
                    outcome,
                })
                .await;
        });
    }

    fn execute(&mut self, command: Command) {
        let player = &mut self.player;
        let changed = match command {
            Command::Toggle => player.toggle(),
            Command::Stop => player.stop(),
            Command::Restart => player.restart(),
            Command::First => player.first(),
            Command::Last => player.last(),
            Command::Next => player.next(),
            Command::Previous => player.previous(),
            Command::Go(line) => player.go_line(line),
            Command::Random => player.random_line(),
            Command::NextChange => player.next_change(),
            Command::PrevChange => player.prev_change(),
            Command::ResetPointer => player.reset_pointer(),
            Command::ShowLine => player.show_line().is_some(),
            Command::CheckFiles => self.check_files.try_send(()).is_ok(),
            Command::Quit => false,
        };
        debug!("Command {command} (changed: {changed}, player: {})", self.player.status());
    }

    /// Snapshot the player as the reference for the next reload.
    fn register_baseline(&mut self) {
        self.baseline = Baseline::capture(
            self.player.state().clone(),
            self.player.running_and_not_paused(),
            Arc::clone(&self.catalog),
            self.options,
        );
    }

    fn capture_baseline(&mut self) -> Baseline {
        self.register_baseline();
        self.baseline.clone()
    }

    /// Drop reload notifications already queued; one reload reads them all.
    fn drain_reloads(&mut self) {
        while self.reloads.try_recv().is_ok() {}
    }

    /// Reconcile the player with the file on disk. The baseline is taken
    /// once per chain: when the file changes again during the feedback,
    /// the chain restarts against the same baseline with `changed_again`.
    async fn reload(&mut self) -> Flow {
        self.set_state(SessionState::Reloading);
        let baseline = self.capture_baseline();
        let mut changed_again = false;
        let mut pending = None;

        let flow = loop {
            self.drain_reloads();
            let loaded = match self.source.load().await {
                Ok(loaded) => loaded,
                Err(e) => {
                    error!("{e}");
                    break Flow::Continue;
                }
            };

            let event = tracking::compute(&baseline, &loaded.text, &loaded.lines, changed_again);
            for line in &event.log_lines {
                info!("{line}");
            }

            let texts = self.catalog.resolve(&event.spoken_feedback, FeedbackMode::Full);
            if !texts.is_empty() {
                info!("Feedback: {}", texts.join(" "));
                if baseline.player_was_running_and_not_paused {
                    self.player.interrupt();
                }
                self.set_state(SessionState::Feedback);
                match self.speak_feedback(&texts).await {
                    FeedbackOutcome::Finished => {}
                    FeedbackOutcome::Reloaded => {
                        changed_again = true;
                        self.set_state(SessionState::Reloading);
                        continue;
                    }
                    FeedbackOutcome::Interrupted(command) => {
                        info!("Feedback playing was stopped.");
                        pending = Some(command);
                    }
                    FeedbackOutcome::Quit => break Flow::Quit,
                }
            }

            if let Some(history) = &self.history {
                let record = TrackingRecord::new(
                    self.source.path(),
                    &baseline,
                    loaded.lines.len(),
                    changed_again,
                    &event,
                );
                history.save_record(&record);
            }

            self.player.apply_update(
                loaded.text,
                loaded.lines,
                event.modified_lines,
                event.jump_to,
                event.action,
            );
            self.register_baseline();
            break match pending {
                Some(Command::Quit) => Flow::Quit,
                Some(command) => {
                    self.execute(command);
                    Flow::Continue
                }
                None => Flow::Continue,
            };
        };

        self.set_state(SessionState::Idle);
        flow
    }

    /// Speak the feedback messages, giving way to a newer reload or any command.
    async fn speak_feedback(&mut self, texts: &[String]) -> FeedbackOutcome {
        let speaker = Arc::clone(&self.feedback);
        let speaking = speaker.speak_all(texts);
        tokio::pin!(speaking);

        let outcome = tokio::select! {
            result = &mut speaking => {
                if let Err(e) = result {
                    warn!("Feedback could not be spoken: {e}");
                }
                return FeedbackOutcome::Finished;
            }
            Some(_) = self.reloads.recv(), if self.reloads_open => FeedbackOutcome::Reloaded,
            Some(command) = self.commands.recv(), if self.commands_open => {
                debug!("Command {command} interrupted the feedback");
                FeedbackOutcome::Interrupted(command)
            }
            _ = tokio::signal::ctrl_c() => FeedbackOutcome::Quit,
        };

        speaker.cancel();
        if let Err(e) = speaking.await {
            debug!("Cancelled feedback: {e}");
        }
        outcome
    }
}
