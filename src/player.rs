//! Playback state machine.
//!
//! The player owns the reading pointer and the playback status; nothing
//! else writes them. It does not speak by itself: the session asks it for
//! the next [`Utterance`], speaks it, and reports back through
//! [`Player::line_finished`]. Moving the pointer while a line is being
//! spoken cancels that utterance through the shared [`Speaker`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::sequence::{RandomHistory, ReadingState, SequenceMode};
use crate::speech::Speaker;
use crate::tracking::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    /// Reading is suspended; resuming re-reads the current line.
    Paused,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Paused => write!(f, "PAUSED"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlayerOptions {
    pub sequence_mode: SequenceMode,
    pub stop_after_each_line: bool,
    pub show_line_number: bool,
    pub show_total_lines: bool,
    /// Silence before the first line whenever reading starts.
    pub pause_before: Duration,
    pub pause_between: Duration,
    /// Ask the session to quit once a normal reading reaches the last line.
    pub close_at_end: bool,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            sequence_mode: SequenceMode::Normal,
            stop_after_each_line: false,
            show_line_number: true,
            show_total_lines: true,
            pause_before: Duration::ZERO,
            pause_between: Duration::ZERO,
            close_at_end: false,
        }
    }
}

/// A line handed out for speaking, tagged with the speaker epoch it is valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub epoch: u64,
    pub pointer: usize,
    pub text: String,
    /// Wait this long before speaking.
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Movement {
    First,
    Previous,
    Next,
    Last,
}

pub struct Player {
    state: ReadingState,
    status: PlaybackStatus,
    options: PlayerOptions,
    /// One-shot variant of `stop_after_each_line`.
    stop_after_current_line: bool,
    random: Arc<RandomHistory>,
    speaker: Arc<Speaker>,
    /// Epoch of the utterance currently out for speaking.
    in_flight: Option<u64>,
    /// Silence owed before the next utterance.
    delay: Duration,
    at_end: bool,
}

impl Player {
    pub fn new(options: PlayerOptions, speaker: Arc<Speaker>, random: Arc<RandomHistory>) -> Self {
        Self {
            state: ReadingState::default(),
            status: PlaybackStatus::Stopped,
            options,
            stop_after_current_line: false,
            random,
            speaker,
            in_flight: None,
            delay: Duration::ZERO,
            at_end: false,
        }
    }

    pub fn state(&self) -> &ReadingState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn running_and_not_paused(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// A normal reading ran off the last line with `close_at_end` set.
    pub fn reached_end(&self) -> bool {
        self.at_end
    }

    fn update(&mut self, f: impl FnOnce(ReadingState) -> ReadingState) {
        self.state = f(std::mem::take(&mut self.state));
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.status != status {
            debug!("Player: {} → {status}", self.status);
            self.status = status;
        }
    }

    /// Abandon the line being spoken, if any.
    fn cancel_current(&mut self) {
        if self.in_flight.take().is_some() {
            self.speaker.cancel();
        }
    }

    /// Install the first version of the text and start reading, unless the
    /// sequence only visits modified lines (nothing is modified yet).
    pub fn first_load(&mut self, text: String, lines: Vec<String>) {
        self.state = ReadingState::new(text, lines);
        let sequence = self.options.sequence_mode;
        if sequence == SequenceMode::Modified {
            info!("Waiting for changes.");
            return;
        }
        let first = sequence.first(&self.state, &self.random);
        self.update(|s| s.at(first));
        self.start();
    }

    /// Replace the text, keeping pointer and flags.
    pub fn register_content(&mut self, text: String, lines: Vec<String>, modified_lines: Vec<usize>) {
        self.update(|s| s.with_content(text, lines, modified_lines));
    }

    /// Move to `jump_to` (if any), then stop or restart as requested.
    pub fn apply(&mut self, jump_to: Option<usize>, action: Action) {
        if let Some(pointer) = jump_to {
            self.go(pointer);
            self.stop_after_current_line = false;
        }
        match action {
            Action::Stop => {
                self.stop();
            }
            Action::Restart => {
                self.restart();
            }
            Action::NoAction => {}
        }
    }

    /// Content first, then the jump, then the stop/restart.
    pub fn apply_update(
        &mut self,
        text: String,
        lines: Vec<String>,
        modified_lines: Vec<usize>,
        jump_to: Option<usize>,
        action: Action,
    ) {
        self.register_content(text, lines, modified_lines);
        self.apply(jump_to, action);
    }

    /// Silence the current line without changing the status; reading
    /// resumes from the same line once something restarts it.
    pub fn interrupt(&mut self) {
        self.cancel_current();
    }

    /// Next line to speak, if playing and nothing is out already.
    pub fn next_utterance(&mut self) -> Option<Utterance> {
        if self.status != PlaybackStatus::Playing || self.in_flight.is_some() {
            return None;
        }
        let Some(text) = self.state.current_line().map(str::to_string) else {
            self.set_status(PlaybackStatus::Stopped);
            return None;
        };
        self.show_line();
        let epoch = self.speaker.epoch();
        self.in_flight = Some(epoch);
        Some(Utterance {
            epoch,
            pointer: self.state.pointer,
            text,
            delay: std::mem::take(&mut self.delay),
        })
    }

    /// Outcome of an utterance: `Ok(cancelled)` or a speech failure.
    pub fn line_finished(&mut self, epoch: u64, outcome: Result<bool, String>) {
        if self.in_flight != Some(epoch) {
            debug!("Ignoring stale utterance (epoch {epoch})");
            return;
        }
        self.in_flight = None;
        self.update(ReadingState::spoken);

        match outcome {
            Err(e) => {
                warn!("Speech failed: {e}");
                info!("The reading is stopped, you can try to restart it.");
                self.set_status(PlaybackStatus::Stopped);
            }
            Ok(true) => self.set_status(PlaybackStatus::Stopped),
            Ok(false) => self.advance(),
        }
    }

    fn advance(&mut self) {
        let sequence = self.options.sequence_mode;
        if sequence.eof(&self.state) {
            debug!("Reached the end of the sequence");
            self.set_status(PlaybackStatus::Stopped);
            self.at_end = self.options.close_at_end && sequence == SequenceMode::Normal;
            return;
        }
        if self.stop_after_current_line || self.options.stop_after_each_line {
            self.set_status(PlaybackStatus::Stopped);
            self.update(|s| s.with_eol(true));
            self.stop_after_current_line = false;
            if self.options.stop_after_each_line {
                info!("The player is stopping at the end of each line.");
            }
            return;
        }
        match sequence.next(&self.state, &self.random) {
            Some(next) if self.go(next) => self.delay = self.options.pause_between,
            Some(next) => {
                warn!("Line {} is out of range, stopping", next + 1);
                self.set_status(PlaybackStatus::Stopped);
            }
            None => self.set_status(PlaybackStatus::Stopped),
        }
    }

    /// Begin reading. From an end-of-line state, first step forward.
    pub fn start(&mut self) -> bool {
        match self.status {
            PlaybackStatus::Playing => false,
            PlaybackStatus::Paused => {
                self.set_status(PlaybackStatus::Playing);
                true
            }
            PlaybackStatus::Stopped => {
                if self.state.eol {
                    let next = self.options.sequence_mode.next(&self.state, &self.random);
                    match next {
                        Some(next) if next != self.state.pointer => self.update(|s| s.at(next)),
                        _ => self.update(|s| s.with_eol(false)),
                    }
                }
                self.delay = self.options.pause_before;
                self.set_status(PlaybackStatus::Playing);
                true
            }
        }
    }

    pub fn stop(&mut self) -> bool {
        if self.status == PlaybackStatus::Stopped {
            return false;
        }
        self.cancel_current();
        self.set_status(PlaybackStatus::Stopped);
        true
    }

    /// Start, pause or resume.
    pub fn toggle(&mut self) -> bool {
        match self.status {
            PlaybackStatus::Stopped | PlaybackStatus::Paused => self.start(),
            PlaybackStatus::Playing if self.in_flight.is_some() => {
                self.cancel_current();
                self.set_status(PlaybackStatus::Paused);
                true
            }
            PlaybackStatus::Playing => self.stop(),
        }
    }

    /// Read the current line again from its beginning.
    pub fn restart(&mut self) -> bool {
        match self.status {
            PlaybackStatus::Playing | PlaybackStatus::Paused => {
                self.cancel_current();
                self.set_status(PlaybackStatus::Playing);
                false
            }
            PlaybackStatus::Stopped => {
                self.update(|s| s.with_eol(false));
                let started = self.start();
                self.delay = Duration::ZERO;
                started
            }
        }
    }

    pub fn reset_pointer(&mut self) -> bool {
        if !self.state.eol {
            return false;
        }
        self.update(|s| s.with_eol(false));
        info!("The player was reset to the beginning of the current line.");
        true
    }

    /// Move to a 1-based line number.
    pub fn go_line(&mut self, line_number: usize) -> bool {
        let before = self.state.pointer;
        line_number
            .checked_sub(1)
            .is_some_and(|pointer| self.go(pointer) && self.state.pointer != before)
    }

    /// Move to `pointer`. Out-of-range targets are ignored. Moving while a
    /// line is being read restarts reading at the new line; moving while
    /// paused stops.
    pub fn go(&mut self, pointer: usize) -> bool {
        if pointer >= self.state.lines.len() {
            return false;
        }
        if pointer == self.state.pointer {
            self.reset_pointer();
        } else {
            self.update(|s| s.at(pointer));
            match self.status {
                PlaybackStatus::Playing => self.cancel_current(),
                PlaybackStatus::Paused => self.set_status(PlaybackStatus::Stopped),
                PlaybackStatus::Stopped => {}
            }
        }
        if self.status != PlaybackStatus::Playing {
            self.show_line();
        }
        true
    }

    pub fn first(&mut self) -> bool {
        self.movement(Movement::First)
    }

    pub fn previous(&mut self) -> bool {
        self.movement(Movement::Previous)
    }

    pub fn next(&mut self) -> bool {
        self.movement(Movement::Next)
    }

    pub fn last(&mut self) -> bool {
        self.movement(Movement::Last)
    }

    fn movement(&mut self, movement: Movement) -> bool {
        let sequence = self.options.sequence_mode;
        let messages = sequence.messages();
        let forward = matches!(movement, Movement::Next | Movement::Last);
        if sequence.is_empty(&self.state) {
            if let Some(msg) = messages.empty {
                info!("{msg}");
            }
            return false;
        }
        if forward && sequence.eof(&self.state) {
            info!("{}", messages.eof);
            return false;
        }
        if !forward && sequence.bof(&self.state) {
            info!("{}", messages.bof);
            return false;
        }
        let target = match movement {
            Movement::First => {
                info!("{}", messages.first);
                Some(sequence.first(&self.state, &self.random))
            }
            Movement::Previous => {
                info!("Back one line.");
                sequence.previous(&self.state, &self.random)
            }
            Movement::Next => sequence.next(&self.state, &self.random),
            Movement::Last => {
                info!("{}", messages.last);
                Some(sequence.last(&self.state, &self.random))
            }
        };
        target.is_some_and(|pointer| self.go(pointer))
    }

    pub fn go_random(&mut self) -> bool {
        info!("Choosing a random line.");
        let before = self.state.pointer;
        let pointer = self.random.advance(self.state.lines.len());
        self.go(pointer) && self.state.pointer != before
    }

    /// Skip to the nearest modified line after (or before) the pointer.
    pub fn go_modified(&mut self, forward: bool) -> bool {
        let modified = SequenceMode::Modified;
        let messages = modified.messages();
        let (Some(&first), Some(&last)) = (self.state.modified_lines.first(), self.state.modified_lines.last()) else {
            if let Some(msg) = messages.empty {
                info!("{msg}");
            }
            return false;
        };
        let (hit_limit, at_end, end_msg, none_msg) = if forward {
            (
                modified.eof(&self.state),
                self.state.pointer == last,
                messages.eof,
                "There are no modified lines after this one.",
            )
        } else {
            (
                modified.bof(&self.state),
                self.state.pointer == first,
                messages.bof,
                "There are no modified lines before this one.",
            )
        };
        if hit_limit {
            info!("{}", if at_end { end_msg } else { none_msg });
            return false;
        }
        let target = if forward {
            info!("Skipping to the next modified line.");
            modified.next(&self.state, &self.random)
        } else {
            info!("Skipping to the previous modified line.");
            modified.previous(&self.state, &self.random)
        };
        target.is_some_and(|pointer| self.go(pointer))
    }

    /// Read the next modified line once, then stop.
    pub fn next_change(&mut self) -> bool {
        self.read_change(true)
    }

    /// Read the previous modified line once, then stop.
    pub fn prev_change(&mut self) -> bool {
        self.read_change(false)
    }

    fn read_change(&mut self, forward: bool) -> bool {
        if !self.go_modified(forward) {
            return false;
        }
        self.restart();
        self.stop_after_current_line = true;
        true
    }

    /// Read one random line, then stop.
    pub fn random_line(&mut self) -> bool {
        self.stop_after_current_line = false;
        let moved = self.go_random();
        self.stop_after_current_line = true;
        self.restart();
        moved
    }

    /// Echo the current line to the terminal.
    pub fn show_line(&self) -> Option<String> {
        let line = self.state.current_line()?;
        let shown = match (self.options.show_line_number, self.options.show_total_lines) {
            (true, true) => format!("<{}/{}> {line}", self.state.pointer + 1, self.state.lines.len()),
            (true, false) => format!("<{}> {line}", self.state.pointer + 1),
            (false, _) => line.to_string(),
        };
        println!("{shown}");
        Some(shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::SpeechBackend;
    use std::time::Duration;

    fn lines(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {i}")).collect()
    }

    fn player_with(options: PlayerOptions) -> Player {
        let speaker = Arc::new(Speaker::new(SpeechBackend::transcript(Duration::ZERO)));
        Player::new(options, speaker, Arc::new(RandomHistory::with_seed(10, 7)))
    }

    fn loaded(options: PlayerOptions, n: usize) -> Player {
        let mut player = player_with(options);
        player.first_load(lines(n).join("\n"), lines(n));
        player
    }

    /// Speak the pending utterance to completion.
    fn finish_line(player: &mut Player) -> Utterance {
        let utterance = player.next_utterance().expect("an utterance");
        player.line_finished(utterance.epoch, Ok(false));
        utterance
    }

    #[test]
    fn test_reads_through_to_the_end() {
        let mut player = loaded(PlayerOptions::default(), 3);
        assert_eq!(player.status(), PlaybackStatus::Playing);
        let spoken: Vec<String> = (0..3).map(|_| finish_line(&mut player).text).collect();
        assert_eq!(spoken, vec!["line 1", "line 2", "line 3"]);
        assert_eq!(player.status(), PlaybackStatus::Stopped);
        assert_eq!(player.state().pointer, 2);
        assert!(player.state().said_anything);
        assert!(player.next_utterance().is_none());
    }

    #[test]
    fn test_modified_sequence_waits_for_changes() {
        let options = PlayerOptions {
            sequence_mode: SequenceMode::Modified,
            ..PlayerOptions::default()
        };
        let player = loaded(options, 3);
        assert_eq!(player.status(), PlaybackStatus::Stopped);
        assert!(!player.state().said_anything);
    }

    #[test]
    fn test_stop_after_each_line_sets_eol() {
        let options = PlayerOptions {
            stop_after_each_line: true,
            ..PlayerOptions::default()
        };
        let mut player = loaded(options, 3);
        finish_line(&mut player);
        assert_eq!(player.status(), PlaybackStatus::Stopped);
        assert_eq!(player.state().pointer, 0);
        assert!(player.state().eol);

        assert!(player.toggle());
        assert_eq!(player.state().pointer, 1);
        assert!(!player.state().eol);
        assert_eq!(finish_line(&mut player).text, "line 2");
    }

    #[test]
    fn test_pause_and_resume_rereads_line() {
        let mut player = loaded(PlayerOptions::default(), 3);
        let first = player.next_utterance().unwrap();
        assert!(player.toggle());
        assert_eq!(player.status(), PlaybackStatus::Paused);

        // The cancelled utterance reports back late and is ignored.
        player.line_finished(first.epoch, Ok(true));
        assert_eq!(player.status(), PlaybackStatus::Paused);

        assert!(player.toggle());
        let again = player.next_utterance().unwrap();
        assert_eq!(again.pointer, 0);
        assert_ne!(again.epoch, first.epoch);
    }

    #[test]
    fn test_go_while_reading_restarts_at_new_line() {
        let mut player = loaded(PlayerOptions::default(), 5);
        let first = player.next_utterance().unwrap();
        assert!(player.go_line(4));
        player.line_finished(first.epoch, Ok(true));
        assert_eq!(player.status(), PlaybackStatus::Playing);
        assert_eq!(finish_line(&mut player).text, "line 4");
        assert!(!player.go_line(0));
        assert!(!player.go_line(9));
    }

    #[test]
    fn test_go_while_paused_stops() {
        let mut player = loaded(PlayerOptions::default(), 5);
        player.next_utterance().unwrap();
        player.toggle();
        assert!(player.go(2));
        assert_eq!(player.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_movement_bounds() {
        let mut player = loaded(PlayerOptions::default(), 3);
        player.stop();
        assert!(!player.previous());
        assert!(player.last());
        assert_eq!(player.state().pointer, 2);
        assert!(!player.next());
        assert!(player.previous());
        assert_eq!(player.state().pointer, 1);
        assert!(player.first());
        assert_eq!(player.state().pointer, 0);
    }

    #[test]
    fn test_speech_failure_stops() {
        let mut player = loaded(PlayerOptions::default(), 3);
        let utterance = player.next_utterance().unwrap();
        player.line_finished(utterance.epoch, Err("boom".into()));
        assert_eq!(player.status(), PlaybackStatus::Stopped);
        assert_eq!(player.state().pointer, 0);
    }

    #[test]
    fn test_change_navigation() {
        let mut player = loaded(PlayerOptions::default(), 8);
        player.stop();
        assert!(!player.next_change());

        player.register_content(lines(8).join("\n"), lines(8), vec![2, 5]);
        assert!(player.next_change());
        assert_eq!(player.state().pointer, 2);
        assert_eq!(player.status(), PlaybackStatus::Playing);

        // Reads the changed line once, then stops on it.
        finish_line(&mut player);
        assert_eq!(player.status(), PlaybackStatus::Stopped);
        assert_eq!(player.state().pointer, 2);
        assert!(player.state().eol);

        assert!(player.next_change());
        assert_eq!(player.state().pointer, 5);
        assert!(!player.next_change());
        assert!(player.prev_change());
        assert_eq!(player.state().pointer, 2);
        assert!(!player.prev_change());
    }

    #[test]
    fn test_apply_jump_and_actions() {
        let mut player = loaded(PlayerOptions::default(), 6);
        player.stop();
        player.apply_update(lines(6).join("\n"), lines(6), vec![3], Some(3), Action::NoAction);
        assert_eq!(player.state().pointer, 3);
        assert_eq!(player.state().modified_lines, vec![3]);
        assert_eq!(player.status(), PlaybackStatus::Stopped);

        player.apply(Some(1), Action::Restart);
        assert_eq!(player.status(), PlaybackStatus::Playing);
        assert_eq!(player.next_utterance().unwrap().pointer, 1);

        player.apply(None, Action::Stop);
        assert_eq!(player.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_interrupt_keeps_playing() {
        let mut player = loaded(PlayerOptions::default(), 3);
        let first = player.next_utterance().unwrap();
        player.interrupt();
        assert!(player.running_and_not_paused());
        player.line_finished(first.epoch, Ok(true));
        assert_eq!(player.next_utterance().unwrap().pointer, 0);
    }

    #[test]
    fn test_random_line_reads_once() {
        let mut player = loaded(PlayerOptions::default(), 50);
        player.stop();
        player.random_line();
        assert_eq!(player.status(), PlaybackStatus::Playing);
        let utterance = finish_line(&mut player);
        assert_eq!(utterance.pointer, player.state().pointer);
        assert_eq!(player.status(), PlaybackStatus::Stopped);
    }

    #[test]
    fn test_random_reading_after_text_shrinks() {
        let options = PlayerOptions {
            sequence_mode: SequenceMode::Random,
            ..PlayerOptions::default()
        };
        let mut player = loaded(options, 1000);
        for _ in 0..10 {
            finish_line(&mut player);
        }
        for _ in 0..5 {
            player.random.retreat(1000);
        }

        player.apply_update(lines(3).join("\n"), lines(3), vec![], Some(0), Action::Restart);
        for _ in 0..6 {
            let utterance = finish_line(&mut player);
            assert!(utterance.pointer < 3);
            assert_eq!(player.status(), PlaybackStatus::Playing);
            assert_eq!(Some(player.state().pointer), player.random.peek());
        }
    }

    #[test]
    fn test_pauses_before_and_between_lines() {
        let options = PlayerOptions {
            pause_before: Duration::from_millis(700),
            pause_between: Duration::from_millis(200),
            ..PlayerOptions::default()
        };
        let mut player = loaded(options, 3);
        assert_eq!(finish_line(&mut player).delay, Duration::from_millis(700));
        assert_eq!(finish_line(&mut player).delay, Duration::from_millis(200));

        // Restarting a stopped reader skips the opening pause
        player.stop();
        player.restart();
        assert_eq!(finish_line(&mut player).delay, Duration::ZERO);
        assert_eq!(player.status(), PlaybackStatus::Stopped);

        player.go(0);
        player.toggle();
        assert_eq!(player.next_utterance().unwrap().delay, Duration::from_millis(700));
    }

    #[test]
    fn test_close_at_end_only_after_normal_reading() {
        let options = PlayerOptions {
            close_at_end: true,
            ..PlayerOptions::default()
        };
        let mut player = loaded(options, 2);
        finish_line(&mut player);
        assert!(!player.reached_end());
        finish_line(&mut player);
        assert!(player.reached_end());

        let random = PlayerOptions {
            sequence_mode: SequenceMode::Random,
            stop_after_each_line: true,
            close_at_end: true,
            ..PlayerOptions::default()
        };
        let mut player = loaded(random, 2);
        finish_line(&mut player);
        assert!(!player.reached_end());
    }

    #[test]
    fn test_show_line_format() {
        let mut player = loaded(PlayerOptions::default(), 3);
        assert_eq!(player.show_line().as_deref(), Some("<1/3> line 1"));
        player.options.show_total_lines = false;
        assert_eq!(player.show_line().as_deref(), Some("<1> line 1"));
        player.options.show_line_number = false;
        assert_eq!(player.show_line().as_deref(), Some("line 1"));
    }
}
