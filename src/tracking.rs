//! Reconciliation of a reloaded text against the reading baseline.
//!
//! [`compute`] is a pure function: given the snapshot taken when the reload
//! started and the new text, it decides which lines changed, what to log,
//! which feedback messages to speak, where the pointer should go and whether
//! playback stops or restarts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::diff;
use crate::feedback::{FeedbackCatalog, FeedbackKey, FeedbackMode};
use crate::sequence::{ReadingState, SequenceMode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    None,
    #[default]
    Backward,
    Forward,
    /// Any change sends the reader back to the first line.
    #[serde(rename = "restart")]
    RestartFromBeginning,
}

impl FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "backward" => Ok(Self::Backward),
            "forward" => Ok(Self::Forward),
            "restart" => Ok(Self::RestartFromBeginning),
            other => Err(format!("unknown tracking mode: {other}")),
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Backward => write!(f, "backward"),
            Self::Forward => write!(f, "forward"),
            Self::RestartFromBeginning => write!(f, "restart"),
        }
    }
}

/// Playback transition requested by a tracking event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    NoAction,
    Stop,
    Restart,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAction => write!(f, "none"),
            Self::Stop => write!(f, "stop"),
            Self::Restart => write!(f, "restart"),
        }
    }
}

/// Options read by the engine; snapshotted into every [`Baseline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackingOptions {
    pub tracking_mode: TrackingMode,
    pub sequence_mode: SequenceMode,
    pub feedback_mode: FeedbackMode,
    pub restart_after_change: bool,
    pub restarting_message_when_not_playing: bool,
    pub restart_on_touch: bool,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            tracking_mode: TrackingMode::Backward,
            sequence_mode: SequenceMode::Normal,
            feedback_mode: FeedbackMode::Minimum,
            restart_after_change: true,
            restarting_message_when_not_playing: true,
            restart_on_touch: false,
        }
    }
}

/// Snapshot of the reader at the moment a reload started.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub state: ReadingState,
    pub feedback_messages: Arc<FeedbackCatalog>,
    pub options: TrackingOptions,
    pub player_was_running_and_not_paused: bool,
}

impl Baseline {
    pub fn capture(
        state: ReadingState,
        player_was_running_and_not_paused: bool,
        feedback_messages: Arc<FeedbackCatalog>,
        options: TrackingOptions,
    ) -> Self {
        Self {
            state,
            feedback_messages,
            options,
            player_was_running_and_not_paused,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingEvent {
    /// Indices into the new lines that differ from the baseline.
    pub modified_lines: Vec<usize>,
    pub log_lines: Vec<String>,
    /// Keys to speak, in order, each at most once.
    pub spoken_feedback: Vec<FeedbackKey>,
    pub jump_to: Option<usize>,
    pub action: Action,
}

/// Reconcile `new_text`/`new_lines` against `baseline`.
pub fn compute(
    baseline: &Baseline,
    new_text: &str,
    new_lines: &[String],
    changed_again: bool,
) -> TrackingEvent {
    let mut rec = Reconciliation {
        baseline,
        new_lines,
        changed_again,
        blank_areas_changed: diff::blank_areas_changed(&baseline.state.text, new_text),
        modified_lines: Vec::new(),
        jump_to: None,
        action: Action::NoAction,
        spoken: Vec::new(),
    };

    rec.modified_lines = rec.compute_modified_lines();
    (rec.jump_to, rec.action) = rec.jump_and_action();
    let log_lines = rec.log_lines();

    rec.basic_feedback();
    if rec.action == Action::NoAction
        && baseline.player_was_running_and_not_paused
        && !rec.spoken.is_empty()
    {
        // Feedback interrupts the reading, which then has to resume.
        rec.action = Action::Restart;
    }
    rec.feedback_for_action_taken();

    TrackingEvent {
        modified_lines: rec.modified_lines,
        log_lines,
        spoken_feedback: rec.spoken,
        jump_to: rec.jump_to,
        action: rec.action,
    }
}

struct Reconciliation<'a> {
    baseline: &'a Baseline,
    new_lines: &'a [String],
    changed_again: bool,
    blank_areas_changed: bool,
    modified_lines: Vec<usize>,
    jump_to: Option<usize>,
    action: Action,
    spoken: Vec<FeedbackKey>,
}

impl Reconciliation<'_> {
    fn state(&self) -> &ReadingState {
        &self.baseline.state
    }

    fn options(&self) -> &TrackingOptions {
        &self.baseline.options
    }

    fn old_len(&self) -> usize {
        self.state().lines.len()
    }

    fn new_len(&self) -> usize {
        self.new_lines.len()
    }

    fn too_short(&self) -> bool {
        self.new_len() <= self.state().pointer
    }

    fn compute_modified_lines(&self) -> Vec<usize> {
        let modified = diff::modified_lines(&self.state().lines, self.new_lines);
        if self.options().sequence_mode == SequenceMode::Modified {
            diff::accumulate_modified_lines(
                &self.state().modified_lines,
                self.state().pointer,
                self.new_len(),
                modified,
            )
        } else {
            modified
        }
    }

    // --- jump and action ---

    fn jump_and_action(&self) -> (Option<usize>, Action) {
        if let Some(jump) = self.jump_to_modified_line() {
            (Some(jump), self.default_action())
        } else if self.too_short() {
            if self.options().tracking_mode == TrackingMode::RestartFromBeginning {
                (Some(0), self.default_action())
            } else {
                (self.new_len().checked_sub(1), Action::Stop)
            }
        } else if self.options().restart_on_touch {
            let jump = (self.options().tracking_mode == TrackingMode::RestartFromBeginning).then_some(0);
            (jump, Action::Restart)
        } else {
            (None, Action::NoAction)
        }
    }

    fn jump_to_modified_line(&self) -> Option<usize> {
        let &first = self.modified_lines.first()?;
        let state = self.state();
        match self.options().tracking_mode {
            TrackingMode::None => None,
            TrackingMode::RestartFromBeginning => Some(0),
            TrackingMode::Forward => {
                // A running modified-only sequence reaches later changes on its own.
                let deferred = self.options().sequence_mode == SequenceMode::Modified
                    && self.baseline.player_was_running_and_not_paused
                    && first > state.pointer;
                (!deferred).then_some(first)
            }
            TrackingMode::Backward => {
                let boundary = state.pointer + usize::from(state.eol);
                (first <= boundary).then_some(first)
            }
        }
    }

    fn default_action(&self) -> Action {
        let options = self.options();
        if self.baseline.player_was_running_and_not_paused
            || options.restart_after_change
            || options.restart_on_touch
        {
            Action::Restart
        } else {
            Action::NoAction
        }
    }

    // --- transcript ---

    fn log_lines(&self) -> Vec<String> {
        let mut logs = Vec::new();
        if self.changed_again {
            logs.push("The input file changed again on disk.".to_string());
            logs.push("Reporting changes again (may include previously reported changes).".to_string());
        }
        if self.new_lines.is_empty() {
            logs.push("The input file is empty.".to_string());
            return logs;
        }
        if self.blank_areas_changed {
            logs.push("Blank areas of the input file have changed.".to_string());
        }
        let (old_len, new_len) = (self.old_len(), self.new_len());
        if new_len < old_len {
            logs.push(format!("The text was shortened from {old_len} to {new_len} line(s)."));
        } else if new_len > old_len {
            logs.push(format!("The text was extended from {old_len} to {new_len} lines."));
        }
        if self.modified_lines.is_empty() {
            if new_len == old_len {
                logs.push(if self.changed_again {
                    "The latest changes have been reverted.".to_string()
                } else {
                    "No changes to the text were detected.".to_string()
                });
                return logs;
            }
        } else {
            logs.push(self.describe_changes());
        }
        if self.options().tracking_mode == TrackingMode::RestartFromBeginning {
            logs.push("Restarting from the beginning.".to_string());
        }
        logs
    }

    fn describe_changes(&self) -> String {
        let changes = format_line_ranges(&self.modified_lines);
        let pointer = self.state().pointer;
        let eol = self.state().eol;
        let jump = match self.jump_to {
            Some(_) if self.options().tracking_mode == TrackingMode::RestartFromBeginning => None,
            other => other,
        };
        match jump {
            Some(jump) if jump < pointer => format!(
                "Changes were detected at lines: {changes}; the player will jump back from line {}.",
                pointer + 1
            ),
            Some(jump) if jump == pointer => format!(
                "Changes were detected at lines: {changes}; the player will restart at line {}.",
                pointer + 1
            ),
            Some(jump) if eol && jump == pointer + 1 => format!(
                "Changes were detected at lines: {changes}; the player will continue at line {}.",
                pointer + 2
            ),
            Some(_) => format!(
                "Changes were detected at lines: {changes}; the player will jump forward from line {}.",
                pointer + 1
            ),
            None => format!(
                "Changes were detected at lines: {changes} (current line is: {}).",
                pointer + 1
            ),
        }
    }

    // --- spoken feedback ---

    /// Queue `key` unless already queued or not speakable at the active
    /// level. `mandatory` keys are looked up at full level.
    fn say(&mut self, key: FeedbackKey, mandatory: bool) {
        if self.spoken.contains(&key) {
            return;
        }
        let mode = if mandatory {
            FeedbackMode::Full
        } else {
            self.options().feedback_mode
        };
        if self.baseline.feedback_messages.message(key, mode).is_some() {
            self.spoken.push(key);
        }
    }

    fn basic_feedback(&mut self) {
        if self.options().feedback_mode == FeedbackMode::None {
            return;
        }
        if self.changed_again {
            self.say(FeedbackKey::FileChangedAgain, false);
        }
        if self.new_lines.is_empty() {
            self.say(FeedbackKey::FileIsEmpty, false);
            return;
        }
        if self.blank_areas_changed {
            self.say(FeedbackKey::BlankAreasChanged, false);
        }

        let (old_len, new_len) = (self.old_len(), self.new_len());
        if new_len < old_len {
            self.say(FeedbackKey::FileDecreased, false);
            if self.too_short() {
                self.say(FeedbackKey::FileTooShort, false);
            }
        } else if new_len > old_len {
            self.say(FeedbackKey::FileIncreased, false);
        }

        let Some(&first) = self.modified_lines.first() else {
            if new_len == old_len {
                let key = if self.changed_again {
                    FeedbackKey::ChangesReverted
                } else {
                    FeedbackKey::NoChanges
                };
                self.say(key, false);
            }
            return;
        };
        let pointer = self.state().pointer;
        let key = if first < pointer {
            FeedbackKey::ChangesBefore
        } else if first == pointer {
            FeedbackKey::ChangesHere
        } else if self.state().eol && first == pointer + 1 {
            FeedbackKey::ChangesNext
        } else {
            FeedbackKey::ChangesAfter
        };
        self.say(key, false);
        if self.modified_lines.len() > 1 {
            self.say(FeedbackKey::ManyChanges, false);
        }
    }

    fn feedback_for_action_taken(&mut self) {
        if self.options().feedback_mode == FeedbackMode::None {
            return;
        }
        if self.action == Action::Restart {
            if let Some(key) = self.restart_message() {
                self.say(key, false);
            }
        } else if let Some(jump) = self.jump_to {
            let pointer = self.state().pointer;
            if jump < pointer {
                if self.modified_lines.first() == Some(&jump) {
                    self.say(FeedbackKey::JumpingBack, false);
                } else if self.too_short() {
                    self.say(FeedbackKey::FileTooShort, true);
                }
            } else if jump == pointer {
                self.say(FeedbackKey::ChangesHere, true);
            } else {
                self.say(FeedbackKey::JumpingForward, false);
            }
        }
    }

    fn restart_message(&self) -> Option<FeedbackKey> {
        let options = self.options();
        let state = self.state();
        if options.tracking_mode == TrackingMode::RestartFromBeginning {
            return Some(FeedbackKey::StartingAgain);
        }
        if options.sequence_mode == SequenceMode::Modified && !state.said_anything {
            // Nothing read yet: the first reload is not a restart to the user.
            return None;
        }
        if !self.baseline.player_was_running_and_not_paused && !options.restarting_message_when_not_playing {
            return None;
        }
        match self.jump_to {
            None => Some(FeedbackKey::Restarting),
            Some(jump) if jump == state.pointer => Some(FeedbackKey::Restarting),
            Some(jump) if jump < state.pointer => Some(FeedbackKey::JumpingBack),
            Some(jump) if state.eol && jump == state.pointer + 1 => Some(FeedbackKey::Continuing),
            Some(_) => Some(FeedbackKey::JumpingForward),
        }
    }
}

/// 1-based, comma-separated ranges: `[0, 1, 2, 5]` -> `"1-3, 6"`.
pub fn format_line_ranges(lines: &[usize]) -> String {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &line in lines {
        match ranges.last_mut() {
            Some((_, end)) if *end + 1 == line => *end = line,
            _ => ranges.push((line, line)),
        }
    }
    ranges
        .into_iter()
        .map(|(start, end)| {
            if start == end {
                (start + 1).to_string()
            } else {
                format!("{}-{}", start + 1, end + 1)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
