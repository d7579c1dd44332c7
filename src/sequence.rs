//! Reading sequences: what "first", "last", "next" and "previous" mean.
//!
//! - `Normal`: every line, top to bottom.
//! - `Modified`: only the lines changed by the last reload.
//! - `Random`: a uniformly random walk with a bounded, replayable history.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

/// Default number of entries kept by [`RandomHistory`].
pub const DEFAULT_RANDOM_HISTORY: usize = 100;

/// The player's reading state. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingState {
    pub text: String,
    pub lines: Vec<String>,
    pub pointer: usize,
    /// Ascending, unique, all `< lines.len()`.
    pub modified_lines: Vec<usize>,
    /// The current line has been read to the end; the next start advances.
    pub eol: bool,
    pub said_anything: bool,
}

impl ReadingState {
    pub fn new(text: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            text: text.into(),
            lines,
            ..Self::default()
        }
    }

    /// Move to `pointer`, clearing the eol flag.
    pub fn at(self, pointer: usize) -> Self {
        Self {
            pointer,
            eol: false,
            ..self
        }
    }

    pub fn with_eol(self, eol: bool) -> Self {
        Self { eol, ..self }
    }

    pub fn spoken(self) -> Self {
        Self {
            said_anything: true,
            ..self
        }
    }

    /// Swap in a new version of the text, keeping pointer and flags.
    pub fn with_content(self, text: String, lines: Vec<String>, modified_lines: Vec<usize>) -> Self {
        Self {
            text,
            lines,
            modified_lines,
            ..self
        }
    }

    pub fn current_line(&self) -> Option<&str> {
        self.lines.get(self.pointer).map(String::as_str)
    }

    pub fn last_index(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }
}

/// User-facing strings attached to each sequence mode.
#[derive(Debug)]
pub struct SequenceMessages {
    pub bof: &'static str,
    pub eof: &'static str,
    pub first: &'static str,
    pub last: &'static str,
    pub empty: Option<&'static str>,
}

const NORMAL_MESSAGES: SequenceMessages = SequenceMessages {
    bof: "This is the beginning of the text.",
    eof: "This is the end of the text.",
    first: "Jumping back to the beginning of the text.",
    last: "Jumping forward to the end of the text.",
    empty: None,
};

const MODIFIED_MESSAGES: SequenceMessages = SequenceMessages {
    bof: "This is the first modified line.",
    eof: "This is the last modified line.",
    first: "Jumping back to the first modified line.",
    last: "Jumping forward to the last modified line.",
    empty: Some("There are no modified lines."),
};

const RANDOM_MESSAGES: SequenceMessages = SequenceMessages {
    bof: "This is the beginning of the random reading history.",
    eof: "This is the end of the random reading history.",
    first: "Jumping back to the beginning of the random reading history.",
    last: "Jumping forward to the end of the random reading history.",
    empty: None,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceMode {
    #[default]
    Normal,
    #[serde(alias = "modified-only")]
    Modified,
    Random,
}

impl FromStr for SequenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "modified" | "modified-only" => Ok(Self::Modified),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown sequence mode: {other}")),
        }
    }
}

impl fmt::Display for SequenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Modified => write!(f, "modified"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl SequenceMode {
    pub fn messages(self) -> &'static SequenceMessages {
        match self {
            Self::Normal => &NORMAL_MESSAGES,
            Self::Modified => &MODIFIED_MESSAGES,
            Self::Random => &RANDOM_MESSAGES,
        }
    }

    /// True when there is nothing to move through.
    pub fn is_empty(self, state: &ReadingState) -> bool {
        match self {
            Self::Modified => state.modified_lines.is_empty(),
            Self::Normal | Self::Random => false,
        }
    }

    pub fn bof(self, state: &ReadingState) -> bool {
        match self {
            Self::Normal => state.pointer == 0,
            Self::Modified => state
                .modified_lines
                .first()
                .map_or(true, |&first| state.pointer <= first),
            Self::Random => false,
        }
    }

    pub fn eof(self, state: &ReadingState) -> bool {
        match self {
            Self::Normal => state.pointer + 1 == state.lines.len(),
            Self::Modified => state
                .modified_lines
                .last()
                .map_or(true, |&last| state.pointer >= last),
            Self::Random => false,
        }
    }

    /// Start of the sequence. Advances the random history when it is empty.
    pub fn first(self, state: &ReadingState, random: &RandomHistory) -> usize {
        match self {
            Self::Normal => 0,
            Self::Modified => state.modified_lines.first().copied().unwrap_or(0),
            Self::Random => random.oldest(state.lines.len()),
        }
    }

    /// End of the sequence. Advances the random history when it is empty.
    pub fn last(self, state: &ReadingState, random: &RandomHistory) -> usize {
        match self {
            Self::Normal => state.last_index(),
            Self::Modified => state
                .modified_lines
                .last()
                .copied()
                .unwrap_or_else(|| state.last_index()),
            Self::Random => random.newest(state.lines.len()),
        }
    }

    /// One step forward. `None` only for `Normal` at the last line.
    pub fn next(self, state: &ReadingState, random: &RandomHistory) -> Option<usize> {
        match self {
            Self::Normal => (state.pointer + 1 < state.lines.len()).then(|| state.pointer + 1),
            Self::Modified => Some(
                state
                    .modified_lines
                    .iter()
                    .copied()
                    .find(|&line| line > state.pointer)
                    .unwrap_or(state.pointer),
            ),
            Self::Random => Some(random.advance(state.lines.len())),
        }
    }

    /// One step back. `None` only for `Normal` at the first line.
    pub fn previous(self, state: &ReadingState, random: &RandomHistory) -> Option<usize> {
        match self {
            Self::Normal => state.pointer.checked_sub(1),
            Self::Modified => Some(
                state
                    .modified_lines
                    .iter()
                    .copied()
                    .rev()
                    .find(|&line| line < state.pointer)
                    .unwrap_or(state.pointer),
            ),
            Self::Random => Some(random.retreat(state.lines.len())),
        }
    }
}

struct RandomCursor {
    entries: VecDeque<usize>,
    index: usize,
    rng: StdRng,
}

impl RandomCursor {
    fn pick(&mut self, line_count: usize) -> usize {
        self.rng.gen_range(0..line_count.max(1))
    }

    /// Step forward to the next entry that still fits in `line_count`
    /// lines, drawing a fresh one past the end. Entries left behind by a
    /// shorter text are stepped over, not replayed.
    fn advance(&mut self, line_count: usize, capacity: usize) -> usize {
        while self.index + 1 < self.entries.len() {
            self.index += 1;
            if self.entries[self.index] < line_count {
                return self.entries[self.index];
            }
        }
        let line = self.pick(line_count);
        self.entries.push_back(line);
        if self.entries.len() > capacity {
            self.entries.pop_front();
        }
        self.index = self.entries.len() - 1;
        line
    }

    fn retreat(&mut self, line_count: usize, capacity: usize) -> usize {
        while self.index > 0 && !self.entries.is_empty() {
            self.index -= 1;
            if self.entries[self.index] < line_count {
                return self.entries[self.index];
            }
        }
        let line = self.pick(line_count);
        self.entries.push_front(line);
        if self.entries.len() > capacity {
            self.entries.pop_back();
        }
        self.index = 0;
        line
    }
}

/// History of randomly chosen lines, with a cursor for replaying it.
///
/// Shared between command handling and reconciliation, so every
/// read-modify-write of `(entries, index)` happens under one short lock.
pub struct RandomHistory {
    inner: Mutex<RandomCursor>,
    capacity: usize,
}

impl RandomHistory {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: StdRng) -> Self {
        Self {
            inner: Mutex::new(RandomCursor {
                entries: VecDeque::new(),
                index: 0,
                rng,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Entry under the cursor, without moving it.
    #[cfg(test)]
    pub fn peek(&self) -> Option<usize> {
        let cursor = self.inner.lock().unwrap();
        cursor.entries.get(cursor.index).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Move forward through the history, drawing a fresh line past its end.
    pub fn advance(&self, line_count: usize) -> usize {
        self.inner.lock().unwrap().advance(line_count, self.capacity)
    }

    /// Move back through the history, drawing a fresh line before its start.
    pub fn retreat(&self, line_count: usize) -> usize {
        self.inner.lock().unwrap().retreat(line_count, self.capacity)
    }

    pub fn oldest(&self, line_count: usize) -> usize {
        let mut cursor = self.inner.lock().unwrap();
        match cursor.entries.iter().copied().find(|&line| line < line_count) {
            Some(line) => line,
            None => cursor.advance(line_count, self.capacity),
        }
    }

    pub fn newest(&self, line_count: usize) -> usize {
        let mut cursor = self.inner.lock().unwrap();
        match cursor.entries.iter().copied().rev().find(|&line| line < line_count) {
            Some(line) => line,
            None => cursor.advance(line_count, self.capacity),
        }
    }
}

impl Default for RandomHistory {
    fn default() -> Self {
        Self::new(DEFAULT_RANDOM_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(len: usize, pointer: usize, modified: &[usize]) -> ReadingState {
        let lines = (0..len).map(|i| format!("line {i}")).collect();
        ReadingState {
            modified_lines: modified.to_vec(),
            ..ReadingState::new("", lines).at(pointer)
        }
    }

    #[test]
    fn test_normal_boundaries() {
        let random = RandomHistory::with_seed(10, 1);
        let s = state(3, 0, &[]);
        assert!(SequenceMode::Normal.bof(&s));
        assert!(!SequenceMode::Normal.eof(&s));
        assert_eq!(SequenceMode::Normal.previous(&s, &random), None);
        assert_eq!(SequenceMode::Normal.next(&s, &random), Some(1));

        let s = state(3, 2, &[]);
        assert!(SequenceMode::Normal.eof(&s));
        assert_eq!(SequenceMode::Normal.next(&s, &random), None);
        assert_eq!(SequenceMode::Normal.last(&s, &random), 2);
        assert!(!SequenceMode::Normal.is_empty(&s));
    }

    #[test]
    fn test_modified_navigation() {
        let random = RandomHistory::with_seed(10, 1);
        let s = state(10, 4, &[1, 3, 6, 8]);
        let mode = SequenceMode::Modified;
        assert_eq!(mode.next(&s, &random), Some(6));
        assert_eq!(mode.previous(&s, &random), Some(3));
        assert_eq!(mode.first(&s, &random), 1);
        assert_eq!(mode.last(&s, &random), 8);
        assert!(!mode.bof(&s));
        assert!(!mode.eof(&s));

        let at_end = state(10, 8, &[1, 3, 6, 8]);
        assert_eq!(mode.next(&at_end, &random), Some(8));
        assert!(mode.eof(&at_end));
    }

    #[test]
    fn test_modified_empty_falls_back_to_normal() {
        let random = RandomHistory::with_seed(10, 1);
        let s = state(5, 2, &[]);
        let mode = SequenceMode::Modified;
        assert!(mode.is_empty(&s));
        assert!(mode.bof(&s));
        assert!(mode.eof(&s));
        assert_eq!(mode.first(&s, &random), 0);
        assert_eq!(mode.last(&s, &random), 4);
        assert_eq!(mode.next(&s, &random), Some(2));
        assert!(mode.messages().empty.is_some());
    }

    #[test]
    fn test_random_history_replays() {
        let random = RandomHistory::with_seed(100, 7);
        let a = random.advance(50);
        let b = random.advance(50);
        let c = random.advance(50);
        assert_eq!(random.len(), 3);
        assert_eq!(random.peek(), Some(c));

        assert_eq!(random.retreat(50), b);
        assert_eq!(random.retreat(50), a);
        assert_eq!(random.advance(50), b);
        assert_eq!(random.advance(50), c);
        assert_eq!(random.len(), 3);

        assert_eq!(random.oldest(50), a);
        assert_eq!(random.newest(50), c);
    }

    #[test]
    fn test_random_history_is_bounded() {
        let random = RandomHistory::with_seed(5, 3);
        for _ in 0..20 {
            let line = random.advance(8);
            assert!(line < 8);
        }
        assert_eq!(random.len(), 5);

        for _ in 0..20 {
            random.retreat(8);
        }
        assert_eq!(random.len(), 5);
    }

    #[test]
    fn test_random_history_skips_lines_past_the_end() {
        let random = RandomHistory::with_seed(100, 5);
        let drawn: Vec<usize> = (0..20).map(|_| random.advance(1000)).collect();
        assert!(drawn.iter().any(|&line| line >= 3));
        for _ in 0..5 {
            random.retreat(1000);
        }

        // The text shrank to three lines.
        for _ in 0..10 {
            assert!(random.advance(3) < 3);
        }
        for _ in 0..30 {
            assert!(random.retreat(3) < 3);
        }
        assert!(random.oldest(3) < 3);
        assert!(random.newest(3) < 3);
    }

    #[test]
    fn test_random_first_generates_when_empty() {
        let random = RandomHistory::with_seed(10, 11);
        let s = state(4, 0, &[]);
        let first = SequenceMode::Random.first(&s, &random);
        assert!(first < 4);
        assert_eq!(random.len(), 1);
        assert!(!SequenceMode::Random.bof(&s));
        assert!(!SequenceMode::Random.eof(&s));
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("normal".parse::<SequenceMode>(), Ok(SequenceMode::Normal));
        assert_eq!("modified".parse::<SequenceMode>(), Ok(SequenceMode::Modified));
        assert_eq!("random".parse::<SequenceMode>(), Ok(SequenceMode::Random));
        assert!("sideways".parse::<SequenceMode>().is_err());
    }
}
