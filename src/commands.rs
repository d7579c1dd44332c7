//! Interactive commands, read one per line from stdin.

use std::fmt;
use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start, pause or resume
    Toggle,
    Stop,
    Restart,
    First,
    Last,
    Next,
    Previous,
    /// 1-based line number
    Go(usize),
    Random,
    NextChange,
    PrevChange,
    /// Clear the end-of-line flag so the current line is read again
    ResetPointer,
    ShowLine,
    CheckFiles,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words.next().unwrap_or("");
        let command = match verb {
            "" | "t" | "toggle" => Self::Toggle,
            "s" | "stop" => Self::Stop,
            "r" | "restart" => Self::Restart,
            "f" | "first" => Self::First,
            "l" | "last" => Self::Last,
            "n" | "next" => Self::Next,
            "p" | "previous" => Self::Previous,
            "g" | "go" | "go-line" => {
                let line = words
                    .next()
                    .ok_or_else(|| "go needs a line number".to_string())?;
                match line.parse::<usize>() {
                    Ok(n) if n > 0 => Self::Go(n),
                    _ => return Err(format!("invalid line number: {line}")),
                }
            }
            "?" | "random" => Self::Random,
            "nc" | "next-change" => Self::NextChange,
            "pc" | "prev-change" => Self::PrevChange,
            "x" | "reset" => Self::ResetPointer,
            "." | "show" | "show-line" => Self::ShowLine,
            "c" | "check" | "check-files" => Self::CheckFiles,
            "q" | "quit" => Self::Quit,
            other => return Err(format!("unknown command: {other}")),
        };
        if let Some(extra) = words.next() {
            return Err(format!("unexpected argument: {extra}"));
        }
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toggle => write!(f, "toggle"),
            Self::Stop => write!(f, "stop"),
            Self::Restart => write!(f, "restart"),
            Self::First => write!(f, "first"),
            Self::Last => write!(f, "last"),
            Self::Next => write!(f, "next"),
            Self::Previous => write!(f, "previous"),
            Self::Go(n) => write!(f, "go {n}"),
            Self::Random => write!(f, "random"),
            Self::NextChange => write!(f, "next-change"),
            Self::PrevChange => write!(f, "prev-change"),
            Self::ResetPointer => write!(f, "reset"),
            Self::ShowLine => write!(f, "show-line"),
            Self::CheckFiles => write!(f, "check-files"),
            Self::Quit => write!(f, "quit"),
        }
    }
}

/// Parse lines from `reader` and forward commands until EOF or until the
/// receiver goes away. Unparseable lines are logged and skipped.
pub async fn forward_commands<R>(reader: R, tx: mpsc::Sender<Command>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Command input closed");
                return;
            }
            Err(e) => {
                warn!("Failed to read command: {e}");
                return;
            }
        };
        match line.parse::<Command>() {
            Ok(command) => {
                if tx.send(command).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!("{e}"),
        }
    }
}

/// Read commands from the process's stdin.
pub async fn read_stdin(tx: mpsc::Sender<Command>) {
    forward_commands(tokio::io::BufReader::new(tokio::io::stdin()), tx).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("".parse::<Command>(), Ok(Command::Toggle));
        assert_eq!("  n ".parse::<Command>(), Ok(Command::Next));
        assert_eq!("go 12".parse::<Command>(), Ok(Command::Go(12)));
        assert_eq!("next-change".parse::<Command>(), Ok(Command::NextChange));
        assert_eq!("pc".parse::<Command>(), Ok(Command::PrevChange));
        assert!("go".parse::<Command>().is_err());
        assert!("go 0".parse::<Command>().is_err());
        assert!("go x".parse::<Command>().is_err());
        assert!("stop now".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for command in [Command::Go(3), Command::Random, Command::CheckFiles, Command::ResetPointer] {
            assert_eq!(command.to_string().parse::<Command>(), Ok(command));
        }
    }

    #[tokio::test]
    async fn test_forward_skips_bad_lines() {
        let input: &[u8] = b"next\nbogus\ng 4\nq\n";
        let (tx, mut rx) = mpsc::channel(8);
        forward_commands(input, tx).await;
        let mut received = Vec::new();
        while let Some(command) = rx.recv().await {
            received.push(command);
        }
        assert_eq!(received, vec![Command::Next, Command::Go(4), Command::Quit]);
    }
}
