//! Speech output through an external synthesizer process.
//!
//! Each call to [`Speaker::speak`] runs one utterance to completion or until
//! [`Speaker::cancel`] kills it. Cancelling bumps the speaker's epoch, so an
//! utterance requested under an older epoch is dropped even if it had not
//! started yet. The `Transcript` backend records utterances instead of
//! producing audio (dry runs and tests).

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::error::{Error, Result};

/// Outcome of a speak operation.
#[derive(Debug)]
pub struct SpeakResult {
    pub elapsed_ms: f64,
    pub cancelled: bool,
    pub text_spoken: String,
}

/// Shared record of everything a transcript backend has "said".
pub type Transcript = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
pub enum SpeechBackend {
    Espeak {
        program: String,
        voice: Option<String>,
        speed: u32,
        extra_args: Vec<String>,
    },
    Transcript {
        spoken: Transcript,
        /// Simulated duration of each utterance.
        delay: Duration,
    },
}

impl SpeechBackend {
    pub fn from_config(config: &SpeechConfig, voice: Option<String>) -> Self {
        if config.backend == "transcript" {
            return Self::transcript(Duration::from_millis(config.transcript_delay_ms));
        }
        if config.backend != "espeak" {
            warn!("Unknown speech backend '{}', using espeak", config.backend);
        }
        Self::Espeak {
            program: config.program.clone(),
            voice: voice.or_else(|| config.voice.clone()),
            speed: config.speed,
            extra_args: config.extra_args.clone(),
        }
    }

    pub fn transcript(delay: Duration) -> Self {
        Self::Transcript {
            spoken: Arc::new(Mutex::new(Vec::new())),
            delay,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Espeak { .. } => "espeak",
            Self::Transcript { .. } => "transcript",
        }
    }
}

pub struct Speaker {
    backend: SpeechBackend,
    epoch: AtomicU64,
    cancel_notify: Notify,
    speaking: AtomicBool,
    speak_lock: AsyncMutex<()>,
}

impl Speaker {
    pub fn new(backend: SpeechBackend) -> Self {
        info!("Speech initialized (backend: {})", backend.name());
        Self {
            backend,
            epoch: AtomicU64::new(0),
            cancel_notify: Notify::new(),
            speaking: AtomicBool::new(false),
            speak_lock: AsyncMutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Utterances recorded so far by a transcript backend.
    pub fn transcript(&self) -> Option<Transcript> {
        match &self.backend {
            SpeechBackend::Transcript { spoken, .. } => Some(Arc::clone(spoken)),
            SpeechBackend::Espeak { .. } => None,
        }
    }

    /// Incremented by every [`Speaker::cancel`].
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Speak `text`, returning early if cancelled.
    #[cfg(test)]
    pub async fn speak(&self, text: &str) -> Result<SpeakResult> {
        self.speak_at(text, self.epoch()).await
    }

    /// Speak `text` unless the speaker was cancelled after `epoch`.
    pub async fn speak_at(&self, text: &str, epoch: u64) -> Result<SpeakResult> {
        let _guard = self.speak_lock.lock().await;
        self.speaking.store(true, Ordering::SeqCst);

        let started = Instant::now();
        let result = self.speak_inner(text, epoch).await;
        self.speaking.store(false, Ordering::SeqCst);

        let cancelled = result?;
        Ok(SpeakResult {
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            cancelled,
            text_spoken: text.to_string(),
        })
    }

    /// Speak each text in order, stopping at the first cancellation.
    /// Returns true if the sequence was cut short.
    pub async fn speak_all(&self, texts: &[String]) -> Result<bool> {
        let epoch = self.epoch();
        for text in texts {
            if self.speak_at(text, epoch).await?.cancelled {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn speak_inner(&self, text: &str, epoch: u64) -> Result<bool> {
        // Register interest before checking the epoch so a cancel issued
        // between the two cannot be missed.
        let notified = self.cancel_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.epoch() != epoch {
            return Ok(true);
        }

        match &self.backend {
            SpeechBackend::Transcript { spoken, delay } => {
                debug!("Transcript: {text}");
                spoken.lock().unwrap().push(text.to_string());
                tokio::select! {
                    _ = tokio::time::sleep(*delay) => Ok(false),
                    _ = &mut notified => Ok(true),
                }
            }
            SpeechBackend::Espeak {
                program,
                voice,
                speed,
                extra_args,
            } => {
                let mut command = Command::new(program);
                if let Some(voice) = voice {
                    command.arg("-v").arg(voice);
                }
                command
                    .arg("-s")
                    .arg(speed.to_string())
                    .args(extra_args)
                    .arg("--stdin")
                    .stdin(Stdio::piped())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true);

                let mut child = command
                    .spawn()
                    .map_err(|e| Error::Speech(format!("failed to start {program}: {e}")))?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(text.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                }

                tokio::select! {
                    status = child.wait() => {
                        let status = status?;
                        if status.success() {
                            Ok(false)
                        } else {
                            Err(Error::Speech(format!("{program} exited with {status}")))
                        }
                    }
                    _ = &mut notified => {
                        if let Err(e) = child.kill().await {
                            warn!("Failed to stop {program}: {e}");
                        }
                        Ok(true)
                    }
                }
            }
        }
    }

    /// Cancel current speech immediately.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
        if self.speaking.swap(false, Ordering::SeqCst) {
            debug!("Speech cancelled");
        }
    }

    /// Cancel and wait for the in-progress utterance to wind down.
    pub async fn cancel_and_wait(&self) {
        self.cancel();
        let _guard = self.speak_lock.lock().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transcript_records_utterances() {
        let speaker = Speaker::new(SpeechBackend::transcript(Duration::ZERO));
        let result = speaker.speak("hello").await.unwrap();
        assert!(!result.cancelled);
        assert_eq!(result.text_spoken, "hello");
        speaker
            .speak_all(&["one".to_string(), "two".to_string()])
            .await
            .unwrap();
        let transcript = speaker.transcript().unwrap();
        assert_eq!(*transcript.lock().unwrap(), vec!["hello", "one", "two"]);
        assert!(!speaker.is_speaking());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_speech() {
        let speaker = Arc::new(Speaker::new(SpeechBackend::transcript(Duration::from_secs(30))));
        let task = {
            let speaker = Arc::clone(&speaker);
            tokio::spawn(async move { speaker.speak("a long line").await })
        };
        while !speaker.is_speaking() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        speaker.cancel_and_wait().await;
        let result = task.await.unwrap().unwrap();
        assert!(result.cancelled);
    }

    #[tokio::test]
    async fn test_result_reports_time_spent_speaking() {
        let speaker = Speaker::new(SpeechBackend::transcript(Duration::from_millis(60)));
        let result = speaker.speak("timed").await.unwrap();
        assert!(result.elapsed_ms >= 60.0);
        assert_eq!(result.text_spoken, "timed");
    }

    #[tokio::test]
    async fn test_cancel_before_speak_does_not_stick() {
        let speaker = Speaker::new(SpeechBackend::transcript(Duration::ZERO));
        speaker.cancel();
        let result = speaker.speak("fresh").await.unwrap();
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_stale_epoch_is_dropped() {
        let speaker = Speaker::new(SpeechBackend::transcript(Duration::ZERO));
        let epoch = speaker.epoch();
        speaker.cancel();
        assert!(speaker.speak_at("stale", epoch).await.unwrap().cancelled);
        assert!(!speaker.speak_at("current", speaker.epoch()).await.unwrap().cancelled);
        assert_eq!(*speaker.transcript().unwrap().lock().unwrap(), vec!["current"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let speaker = Speaker::new(SpeechBackend::Espeak {
            program: "/nonexistent/speech-program".into(),
            voice: None,
            speed: 160,
            extra_args: Vec::new(),
        });
        assert!(matches!(speaker.speak("x").await, Err(Error::Speech(_))));
    }
}
