//! Modification-time watching for the input file and any extra files.
//!
//! A notify `PollWatcher` compares modification times on an interval and on
//! demand. Every change is forwarded over a tokio channel; the session
//! reloads the input text whichever monitored file changed.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use notify::event::EventKind;
use notify::{PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Events sent from the monitor to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Changed(PathBuf),
}

pub struct FileMonitor {
    /// Holds the polling thread; dropping it stops the watch.
    watcher: PollWatcher,
}

fn forward(tx: &mpsc::Sender<MonitorEvent>, res: notify::Result<notify::Event>) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!("Error while trying to get modification times: {e}");
            return;
        }
    };
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            for path in event.paths {
                info!("Modification time changed: {} ({}).", path.display(), Local::now().format("%X"));
                match tx.try_send(MonitorEvent::Changed(path)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(MonitorEvent::Changed(path))) => {
                        warn!("Reload queue full, dropping change of {}", path.display());
                    }
                    Err(TrySendError::Closed(_)) => debug!("Monitor channel closed"),
                }
            }
        }
        EventKind::Remove(_) => {
            for path in event.paths {
                warn!("{} is not a file nor a directory. Its modification time cannot be checked.", path.display());
            }
        }
        _ => {}
    }
}

impl FileMonitor {
    /// Start watching every file. A file that does not exist at startup
    /// is an error.
    pub fn new(files: Vec<PathBuf>, interval: Duration, tx: mpsc::Sender<MonitorEvent>) -> Result<Self> {
        for file in &files {
            std::fs::metadata(file).map_err(|source| Error::Load {
                path: file.clone(),
                source,
            })?;
        }

        let config = notify::Config::default().with_poll_interval(interval.max(Duration::from_millis(10)));
        let mut watcher = PollWatcher::new(
            move |res: notify::Result<notify::Event>| forward(&tx, res),
            config,
        )?;
        for file in &files {
            watcher.watch(file, RecursiveMode::NonRecursive)?;
        }
        info!("Monitoring {} file(s) every {:?}", files.len(), interval);
        Ok(Self { watcher })
    }

    /// Compare modification times now instead of waiting for the interval.
    pub fn check_now(&self) {
        info!("Checking modification times of monitored files/directories.");
        if let Err(e) = self.watcher.poll() {
            error!("Could not check modification times: {e}");
        }
    }

    /// Serve `check` requests until `check_rx` closes, then stop watching.
    pub async fn run(self, mut check_rx: mpsc::Receiver<()>) {
        while check_rx.recv().await.is_some() {
            self.check_now();
        }
        debug!("Check channel closed, monitor stopping");
    }
}
