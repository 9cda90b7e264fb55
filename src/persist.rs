//! Background database saves.
//!
//! The state is rendered to text while the state mutex is held, then the
//! lock is released and the file is written on the blocking pool. Saves
//! happen on a fixed interval, on request, and once more at shutdown.

use crate::db::{self, Database, DbError};
use crate::state::{Notifier, ServiceState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// State shared between the event loop and the save task.
pub type SharedState = Arc<Mutex<ServiceState>>;

enum SaveCommand {
    Save,
    Shutdown(oneshot::Sender<()>),
}

/// Handle for talking to a running save task.
#[derive(Clone)]
pub struct SaveHandle {
    tx: mpsc::Sender<SaveCommand>,
}

impl SaveHandle {
    /// Ask for a save soon. Returns `false` if one is already queued or the
    /// task is gone.
    pub fn request_save(&self) -> bool {
        self.tx.try_send(SaveCommand::Save).is_ok()
    }

    /// Run a final save and stop the task.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SaveCommand::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Writes the shared state to the database.
pub struct Persister {
    db: Arc<Database>,
    state: SharedState,
    notifier: Arc<dyn Notifier>,
}

impl Persister {
    pub fn new(db: Arc<Database>, state: SharedState, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            state,
            notifier,
        }
    }

    /// Save once. Returns the number of bytes written.
    pub async fn save_now(&self) -> Result<usize, DbError> {
        let text = {
            let state = self.state.lock();
            db::render(&state)?
        };
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.write(&text).map(|()| text.len()))
            .await
            .map_err(|e| DbError::Io(std::io::Error::other(e)))?
    }

    async fn save_and_report(&self) {
        match self.save_now().await {
            Ok(bytes) => info!(path = %self.db.path().display(), bytes, "Database saved"),
            Err(e) => {
                error!(error = %e, code = e.error_code(), "Database save failed");
                self.notifier
                    .wallops(&format!("Unable to write database {}: {e}", self.db.path().display()));
            }
        }
    }

    /// Start the save loop.
    pub fn spawn(self, period: Duration) -> (SaveHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately; nothing to save yet
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.save_and_report().await,
                    cmd = rx.recv() => match cmd {
                        Some(SaveCommand::Save) => {
                            debug!("Save requested");
                            self.save_and_report().await;
                        }
                        Some(SaveCommand::Shutdown(done)) => {
                            self.save_and_report().await;
                            let _ = done.send(());
                            break;
                        }
                        None => {
                            self.save_and_report().await;
                            break;
                        }
                    },
                }
            }
        });
        (SaveHandle { tx }, task)
    }
}
