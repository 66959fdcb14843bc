use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gridpad_storage::{BlobStore, FileRecordStore};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::{EditSession, SaveOutcome, SessionError};

#[derive(Clone, Copy, Debug)]
pub struct AutoSaveConfig {
    /// Inactivity window: every dirty-marking edit rearms this timer.
    pub idle_delay: Duration,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_secs(30),
        }
    }
}

struct Shared {
    shutdown: AtomicBool,
    save_count: AtomicUsize,
}

/// Debounced autosave for one session.
///
/// Edits rearm an inactivity timer — timers never stack, a fresh edit simply
/// restarts the wait. When the timer fires, the save goes through the
/// session's own single-flight gate, so a manual save already in progress
/// causes the autosave trigger to be dropped (and vice versa).
pub struct AutoSaveManager<B, R> {
    session: EditSession<B, R>,
    rearm: Arc<Notify>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<B, R> AutoSaveManager<B, R>
where
    B: BlobStore + 'static,
    R: FileRecordStore + 'static,
{
    pub fn spawn(session: EditSession<B, R>, config: AutoSaveConfig) -> Self {
        let rearm = Arc::new(Notify::new());
        session.attach_autosave(rearm.clone());

        let shared = Arc::new(Shared {
            shutdown: AtomicBool::new(false),
            save_count: AtomicUsize::new(0),
        });
        let task = tokio::spawn(run_loop(
            session.clone(),
            rearm.clone(),
            shared.clone(),
            config,
        ));

        Self {
            session,
            rearm,
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    /// Saves completed by the debounce loop (not manual saves).
    pub fn save_count(&self) -> usize {
        self.shared.save_count.load(Ordering::SeqCst)
    }

    /// Save now, bypassing the inactivity window but not the single-flight
    /// gate.
    pub async fn flush(&self) -> Result<SaveOutcome, SessionError> {
        self.session.save(false).await
    }

    pub async fn shutdown(&self) -> Result<(), tokio::task::JoinError> {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.rearm.notify_one();
        let task = self.task.lock().expect("autosave mutex poisoned").take();
        match task {
            Some(task) => task.await,
            None => Ok(()),
        }
    }
}

impl<B, R> Drop for AutoSaveManager<B, R> {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().expect("autosave mutex poisoned").take() {
            task.abort();
        }
    }
}

async fn run_loop<B, R>(
    session: EditSession<B, R>,
    rearm: Arc<Notify>,
    shared: Arc<Shared>,
    config: AutoSaveConfig,
) where
    B: BlobStore,
    R: FileRecordStore,
{
    loop {
        // Wait for the first dirty-marking edit.
        rearm.notified().await;
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        // Debounce: each further edit restarts the inactivity window.
        loop {
            tokio::select! {
                _ = rearm.notified() => {
                    if shared.shutdown.load(Ordering::SeqCst) {
                        return;
                    }
                }
                _ = tokio::time::sleep(config.idle_delay) => break,
            }
        }
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        match session.save(false).await {
            Ok(SaveOutcome::Saved) => {
                shared.save_count.fetch_add(1, Ordering::SeqCst);
            }
            Ok(SaveOutcome::AlreadyInFlight) | Ok(SaveOutcome::NotDirty) => {}
            Err(e) => {
                // The session is back in an editable state; the next edit
                // rearms us for another attempt.
                log::warn!("autosave failed: {e}");
            }
        }
    }
}
