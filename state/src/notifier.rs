//! Detection of writes made by other processes sharing the key-value store
//!
//! Another process running against the same data directory may rewrite the
//! key-value entry at any time. The notifier polls the entry's fingerprint
//! and broadcasts an [`ExternalChange`] whenever it changes to something
//! this process did not write itself. File polling observes our own writes
//! too, so they are filtered out against the backend's last-write
//! fingerprint.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::key_value::{Fingerprint, KeyValueBackend};

const CHANNEL_CAPACITY: usize = 16;

/// Origin of an external change
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Storage,
}

/// Signal that the persisted data changed outside this process.
/// Carries no data; subscribers reload through the manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalChange {
    pub source: ChangeSource,
}

impl ExternalChange {
    pub fn storage() -> Self {
        Self {
            source: ChangeSource::Storage,
        }
    }
}

/// Background watcher over a key-value backend
pub struct ChangeNotifier {
    sender: broadcast::Sender<ExternalChange>,
    task: JoinHandle<()>,
}

impl ChangeNotifier {
    /// Start watching. Must be called from within a tokio runtime.
    pub fn spawn(backend: Arc<KeyValueBackend>, interval: Duration) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let observed = backend.current_fingerprint().unwrap_or_else(|e| {
            warn!("Change notifier could not read initial entry: {}", e);
            Fingerprint::ABSENT
        });

        info!("Watching {} for external changes", backend.entry_path().display());
        let task = tokio::spawn(watch(backend, interval, observed, sender.clone()));
        Self { sender, task }
    }

    /// Receive every external change signalled from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ExternalChange> {
        self.sender.subscribe()
    }

    /// Stop watching
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch(
    backend: Arc<KeyValueBackend>,
    interval: Duration,
    mut observed: Fingerprint,
    sender: broadcast::Sender<ExternalChange>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let current = match backend.current_fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                debug!("Change notifier poll failed: {}", e);
                continue;
            }
        };
        if current == observed {
            continue;
        }
        observed = current;

        if backend.last_own_write() == Some(current) {
            debug!("Ignoring change made by this process");
            continue;
        }

        info!("Persisted data changed externally");
        // No subscribers is not an error
        let _ = sender.send(ExternalChange::storage());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memorybank_core::{PersistedState, Record, StorageBackend, SCHEMA_VERSION, STORAGE_KEY};
    use tempfile::TempDir;
    use tokio::time::timeout;

    const POLL: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(2);

    fn context(tmp: &TempDir) -> Arc<KeyValueBackend> {
        Arc::new(KeyValueBackend::new(
            tmp.path().join("kv"),
            STORAGE_KEY,
            SCHEMA_VERSION,
            1024 * 1024,
        ))
    }

    #[tokio::test]
    async fn test_foreign_write_is_signalled() {
        let tmp = TempDir::new().unwrap();
        let local = context(&tmp);
        let foreign = context(&tmp);

        let notifier = ChangeNotifier::spawn(local, POLL);
        let mut changes = notifier.subscribe();

        foreign.save(&PersistedState::empty()).await.unwrap();

        let change = timeout(WAIT, changes.recv()).await.unwrap().unwrap();
        assert_eq!(change, ExternalChange::storage());
        assert_eq!(
            serde_json::to_string(&change).unwrap(),
            r#"{"source":"storage"}"#
        );
    }

    #[tokio::test]
    async fn test_own_write_is_not_signalled() {
        let tmp = TempDir::new().unwrap();
        let local = context(&tmp);
        let foreign = context(&tmp);

        let notifier = ChangeNotifier::spawn(local.clone(), POLL);
        let mut changes = notifier.subscribe();

        local.save(&PersistedState::empty()).await.unwrap();
        assert!(timeout(POLL * 10, changes.recv()).await.is_err());

        let mut state = PersistedState::empty();
        state.reviews.push(Record::new().with("id", "r1").with("rating", 5));
        foreign.save(&state).await.unwrap();
        assert!(timeout(WAIT, changes.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_clear_is_signalled() {
        let tmp = TempDir::new().unwrap();
        let local = context(&tmp);
        let foreign = context(&tmp);
        local.save(&PersistedState::empty()).await.unwrap();

        let notifier = ChangeNotifier::spawn(local, POLL);
        let mut changes = notifier.subscribe();

        foreign.clear().await.unwrap();
        assert!(timeout(WAIT, changes.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop() {
        let tmp = TempDir::new().unwrap();
        let notifier = ChangeNotifier::spawn(context(&tmp), POLL);
        assert!(notifier.is_running());

        notifier.stop();
        tokio::time::sleep(POLL * 5).await;
        assert!(!notifier.is_running());
    }
}
