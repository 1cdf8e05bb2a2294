//! Persistence manager: backend selection, fallback and the document workflows
//!
//! The manager probes its backends once, at construction. The structured
//! backend is preferred when both are usable. Saves and loads walk the
//! available backends in preference order; mutations are serialized so
//! overlapping callers are applied one at a time in arrival order.

use memorybank_core::{
    BackendKind, MemoryBankError, MemoryBankResult, PersistedState, StorageBackend,
    StorageConfig, StorageError, StorageInfo,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::documents;
use crate::key_value::KeyValueBackend;
use crate::structured::StructuredBackend;

/// Outcome of the construction-time probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    /// At least one backend is usable
    Ready { preferred: BackendKind },
    /// No backend is usable; every operation fails
    Degraded,
}

/// Sole entry point to persisted state
pub struct PersistenceManager {
    /// Available backends, preferred first
    backends: Vec<Arc<dyn StorageBackend>>,
    structured_available: bool,
    key_value_available: bool,
    version: String,
    state: ManagerState,
    write_lock: Mutex<()>,
}

impl PersistenceManager {
    /// Build both on-disk backends from configuration and probe them
    pub fn open(config: &StorageConfig) -> Self {
        Self::with_backends(
            Arc::new(StructuredBackend::from_config(config)),
            Arc::new(KeyValueBackend::from_config(config)),
            &config.schema_version,
        )
    }

    /// Probe the given backends and build a manager over them
    pub fn with_backends(
        structured: Arc<dyn StorageBackend>,
        key_value: Arc<dyn StorageBackend>,
        version: &str,
    ) -> Self {
        let structured_available = structured.is_available();
        let key_value_available = key_value.is_available();

        let backends: Vec<Arc<dyn StorageBackend>> = [
            (structured, structured_available),
            (key_value, key_value_available),
        ]
        .into_iter()
        .filter(|(_, available)| *available)
        .map(|(backend, _)| backend)
        .collect();

        let state = match backends.first() {
            Some(backend) => {
                info!(
                    "Memory bank ready, preferred backend: {} ({} available)",
                    backend.kind(),
                    backends.len()
                );
                ManagerState::Ready {
                    preferred: backend.kind(),
                }
            }
            None => {
                error!("No storage backend available, memory bank is degraded");
                ManagerState::Degraded
            }
        };

        Self {
            backends,
            structured_available,
            key_value_available,
            version: version.to_string(),
            state,
            write_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn schema_version(&self) -> &str {
        &self.version
    }

    /// Preferred backend, if any
    pub fn preferred(&self) -> Option<BackendKind> {
        match self.state {
            ManagerState::Ready { preferred } => Some(preferred),
            ManagerState::Degraded => None,
        }
    }

    /// Persist the state on the first backend that accepts it
    pub async fn save(&self, state: &PersistedState) -> MemoryBankResult<()> {
        let _guard = self.write_lock.lock().await;
        self.save_unlocked(state).await
    }

    async fn save_unlocked(&self, state: &PersistedState) -> MemoryBankResult<()> {
        self.ensure_ready()?;

        let mut failures = Vec::new();
        for (index, backend) in self.backends.iter().enumerate() {
            match backend.save(state).await {
                Ok(()) => {
                    if failures.is_empty() {
                        debug!("Saved state to {} backend", backend.kind());
                    } else {
                        warn!("Saved state to fallback {} backend", backend.kind());
                        self.evict_stale(&self.backends[..index]).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!("Save to {} backend failed: {}", backend.kind(), e);
                    failures.push(e);
                }
            }
        }

        error!("Save failed on every available backend");
        Err(Self::aggregate(failures))
    }

    /// Clear backends ahead of a fallback save so their older envelopes
    /// cannot shadow the new one on load
    async fn evict_stale(&self, skipped: &[Arc<dyn StorageBackend>]) {
        for backend in skipped {
            match backend.clear().await {
                Ok(()) => debug!("Cleared stale state from {} backend", backend.kind()),
                Err(e) => warn!("Clearing stale {} backend failed: {}", backend.kind(), e),
            }
        }
    }

    /// Load the state from the first backend that has it.
    ///
    /// `Ok(None)` means nothing usable is stored, which is expected on
    /// first run.
    pub async fn load(&self) -> MemoryBankResult<Option<PersistedState>> {
        self.ensure_ready()?;

        for backend in &self.backends {
            match backend.load().await {
                Ok(Some(state)) => {
                    debug!("Loaded state from {} backend", backend.kind());
                    return Ok(Some(state));
                }
                Ok(None) => debug!("Nothing stored in {} backend", backend.kind()),
                Err(e) => warn!("Load from {} backend failed: {}", backend.kind(), e),
            }
        }

        Ok(None)
    }

    /// Clear every available backend. Individual failures are only logged.
    pub async fn clear(&self) -> MemoryBankResult<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_ready()?;

        for backend in &self.backends {
            if let Err(e) = backend.clear().await {
                warn!("Clearing {} backend failed: {}", backend.kind(), e);
            }
        }
        info!("Memory bank cleared");
        Ok(())
    }

    /// Export the stored state as a pretty-printed document
    pub async fn export(&self) -> MemoryBankResult<String> {
        let state = self.load().await?.ok_or(MemoryBankError::NoData)?;
        documents::export_document(state, &self.version)
    }

    /// Validate and persist an exported document, returning its state
    pub async fn import(&self, document: &str) -> MemoryBankResult<PersistedState> {
        let state = documents::parse_export(document, &self.version)?;

        let _guard = self.write_lock.lock().await;
        self.save_unlocked(&state).await?;
        info!("Imported {} entities", state.entity_count());
        Ok(state)
    }

    /// Snapshot the stored state with aggregate metadata
    pub async fn create_backup(&self) -> MemoryBankResult<String> {
        let state = self.load().await?.ok_or(MemoryBankError::NoData)?;
        documents::backup_document(state, &self.version)
    }

    /// Validate and persist a backup document, returning its state
    pub async fn restore_backup(&self, document: &str) -> MemoryBankResult<PersistedState> {
        let (state, metadata) = documents::parse_backup(document, &self.version)?;

        let _guard = self.write_lock.lock().await;
        self.save_unlocked(&state).await?;
        info!(
            "Restored backup with {} orders ({:.2} revenue)",
            metadata.orders_count, metadata.total_revenue
        );
        Ok(state)
    }

    /// Report backend availability and the size of the stored state
    pub async fn storage_info(&self) -> StorageInfo {
        let approximate_size_bytes = match self.load().await {
            Ok(Some(state)) => codec::encode(&state).map(|s| s.len()).unwrap_or(0),
            _ => 0,
        };

        StorageInfo {
            key_value_available: self.key_value_available,
            structured_available: self.structured_available,
            preferred: self.preferred(),
            approximate_size_bytes,
        }
    }

    fn ensure_ready(&self) -> MemoryBankResult<()> {
        match self.state {
            ManagerState::Ready { .. } => Ok(()),
            ManagerState::Degraded => Err(MemoryBankError::BackendsExhausted(vec![
                StorageError::unavailable(BackendKind::Structured, "not available at startup"),
                StorageError::unavailable(BackendKind::KeyValue, "not available at startup"),
            ])),
        }
    }

    fn aggregate(mut failures: Vec<StorageError>) -> MemoryBankError {
        if failures.len() == 1 {
            MemoryBankError::Storage(failures.remove(0))
        } else {
            MemoryBankError::BackendsExhausted(failures)
        }
    }
}
