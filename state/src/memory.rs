//! In-memory backend for tests and volatile memory banks

use async_trait::async_trait;
use dashmap::DashMap;
use memorybank_core::{
    BackendKind, MemoryBankResult, PersistedState, StorageBackend, StorageError,
    StorageErrorKind, SCHEMA_VERSION, STORAGE_KEY,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::envelope::{self, Opened};

/// In-memory backend with switchable availability and failure injection.
///
/// It impersonates one of the real variants so that the manager's
/// preference order can be exercised without touching disk.
pub struct MemoryBackend {
    kind: BackendKind,
    key: String,
    version: String,
    data: DashMap<String, String>,
    available: AtomicBool,
    save_failure: RwLock<Option<StorageErrorKind>>,
    load_failure: RwLock<Option<StorageErrorKind>>,
    clear_failure: RwLock<Option<StorageErrorKind>>,
    saves: AtomicUsize,
    loads: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self::with_version(kind, SCHEMA_VERSION)
    }

    pub fn with_version(kind: BackendKind, version: &str) -> Self {
        Self {
            kind,
            key: STORAGE_KEY.to_string(),
            version: version.to_string(),
            data: DashMap::new(),
            available: AtomicBool::new(true),
            save_failure: RwLock::new(None),
            load_failure: RwLock::new(None),
            clear_failure: RwLock::new(None),
            saves: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every subsequent save fail with `kind`, or succeed again with `None`
    pub fn fail_saves(&self, kind: Option<StorageErrorKind>) {
        *self.save_failure.write() = kind;
    }

    /// Make every subsequent load fail with `kind`, or succeed again with `None`
    pub fn fail_loads(&self, kind: Option<StorageErrorKind>) {
        *self.load_failure.write() = kind;
    }

    /// Make every subsequent clear fail with `kind`, or succeed again with `None`
    pub fn fail_clears(&self, kind: Option<StorageErrorKind>) {
        *self.clear_failure.write() = kind;
    }

    /// Store raw envelope text under the key, bypassing sealing
    pub fn put_raw(&self, raw: impl Into<String>) {
        self.data.insert(self.key.clone(), raw.into());
    }

    /// Raw envelope text stored under the key
    pub fn raw(&self) -> Option<String> {
        self.data.get(&self.key).map(|v| v.value().clone())
    }

    /// Number of save calls that reached this backend
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of load calls that reached this backend
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let failure = *self.save_failure.read();
        if let Some(kind) = failure {
            return Err(StorageError::new(kind, self.kind, "injected save failure"));
        }

        let raw = envelope::seal(state, &self.version)
            .map_err(|e| StorageError::unknown(self.kind, e.to_string()))?;
        debug!("Memory backend ({}) stored {} bytes", self.kind, raw.len());
        self.data.insert(self.key.clone(), raw);
        Ok(())
    }

    async fn load(&self) -> MemoryBankResult<Option<PersistedState>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failure = *self.load_failure.read();
        if let Some(kind) = failure {
            return Err(StorageError::new(kind, self.kind, "injected load failure").into());
        }

        let Some(raw) = self.raw() else {
            return Ok(None);
        };

        match envelope::open(&raw, &self.version)? {
            Opened::Current(state) => Ok(Some(state)),
            Opened::Stale { found } => {
                debug!("Memory backend ({}) dropped envelope version {}", self.kind, found);
                self.data.remove(&self.key);
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let failure = *self.clear_failure.read();
        if let Some(kind) = failure {
            return Err(StorageError::new(kind, self.kind, "injected clear failure"));
        }

        self.data.remove(&self.key);
        Ok(())
    }
}

/// Thread-safe memory backend wrapper
pub type SharedMemoryBackend = Arc<MemoryBackend>;

/// Create a shared memory backend impersonating `kind`
pub fn create_memory_backend(kind: BackendKind) -> SharedMemoryBackend {
    Arc::new(MemoryBackend::new(kind))
}
