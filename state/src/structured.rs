//! Structured backend using an embedded sled database
//!
//! The database is opened lazily: the first operation opens it on the
//! blocking pool and creates the named tree if absent. Concurrent callers
//! wait behind that single pending initialization.

use async_trait::async_trait;
use memorybank_core::{
    BackendKind, MemoryBankError, MemoryBankResult, PersistedState, StorageBackend, StorageConfig,
    StorageError,
};
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, IVec, Tree};
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::envelope::{self, Opened};
use crate::key_value::writable_dir;

/// Name of the tree holding the envelope
const COLLECTION: &str = "memory_bank";

struct Connection {
    db: Db,
    tree: Tree,
}

/// Transactional embedded-database store, the preferred backend variant
pub struct StructuredBackend {
    path: PathBuf,
    key: String,
    version: String,
    capacity_bytes: u64,
    enabled: bool,
    connection: OnceCell<Connection>,
}

impl StructuredBackend {
    pub fn new(path: impl Into<PathBuf>, key: &str, version: &str, capacity_bytes: u64) -> Self {
        Self {
            path: path.into(),
            key: key.to_string(),
            version: version.to_string(),
            capacity_bytes,
            enabled: true,
            connection: OnceCell::new(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        let mut backend = Self::new(
            config.structured_path(),
            &config.storage_key,
            &config.schema_version,
            config.structured.capacity_bytes,
        );
        backend.enabled = config.structured.enabled;
        backend
    }

    /// Whether the database has been opened
    pub fn is_initialized(&self) -> bool {
        self.connection.initialized()
    }

    /// Open the database and create the collection.
    ///
    /// Callers never need this: every operation initializes on demand.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<&Connection, StorageError> {
        if !self.enabled {
            return Err(StorageError::unavailable(
                BackendKind::Structured,
                "backend disabled by configuration",
            ));
        }

        self.connection
            .get_or_try_init(|| async {
                let path = self.path.clone();
                info!("Opening structured store at {}", path.display());
                let opened = tokio::task::spawn_blocking(move || -> sled::Result<Connection> {
                    let db = sled::open(&path)?;
                    let tree = db.open_tree(COLLECTION)?;
                    Ok(Connection { db, tree })
                })
                .await
                .map_err(|e| StorageError::unknown(BackendKind::Structured, e.to_string()))?;
                opened.map_err(|e| self.logged(classify(&e)))
            })
            .await
    }

    async fn flush(&self, connection: &Connection) -> Result<(), StorageError> {
        connection
            .db
            .flush_async()
            .await
            .map(|_| ())
            .map_err(|e| self.logged(classify(&e)))
    }

    async fn remove_envelope(&self, connection: &Connection) -> Result<(), StorageError> {
        let key = self.key.as_bytes();
        let result: TransactionResult<(), ()> = connection.tree.transaction(|tx| {
            tx.remove(key)?;
            Ok(())
        });
        result.map_err(|e| self.logged(transaction_error(e)))?;
        self.flush(connection).await
    }

    fn logged(&self, err: StorageError) -> StorageError {
        warn!("Structured backend at {}: {}", self.path.display(), err);
        err
    }
}

fn classify(err: &sled::Error) -> StorageError {
    match err {
        sled::Error::Io(io) => StorageError::from_io(BackendKind::Structured, io),
        other => StorageError::unknown(BackendKind::Structured, other.to_string()),
    }
}

fn transaction_error(err: TransactionError<()>) -> StorageError {
    match err {
        TransactionError::Storage(e) => classify(&e),
        TransactionError::Abort(()) => {
            StorageError::unknown(BackendKind::Structured, "transaction aborted")
        }
    }
}

#[async_trait]
impl StorageBackend for StructuredBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Structured
    }

    fn is_available(&self) -> bool {
        self.enabled && (self.is_initialized() || writable_dir(&self.path))
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        let raw = envelope::seal(state, &self.version)
            .map_err(|e| StorageError::unknown(BackendKind::Structured, e.to_string()))?;
        if raw.len() as u64 > self.capacity_bytes {
            return Err(self.logged(StorageError::quota_exceeded(
                BackendKind::Structured,
                format!("{} bytes, capacity is {}", raw.len(), self.capacity_bytes),
            )));
        }

        let connection = self.connection().await?;
        let key = self.key.as_bytes();
        let value = raw.as_bytes();
        let result: TransactionResult<(), ()> = connection.tree.transaction(|tx| {
            tx.insert(key, value)?;
            Ok(())
        });
        result.map_err(|e| self.logged(transaction_error(e)))?;
        self.flush(connection).await?;

        debug!("Structured backend wrote {} bytes", raw.len());
        Ok(())
    }

    async fn load(&self) -> MemoryBankResult<Option<PersistedState>> {
        let connection = self.connection().await?;
        let key = self.key.as_bytes();
        let result: TransactionResult<Option<IVec>, ()> =
            connection.tree.transaction(|tx| Ok(tx.get(key)?));
        let Some(bytes) = result.map_err(|e| self.logged(transaction_error(e)))? else {
            return Ok(None);
        };

        let raw = std::str::from_utf8(&bytes).map_err(|e| {
            warn!("Structured backend holds a non UTF-8 envelope: {}", e);
            MemoryBankError::Decode(e.to_string())
        })?;
        match envelope::open(raw, &self.version)? {
            Opened::Current(state) => Ok(Some(state)),
            Opened::Stale { found } => {
                warn!(
                    "Structured backend discarding envelope version {} (expected {})",
                    found, self.version
                );
                self.remove_envelope(connection).await?;
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let connection = self.connection().await?;
        self.remove_envelope(connection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memorybank_core::{Record, StorageErrorKind, SCHEMA_VERSION, STORAGE_KEY};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn backend(tmp: &TempDir) -> StructuredBackend {
        StructuredBackend::new(tmp.path().join("db"), STORAGE_KEY, SCHEMA_VERSION, 1024 * 1024)
    }

    #[tokio::test]
    async fn test_structured_lazy_init() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp);
        assert!(store.is_available());
        assert!(!store.is_initialized());

        assert!(store.load().await.unwrap().is_none());
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_structured_save_load_clear() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp);

        let mut state = PersistedState::empty();
        state.orders.push(Record::new().with("id", "1").with("total", 234.50));
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.orders.len(), 1);
        assert_eq!(loaded.orders[0].number("total"), Some(234.50));

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_structured_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = backend(&tmp);
            let mut state = PersistedState::empty();
            state.users.push(Record::new().with("id", "u1").with("role", "admin"));
            store.save(&state).await.unwrap();
        }

        let store = backend(&tmp);
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.users[0].text("role"), Some("admin"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_structured_concurrent_first_use() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(backend(&tmp));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.load().await.map(|s| s.is_none()) })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }
        assert!(store.is_initialized());
    }

    #[tokio::test]
    async fn test_structured_version_invalidation() {
        let tmp = TempDir::new().unwrap();
        {
            let old = StructuredBackend::new(tmp.path().join("db"), STORAGE_KEY, "0.9", 1024 * 1024);
            old.save(&PersistedState::empty()).await.unwrap();
        }

        let store = backend(&tmp);
        assert!(store.load().await.unwrap().is_none());

        let connection = store.connection().await.unwrap();
        assert!(connection.tree.get(STORAGE_KEY.as_bytes()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_structured_rejects_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp);
        let connection = store.connection().await.unwrap();
        connection
            .tree
            .insert(STORAGE_KEY.as_bytes(), &b"{\"version\":\"1.0\",\"payload\":\"\xff\"}"[..])
            .unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, MemoryBankError::Decode(_)));
    }

    #[tokio::test]
    async fn test_structured_quota() {
        let tmp = TempDir::new().unwrap();
        let store = StructuredBackend::new(tmp.path().join("db"), STORAGE_KEY, SCHEMA_VERSION, 64);

        let err = store.save(&PersistedState::empty()).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_structured_disabled() {
        let tmp = TempDir::new().unwrap();
        let mut config = StorageConfig::with_data_dir(tmp.path());
        config.structured.enabled = false;

        let store = StructuredBackend::from_config(&config);
        assert!(!store.is_available());
        let err = store.save(&PersistedState::empty()).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::Unavailable);
    }
}
