//! Key-value backend: one file per key with a fixed capacity ceiling

use async_trait::async_trait;
use memorybank_core::{
    BackendKind, MemoryBankResult, PersistedState, StorageBackend, StorageConfig, StorageError,
};
use parking_lot::RwLock;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::envelope::{self, Opened};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Content fingerprint of a stored entry; `ABSENT` when no entry exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fingerprint(Option<[u8; 32]>);

impl Fingerprint {
    pub const ABSENT: Fingerprint = Fingerprint(None);

    pub fn of(bytes: &[u8]) -> Self {
        Fingerprint(Some(*blake3::hash(bytes).as_bytes()))
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }
}

/// Synchronous file-per-key store, the simple backend variant.
///
/// Entries live in `<dir>/<key>.json`. Writes go through a temp file and a
/// rename so readers never observe a half-written entry.
pub struct KeyValueBackend {
    dir: PathBuf,
    key: String,
    version: String,
    capacity_bytes: u64,
    enabled: bool,
    last_own_write: RwLock<Option<Fingerprint>>,
}

impl KeyValueBackend {
    pub fn new(dir: impl Into<PathBuf>, key: &str, version: &str, capacity_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            key: key.to_string(),
            version: version.to_string(),
            capacity_bytes,
            enabled: true,
            last_own_write: RwLock::new(None),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        let mut backend = Self::new(
            config.key_value_dir(),
            &config.storage_key,
            &config.schema_version,
            config.key_value.capacity_bytes,
        );
        backend.enabled = config.key_value.enabled;
        backend
    }

    /// Path of the entry holding the envelope
    pub fn entry_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.key, ENTRY_EXTENSION))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.key, TEMP_EXTENSION))
    }

    /// Fingerprint of what this instance last wrote or cleared
    pub fn last_own_write(&self) -> Option<Fingerprint> {
        *self.last_own_write.read()
    }

    /// Fingerprint of the entry currently on disk
    pub fn current_fingerprint(&self) -> Result<Fingerprint, StorageError> {
        match fs::read(self.entry_path()) {
            Ok(bytes) => Ok(Fingerprint::of(&bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Fingerprint::ABSENT),
            Err(e) => Err(StorageError::from_io(BackendKind::KeyValue, &e)),
        }
    }

    fn read_raw(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.entry_path()) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.logged(StorageError::from_io(BackendKind::KeyValue, &e))),
        }
    }

    /// Bytes used by every entry except the one under our key
    fn used_by_others(&self) -> Result<u64, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::from_io(BackendKind::KeyValue, &e)),
        };

        let own = self.entry_path();
        let temp = self.temp_path();
        let mut used = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::from_io(BackendKind::KeyValue, &e))?;
            let path = entry.path();
            if path == own || path == temp {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|e| StorageError::from_io(BackendKind::KeyValue, &e))?;
            if metadata.is_file() {
                used += metadata.len();
            }
        }
        Ok(used)
    }

    fn write_raw(&self, raw: &str) -> Result<(), StorageError> {
        let used = self.used_by_others()?;
        let needed = used + raw.len() as u64;
        if needed > self.capacity_bytes {
            return Err(StorageError::quota_exceeded(
                BackendKind::KeyValue,
                format!("{} bytes needed, capacity is {}", needed, self.capacity_bytes),
            ));
        }

        let io = |e: std::io::Error| StorageError::from_io(BackendKind::KeyValue, &e);
        fs::create_dir_all(&self.dir).map_err(io)?;
        let temp = self.temp_path();
        fs::write(&temp, raw).map_err(io)?;
        if let Err(e) = fs::rename(&temp, self.entry_path()) {
            let _ = fs::remove_file(&temp);
            return Err(io(e));
        }

        *self.last_own_write.write() = Some(Fingerprint::of(raw.as_bytes()));
        Ok(())
    }

    fn remove_entry(&self) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(self.logged(StorageError::from_io(BackendKind::KeyValue, &e))),
        }
        *self.last_own_write.write() = Some(Fingerprint::ABSENT);
        Ok(())
    }

    fn logged(&self, err: StorageError) -> StorageError {
        warn!("Key-value backend at {}: {}", self.dir.display(), err);
        err
    }
}

/// Whether `dir`, or the nearest ancestor that exists, is a writable directory
pub(crate) fn writable_dir(dir: &Path) -> bool {
    for ancestor in dir.ancestors() {
        let candidate = if ancestor.as_os_str().is_empty() {
            Path::new(".")
        } else {
            ancestor
        };
        match fs::metadata(candidate) {
            Ok(metadata) => return metadata.is_dir() && !metadata.permissions().readonly(),
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(_) => return false,
        }
    }
    false
}

#[async_trait]
impl StorageBackend for KeyValueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn is_available(&self) -> bool {
        self.enabled && writable_dir(&self.dir)
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StorageError> {
        let raw = envelope::seal(state, &self.version)
            .map_err(|e| StorageError::unknown(BackendKind::KeyValue, e.to_string()))?;
        self.write_raw(&raw).map_err(|e| self.logged(e))?;
        debug!("Key-value backend wrote {} bytes", raw.len());
        Ok(())
    }

    async fn load(&self) -> MemoryBankResult<Option<PersistedState>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };

        match envelope::open(&raw, &self.version)? {
            Opened::Current(state) => Ok(Some(state)),
            Opened::Stale { found } => {
                warn!(
                    "Key-value backend discarding envelope version {} (expected {})",
                    found, self.version
                );
                self.remove_entry()?;
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.remove_entry()
    }
}

/// Thread-safe key-value backend wrapper
pub type SharedKeyValueBackend = Arc<KeyValueBackend>;

#[cfg(test)]
mod tests {
    use super::*;
    use memorybank_core::{MemoryBankError, Record, StorageErrorKind, SCHEMA_VERSION, STORAGE_KEY};
    use tempfile::TempDir;

    fn backend(tmp: &TempDir, capacity: u64) -> KeyValueBackend {
        KeyValueBackend::new(tmp.path().join("kv"), STORAGE_KEY, SCHEMA_VERSION, capacity)
    }

    #[tokio::test]
    async fn test_key_value_save_load_clear() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp, 1024 * 1024);
        assert!(store.is_available());
        assert!(store.load().await.unwrap().is_none());

        let mut state = PersistedState::empty();
        state.customers.push(Record::new().with("id", "c1").with("name", "Ada"));
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, state);

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.entry_path().exists());
    }

    #[tokio::test]
    async fn test_key_value_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = backend(&tmp, 1024 * 1024);
            let mut state = PersistedState::empty();
            state.coupons.push(Record::new().with("code", "SPRING10"));
            store.save(&state).await.unwrap();
        }

        let store = backend(&tmp, 1024 * 1024);
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.coupons[0].text("code"), Some("SPRING10"));
    }

    #[tokio::test]
    async fn test_key_value_quota() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp, 256);

        let mut state = PersistedState::empty();
        for i in 0..20 {
            state.products.push(Record::new().with("id", format!("product-{}", i)));
        }

        let err = store.save(&state).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::QuotaExceeded);
        assert!(!store.entry_path().exists());
    }

    #[tokio::test]
    async fn test_key_value_quota_counts_other_entries() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp, 4096);
        store.save(&PersistedState::empty()).await.unwrap();
        // Overwriting our own entry does not count against itself
        store.save(&PersistedState::empty()).await.unwrap();

        fs::write(tmp.path().join("kv").join("other.json"), vec![b'x'; 4000]).unwrap();
        let err = store.save(&PersistedState::empty()).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_key_value_version_invalidation() {
        let tmp = TempDir::new().unwrap();
        let old = KeyValueBackend::new(tmp.path().join("kv"), STORAGE_KEY, "0.9", 1024 * 1024);
        old.save(&PersistedState::empty()).await.unwrap();

        let store = backend(&tmp, 1024 * 1024);
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.entry_path().exists());
    }

    #[tokio::test]
    async fn test_key_value_corrupt_entry() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp, 1024 * 1024);
        fs::create_dir_all(tmp.path().join("kv")).unwrap();
        fs::write(store.entry_path(), "{\"payload\": \"tru").unwrap();

        assert!(matches!(store.load().await, Err(MemoryBankError::Decode(_))));
    }

    #[tokio::test]
    async fn test_key_value_fingerprints() {
        let tmp = TempDir::new().unwrap();
        let store = backend(&tmp, 1024 * 1024);
        assert_eq!(store.last_own_write(), None);
        assert!(store.current_fingerprint().unwrap().is_absent());

        store.save(&PersistedState::empty()).await.unwrap();
        assert_eq!(store.last_own_write(), Some(store.current_fingerprint().unwrap()));

        store.clear().await.unwrap();
        assert_eq!(store.last_own_write(), Some(Fingerprint::ABSENT));
    }

    #[test]
    fn test_key_value_unavailable() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("plain-file");
        fs::write(&file, "not a directory").unwrap();

        let store = KeyValueBackend::new(file.join("kv"), STORAGE_KEY, SCHEMA_VERSION, 1024);
        assert!(!store.is_available());

        let mut config = StorageConfig::with_data_dir(tmp.path());
        config.key_value.enabled = false;
        assert!(!KeyValueBackend::from_config(&config).is_available());
    }
}
