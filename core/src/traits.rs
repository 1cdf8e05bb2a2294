//! Core traits defining memory bank interfaces
//!
//! Every storage mechanism implements [`StorageBackend`]; the persistence
//! manager depends on nothing else.

use crate::error::StorageError;
use crate::types::{BackendKind, PersistedState};
use async_trait::async_trait;

/// Result type for memory bank operations
pub type MemoryBankResult<T> = Result<T, crate::error::MemoryBankError>;

/// A storage mechanism holding one versioned document under a fixed key
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which variant this backend is
    fn kind(&self) -> BackendKind;

    /// Probe whether the backend can be used. Never panics and never writes.
    fn is_available(&self) -> bool;

    /// Persist the state, replacing any previous envelope
    async fn save(&self, state: &PersistedState) -> Result<(), StorageError>;

    /// Load the stored state.
    ///
    /// Returns `Ok(None)` when nothing is stored or when the stored envelope
    /// carries a different schema version; in the latter case the stale
    /// envelope is removed.
    async fn load(&self) -> MemoryBankResult<Option<PersistedState>>;

    /// Remove the stored envelope. Clearing an empty backend succeeds.
    async fn clear(&self) -> Result<(), StorageError>;
}
