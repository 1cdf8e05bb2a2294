//! Error types for the memory bank

use crate::types::BackendKind;
use std::fmt;
use thiserror::Error;

/// Classification of a backend-level failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    /// The write would exceed the backend's capacity
    QuotaExceeded,
    /// The platform refused access to the storage location
    PermissionDenied,
    /// The backend cannot be used at all
    Unavailable,
    /// Anything else
    Unknown,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageErrorKind::QuotaExceeded => "quota exceeded",
            StorageErrorKind::PermissionDenied => "permission denied",
            StorageErrorKind::Unavailable => "unavailable",
            StorageErrorKind::Unknown => "unknown failure",
        };
        f.write_str(name)
    }
}

/// A failure raised by one storage backend
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{backend} storage {kind}: {cause}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub backend: BackendKind,
    pub cause: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, backend: BackendKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            backend,
            cause: cause.into(),
        }
    }

    pub fn quota_exceeded(backend: BackendKind, cause: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::QuotaExceeded, backend, cause)
    }

    pub fn unavailable(backend: BackendKind, cause: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Unavailable, backend, cause)
    }

    pub fn unknown(backend: BackendKind, cause: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Unknown, backend, cause)
    }

    /// Classify an I/O error raised by a backend
    pub fn from_io(backend: BackendKind, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => StorageErrorKind::Unavailable,
            _ => StorageErrorKind::Unknown,
        };
        Self::new(kind, backend, err.to_string())
    }
}

/// Main error type for the memory bank
#[derive(Error, Debug)]
pub enum MemoryBankError {
    // ============ Codec Errors ============
    #[error("Malformed stored data: {0}")]
    Decode(String),

    #[error("Failed to encode state: {0}")]
    Encode(String),

    // ============ Storage Errors ============
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("All storage backends failed: {}", join_causes(.0))]
    BackendsExhausted(Vec<StorageError>),

    // ============ Data Errors ============
    #[error("Invalid state: {0}")]
    Validation(String),

    #[error("No data available to export")]
    NoData,

    #[error("Import failed: {0}")]
    Import(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl MemoryBankError {
    /// Storage kind for storage-class errors.
    /// An exhausted fallback chain reports the kind of its first cause.
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            MemoryBankError::Storage(err) => Some(err.kind),
            MemoryBankError::BackendsExhausted(causes) => causes.first().map(|c| c.kind),
            _ => None,
        }
    }

    /// Underlying backend failures carried by this error
    pub fn storage_causes(&self) -> &[StorageError] {
        match self {
            MemoryBankError::Storage(err) => std::slice::from_ref(err),
            MemoryBankError::BackendsExhausted(causes) => causes,
            _ => &[],
        }
    }
}

fn join_causes(causes: &[StorageError]) -> String {
    causes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<std::io::Error> for MemoryBankError {
    fn from(err: std::io::Error) -> Self {
        MemoryBankError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MemoryBankError {
    fn from(err: serde_json::Error) -> Self {
        MemoryBankError::Decode(err.to_string())
    }
}
