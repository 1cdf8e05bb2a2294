//! Export and backup documents
//!
//! Documents are pretty-printed JSON snapshots. Parsing is strict about the
//! outer shape and about the structure of `data`, and lenient about the
//! version tag: a foreign version only produces a warning.

use memorybank_core::{
    now_rfc3339, BackupDocument, BackupMetadata, ExportDocument, MemoryBankError,
    MemoryBankResult, PersistedState,
};
use serde_json::{Map, Value};
use tracing::warn;

use crate::codec;
use crate::validator;

/// Render an export document for `state`
pub fn export_document(state: PersistedState, version: &str) -> MemoryBankResult<String> {
    codec::encode_pretty(&ExportDocument {
        version: version.to_string(),
        exported_at: now_rfc3339(),
        data: state,
    })
}

/// Render a backup document for `state`, metadata included
pub fn backup_document(state: PersistedState, version: &str) -> MemoryBankResult<String> {
    let metadata = BackupMetadata::from_state(&state);
    codec::encode_pretty(&BackupDocument {
        version: version.to_string(),
        created_at: now_rfc3339(),
        data: state,
        metadata,
    })
}

/// Parse an export document and return its validated state
pub fn parse_export(document: &str, expected_version: &str) -> MemoryBankResult<PersistedState> {
    let mut object = parse_object(document)?;
    check_version(&object, expected_version)?;
    take_state(&mut object)
}

/// Parse a backup document and return its validated state and metadata
pub fn parse_backup(
    document: &str,
    expected_version: &str,
) -> MemoryBankResult<(PersistedState, BackupMetadata)> {
    let mut object = parse_object(document)?;
    check_version(&object, expected_version)?;

    let metadata = object
        .remove("metadata")
        .ok_or_else(|| MemoryBankError::Import("backup is missing `metadata`".into()))?;
    let metadata: BackupMetadata = serde_json::from_value(metadata)
        .map_err(|e| MemoryBankError::Import(format!("malformed `metadata`: {}", e)))?;

    let state = take_state(&mut object)?;
    let actual = BackupMetadata::from_state(&state);
    if actual != metadata {
        warn!(
            "Backup metadata disagrees with its data: recorded {:?}, computed {:?}",
            metadata, actual
        );
    }

    Ok((state, metadata))
}

fn parse_object(document: &str) -> MemoryBankResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(document) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(MemoryBankError::Import("document is not an object".into())),
        Err(e) => Err(MemoryBankError::Import(format!("malformed document: {}", e))),
    }
}

fn check_version(object: &Map<String, Value>, expected: &str) -> MemoryBankResult<()> {
    let version = object
        .get("version")
        .ok_or_else(|| MemoryBankError::Import("document is missing `version`".into()))?
        .as_str()
        .ok_or_else(|| MemoryBankError::Import("`version` is not a string".into()))?;

    if version != expected {
        warn!(
            "Importing document version {} into schema version {}",
            version, expected
        );
    }
    Ok(())
}

fn take_state(object: &mut Map<String, Value>) -> MemoryBankResult<PersistedState> {
    let data = object
        .remove("data")
        .ok_or_else(|| MemoryBankError::Import("document is missing `data`".into()))?;

    validator::check(&data).map_err(|e| MemoryBankError::Import(e.to_string()))?;
    serde_json::from_value(data).map_err(|e| MemoryBankError::Import(format!("malformed `data`: {}", e)))
}
