//! Envelope sealing and opening shared by every backend

use memorybank_core::{MemoryBankError, MemoryBankResult, PersistedState, StorageEnvelope};

use crate::codec;

/// Result of opening a stored envelope
#[derive(Debug)]
pub enum Opened {
    /// The envelope matches the expected version
    Current(PersistedState),
    /// The envelope was written with another schema version
    Stale { found: String },
}

/// Wrap a state in a fresh envelope and serialize it
pub fn seal(state: &PersistedState, version: &str) -> MemoryBankResult<String> {
    let envelope = StorageEnvelope::new(codec::encode(state)?, version);
    serde_json::to_string(&envelope).map_err(|e| MemoryBankError::Encode(e.to_string()))
}

/// Parse a stored envelope and decode its payload if the version matches
pub fn open(raw: &str, version: &str) -> MemoryBankResult<Opened> {
    let envelope: StorageEnvelope = serde_json::from_str(raw)
        .map_err(|e| MemoryBankError::Decode(format!("envelope: {}", e)))?;

    if envelope.version != version {
        return Ok(Opened::Stale {
            found: envelope.version,
        });
    }

    Ok(Opened::Current(codec::decode(&envelope.payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let raw = seal(&PersistedState::empty(), "1.0").unwrap();

        match open(&raw, "1.0").unwrap() {
            Opened::Current(state) => assert_eq!(state.entity_count(), 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_open_stale() {
        let raw = seal(&PersistedState::empty(), "0.9").unwrap();

        match open(&raw, "1.0").unwrap() {
            Opened::Stale { found } => assert_eq!(found, "0.9"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_open_corrupt() {
        assert!(matches!(open("{\"payload\":", "1.0"), Err(MemoryBankError::Decode(_))));

        let raw = serde_json::to_string(&StorageEnvelope::new("not json".into(), "1.0")).unwrap();
        assert!(matches!(open(&raw, "1.0"), Err(MemoryBankError::Decode(_))));
    }
}
