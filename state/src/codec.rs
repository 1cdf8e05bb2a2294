//! JSON codec for the persisted state

use memorybank_core::{MemoryBankError, MemoryBankResult, PersistedState};
use serde::Serialize;

/// Encode a state as compact JSON
pub fn encode(state: &PersistedState) -> MemoryBankResult<String> {
    serde_json::to_string(state).map_err(|e| MemoryBankError::Encode(e.to_string()))
}

/// Encode any document as pretty-printed JSON
pub fn encode_pretty<T: Serialize>(document: &T) -> MemoryBankResult<String> {
    serde_json::to_string_pretty(document).map_err(|e| MemoryBankError::Encode(e.to_string()))
}

/// Decode a state previously produced by [`encode`]
pub fn decode(text: &str) -> MemoryBankResult<PersistedState> {
    serde_json::from_str(text).map_err(|e| MemoryBankError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use memorybank_core::{Record, SyncStatus};

    #[test]
    fn test_roundtrip() {
        let mut state = PersistedState::empty();
        state.orders = vec![Record::new()
            .with("id", "1")
            .with("total", 234.50)
            .with("createdAt", "2024-01-15T10:30:00.000Z")
            .with("items", serde_json::json!([{ "sku": "MUG-01", "qty": 2 }]))];
        state.settings = Record::new().with("storeName", "Acme").with("taxRate", 0.0825);
        state.sync_status = SyncStatus::Synced;

        let text = encode(&state).unwrap();
        let decoded = decode(&text).unwrap();

        assert_eq!(decoded, state);
    }

    #[test]
    fn test_decode_truncated() {
        let text = encode(&PersistedState::empty()).unwrap();
        let truncated = &text[..text.len() / 2];

        assert!(matches!(decode(truncated), Err(MemoryBankError::Decode(_))));
    }

    #[test]
    fn test_decode_wrong_shape() {
        assert!(matches!(decode("[1, 2, 3]"), Err(MemoryBankError::Decode(_))));
        assert!(matches!(decode(r#"{"orders": {}}"#), Err(MemoryBankError::Decode(_))));
    }
}
