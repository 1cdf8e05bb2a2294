//! Core types for the memory bank
//!
//! Defines the persisted dataset, the storage envelope and the
//! export/backup documents built around it.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Logical key under which the dataset is stored, identical for every backend
pub const STORAGE_KEY: &str = "ecommerce-admin-memory-bank";

/// Schema version tag written into every envelope
pub const SCHEMA_VERSION: &str = "1.0";

/// Field names of every entity collection in a persisted state
pub const COLLECTION_FIELDS: [&str; 12] = [
    "orders",
    "products",
    "customers",
    "categories",
    "inventory",
    "reviews",
    "coupons",
    "discountRules",
    "shippingZones",
    "shippingMethods",
    "users",
    "activityLogs",
];

/// Field name of the settings record
pub const SETTINGS_FIELD: &str = "settings";

/// Current time as an RFC 3339 string with millisecond precision
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A single entity as owned by the CRUD layer.
///
/// The persistence layer never interprets entity fields beyond the few
/// accessors below; everything else passes through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style field insertion
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Entity id, accepting both string and numeric ids
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Numeric field, if present and a number
    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    /// String field, if present and a string
    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

/// Synchronization status of the dataset with respect to storage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced,
    Error,
}

/// The complete application dataset, saved and loaded as one unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub orders: Vec<Record>,
    pub products: Vec<Record>,
    pub customers: Vec<Record>,
    pub categories: Vec<Record>,
    pub inventory: Vec<Record>,
    pub reviews: Vec<Record>,
    pub coupons: Vec<Record>,
    pub discount_rules: Vec<Record>,
    pub shipping_zones: Vec<Record>,
    pub shipping_methods: Vec<Record>,
    pub users: Vec<Record>,
    pub activity_logs: Vec<Record>,
    pub settings: Record,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl PersistedState {
    /// An empty dataset with default settings
    pub fn empty() -> Self {
        Self {
            orders: Vec::new(),
            products: Vec::new(),
            customers: Vec::new(),
            categories: Vec::new(),
            inventory: Vec::new(),
            reviews: Vec::new(),
            coupons: Vec::new(),
            discount_rules: Vec::new(),
            shipping_zones: Vec::new(),
            shipping_methods: Vec::new(),
            users: Vec::new(),
            activity_logs: Vec::new(),
            settings: Record::new(),
            last_updated: Utc::now(),
            sync_status: SyncStatus::Idle,
        }
    }

    /// Sum of the `total` field across all orders.
    /// Orders without a numeric total contribute nothing.
    pub fn total_revenue(&self) -> f64 {
        self.orders
            .iter()
            .filter_map(|order| order.number("total"))
            .sum()
    }

    /// Number of entities across every collection
    pub fn entity_count(&self) -> usize {
        self.collections().iter().map(|(_, c)| c.len()).sum()
    }

    /// Every collection paired with its wire name
    pub fn collections(&self) -> [(&'static str, &Vec<Record>); 12] {
        [
            ("orders", &self.orders),
            ("products", &self.products),
            ("customers", &self.customers),
            ("categories", &self.categories),
            ("inventory", &self.inventory),
            ("reviews", &self.reviews),
            ("coupons", &self.coupons),
            ("discountRules", &self.discount_rules),
            ("shippingZones", &self.shipping_zones),
            ("shippingMethods", &self.shipping_methods),
            ("users", &self.users),
            ("activityLogs", &self.activity_logs),
        ]
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Versioned wrapper stored by a backend under the storage key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEnvelope {
    /// Encoded `PersistedState`
    pub payload: String,
    /// Schema version the payload was written with
    pub version: String,
    /// RFC 3339 write time
    pub timestamp: String,
}

impl StorageEnvelope {
    pub fn new(payload: String, version: &str) -> Self {
        Self {
            payload,
            version: version.to_string(),
            timestamp: now_rfc3339(),
        }
    }
}

/// Snapshot produced by an export
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: String,
    pub exported_at: String,
    pub data: PersistedState,
}

/// Aggregate figures attached to a backup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub products_count: usize,
    pub customers_count: usize,
    pub orders_count: usize,
    pub total_revenue: f64,
}

impl BackupMetadata {
    /// Compute the metadata for a dataset
    pub fn from_state(state: &PersistedState) -> Self {
        Self {
            products_count: state.products.len(),
            customers_count: state.customers.len(),
            orders_count: state.orders.len(),
            total_revenue: state.total_revenue(),
        }
    }
}

/// Snapshot produced by a backup
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupDocument {
    pub version: String,
    pub created_at: String,
    pub data: PersistedState,
    pub metadata: BackupMetadata,
}

/// Storage backend variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Simple file-per-key store with a fixed capacity
    KeyValue,
    /// Transactional embedded database with async initialization
    Structured,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::KeyValue => write!(f, "key-value"),
            BackendKind::Structured => write!(f, "structured"),
        }
    }
}

/// Report on backend availability and stored size
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub key_value_available: bool,
    pub structured_available: bool,
    pub preferred: Option<BackendKind>,
    /// Length in bytes of the encoded stored state, 0 when nothing is stored
    pub approximate_size_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(id: &str, total: f64) -> Record {
        Record::new().with("id", id).with("total", total)
    }

    #[test]
    fn test_total_revenue() {
        let mut state = PersistedState::empty();
        state.orders = vec![order("1", 100.0), order("2", 50.0), order("3", 25.0)];
        state.orders.push(Record::new().with("id", "4").with("total", "n/a"));

        assert_eq!(state.total_revenue(), 175.0);
        assert_eq!(state.entity_count(), 4);
    }

    #[test]
    fn test_wire_names() {
        let value = serde_json::to_value(PersistedState::empty()).unwrap();
        let object = value.as_object().unwrap();

        for field in COLLECTION_FIELDS {
            assert!(object[field].is_array(), "{field} should be an array");
        }
        assert!(object[SETTINGS_FIELD].is_object());
        assert_eq!(object["syncStatus"], json!("idle"));
        assert!(object.contains_key("lastUpdated"));
    }

    #[test]
    fn test_record_accessors() {
        let record = Record::new().with("id", 7).with("name", "Mug").with("price", 12.5);

        assert_eq!(record.id().as_deref(), Some("7"));
        assert_eq!(record.text("name"), Some("Mug"));
        assert_eq!(record.number("price"), Some(12.5));
        assert_eq!(record.number("name"), None);
    }

    #[test]
    fn test_backup_metadata() {
        let mut state = PersistedState::empty();
        state.orders = vec![order("1", 10.0)];
        state.products = vec![Record::new().with("id", "p1")];

        let metadata = BackupMetadata::from_state(&state);
        assert_eq!(metadata.orders_count, 1);
        assert_eq!(metadata.products_count, 1);
        assert_eq!(metadata.customers_count, 0);
        assert_eq!(metadata.total_revenue, 10.0);
    }
}
