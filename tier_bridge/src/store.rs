//! Option storage: option keys, the in-memory store, and expiring
//! transients layered on top of any `OptionStore`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{OptionStore, StoreError};

// ================================================================================================
// OPTION KEYS
// ================================================================================================

/// Installed plugin version.
pub const VERSION_OPTION: &str = "pricetier_version";
/// Global settings map.
pub const SETTINGS_OPTION: &str = "pricetier_settings";
/// Ordered rule list.
pub const RULES_OPTION: &str = "pricetier_rules";
/// Admin notice queue (transient).
pub const NOTICES_TRANSIENT: &str = "pricetier_notices";

const TRANSIENT_PREFIX: &str = "_transient_";

// ================================================================================================
// IN-MEMORY STORE
// ================================================================================================

/// Option store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryOptionStore {
    options: RwLock<HashMap<String, Value>>,
}

impl MemoryOptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `(key, value)` pairs.
    pub fn with_options<I, K>(options: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map = options.into_iter().map(|(k, v)| (k.into(), v)).collect();
        MemoryOptionStore {
            options: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.options.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.read().is_empty()
    }
}

impl OptionStore for MemoryOptionStore {
    fn get_option(&self, key: &str) -> Option<Value> {
        self.options.read().get(key).cloned()
    }

    fn update_option(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.options.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete_option(&self, key: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.options.write().remove(key);
        Ok(())
    }
}

// ================================================================================================
// TRANSIENTS
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransientRecord {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// Expiring values stored as ordinary options.
pub struct Transients<'a> {
    store: &'a dyn OptionStore,
}

impl<'a> Transients<'a> {
    pub fn new(store: &'a dyn OptionStore) -> Self {
        Transients { store }
    }

    fn option_key(key: &str) -> String {
        format!("{}{}", TRANSIENT_PREFIX, key)
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        self.set_at(key, value, ttl, Utc::now())
    }

    pub fn set_at(&self, key: &str, value: Value, ttl: Duration, now: DateTime<Utc>) -> Result<(), StoreError> {
        let record = TransientRecord {
            value,
            expires_at: now + ttl,
        };
        let encoded = serde_json::to_value(&record).map_err(|e| StoreError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.update_option(&Self::option_key(key), encoded)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now())
    }

    /// The stored value, or `None` once it has expired or if the record
    /// cannot be read. Expired records are removed.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let raw = self.store.get_option(&Self::option_key(key))?;
        let record: TransientRecord = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(e) => {
                debug!("Unreadable transient {}: {}", key, e);
                return None;
            }
        };
        if record.expires_at <= now {
            let _ = self.delete(key);
            return None;
        }
        Some(record.value)
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete_option(&Self::option_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_round_trip() {
        let store = MemoryOptionStore::new();
        assert_eq!(store.get_option(RULES_OPTION), None);

        store.update_option(RULES_OPTION, json!([])).unwrap();
        assert_eq!(store.get_option(RULES_OPTION), Some(json!([])));

        store.update_option(RULES_OPTION, json!([{"name": "a"}])).unwrap();
        assert_eq!(store.get_option(RULES_OPTION), Some(json!([{"name": "a"}])));

        store.delete_option(RULES_OPTION).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = MemoryOptionStore::new();
        assert_eq!(store.update_option("", json!(1)), Err(StoreError::EmptyKey));
    }

    #[test]
    fn test_transient_expiry() {
        let store = MemoryOptionStore::new();
        let transients = Transients::new(&store);
        let now = Utc::now();

        transients
            .set_at(NOTICES_TRANSIENT, json!(["hi"]), Duration::seconds(30), now)
            .unwrap();
        assert_eq!(
            transients.get_at(NOTICES_TRANSIENT, now + Duration::seconds(29)),
            Some(json!(["hi"]))
        );
        assert_eq!(transients.get_at(NOTICES_TRANSIENT, now + Duration::seconds(30)), None);
        // the expired record was cleaned up
        assert!(store.is_empty());
    }

    #[test]
    fn test_garbage_transient_reads_as_missing() {
        let store = MemoryOptionStore::with_options([("_transient_x", json!("not a record"))]);
        assert_eq!(Transients::new(&store).get("x"), None);
    }
}
