// Global plugin settings, stored as a flat map and always read by merging
// the stored map over the defaults.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::coerce::{sanitize_key_str, truthy};

/// Meta key read when no cost key has been configured.
pub const DEFAULT_COST_META_KEY: &str = "_wc_cog_cost";

/// What the storefront should do when a rule matches but no cost is
/// available. Stored for the settings page; pricing always falls back to
/// the normal price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    #[default]
    NormalPrice,
    BlockPurchase,
}

impl FallbackMode {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "normal_price" => Some(FallbackMode::NormalPrice),
            "block_purchase" => Some(FallbackMode::BlockPurchase),
            _ => None,
        }
    }
}

/// Settings map after merging over the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSettings {
    values: Map<String, Value>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self::from_stored(None)
    }
}

impl GlobalSettings {
    pub fn defaults() -> Value {
        json!({
            "enabled": true,
            "cost_meta_key": DEFAULT_COST_META_KEY,
            "fallback_mode": "normal_price",
        })
    }

    /// Builds settings from whatever the option store returned. Anything
    /// that is not a map counts as an empty map.
    pub fn from_stored(stored: Option<&Value>) -> Self {
        let mut values = match Self::defaults() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Some(Value::Object(stored)) = stored {
            for (key, value) in stored {
                values.insert(key.clone(), value.clone());
            }
        }
        GlobalSettings { values }
    }

    pub fn is_enabled(&self) -> bool {
        self.values.get("enabled").map(truthy).unwrap_or(false)
    }

    /// The meta key holding the product cost. A configured key goes
    /// through key sanitation and may come out empty, in which case no
    /// cost can ever be read.
    pub fn cost_meta_key(&self) -> String {
        match self.values.get("cost_meta_key") {
            Some(Value::String(key)) if !key.is_empty() => sanitize_key_str(key),
            _ => DEFAULT_COST_META_KEY.to_string(),
        }
    }

    pub fn fallback_mode(&self) -> FallbackMode {
        self.values
            .get("fallback_mode")
            .and_then(Value::as_str)
            .and_then(FallbackMode::from_key)
            .unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}
