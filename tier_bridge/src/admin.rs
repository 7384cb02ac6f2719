//! Settings page: the save handler, the notice queue and the data the page
//! and its script need.
//!
//! Saving follows post/redirect/get. A successful save queues a notice and
//! hands back the URL to redirect to; the next page view drains the queue.

use std::collections::BTreeMap;

use chrono::Duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use tier_engine::coerce::{parse_numeric, sanitize_key, scalar_to_string, to_list, truthy};
use tier_engine::{rule_defaults, sanitize_rule, Rule, RuleId, DEFAULT_COST_META_KEY};

use crate::bridge::{HostEnvironment, PluginConfig};
use crate::form::{parse_form, unslash, FormError};
use crate::nonce::{Nonces, ADMIN_ACTION, SAVE_ACTION};
use crate::store::{Transients, NOTICES_TRANSIENT, RULES_OPTION, SETTINGS_OPTION};
use crate::types::{Catalog, OptionStore, SiteUser, StoreError};

/// Form field carrying the save token.
pub const NONCE_FIELD: &str = "pricetier_nonce";
/// Form entry used by the client-side "add rule" block.
pub const NEW_RULE_KEY: &str = "new";

const NOTICE_TTL_SECS: i64 = 30;
const BUILTIN_PRICE_KEYS: [&str; 3] = ["_price", "_regular_price", "_sale_price"];

// ================================================================================================
// ERRORS
// ================================================================================================

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Form(#[from] FormError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to build redirect: {0}")]
    Redirect(#[from] serde_urlencoded::ser::Error),
}

// ================================================================================================
// REQUESTS AND OUTCOMES
// ================================================================================================

/// One hit on the settings page.
#[derive(Debug, Clone)]
pub struct AdminRequest {
    pub method: String,
    /// Current page URL, used as the redirect base.
    pub url: String,
    /// Decoded form body; an empty object for non-POST requests.
    pub form: Value,
    pub user: SiteUser,
}

impl AdminRequest {
    pub fn get(url: impl Into<String>, user: SiteUser) -> Self {
        AdminRequest {
            method: "GET".to_string(),
            url: url.into(),
            form: Value::Object(Map::new()),
            user,
        }
    }

    /// A POST with an url-encoded body.
    pub fn post(url: impl Into<String>, body: &str, user: SiteUser) -> Result<Self, FormError> {
        Ok(AdminRequest {
            method: "POST".to_string(),
            url: url.into(),
            form: parse_form(body)?,
            user,
        })
    }

    pub fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }
}

/// What the save handler did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Not a POST.
    Ignored,
    /// Missing or stale token; an error notice was queued.
    Rejected,
    /// The user lacks the capability; nothing queued.
    Forbidden,
    /// Options written; redirect the browser here.
    Saved { redirect: String },
}

// ================================================================================================
// NOTICES
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

/// A one-shot admin message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NoticeKind,
}

/// Everything the settings page shows.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    pub enabled: bool,
    pub cost_meta_key: String,
    pub cost_sources: BTreeMap<String, String>,
    /// Stored rules, sanitized, in stored order. Disabled and invalid ones
    /// are listed too.
    pub rules: Vec<Rule>,
    pub notices: Vec<Notice>,
}

// ================================================================================================
// ADMIN PAGE
// ================================================================================================

pub struct AdminPage<'a> {
    config: &'a PluginConfig,
    env: &'a HostEnvironment,
    nonces: &'a Nonces,
}

impl<'a> AdminPage<'a> {
    pub fn new(config: &'a PluginConfig, env: &'a HostEnvironment, nonces: &'a Nonces) -> Self {
        AdminPage { config, env, nonces }
    }

    fn transients(&self) -> Transients<'a> {
        Transients::new(self.env.options.as_ref())
    }

    /// Handles a settings form submission.
    pub fn handle_post(&self, request: &AdminRequest) -> Result<SaveOutcome, AdminError> {
        if !request.is_post() {
            return Ok(SaveOutcome::Ignored);
        }

        let token = request.form.get(NONCE_FIELD).and_then(scalar_to_string);
        let verified = token
            .map(|t| self.nonces.verify(&t, SAVE_ACTION, request.user.id).is_some())
            .unwrap_or(false);
        if !verified {
            warn!("Rejected settings save from user {}: bad token", request.user.id);
            self.add_notice("Security check failed", NoticeKind::Error)?;
            return Ok(SaveOutcome::Rejected);
        }

        if !request.user.can(&self.config.capability) {
            debug!("User {} may not save settings", request.user.id);
            return Ok(SaveOutcome::Forbidden);
        }

        let raw_settings = request.form.get("pricetier_settings").cloned().map(unslash);
        let field = |name: &str| raw_settings.as_ref().and_then(|s| s.get(name)).cloned().unwrap_or(Value::Null);
        let settings = json!({
            "enabled": truthy(&field("enabled")),
            "cost_meta_key": sanitize_key(&field("cost_meta_key")),
        });
        self.env.options.update_option(SETTINGS_OPTION, settings)?;

        let rules = collect_rules(request.form.get("pricetier_rules"));
        let count = rules.len();
        self.env.options.update_option(RULES_OPTION, Value::Array(rules))?;
        info!("User {} saved settings and {} rules", request.user.id, count);

        self.add_notice("Settings saved.", NoticeKind::Success)?;
        let redirect = with_saved_flag(&request.url)?;
        Ok(SaveOutcome::Saved { redirect })
    }

    /// Queues a notice for the next page view.
    pub fn add_notice(&self, message: &str, kind: NoticeKind) -> Result<(), StoreError> {
        let mut queue = self.peek_notices();
        queue.push(Notice {
            message: message.to_string(),
            kind,
        });
        let encoded = serde_json::to_value(&queue).map_err(|e| StoreError::WriteFailed {
            key: NOTICES_TRANSIENT.to_string(),
            reason: e.to_string(),
        })?;
        self.transients()
            .set(NOTICES_TRANSIENT, encoded, Duration::seconds(NOTICE_TTL_SECS))
    }

    fn peek_notices(&self) -> Vec<Notice> {
        match self.transients().get(NOTICES_TRANSIENT) {
            Some(raw) => serde_json::from_value(raw).unwrap_or_else(|e| {
                debug!("Discarding unreadable notice queue: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Returns the queued notices and clears the queue.
    pub fn drain_notices(&self) -> Vec<Notice> {
        let notices = self.peek_notices();
        if !notices.is_empty() {
            if let Err(e) = self.transients().delete(NOTICES_TRANSIENT) {
                warn!("Failed to clear notices: {}", e);
            }
        }
        notices
    }

    /// Cost meta keys offered in the settings select, keyed by meta key.
    pub fn cost_sources(&self) -> BTreeMap<String, String> {
        let mut sources = BTreeMap::new();
        sources.insert("_price".to_string(), "Product: Active Price".to_string());
        sources.insert("_regular_price".to_string(), "Product: Regular Price".to_string());
        sources.insert("_sale_price".to_string(), "Product: Sale Price".to_string());

        if let Some(product) = self.env.catalog.first_published_product() {
            for (key, value) in &product.meta {
                let listed = key == DEFAULT_COST_META_KEY || BUILTIN_PRICE_KEYS.contains(&key.as_str());
                if key.starts_with('_') && !listed {
                    continue;
                }
                if parse_numeric(value).is_some() {
                    sources.insert(key.clone(), format!("Meta: {}", key));
                }
            }
            // price fields live on the product, not in its meta map
            for key in BUILTIN_PRICE_KEYS {
                if product.meta_or_price(key).and_then(|raw| parse_numeric(&raw)).is_some() {
                    sources.insert(key.to_string(), format!("Meta: {}", key));
                }
            }
        }
        sources
    }

    /// Blank rule for the client-side "add rule" button.
    pub fn rule_template(&self) -> Value {
        rule_defaults()
    }

    /// Settings handed to the page script.
    pub fn script_config(&self, user: &SiteUser) -> Value {
        json!({
            "ajaxUrl": self.config.ajax_url(),
            "nonce": self.nonces.create(ADMIN_ACTION, user.id),
            "ruleTemplate": self.rule_template(),
        })
    }

    /// Token for the settings form.
    pub fn form_nonce(&self, user: &SiteUser) -> String {
        self.nonces.create(SAVE_ACTION, user.id)
    }

    /// Page data for a view. Drains the notice queue.
    pub fn page_state(&self) -> PageState {
        let settings = self.env.options.get_option(SETTINGS_OPTION);
        let stored = |name: &str| settings.as_ref().and_then(|s| s.get(name)).filter(|v| !v.is_null());

        let enabled = stored("enabled").map(truthy).unwrap_or(true);
        let cost_meta_key = stored("cost_meta_key")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| DEFAULT_COST_META_KEY.to_string());

        let rules = match self.env.options.get_option(RULES_OPTION) {
            Some(stored @ (Value::Array(_) | Value::Object(_))) => {
                to_list(&stored).into_iter().map(sanitize_rule).collect()
            }
            _ => Vec::new(),
        };

        PageState {
            enabled,
            cost_meta_key,
            cost_sources: self.cost_sources(),
            rules,
            notices: self.drain_notices(),
        }
    }
}

/// Sanitizes the submitted rule entries in submission order. The `new`
/// entry is dropped when it has no name; ids are filled in where missing.
fn collect_rules(raw: Option<&Value>) -> Vec<Value> {
    let entries: Vec<(String, Value)> = match raw {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter(|(key, entry)| {
            key != NEW_RULE_KEY || entry.get("name").map(truthy).unwrap_or(false)
        })
        .map(|(_, entry)| {
            let mut rule = sanitize_rule(unslash(entry));
            if rule.id.is_blank() {
                rule.id = RuleId::generate();
            }
            rule.to_value()
        })
        .collect()
}

/// `url` with any `saved` query argument replaced by `saved=true`.
fn with_saved_flag(url: &str) -> Result<String, serde_urlencoded::ser::Error> {
    let (base, query) = url.split_once('?').unwrap_or((url, ""));
    let mut pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    pairs.retain(|(k, _)| k != "saved");
    pairs.push(("saved".to_string(), "true".to_string()));
    Ok(format!("{}?{}", base, serde_urlencoded::to_string(&pairs)?))
}
