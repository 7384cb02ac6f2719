use std::sync::Arc;

use log::{debug, info};
use serde_json::{json, Value};
use thiserror::Error;

use tier_engine::coerce::truthy;

use crate::admin::AdminPage;
use crate::ajax::AjaxEndpoints;
use crate::money::CurrencyFormat;
use crate::nonce::{NonceConfig, Nonces};
use crate::price_filters::RequestScope;
use crate::store::{RULES_OPTION, SETTINGS_OPTION, VERSION_OPTION};
use crate::types::{Catalog, MoneyFormat, OptionStore, SiteUser, StoreError, UserDirectory};
use crate::updater::{UpdateError, Updater, UpdaterConfig};

// ================================================================================================
// PLUGIN CONFIGURATION
// ================================================================================================

/// Static identity of the plugin.
#[derive(Clone, Debug)]
pub struct PluginConfig {
    pub slug: String,
    /// `directory/main-file`, the key update offers are filed under.
    pub basename: String,
    pub version: String,
    /// Release repository owner.
    pub release_owner: String,
    pub release_repo: String,
    /// Settings page slug under the storefront menu.
    pub page_slug: String,
    /// Capability required to save settings and look up products.
    pub capability: String,
    /// Admin URL prefix used to build links.
    pub admin_url: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            slug: "pricetier".to_string(),
            basename: "pricetier/pricetier.php".to_string(),
            version: "1.0.0".to_string(),
            release_owner: "adeelwebify".to_string(),
            release_repo: "pricetier".to_string(),
            page_slug: "pricetier".to_string(),
            capability: "manage_woocommerce".to_string(),
            admin_url: "/wp-admin/".to_string(),
        }
    }
}

impl PluginConfig {
    /// Settings page URL.
    pub fn page_url(&self) -> String {
        format!("{}admin.php?page={}", self.admin_url, self.page_slug)
    }

    pub fn ajax_url(&self) -> String {
        format!("{}admin-ajax.php", self.admin_url)
    }

    /// Update-checker settings for this plugin's release repository.
    pub fn updater_config(&self) -> UpdaterConfig {
        UpdaterConfig {
            owner: self.release_owner.clone(),
            repo: self.release_repo.clone(),
            installed_version: self.version.clone(),
            slug: self.slug.clone(),
            basename: self.basename.clone(),
            ..UpdaterConfig::default()
        }
    }
}

// ================================================================================================
// HOST ENVIRONMENT
// ================================================================================================

/// The host collaborators handed to the plugin at boot.
#[derive(Clone)]
pub struct HostEnvironment {
    pub options: Arc<dyn OptionStore>,
    pub catalog: Arc<dyn Catalog>,
    pub users: Arc<dyn UserDirectory>,
    pub money: Arc<dyn MoneyFormat>,
    /// Whether the storefront extension is active.
    pub storefront_active: bool,
}

impl HostEnvironment {
    pub fn new(
        options: Arc<dyn OptionStore>,
        catalog: Arc<dyn Catalog>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            options,
            catalog,
            users,
            money: Arc::new(CurrencyFormat::default()),
            storefront_active: true,
        }
    }

    pub fn with_money(mut self, money: Arc<dyn MoneyFormat>) -> Self {
        self.money = money;
        self
    }

    pub fn without_storefront(mut self) -> Self {
        self.storefront_active = false;
        self
    }
}

/// Errors raised while bringing the plugin up.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("The storefront extension is not active")]
    StorefrontMissing,

    #[error("Activation failed: {0}")]
    Activation(#[from] StoreError),
}

// ================================================================================================
// PLUGIN
// ================================================================================================

/// The booted plugin: configuration, host handles and the per-install
/// nonce secret.
pub struct Plugin {
    config: PluginConfig,
    env: HostEnvironment,
    nonces: Arc<Nonces>,
}

impl Plugin {
    /// Boots with a fresh nonce secret.
    pub fn boot(env: HostEnvironment, config: PluginConfig) -> Result<Self, BootError> {
        Self::boot_with_nonces(env, config, Nonces::new(NonceConfig::default()))
    }

    pub fn boot_with_nonces(env: HostEnvironment, config: PluginConfig, nonces: Nonces) -> Result<Self, BootError> {
        if !env.storefront_active {
            info!("Storefront extension not active, {} stays dormant", config.slug);
            return Err(BootError::StorefrontMissing);
        }
        debug!("Booted {} {}", config.slug, config.version);
        Ok(Plugin {
            config,
            env,
            nonces: Arc::new(nonces),
        })
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn env(&self) -> &HostEnvironment {
        &self.env
    }

    pub fn nonces(&self) -> &Nonces {
        &self.nonces
    }

    /// Seeds the options that are missing or falsy. Existing values are
    /// left alone.
    pub fn activate(&self) -> Result<(), BootError> {
        let store = &self.env.options;

        if !self.option_set(VERSION_OPTION) {
            store.update_option(VERSION_OPTION, Value::String(self.config.version.clone()))?;
        }
        if !self.option_set(SETTINGS_OPTION) {
            store.update_option(SETTINGS_OPTION, json!({ "enabled": true, "cost_meta_key": "" }))?;
        }
        if !self.option_set(RULES_OPTION) {
            store.update_option(RULES_OPTION, json!([]))?;
        }
        info!("Activated {} {}", self.config.slug, self.config.version);
        Ok(())
    }

    /// Nothing to undo; options survive deactivation.
    pub fn deactivate(&self) {
        debug!("Deactivated {}", self.config.slug);
    }

    fn option_set(&self, key: &str) -> bool {
        self.env.options.get_option(key).map(|v| truthy(&v)).unwrap_or(false)
    }

    /// Starts pricing for one storefront request.
    pub fn begin_request(&self, user: &SiteUser) -> RequestScope {
        RequestScope::new(self.env.options.clone(), user.clone())
    }

    pub fn admin_page(&self) -> AdminPage<'_> {
        AdminPage::new(&self.config, &self.env, &self.nonces)
    }

    pub fn ajax(&self) -> AjaxEndpoints<'_> {
        AjaxEndpoints::new(&self.config, &self.env, &self.nonces)
    }

    /// Release checker caching through the option store.
    pub fn updater(&self) -> Result<Updater, UpdateError> {
        Ok(Updater::new(self.config.updater_config())?.with_cache(self.env.options.clone()))
    }

    /// Plugin list links with the settings link first.
    pub fn action_links(&self, links: Vec<String>) -> Vec<String> {
        let mut out = Vec::with_capacity(links.len() + 1);
        out.push(format!("<a href=\"{}\">Settings</a>", self.config.page_url()));
        out.extend(links);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, MemoryUserDirectory};
    use crate::store::MemoryOptionStore;

    fn env(store: Arc<MemoryOptionStore>) -> HostEnvironment {
        HostEnvironment::new(
            store,
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryUserDirectory::new()),
        )
    }

    #[test]
    fn test_plugin_config_defaults() {
        let config = PluginConfig::default();
        assert_eq!(config.slug, "pricetier");
        assert_eq!(config.basename, "pricetier/pricetier.php");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.capability, "manage_woocommerce");
        assert_eq!(config.page_url(), "/wp-admin/admin.php?page=pricetier");
    }

    #[test]
    fn test_boot_requires_storefront() {
        let store = Arc::new(MemoryOptionStore::new());
        let result = Plugin::boot(env(store).without_storefront(), PluginConfig::default());
        assert!(matches!(result, Err(BootError::StorefrontMissing)));
    }

    #[test]
    fn test_activation_seeds_missing_options() {
        let store = Arc::new(MemoryOptionStore::new());
        let plugin = Plugin::boot(env(store.clone()), PluginConfig::default()).unwrap();
        plugin.activate().unwrap();

        assert_eq!(store.get_option(VERSION_OPTION), Some(json!("1.0.0")));
        assert_eq!(
            store.get_option(SETTINGS_OPTION),
            Some(json!({ "enabled": true, "cost_meta_key": "" }))
        );
        assert_eq!(store.get_option(RULES_OPTION), Some(json!([])));
    }

    #[test]
    fn test_activation_keeps_existing_options() {
        let store = Arc::new(MemoryOptionStore::with_options([
            (VERSION_OPTION, json!("0.9.0")),
            (SETTINGS_OPTION, json!({ "enabled": false, "cost_meta_key": "my_cost" })),
            (RULES_OPTION, json!([{ "name": "Keep" }])),
        ]));
        let plugin = Plugin::boot(env(store.clone()), PluginConfig::default()).unwrap();
        plugin.activate().unwrap();
        plugin.deactivate();

        assert_eq!(store.get_option(VERSION_OPTION), Some(json!("0.9.0")));
        assert_eq!(store.get_option(RULES_OPTION), Some(json!([{ "name": "Keep" }])));
        assert_eq!(store.get_option(SETTINGS_OPTION).unwrap()["cost_meta_key"], json!("my_cost"));
    }

    #[test]
    fn test_activation_replaces_falsy_options() {
        let store = Arc::new(MemoryOptionStore::with_options([
            (SETTINGS_OPTION, json!({})),
            (RULES_OPTION, json!("")),
        ]));
        let plugin = Plugin::boot(env(store.clone()), PluginConfig::default()).unwrap();
        plugin.activate().unwrap();

        assert_eq!(store.get_option(SETTINGS_OPTION).unwrap()["enabled"], json!(true));
        assert_eq!(store.get_option(RULES_OPTION), Some(json!([])));
    }

    #[test]
    fn test_action_links() {
        let store = Arc::new(MemoryOptionStore::new());
        let plugin = Plugin::boot(env(store), PluginConfig::default()).unwrap();
        let links = plugin.action_links(vec!["<a href=\"#\">Deactivate</a>".to_string()]);
        assert_eq!(links.len(), 2);
        assert!(links[0].contains("admin.php?page=pricetier"));
        assert!(links[0].contains(">Settings<"));
    }
}
