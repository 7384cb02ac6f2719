//! # PriceTier Bridge Library
//!
//! Storefront integration for the pricing engine: option storage, plugin
//! activation, per-request price filters, the settings page, its AJAX
//! endpoints and the release update check.

// Core modules
pub mod admin;
pub mod ajax;
pub mod bridge;
pub mod catalog;
pub mod form;
pub mod money;
pub mod nonce;
pub mod price_filters;
pub mod store;
pub mod types;
pub mod updater;

// Re-export commonly used types
pub use admin::{AdminError, AdminPage, AdminRequest, Notice, NoticeKind, PageState, SaveOutcome};
pub use ajax::{AjaxCall, AjaxEndpoints, AjaxResponse};
pub use bridge::{BootError, HostEnvironment, Plugin, PluginConfig};
pub use catalog::{MemoryCatalog, MemoryUserDirectory};
pub use money::{CurrencyFormat, SymbolPosition};
pub use nonce::{NonceConfig, Nonces};
pub use price_filters::RequestScope;
pub use store::{MemoryOptionStore, Transients};
pub use types::{
    Catalog, CatalogError, CatalogProduct, MoneyFormat, OptionStore, SiteUser, StoreError, Term,
    UserDirectory,
};
pub use updater::{PluginInfo, RemoteRelease, UpdateError, UpdateOffer, UpdateTransient, Updater, UpdaterConfig};
