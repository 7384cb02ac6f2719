//! # Host Types Module
//!
//! The storefront collaborators the plugin talks to, expressed as traits,
//! plus the plain records that flow across them.
//!
//! This module provides:
//! - `OptionStore` for persisted options
//! - `Catalog` for products and taxonomy terms
//! - `UserDirectory` for the user search box
//! - `MoneyFormat` for currency display
//! - `CatalogProduct` and `SiteUser` records

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use tier_engine::{ProductId, ProductView, Shopper, TermId, UserId, CATEGORY_TAXONOMY, TAG_TAXONOMY};

// ================================================================================================
// ERRORS
// ================================================================================================

/// Failures of the option store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Option key cannot be empty")]
    EmptyKey,

    #[error("Failed to write option {key}: {reason}")]
    WriteFailed { key: String, reason: String },
}

/// Failures of catalog lookups.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("Invalid taxonomy: {0}")]
    InvalidTaxonomy(String),
}

// ================================================================================================
// COLLABORATOR TRAITS
// ================================================================================================

/// Persisted key/value options. Every write replaces the whole document.
pub trait OptionStore: Send + Sync {
    fn get_option(&self, key: &str) -> Option<Value>;

    fn update_option(&self, key: &str, value: Value) -> Result<(), StoreError>;

    fn delete_option(&self, key: &str) -> Result<(), StoreError>;
}

/// Product and taxonomy lookups.
pub trait Catalog: Send + Sync {
    fn get_product(&self, id: ProductId) -> Option<CatalogProduct>;

    /// The first published product, used to discover cost meta keys.
    fn first_published_product(&self) -> Option<CatalogProduct>;

    /// All terms of a taxonomy, empty ones included.
    fn taxonomy_terms(&self, taxonomy: &str) -> Result<Vec<Term>, CatalogError>;
}

/// User search for the rule form.
pub trait UserDirectory: Send + Sync {
    /// Substring search over login, email and display name.
    fn search(&self, needle: &str, limit: usize) -> Vec<SiteUser>;
}

/// Currency display of an amount.
pub trait MoneyFormat: Send + Sync {
    fn format_money(&self, amount: f64) -> String;
}

// ================================================================================================
// RECORDS
// ================================================================================================

/// A taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub name: String,
}

impl Term {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Term {
            id: TermId(id),
            name: name.into(),
        }
    }
}

/// Product as loaded from the catalog.
///
/// Prices are the raw stored strings; empty means unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub published: bool,
    pub regular_price: String,
    pub sale_price: String,
    /// Meta fields by key.
    pub meta: BTreeMap<String, String>,
    /// Taxonomy name to assigned term ids.
    pub terms: HashMap<String, Vec<TermId>>,
}

impl CatalogProduct {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        CatalogProduct {
            id: ProductId(id),
            name: name.into(),
            published: true,
            ..Self::default()
        }
    }

    pub fn with_prices(mut self, regular: &str, sale: &str) -> Self {
        self.regular_price = regular.to_string();
        self.sale_price = sale.to_string();
        self
    }

    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.meta.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_terms(mut self, taxonomy: &str, ids: &[i64]) -> Self {
        self.terms
            .insert(taxonomy.to_string(), ids.iter().map(|id| TermId(*id)).collect());
        self
    }

    pub fn unpublished(mut self) -> Self {
        self.published = false;
        self
    }

    /// The active price: sale when set, otherwise regular.
    pub fn active_price(&self) -> &str {
        if self.sale_price.is_empty() {
            &self.regular_price
        } else {
            &self.sale_price
        }
    }

    /// Meta lookup that also answers the built-in price keys.
    pub fn meta_or_price(&self, key: &str) -> Option<String> {
        match key {
            "_price" => Some(self.active_price().to_string()),
            "_regular_price" => Some(self.regular_price.clone()),
            "_sale_price" => Some(self.sale_price.clone()),
            _ => self.meta.get(key).cloned(),
        }
    }
}

impl ProductView for CatalogProduct {
    fn product_id(&self) -> ProductId {
        self.id
    }

    fn term_ids(&self, taxonomy: &str) -> Option<Vec<TermId>> {
        match self.terms.get(taxonomy) {
            Some(ids) => Some(ids.clone()),
            // registered product taxonomies exist even with no terms assigned
            None if taxonomy == CATEGORY_TAXONOMY || taxonomy == TAG_TAXONOMY => Some(Vec::new()),
            None => None,
        }
    }

    fn meta_value(&self, key: &str) -> Option<String> {
        self.meta_or_price(key)
    }

    fn sale_price(&self) -> Option<String> {
        if self.sale_price.is_empty() {
            None
        } else {
            Some(self.sale_price.clone())
        }
    }
}

/// A site account. Id 0 is the logged-out visitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteUser {
    pub id: UserId,
    pub login: String,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
}

impl SiteUser {
    pub fn new(id: i64, login: impl Into<String>) -> Self {
        let login = login.into();
        SiteUser {
            id: UserId(id),
            display_name: login.clone(),
            email: format!("{}@example.com", login),
            login,
            ..Self::default()
        }
    }

    /// The logged-out visitor.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, caps: &[&str]) -> Self {
        self.capabilities = caps.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = name.to_string();
        self
    }

    pub fn exists(&self) -> bool {
        self.id.0 > 0
    }

    pub fn can(&self, capability: &str) -> bool {
        self.exists() && self.capabilities.iter().any(|c| c == capability)
    }

    /// The matching-side view of this user.
    pub fn shopper(&self) -> Shopper {
        Shopper::new(self.id, self.roles.iter().cloned())
    }
}
