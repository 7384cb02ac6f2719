//! Per-request pricing.
//!
//! A `RequestScope` lives as long as one storefront request. Settings are
//! read when the scope opens; the rule table is built on the first price
//! lookup that needs it and reused for every later one.

use std::cell::OnceCell;
use std::sync::Arc;

use log::debug;

use tier_engine::{GlobalSettings, PriceFacet, PriceFormat, PriceOutcome, PricingEngine, RuleTable, Shopper};

use crate::store::{RULES_OPTION, SETTINGS_OPTION};
use crate::types::{CatalogProduct, OptionStore, SiteUser};

/// Pricing state for one request and one acting user.
pub struct RequestScope {
    options: Arc<dyn OptionStore>,
    user: SiteUser,
    shopper: Shopper,
    settings: GlobalSettings,
    table: OnceCell<RuleTable>,
    format: PriceFormat,
}

impl RequestScope {
    pub fn new(options: Arc<dyn OptionStore>, user: SiteUser) -> Self {
        let settings = GlobalSettings::from_stored(options.get_option(SETTINGS_OPTION).as_ref());
        let shopper = user.shopper();
        RequestScope {
            options,
            user,
            shopper,
            settings,
            table: OnceCell::new(),
            format: PriceFormat::default(),
        }
    }

    pub fn with_format(mut self, format: PriceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn user(&self) -> &SiteUser {
        &self.user
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    /// Whether the rule table has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }

    /// The rule table, loaded from the store on first use.
    pub fn rules(&self) -> &RuleTable {
        self.table.get_or_init(|| {
            let table = RuleTable::from_stored(self.options.get_option(RULES_OPTION).as_ref());
            let stats = table.get_table_stats();
            debug!(
                "Loaded {} active rules for user {} ({} stored, {} invalid, {} disabled)",
                stats.active, self.user.id, stats.stored, stats.invalid, stats.disabled
            );
            table
        })
    }

    fn outcome(&self, facet: PriceFacet, product: &CatalogProduct) -> PriceOutcome {
        if !self.settings.is_enabled() {
            return PriceOutcome::Unchanged;
        }
        PricingEngine::new(self.rules(), &self.settings)
            .with_format(self.format.clone())
            .price_for(facet, product, Some(&self.shopper))
    }

    pub fn price_outcome(&self, product: &CatalogProduct) -> PriceOutcome {
        self.outcome(PriceFacet::Final, product)
    }

    pub fn regular_price_outcome(&self, product: &CatalogProduct) -> PriceOutcome {
        self.outcome(PriceFacet::Regular, product)
    }

    pub fn sale_price_outcome(&self, product: &CatalogProduct) -> PriceOutcome {
        self.outcome(PriceFacet::Sale, product)
    }

    /// Filters the product's effective price.
    pub fn filter_price(&self, original: &str, product: &CatalogProduct) -> String {
        self.price_outcome(product).resolve(original)
    }

    pub fn filter_regular_price(&self, original: &str, product: &CatalogProduct) -> String {
        self.regular_price_outcome(product).resolve(original)
    }

    pub fn filter_sale_price(&self, original: &str, product: &CatalogProduct) -> String {
        self.sale_price_outcome(product).resolve(original)
    }
}
