// Cost-based price calculation over a built rule table.
//
// The engine answers the three storefront price accessors (regular, sale,
// final) for one product and one acting user. It never fails: every
// problem on the way (no rule, no cost, plugin switched off) resolves to
// the price the storefront already had.

use log::debug;

use crate::coerce::parse_numeric;
use crate::match_clause::{ProductView, Shopper};
use crate::pricing_clause::{PriceFacet, PriceFormat};
use crate::rule_table::RuleTable;
use crate::rule_metadata::RuleId;
use crate::settings::GlobalSettings;

// ============================================================================
// OUTCOME
// ============================================================================

/// What a price accessor decided.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceOutcome {
    /// Keep the storefront's own price.
    Unchanged,
    /// A rule computed a new price from cost.
    Adjusted {
        rule_id: RuleId,
        amount: f64,
        formatted: String,
    },
    /// A sale-targeted rule matched, so the final price is the product's
    /// sale field. `None` when the product has no sale price.
    SaleReadThrough {
        rule_id: RuleId,
        sale_price: Option<String>,
    },
}

impl PriceOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, PriceOutcome::Unchanged)
    }

    /// The price string handed back to the storefront.
    pub fn resolve(self, original: &str) -> String {
        match self {
            PriceOutcome::Unchanged => original.to_string(),
            PriceOutcome::Adjusted { formatted, .. } => formatted,
            PriceOutcome::SaleReadThrough { sale_price, .. } => {
                sale_price.unwrap_or_else(|| original.to_string())
            }
        }
    }

    pub fn rule_id(&self) -> Option<&RuleId> {
        match self {
            PriceOutcome::Unchanged => None,
            PriceOutcome::Adjusted { rule_id, .. } | PriceOutcome::SaleReadThrough { rule_id, .. } => {
                Some(rule_id)
            }
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Borrowed view of everything a price lookup needs.
pub struct PricingEngine<'a> {
    table: &'a RuleTable,
    settings: &'a GlobalSettings,
    format: PriceFormat,
    cost_key: String,
}

impl<'a> PricingEngine<'a> {
    pub fn new(table: &'a RuleTable, settings: &'a GlobalSettings) -> Self {
        PricingEngine {
            table,
            settings,
            format: PriceFormat::default(),
            cost_key: settings.cost_meta_key(),
        }
    }

    pub fn with_format(mut self, format: PriceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn table(&self) -> &RuleTable {
        self.table
    }

    /// Reads the cost meta as a number. Missing, empty-keyed or
    /// non-numeric values give `None`.
    pub fn read_cost<P: ProductView + ?Sized>(&self, product: &P) -> Option<f64> {
        if self.cost_key.is_empty() {
            return None;
        }
        let raw = product.meta_value(&self.cost_key)?;
        parse_numeric(&raw)
    }

    /// Runs the matching rules for `context` and prices the product with
    /// the first one that targets it.
    pub fn apply_pricing<P: ProductView + ?Sized>(
        &self,
        product: &P,
        user: Option<&Shopper>,
        context: PriceFacet,
    ) -> PriceOutcome {
        if !self.settings.is_enabled() {
            return PriceOutcome::Unchanged;
        }

        for rule in self.table.matching(product, user) {
            if !rule.pricing.targets(context) {
                continue;
            }

            let cost = match self.read_cost(product) {
                Some(cost) => cost,
                None => {
                    debug!(
                        "Rule {} matched product {} but no numeric cost under '{}'",
                        rule.id,
                        product.product_id(),
                        self.cost_key
                    );
                    return PriceOutcome::Unchanged;
                }
            };

            let amount = rule.pricing.compute(cost);
            debug!(
                "Rule {} priced product {} ({}) at {} from cost {}",
                rule.id,
                product.product_id(),
                context,
                amount,
                cost
            );
            return PriceOutcome::Adjusted {
                rule_id: rule.id.clone(),
                amount,
                formatted: self.format.format(amount),
            };
        }

        PriceOutcome::Unchanged
    }

    /// The effective price. When any matching rule targets the sale
    /// price, the sale field is read through; otherwise this is the
    /// calculation for `final`.
    pub fn final_price<P: ProductView + ?Sized>(&self, product: &P, user: Option<&Shopper>) -> PriceOutcome {
        if !self.settings.is_enabled() {
            return PriceOutcome::Unchanged;
        }

        let sale_rule = self
            .table
            .matching(product, user)
            .find(|rule| rule.pricing.apply_to == PriceFacet::Sale);
        if let Some(rule) = sale_rule {
            let sale_price = product.sale_price().filter(|s| !s.is_empty());
            return PriceOutcome::SaleReadThrough {
                rule_id: rule.id.clone(),
                sale_price,
            };
        }

        self.apply_pricing(product, user, PriceFacet::Final)
    }

    pub fn regular_price<P: ProductView + ?Sized>(&self, product: &P, user: Option<&Shopper>) -> PriceOutcome {
        self.apply_pricing(product, user, PriceFacet::Regular)
    }

    pub fn sale_price<P: ProductView + ?Sized>(&self, product: &P, user: Option<&Shopper>) -> PriceOutcome {
        self.apply_pricing(product, user, PriceFacet::Sale)
    }

    /// Dispatches on the accessor being filtered.
    pub fn price_for<P: ProductView + ?Sized>(
        &self,
        facet: PriceFacet,
        product: &P,
        user: Option<&Shopper>,
    ) -> PriceOutcome {
        match facet {
            PriceFacet::Final => self.final_price(product, user),
            PriceFacet::Regular => self.regular_price(product, user),
            PriceFacet::Sale => self.sale_price(product, user),
        }
    }
}
