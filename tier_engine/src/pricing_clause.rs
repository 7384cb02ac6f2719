// Pricing side of a rule: how a matched product's price is derived from
// its cost, and which of the three price facets the result replaces.

use serde::{Deserialize, Serialize};

// ============================================================================
// ENUMS
// ============================================================================

/// Margin kind applied on top of cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    /// `cost × (1 + value / 100)`
    #[default]
    Percent,
    /// `cost + value`
    Fixed,
}

impl PricingType {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "percent" => Some(PricingType::Percent),
            "fixed" => Some(PricingType::Fixed),
            _ => None,
        }
    }
}

/// Whole-unit rounding applied after the margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    #[default]
    None,
    Up,
    Down,
    /// Half away from zero.
    Nearest,
}

impl Rounding {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "none" => Some(Rounding::None),
            "up" => Some(Rounding::Up),
            "down" => Some(Rounding::Down),
            "nearest" => Some(Rounding::Nearest),
            _ => None,
        }
    }

    pub fn apply(self, amount: f64) -> f64 {
        match self {
            Rounding::None => amount,
            Rounding::Up => amount.ceil(),
            Rounding::Down => amount.floor(),
            Rounding::Nearest => amount.round(),
        }
    }
}

/// One of the three price accessors a product exposes. Used both as the
/// context of a price lookup and as a rule's `apply_to` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceFacet {
    Regular,
    Sale,
    /// The effective price shown and charged.
    #[default]
    Final,
}

impl PriceFacet {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "regular" => Some(PriceFacet::Regular),
            "sale" => Some(PriceFacet::Sale),
            "final" => Some(PriceFacet::Final),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceFacet::Regular => "regular",
            PriceFacet::Sale => "sale",
            PriceFacet::Final => "final",
        }
    }
}

impl std::fmt::Display for PriceFacet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PRICING CLAUSE
// ============================================================================

/// Formula, rounding, clamps and target facet of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingClause {
    #[serde(rename = "type")]
    pub kind: PricingType,
    pub value: f64,
    pub rounding: Rounding,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub apply_to: PriceFacet,
}

impl Default for PricingClause {
    fn default() -> Self {
        PricingClause {
            kind: PricingType::Percent,
            value: 0.0,
            rounding: Rounding::None,
            min_price: None,
            max_price: None,
            apply_to: PriceFacet::Final,
        }
    }
}

impl PricingClause {
    pub fn percent(value: f64) -> Self {
        PricingClause {
            kind: PricingType::Percent,
            value,
            ..Self::default()
        }
    }

    pub fn fixed(value: f64) -> Self {
        PricingClause {
            kind: PricingType::Fixed,
            value,
            ..Self::default()
        }
    }

    pub fn with_rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min_price = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max_price = Some(max);
        self
    }

    pub fn applied_to(mut self, facet: PriceFacet) -> Self {
        self.apply_to = facet;
        self
    }

    /// Whether this clause writes the price requested under `context`.
    ///
    /// Sale-targeted clauses never drive the final price; the final
    /// accessor reads the sale field through instead.
    pub fn targets(&self, context: PriceFacet) -> bool {
        match (self.apply_to, context) {
            (PriceFacet::Sale, PriceFacet::Final) => false,
            (PriceFacet::Final, _) => true,
            (target, ctx) => target == ctx,
        }
    }

    /// Margin, rounding, then the min bound followed by the max bound.
    /// When both bounds are set and inverted the max bound wins.
    pub fn compute(&self, cost: f64) -> f64 {
        let mut price = match self.kind {
            PricingType::Percent => cost * (1.0 + self.value / 100.0),
            PricingType::Fixed => cost + self.value,
        };

        price = self.rounding.apply(price);

        if let Some(min) = self.min_price {
            price = price.max(min);
        }
        if let Some(max) = self.max_price {
            price = price.min(max);
        }

        price
    }
}

// ============================================================================
// CANONICAL DECIMAL FORMAT
// ============================================================================

/// Canonical decimal representation handed back to the storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceFormat {
    /// Significant digits kept before trimming, like the host's float to
    /// string cast. Absorbs float noise such as `114.99999999999999`.
    pub significant_digits: usize,
    /// Strip trailing zeros and a dangling decimal point.
    pub trim_zeros: bool,
}

impl Default for PriceFormat {
    fn default() -> Self {
        PriceFormat {
            significant_digits: 14,
            trim_zeros: true,
        }
    }
}

impl PriceFormat {
    fn decimals_for(&self, amount: f64) -> usize {
        if amount == 0.0 || !amount.is_finite() {
            return 0;
        }
        let magnitude = amount.abs().log10().floor() as i64;
        (self.significant_digits.max(1) as i64 - 1 - magnitude).clamp(0, 30) as usize
    }

    pub fn format(&self, amount: f64) -> String {
        let mut out = format!("{:.*}", self.decimals_for(amount), amount);
        if self.trim_zeros && out.contains('.') {
            let trimmed_len = out.trim_end_matches('0').trim_end_matches('.').len();
            out.truncate(trimmed_len);
        }
        if out.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
            out = out.trim_start_matches('-').to_string();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_margin() {
        assert_eq!(PricingClause::percent(20.0).compute(100.0), 120.0);
    }

    #[test]
    fn test_fixed_margin() {
        assert_eq!(PricingClause::fixed(7.5).compute(10.0), 17.5);
    }

    #[test]
    fn test_rounding_modes() {
        let base = PricingClause::fixed(0.5);
        assert_eq!(base.clone().with_rounding(Rounding::Up).compute(10.1), 11.0);
        assert_eq!(base.clone().with_rounding(Rounding::Down).compute(10.1), 10.0);
        assert_eq!(base.clone().with_rounding(Rounding::Nearest).compute(10.0), 11.0);
        assert_eq!(base.with_rounding(Rounding::None).compute(10.0), 10.5);
    }

    #[test]
    fn test_percent_rounding_up_stays_whole() {
        let clause = PricingClause::percent(15.0).with_rounding(Rounding::Up);
        assert_eq!(clause.compute(100.0), 115.0);
    }

    #[test]
    fn test_clamps() {
        let clause = PricingClause::percent(15.0)
            .with_rounding(Rounding::Up)
            .with_min(150.0);
        assert_eq!(clause.compute(100.0), 150.0);

        let capped = PricingClause::percent(50.0).with_max(120.0);
        assert_eq!(capped.compute(100.0), 120.0);

        let inverted = PricingClause::percent(0.0).with_min(200.0).with_max(180.0);
        assert_eq!(inverted.compute(100.0), 180.0);
    }

    #[test]
    fn test_targets() {
        let final_clause = PricingClause::default();
        assert!(final_clause.targets(PriceFacet::Regular));
        assert!(final_clause.targets(PriceFacet::Sale));
        assert!(final_clause.targets(PriceFacet::Final));

        let sale = PricingClause::default().applied_to(PriceFacet::Sale);
        assert!(sale.targets(PriceFacet::Sale));
        assert!(!sale.targets(PriceFacet::Final));
        assert!(!sale.targets(PriceFacet::Regular));

        let regular = PricingClause::default().applied_to(PriceFacet::Regular);
        assert!(regular.targets(PriceFacet::Regular));
        assert!(!regular.targets(PriceFacet::Final));
    }

    #[test]
    fn test_format() {
        let fmt = PriceFormat::default();
        assert_eq!(fmt.format(120.0), "120");
        assert_eq!(fmt.format(115.5), "115.5");
        assert_eq!(fmt.format(114.99999999999999), "115");
        assert_eq!(fmt.format(0.1 + 0.2), "0.3");
        assert_eq!(fmt.format(-0.0), "0");
        assert_eq!(fmt.format(99.99999999999999), "100");
    }

    #[test]
    fn test_format_keeps_fourteen_significant_digits() {
        let fmt = PriceFormat::default();
        assert_eq!(fmt.format(12.3456789), "12.3456789");
        assert_eq!(fmt.format(0.000123456), "0.000123456");
        assert_eq!(fmt.format(1234567.891), "1234567.891");
        assert_eq!(fmt.format(-2.5), "-2.5");
    }

    #[test]
    fn test_clause_serializes_in_stored_shape() {
        let json = serde_json::to_value(PricingClause::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "percent",
                "value": 0.0,
                "rounding": "none",
                "min_price": null,
                "max_price": null,
                "apply_to": "final"
            })
        );
    }
}
