pub mod coerce;
pub mod rule_metadata;
pub mod match_clause;
pub mod pricing_clause;
pub mod rule_bundle;
pub mod sanitize;
pub mod settings;
pub mod rule_table;
pub mod engine;

pub use rule_metadata::{
    ProductId, RuleId, TermId, UserId, CATEGORY_TAXONOMY, TAG_TAXONOMY,
};

pub use match_clause::{
    has_term, AttributeFilter, ProductCondition, ProductScope, ProductView, Shopper,
    UserCondition, UserScope,
};

pub use pricing_clause::{PriceFacet, PriceFormat, PricingClause, PricingType, Rounding};

pub use rule_bundle::{
    ParseError,             // Stored JSON errors
    Rule,                   // Complete rule definition
    RuleParser,             // JSON parsing/serialization
    RuleValidator,          // Settings-page report
    ValidationError,        // Validation error types
    ValidationResult,       // Validation outcome
    ValidationWarning,      // Validation warning types
    DEFAULT_PRIORITY,
};

pub use sanitize::{rule_defaults, sanitize_rule, sanitize_rule_value};

pub use settings::{FallbackMode, GlobalSettings, DEFAULT_COST_META_KEY};

pub use rule_table::{RuleTable, TableStats};

pub use engine::{PriceOutcome, PricingEngine};
