// Rule records and the admin-facing checks run over a list of them.
// This module provides:
// 1. Rule, the unit stored in the rules option
// 2. Parsing and serialization of the stored rule list
// 3. RuleValidator, a report of errors and warnings for the settings page

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::coerce::{json_kind, to_list};
use crate::match_clause::{ProductCondition, ProductScope, ProductView, Shopper, UserCondition, UserScope};
use crate::pricing_clause::PricingClause;
use crate::rule_metadata::RuleId;
use crate::sanitize::sanitize_rule;

/// Default priority for new rules.
pub const DEFAULT_PRIORITY: i64 = 10;

// ============================================================================
// RULE
// ============================================================================

/// One pricing rule: conditions plus the pricing formula they unlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    /// Lower runs first.
    pub priority: i64,
    pub products: ProductCondition,
    pub users: UserCondition,
    pub pricing: PricingClause,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: RuleId::default(),
            name: String::new(),
            enabled: true,
            priority: DEFAULT_PRIORITY,
            products: ProductCondition::default(),
            users: UserCondition::default(),
            pricing: PricingClause::default(),
        }
    }
}

impl Rule {
    pub fn new(name: impl Into<String>, pricing: PricingClause) -> Self {
        Rule {
            id: RuleId::generate(),
            name: name.into(),
            pricing,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<RuleId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_products(mut self, products: ProductCondition) -> Self {
        self.products = products;
        self
    }

    pub fn with_users(mut self, users: UserCondition) -> Self {
        self.users = users;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// A rule takes part in pricing only with a name and a non-negative value.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && self.pricing.value >= 0.0
    }

    /// User condition first, product condition only when the user matched.
    pub fn applies_to<P: ProductView + ?Sized>(&self, product: &P, user: Option<&Shopper>) -> bool {
        self.users.matches(user) && self.products.matches(product)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Reads and writes the stored rule list.
pub struct RuleParser;

impl RuleParser {
    /// Parses a stored rule list. Every entry goes through sanitation, so
    /// only the outer shape can fail.
    pub fn from_json(json: &str) -> Result<Vec<Rule>, ParseError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ParseError::JsonParseError(e.to_string()))?;
        Self::from_value(value)
    }

    /// A keyed map is read by its values in stored order.
    pub fn from_value(value: Value) -> Result<Vec<Rule>, ParseError> {
        match value {
            Value::Array(_) | Value::Object(_) => {
                Ok(to_list(&value).into_iter().map(sanitize_rule).collect())
            }
            other => Err(ParseError::InvalidFormat(format!(
                "expected a list of rules, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn to_json(rules: &[Rule]) -> Result<String, ParseError> {
        serde_json::to_string_pretty(rules).map_err(|e| ParseError::SerializationError(e.to_string()))
    }

    pub fn to_value(rules: &[Rule]) -> Result<Value, ParseError> {
        serde_json::to_value(rules).map_err(|e| ParseError::SerializationError(e.to_string()))
    }
}

/// Parse Errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// VALIDATION REPORT
// ============================================================================

/// Validation result with errors and warnings
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// Problems that keep a rule out of pricing.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Rule #{position} has no name")]
    EmptyName { position: usize, rule_id: String },

    #[error("Rule {rule_id} has a negative value {value}")]
    NegativeValue { rule_id: String, value: f64 },
}

/// Suspicious but harmless configurations.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// Enabled rules sharing a priority run in list order.
    DuplicatePriority {
        rule_id1: String,
        rule_id2: String,
        priority: i64,
    },
    /// The max clamp wins over the min clamp.
    InvertedBounds { rule_id: String, min: f64, max: f64 },
    /// Restricted scope with nothing selected.
    EmptySelection { rule_id: String, scope: String },
    AttributeWithoutTaxonomy { rule_id: String },
}

/// Builds the settings-page report for a rule list.
pub struct RuleValidator {
    check_priorities: bool,
}

impl RuleValidator {
    pub fn new() -> Self {
        Self { check_priorities: true }
    }

    pub fn check_priorities(mut self, check: bool) -> Self {
        self.check_priorities = check;
        self
    }

    pub fn validate(&self, rules: &[Rule]) -> ValidationResult {
        let mut result = ValidationResult::valid();

        self.validate_rules(rules, &mut result);
        if self.check_priorities {
            self.validate_priorities(rules, &mut result);
        }
        self.validate_conditions(rules, &mut result);

        result
    }

    fn validate_rules(&self, rules: &[Rule], result: &mut ValidationResult) {
        for (position, rule) in rules.iter().enumerate() {
            if rule.name.is_empty() {
                result.add_error(ValidationError::EmptyName {
                    position: position + 1,
                    rule_id: rule.id.to_string(),
                });
            }
            if rule.pricing.value < 0.0 {
                result.add_error(ValidationError::NegativeValue {
                    rule_id: rule.id.to_string(),
                    value: rule.pricing.value,
                });
            }
            if let (Some(min), Some(max)) = (rule.pricing.min_price, rule.pricing.max_price) {
                if min > max {
                    result.add_warning(ValidationWarning::InvertedBounds {
                        rule_id: rule.id.to_string(),
                        min,
                        max,
                    });
                }
            }
        }
    }

    fn validate_priorities(&self, rules: &[Rule], result: &mut ValidationResult) {
        let mut priority_map: BTreeMap<i64, Vec<String>> = BTreeMap::new();

        for rule in rules.iter().filter(|r| r.enabled) {
            priority_map
                .entry(rule.priority)
                .or_default()
                .push(rule.id.to_string());
        }

        for (priority, rule_ids) in priority_map {
            for pair in rule_ids.windows(2) {
                result.add_warning(ValidationWarning::DuplicatePriority {
                    rule_id1: pair[0].clone(),
                    rule_id2: pair[1].clone(),
                    priority,
                });
            }
        }
    }

    fn validate_conditions(&self, rules: &[Rule], result: &mut ValidationResult) {
        for rule in rules {
            let rule_id = rule.id.to_string();

            if rule.products.scope == ProductScope::Attribute && rule.products.attribute.taxonomy.is_empty() {
                result.add_warning(ValidationWarning::AttributeWithoutTaxonomy {
                    rule_id: rule_id.clone(),
                });
            } else if rule.products.selected_len() == Some(0) {
                result.add_warning(ValidationWarning::EmptySelection {
                    rule_id: rule_id.clone(),
                    scope: rule.products.scope.as_str().to_string(),
                });
            }

            let empty_users = match rule.users.scope {
                UserScope::Roles => rule.users.roles.is_empty(),
                UserScope::Users => rule.users.users.is_empty(),
                _ => false,
            };
            if empty_users {
                result.add_warning(ValidationWarning::EmptySelection {
                    rule_id,
                    scope: rule.users.scope.as_str().to_string(),
                });
            }
        }
    }
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_clause::tests::TestProduct;
    use crate::rule_metadata::{ProductId, UserId};
    use serde_json::json;

    fn named(id: &str, priority: i64) -> Rule {
        Rule::new(format!("Rule {}", id), PricingClause::percent(10.0))
            .with_id(id)
            .with_priority(priority)
    }

    #[test]
    fn test_default_rule_shape() {
        let value = Rule::default().to_value();
        assert_eq!(value["enabled"], json!(true));
        assert_eq!(value["priority"], json!(10));
        assert_eq!(value["products"]["type"], json!("all"));
        assert_eq!(value["products"]["attribute"]["taxonomy"], json!(""));
        assert_eq!(value["users"]["type"], json!("all"));
        assert_eq!(value["pricing"]["apply_to"], json!("final"));
    }

    #[test]
    fn test_validity() {
        assert!(!Rule::default().is_valid());
        assert!(named("a", 1).is_valid());
        assert!(Rule::new("zero", PricingClause::fixed(0.0)).is_valid());
        assert!(!Rule::new("neg", PricingClause::fixed(-1.0)).is_valid());
    }

    #[test]
    fn test_applies_to_checks_user_first() {
        let shopper = Shopper::new(UserId(3), ["customer"]);
        let product = TestProduct::new(5);
        let rule = named("a", 1)
            .with_users(UserCondition::for_roles(["customer"]))
            .with_products(ProductCondition::for_products([ProductId(5)]));

        assert!(rule.applies_to(&product, Some(&shopper)));
        assert!(!rule.applies_to(&product, None));
        assert!(!rule.applies_to(&TestProduct::new(6), Some(&shopper)));
    }

    #[test]
    fn test_parser_sanitizes_entries() {
        let rules = RuleParser::from_json(r#"[{"name":" <b>Gold</b> ","priority":"3x"}, 7]"#).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "Gold");
        assert_eq!(rules[0].priority, 3);
        assert_eq!(rules[1], Rule::default());
    }

    #[test]
    fn test_parser_reads_keyed_map() {
        let rules =
            RuleParser::from_json(r#"{"b":{"id":"b","name":"Second"},"a":{"id":"a","name":"First"}}"#).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, RuleId::new("b"));
        assert_eq!(rules[1].name, "First");
    }

    #[test]
    fn test_parser_rejects_non_list() {
        assert!(matches!(
            RuleParser::from_json(r#""rules""#),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(RuleParser::from_json("null"), Err(ParseError::InvalidFormat(_))));
        assert!(matches!(
            RuleParser::from_json("not json"),
            Err(ParseError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_parser_round_trip() {
        let rules = vec![named("a", 1), named("b", 2)];
        let json = RuleParser::to_json(&rules).unwrap();
        assert_eq!(RuleParser::from_json(&json).unwrap(), rules);
    }

    #[test]
    fn test_validator_errors() {
        let rules = vec![
            Rule::default().with_id("blank"),
            Rule::new("neg", PricingClause::fixed(-5.0)).with_id("neg"),
        ];
        let report = RuleValidator::new().validate(&rules);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(
            report.errors[0],
            ValidationError::EmptyName {
                position: 1,
                rule_id: "blank".to_string()
            }
        );
        assert!(report.errors[1].to_string().contains("negative"));
    }

    #[test]
    fn test_validator_warnings() {
        let mut inverted = named("c", 3);
        inverted.pricing = inverted.pricing.with_min(50.0).with_max(10.0);

        let rules = vec![
            named("a", 1),
            named("b", 1),
            named("off", 1).disabled(),
            inverted,
            named("d", 4).with_products(ProductCondition::for_tags(Vec::new())),
            named("e", 5).with_products(ProductCondition::for_attribute("", Vec::new())),
            named("f", 6).with_users(UserCondition::for_roles(Vec::<String>::new())),
        ];
        let report = RuleValidator::new().validate(&rules);

        assert!(report.valid);
        assert_eq!(
            report.warnings,
            vec![
                ValidationWarning::InvertedBounds {
                    rule_id: "c".to_string(),
                    min: 50.0,
                    max: 10.0
                },
                ValidationWarning::DuplicatePriority {
                    rule_id1: "a".to_string(),
                    rule_id2: "b".to_string(),
                    priority: 1
                },
                ValidationWarning::EmptySelection {
                    rule_id: "d".to_string(),
                    scope: "tags".to_string()
                },
                ValidationWarning::AttributeWithoutTaxonomy {
                    rule_id: "e".to_string()
                },
                ValidationWarning::EmptySelection {
                    rule_id: "f".to_string(),
                    scope: "roles".to_string()
                },
            ]
        );
    }
}
