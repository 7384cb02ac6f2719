// Ordered, request-scoped view of the stored rule list.
//
// Design Principles:
// 1. Built once per request from the raw stored value and then read-only
// 2. Only valid, enabled rules are kept
// 3. Ascending priority, ties keep their stored order
//
// The table owns plain rules; callers that need to share it across
// threads wrap it in an Arc themselves.

use log::{debug, warn};
use serde_json::Value;

use crate::coerce::{json_kind, to_list};
use crate::match_clause::{ProductView, Shopper};
use crate::rule_bundle::Rule;
use crate::rule_metadata::RuleId;
use crate::sanitize::sanitize_rule;

// ============================================================================
// Table
// ============================================================================

/// Active rules in evaluation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    rules: Vec<Rule>,
    stats: TableStats,
}

impl RuleTable {
    /// Empty table; nothing ever matches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from the stored rules option. A keyed map is read
    /// by its values in stored order; a missing or scalar value yields an
    /// empty table.
    pub fn from_stored(stored: Option<&Value>) -> Self {
        match stored {
            Some(value @ (Value::Array(_) | Value::Object(_))) => {
                Self::from_rules(to_list(value).into_iter().map(sanitize_rule))
            }
            Some(Value::Null) | None => Self::new(),
            Some(other) => {
                warn!("Stored rules are not a list ({}), ignoring them", json_kind(other));
                Self::new()
            }
        }
    }

    /// Builds the table from already-typed rules.
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut stats = TableStats::default();
        let mut active = Vec::new();

        for rule in rules {
            stats.stored += 1;
            if !rule.is_valid() {
                stats.invalid += 1;
                debug!("Dropping invalid rule '{}' ({})", rule.name, rule.id);
                continue;
            }
            if !rule.enabled {
                stats.disabled += 1;
                continue;
            }
            active.push(rule);
        }

        // stable: equal priorities keep stored order
        active.sort_by_key(|r| r.priority);
        stats.active = active.len();

        RuleTable { rules: active, stats }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All active rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get_rule(&self, rule_id: &RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| &r.id == rule_id)
    }

    /// Rules applying to this product and user, in evaluation order.
    pub fn matching<'a, P: ProductView + ?Sized + 'a>(
        &'a self,
        product: &'a P,
        user: Option<&'a Shopper>,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules.iter().filter(move |r| r.applies_to(product, user))
    }

    /// The rule that wins for this product and user.
    pub fn first_match<P: ProductView + ?Sized>(&self, product: &P, user: Option<&Shopper>) -> Option<&Rule> {
        self.rules.iter().find(|r| r.applies_to(product, user))
    }

    pub fn list_rule_ids(&self) -> Vec<RuleId> {
        self.rules.iter().map(|r| r.id.clone()).collect()
    }

    pub fn get_table_stats(&self) -> TableStats {
        self.stats.clone()
    }
}

/// Counts taken while building a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Entries in the stored list.
    pub stored: usize,
    pub invalid: usize,
    pub disabled: usize,
    /// Entries kept in the table.
    pub active: usize,
}
