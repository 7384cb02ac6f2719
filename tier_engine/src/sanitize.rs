// Normalisation of untrusted rule records.
//
// Everything that reaches the rule table, the admin form or the JSON API
// passes through `sanitize_rule`: the input is merged over the defaults
// template and then every field is coerced to its declared type. The
// function never fails, and running it on its own output is a no-op.

use log::debug;
use serde_json::{json, Map, Value};

use crate::coerce::{
    scalar_to_string, sanitize_key, sanitize_text_field, to_float, to_int, to_list, truthy,
};
use crate::match_clause::{AttributeFilter, ProductCondition, ProductScope, UserCondition, UserScope};
use crate::pricing_clause::{PriceFacet, PricingClause, PricingType, Rounding};
use crate::rule_bundle::Rule;
use crate::rule_metadata::{ProductId, RuleId, TermId, UserId};

/// The blank rule as JSON, in stored field order.
pub fn rule_defaults() -> Value {
    json!({
        "id": "",
        "name": "",
        "enabled": true,
        "priority": 10,
        "products": {
            "type": "all",
            "products": [],
            "categories": [],
            "tags": [],
            "attribute": { "taxonomy": "", "terms": [] }
        },
        "users": {
            "type": "all",
            "roles": [],
            "users": []
        },
        "pricing": {
            "type": "percent",
            "value": 0,
            "rounding": "none",
            "min_price": null,
            "max_price": null,
            "apply_to": "final"
        }
    })
}

/// Merges `input` over `base`. Maps merge key by key, lists merge index
/// by index, any other value replaces what was there.
fn merge_over(base: &mut Value, input: Value) {
    match (base, input) {
        (Value::Object(base_map), Value::Object(input_map)) => {
            for (key, value) in input_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_over(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base_items), Value::Array(input_items)) => {
            for (idx, value) in input_items.into_iter().enumerate() {
                match base_items.get_mut(idx) {
                    Some(slot) => merge_over(slot, value),
                    None => base_items.push(value),
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Reads a nested block, falling back to an empty map when the merged
/// value at `key` was replaced by something that is not a map.
fn block<'a>(parent: &'a Map<String, Value>, key: &str, empty: &'a Map<String, Value>) -> &'a Map<String, Value> {
    parent.get(key).and_then(Value::as_object).unwrap_or(empty)
}

static NULL: Value = Value::Null;

fn field<'a>(map: &'a Map<String, Value>, key: &str) -> &'a Value {
    map.get(key).unwrap_or(&NULL)
}

fn int_list(value: &Value) -> Vec<i64> {
    to_list(value).iter().map(to_int).collect()
}

fn optional_bound(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(to_float(other)),
    }
}

/// Coerces an arbitrary value into a well-formed rule.
pub fn sanitize_rule(input: Value) -> Rule {
    let mut merged = rule_defaults();
    match input {
        Value::Object(_) => merge_over(&mut merged, input),
        other => debug!("Treating non-map rule input ({}) as empty", other),
    }

    let empty = Map::new();
    let root = merged.as_object().unwrap_or(&empty);

    // Blocks that were overwritten with a scalar fall back to their defaults.
    let defaults = rule_defaults();
    let default_root = defaults.as_object().unwrap_or(&empty);
    let products = merged_block(root, default_root, "products", &empty);
    let users = merged_block(root, default_root, "users", &empty);
    let pricing = merged_block(root, default_root, "pricing", &empty);

    let default_products = block(default_root, "products", &empty);
    let attribute = match products.get("attribute").and_then(Value::as_object) {
        Some(map) => map,
        None => block(default_products, "attribute", &empty),
    };

    Rule {
        id: RuleId::new(scalar_to_string(field(root, "id")).unwrap_or_default()),
        name: sanitize_text_field(field(root, "name")),
        enabled: truthy(field(root, "enabled")),
        priority: to_int(field(root, "priority")),
        products: ProductCondition {
            scope: ProductScope::from_key(&sanitize_key(field(products, "type"))),
            products: int_list(field(products, "products")).into_iter().map(ProductId).collect(),
            categories: int_list(field(products, "categories")).into_iter().map(TermId).collect(),
            tags: int_list(field(products, "tags")).into_iter().map(TermId).collect(),
            attribute: AttributeFilter {
                taxonomy: sanitize_key(field(attribute, "taxonomy")),
                terms: int_list(field(attribute, "terms")).into_iter().map(TermId).collect(),
            },
        },
        users: UserCondition {
            scope: UserScope::from_key(&sanitize_key(field(users, "type"))),
            roles: to_list(field(users, "roles")).iter().map(sanitize_key).collect(),
            users: int_list(field(users, "users")).into_iter().map(UserId).collect(),
        },
        pricing: PricingClause {
            kind: field(pricing, "type")
                .as_str()
                .and_then(PricingType::from_key)
                .unwrap_or_default(),
            value: to_float(field(pricing, "value")),
            rounding: field(pricing, "rounding")
                .as_str()
                .and_then(Rounding::from_key)
                .unwrap_or_default(),
            min_price: optional_bound(field(pricing, "min_price")),
            max_price: optional_bound(field(pricing, "max_price")),
            apply_to: field(pricing, "apply_to")
                .as_str()
                .and_then(PriceFacet::from_key)
                .unwrap_or_default(),
        },
    }
}

fn merged_block<'a>(
    root: &'a Map<String, Value>,
    default_root: &'a Map<String, Value>,
    key: &str,
    empty: &'a Map<String, Value>,
) -> &'a Map<String, Value> {
    match root.get(key).and_then(Value::as_object) {
        Some(map) => map,
        None => block(default_root, key, empty),
    }
}

/// Sanitizes and serializes back to the stored shape.
pub fn sanitize_rule_value(input: Value) -> Value {
    sanitize_rule(input).to_value()
}
