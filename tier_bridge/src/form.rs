//! Admin form bodies: `application/x-www-form-urlencoded` pairs with
//! bracketed keys (`pricetier_rules[0][products][tags][]=3`) folded into a
//! nested JSON value. Every leaf is a string.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("Malformed form body: {0}")]
    Decode(#[from] serde_urlencoded::de::Error),
}

/// Decodes a form body into a nested value.
pub fn parse_form(body: &str) -> Result<Value, FormError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body)?;
    Ok(nest_pairs(pairs))
}

/// Folds decoded pairs into a nested value. Later pairs overwrite earlier
/// ones at the same path; `[]` appends.
pub fn nest_pairs<I>(pairs: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut root = Map::new();
    for (key, value) in pairs {
        let path = split_key(&key);
        if path.is_empty() {
            continue;
        }
        insert_path(&mut root, &path, Value::String(value));
    }
    Value::Object(root)
}

/// One step in a bracketed key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Append,
}

/// `a[b][]` becomes `[Key(a), Key(b), Append]`. A key whose brackets do
/// not close is taken literally.
fn split_key(raw: &str) -> Vec<Segment> {
    let (head, mut rest) = match raw.find('[') {
        Some(idx) if idx > 0 => (&raw[..idx], &raw[idx..]),
        _ => return if raw.is_empty() { Vec::new() } else { vec![Segment::Key(raw.to_string())] },
    };

    let mut path = vec![Segment::Key(head.to_string())];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = match stripped.find(']') {
            Some(close) => close,
            None => return vec![Segment::Key(raw.to_string())],
        };
        let inner = &stripped[..close];
        path.push(if inner.is_empty() {
            Segment::Append
        } else {
            Segment::Key(inner.to_string())
        });
        rest = &stripped[close + 1..];
    }
    path
}

fn next_index(map: &Map<String, Value>) -> String {
    map.keys()
        .filter_map(|k| k.parse::<i64>().ok())
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
        .to_string()
}

fn insert_path(map: &mut Map<String, Value>, path: &[Segment], value: Value) {
    let key = match &path[0] {
        Segment::Key(key) => key.clone(),
        Segment::Append => next_index(map),
    };

    if path.len() == 1 {
        map.insert(key, value);
        return;
    }

    let slot = map.entry(key).or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(child) = slot {
        insert_path(child, &path[1..], value);
    }
}

/// Removes one level of backslash escaping from every string.
pub fn unslash(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(strip_slashes(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(unslash).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, unslash(v))).collect()),
        other => other,
    }
}

fn strip_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('\0'),
            Some(next) => out.push(next),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_and_nested_keys() {
        let form = parse_form(
            "pricetier_nonce=abc&pricetier_settings%5Benabled%5D=1\
             &pricetier_rules%5B0%5D%5Bname%5D=Gold+tier\
             &pricetier_rules%5B0%5D%5Bproducts%5D%5Btags%5D%5B%5D=3\
             &pricetier_rules%5B0%5D%5Bproducts%5D%5Btags%5D%5B%5D=4",
        )
        .unwrap();

        assert_eq!(form["pricetier_nonce"], json!("abc"));
        assert_eq!(form["pricetier_settings"]["enabled"], json!("1"));
        assert_eq!(form["pricetier_rules"]["0"]["name"], json!("Gold tier"));
        assert_eq!(
            form["pricetier_rules"]["0"]["products"]["tags"],
            json!({"0": "3", "1": "4"})
        );
    }

    #[test]
    fn test_rule_order_is_submission_order() {
        let form = parse_form("r[5][name]=a&r[new][name]=b&r[2][name]=c").unwrap();
        let keys: Vec<&String> = form["r"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["5", "new", "2"]);
    }

    #[test]
    fn test_unbalanced_brackets_are_literal() {
        let form = parse_form("a[b=1&=2").unwrap();
        assert_eq!(form, json!({"a[b": "1"}));
    }

    #[test]
    fn test_scalar_replaced_by_nested_value() {
        let form = parse_form("a=1&a[b]=2").unwrap();
        assert_eq!(form, json!({"a": {"b": "2"}}));
    }

    #[test]
    fn test_unslash() {
        let value = json!({"name": "O\\'Brien \\\\ co", "list": ["a\\\"b"]});
        assert_eq!(
            unslash(value),
            json!({"name": "O'Brien \\ co", "list": ["a\"b"]})
        );
    }
}
