// Loose value coercions used when normalising admin-submitted or stored
// rule data. Form posts deliver everything as strings, stored blobs may
// carry numbers, booleans or nulls in any field, so every reader goes
// through these helpers instead of trusting the declared type.

use serde_json::Value;

// ============================================================================
// TRUTHINESS & SCALARS
// ============================================================================

/// Host truthiness: `null`, `false`, `0`, `0.0`, `""`, `"0"` and empty
/// lists/maps are false, everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Renders a scalar the way the host's string cast does. Lists and maps
/// have no scalar form and yield `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some(String::new()),
        Value::Number(n) => Some(number_to_string(n)),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Name of the JSON type, for log lines.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn number_to_string(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => format!("{}", f),
        None => n.to_string(),
    }
}

/// Integer cast: numbers truncate, strings parse their leading numeric
/// prefix (`"12abc"` is 12, `"abc"` is 0), booleans are 0/1.
pub fn to_int(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(saturating_trunc))
            .unwrap_or(0),
        Value::String(s) => scan_number(trim_leading_space(s))
            .map(|(f, _)| saturating_trunc(f))
            .unwrap_or(0),
        Value::Array(items) => i64::from(!items.is_empty()),
        Value::Object(map) => i64::from(!map.is_empty()),
    }
}

/// Float cast with the same prefix rules as [`to_int`]. Non-finite results
/// collapse to zero so the value survives a JSON round trip.
pub fn to_float(value: &Value) -> f64 {
    let f = match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => scan_number(trim_leading_space(s))
            .map(|(f, _)| f)
            .unwrap_or(0.0),
        Value::Array(items) => f64::from(u8::from(!items.is_empty())),
        Value::Object(map) => f64::from(u8::from(!map.is_empty())),
    };
    if f.is_finite() {
        f
    } else {
        0.0
    }
}

fn saturating_trunc(f: f64) -> i64 {
    // `as` saturates at the i64 bounds and maps NaN to 0
    f.trunc() as i64
}

/// Array cast: `null` is empty, a list is itself, a map contributes its
/// values in order, any scalar becomes a one-element list.
pub fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::Object(map) => map.values().cloned().collect(),
        scalar => vec![scalar.clone()],
    }
}

// ============================================================================
// NUMERIC STRINGS
// ============================================================================

const HOST_SPACE: &[char] = &[' ', '\t', '\n', '\r', '\x0B', '\x0C'];

fn trim_leading_space(s: &str) -> &str {
    s.trim_start_matches(HOST_SPACE)
}

/// Scans the longest numeric literal at the start of `s`: optional sign,
/// digits with an optional fraction, optional exponent. Returns the value
/// and the number of bytes consumed.
fn scan_number(s: &str) -> Option<(f64, usize)> {
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    if i < len && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }

    let int_start = i;
    while i < len && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - int_start;

    let mut frac_digits = 0;
    if i < len && bytes[i] == b'.' {
        let mut k = i + 1;
        while k < len && bytes[k].is_ascii_digit() {
            k += 1;
        }
        frac_digits = k - (i + 1);
        if int_digits > 0 || frac_digits > 0 {
            i = k;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    if i < len && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut k = i + 1;
        if k < len && (bytes[k] == b'+' || bytes[k] == b'-') {
            k += 1;
        }
        let exp_start = k;
        while k < len && bytes[k].is_ascii_digit() {
            k += 1;
        }
        if k > exp_start {
            i = k;
        }
    }

    s[..i].parse::<f64>().ok().map(|f| (f, i))
}

/// Strict numeric check on a stored string: the whole value, give or take
/// surrounding whitespace, must be a decimal literal. Returns the parsed
/// number, never `inf` or `NaN`.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim_matches(HOST_SPACE);
    let (value, consumed) = scan_number(trimmed)?;
    if consumed == trimmed.len() && value.is_finite() {
        Some(value)
    } else {
        None
    }
}

// ============================================================================
// STRING SANITATION
// ============================================================================

/// Lowercases and keeps only `[a-z0-9_-]`. Non-scalars become empty.
pub fn sanitize_key(value: &Value) -> String {
    scalar_to_string(value)
        .map(|s| sanitize_key_str(&s))
        .unwrap_or_default()
}

pub fn sanitize_key_str(raw: &str) -> String {
    raw.chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

/// Single-line text field cleanup: tags stripped, whitespace runs
/// collapsed, percent-encoded octets removed, trimmed.
pub fn sanitize_text_field(value: &Value) -> String {
    scalar_to_string(value)
        .map(|s| sanitize_text_str(&s))
        .unwrap_or_default()
}

pub fn sanitize_text_str(raw: &str) -> String {
    let stripped = if raw.contains('<') {
        strip_tags(raw)
    } else {
        raw.to_string()
    };

    let mut filtered = collapse(&stripped, |c| matches!(c, '\r' | '\n' | '\t' | ' '));
    filtered = filtered.trim_matches(TRIM_SET).to_string();

    let mut found_octet = false;
    loop {
        let (next, removed) = remove_octets(&filtered);
        if !removed {
            break;
        }
        found_octet = true;
        filtered = next;
    }
    if found_octet {
        filtered = collapse(&filtered, |c| c == ' ')
            .trim_matches(TRIM_SET)
            .to_string();
    }

    filtered
}

const TRIM_SET: &[char] = &[' ', '\t', '\n', '\r', '\0', '\x0B'];

/// Replaces every run of characters matching `is_space` with one space.
fn collapse(s: &str, is_space: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if is_space(c) {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

/// Drops tag-like `<...>` sequences. A `<` that cannot open a tag is kept
/// as an entity; an unterminated tag swallows the rest of the input.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices();
    while let Some((idx, c)) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        let opens_tag = s[idx + 1..]
            .chars()
            .next()
            .map(|n| n.is_ascii_alphabetic() || matches!(n, '/' | '!' | '?'))
            .unwrap_or(false);
        if !opens_tag {
            out.push_str("&lt;");
            continue;
        }
        let mut closed = false;
        for (_, inner) in chars.by_ref() {
            if inner == '>' {
                closed = true;
                break;
            }
        }
        if !closed {
            break;
        }
    }
    out
}

fn remove_octets(s: &str) -> (String, bool) {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut removed = false;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            removed = true;
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    // only ASCII bytes were removed, so the remainder is still UTF-8
    (String::from_utf8(out).unwrap_or_default(), removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!("0")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!("1")));
        assert!(truthy(&json!("false")));
        assert!(truthy(&json!([0])));
    }

    #[test]
    fn test_int_cast_uses_leading_numeric_prefix() {
        assert_eq!(to_int(&json!("12abc")), 12);
        assert_eq!(to_int(&json!("  7")), 7);
        assert_eq!(to_int(&json!("abc")), 0);
        assert_eq!(to_int(&json!("-3.9")), -3);
        assert_eq!(to_int(&json!("1e3")), 1000);
        assert_eq!(to_int(&json!(4.8)), 4);
        assert_eq!(to_int(&json!(true)), 1);
    }

    #[test]
    fn test_float_cast() {
        assert_eq!(to_float(&json!("15.5")), 15.5);
        assert_eq!(to_float(&json!(".5")), 0.5);
        assert_eq!(to_float(&json!("x")), 0.0);
        assert_eq!(to_float(&json!("1e999")), 0.0);
        assert_eq!(to_float(&json!(null)), 0.0);
    }

    #[test]
    fn test_list_cast() {
        assert!(to_list(&json!(null)).is_empty());
        assert_eq!(to_list(&json!("5")), vec![json!("5")]);
        assert_eq!(to_list(&json!({"a": 1, "b": 2})), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_parse_numeric_is_strict() {
        assert_eq!(parse_numeric("12.50"), Some(12.5));
        assert_eq!(parse_numeric(" 3 "), Some(3.0));
        assert_eq!(parse_numeric("-1e2"), Some(-100.0));
        assert_eq!(parse_numeric("12abc"), None);
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("NaN"), None);
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key(&json!("Pa_Color!")), "pa_color");
        assert_eq!(sanitize_key(&json!("shop manager")), "shopmanager");
        assert_eq!(sanitize_key(&json!(["x"])), "");
        assert_eq!(sanitize_key(&json!(true)), "1");
    }

    #[test]
    fn test_sanitize_text_field() {
        assert_eq!(sanitize_text_str("  Gold <b>Tier</b>\n members "), "Gold Tier members");
        assert_eq!(sanitize_text_str("a < b"), "a &lt; b");
        assert_eq!(sanitize_text_str("50%41off"), "50off");
        assert_eq!(sanitize_text_str("x %20 y"), "x y");
        assert_eq!(sanitize_text_str("cut <i unterminated"), "cut");
    }

    #[test]
    fn test_sanitize_text_is_stable() {
        for raw in ["  Gold <b>Tier</b>\n", "a < b", "%%414", "x %20 y", "\t\tz"] {
            let once = sanitize_text_str(raw);
            assert_eq!(sanitize_text_str(&once), once, "input {:?}", raw);
        }
    }
}
