//! Helpers for digging normalized fields out of divergent provider JSON.

use rust_decimal::Decimal;
use serde_json::Value;

/// Best-effort numeric extraction. Providers return amounts as JSON
/// numbers, quoted numbers, or (one of them) a bare number as text.
/// Anything unparseable is zero, which callers treat as "no quote".
pub fn decimal_from_value(v: &Value) -> Decimal {
    match v {
        Value::Number(n) => n.to_string().parse().unwrap_or(Decimal::ZERO),
        Value::String(s) => s.trim().parse().unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// First non-zero amount found under any of `keys`.
pub fn amount_field(obj: &Value, keys: &[&str]) -> Decimal {
    for key in keys {
        if let Some(v) = obj.get(key) {
            let n = decimal_from_value(v);
            if n != Decimal::ZERO {
                return n;
            }
        }
    }
    Decimal::ZERO
}

/// First non-empty string found under any of `keys`.
pub fn string_field(obj: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = obj.get(key).and_then(Value::as_str) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Lower-cased `status` field, empty string when absent.
pub fn status_text(obj: &Value) -> String {
    obj.get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_decimal_from_bare_number() {
        assert_eq!(decimal_from_value(&json!(1.25)), dec!(1.25));
        assert_eq!(decimal_from_value(&json!("1.25")), dec!(1.25));
        assert_eq!(decimal_from_value(&json!(" 0.5 ")), dec!(0.5));
    }

    #[test]
    fn test_decimal_from_garbage_is_zero() {
        assert_eq!(decimal_from_value(&json!(null)), Decimal::ZERO);
        assert_eq!(decimal_from_value(&json!("n/a")), Decimal::ZERO);
        assert_eq!(decimal_from_value(&json!({"x": 1})), Decimal::ZERO);
    }

    #[test]
    fn test_amount_field_priority() {
        let v = json!({"toAmount": 0, "estimatedAmount": "2.5"});
        assert_eq!(amount_field(&v, &["toAmount", "estimatedAmount"]), dec!(2.5));
    }

    #[test]
    fn test_string_field_skips_empty() {
        let v = json!({"payinAddress": "", "depositAddress": "addr1"});
        assert_eq!(
            string_field(&v, &["payinAddress", "depositAddress"]).as_deref(),
            Some("addr1")
        );
        assert_eq!(string_field(&v, &["missing"]), None);
    }

    #[test]
    fn test_status_text_lowercases() {
        assert_eq!(status_text(&json!({"status": "Finished"})), "finished");
        assert_eq!(status_text(&json!({})), "");
    }
}
