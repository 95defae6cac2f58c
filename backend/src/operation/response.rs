//! Helpers for reading API responses.

use serde_json::Value;

use crate::error::{OperationError, OperationResult};

/// `value[key]`, or a malformed-response error.
pub fn field<'a>(value: &'a Value, key: &str) -> OperationResult<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| OperationError::Malformed(format!("missing \"{}\"", key)))
}

pub fn array<'a>(value: &'a Value, key: &str) -> OperationResult<&'a Vec<Value>> {
    field(value, key)?
        .as_array()
        .ok_or_else(|| OperationError::Malformed(format!("\"{}\" is not a list", key)))
}

/// Number from a JSON number or a numeric string.
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Number at `row[idx]`, or a malformed-response error.
pub fn number_at(row: &Value, idx: usize) -> OperationResult<f64> {
    row.get(idx)
        .and_then(number)
        .ok_or_else(|| OperationError::Malformed(format!("column {} is not numeric", idx)))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_accept_strings() {
        assert_eq!(number(&json!("1.25")), Some(1.25));
        assert_eq!(number(&json!(3)), Some(3.0));
        assert_eq!(number(&json!("n/a")), None);
        assert!(number_at(&json!(["a", "2"]), 0).is_err());
        assert_eq!(number_at(&json!(["a", "2"]), 1).unwrap(), 2.0);
    }

    #[test]
    fn test_round_and_mean() {
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(round2(-0.005001), -0.01);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = array(&json!({"rows": 1}), "rows").unwrap_err();
        assert!(matches!(err, OperationError::Malformed(_)));
        assert!(field(&json!({}), "stats").is_err());
    }
}
