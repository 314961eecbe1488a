//! Precision-preserving payload decoding
//!
//! Exchange payloads carry order ids and quantities that do not survive a trip
//! through `f64`. `serde_json` is built with `arbitrary_precision`, so every
//! number keeps its literal text; long literals are then rewritten as JSON
//! strings so nothing downstream can read them back as a float.

use serde_json::Value;

use crate::error::DecodeError;

/// Number literals with at least this many digits are kept as strings
pub const PRECISION_SAFE_DIGITS: usize = 15;

/// Parser for raw exchange payload text
pub struct SafeDecoder;

impl SafeDecoder {
    /// Parse `raw`, turning every long number literal into a string.
    ///
    /// Shorter numbers stay JSON numbers.
    ///
    /// # Example
    /// ```
    /// use crypto_oms::decoder::SafeDecoder;
    ///
    /// let value = SafeDecoder::parse(r#"{"orderId": 1234567890123456789, "lever": 20}"#).unwrap();
    /// assert_eq!(value["orderId"], "1234567890123456789");
    /// assert!(value["lever"].is_number());
    /// ```
    pub fn parse(raw: &str) -> Result<Value, DecodeError> {
        let mut value: Value = serde_json::from_str(raw)?;
        protect_long_numbers(&mut value);
        Ok(value)
    }
}

fn protect_long_numbers(value: &mut Value) {
    match value {
        Value::Number(number) => {
            let literal = number.to_string();
            if digit_count(&literal) >= PRECISION_SAFE_DIGITS {
                *value = Value::String(literal);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(protect_long_numbers),
        Value::Object(fields) => fields.values_mut().for_each(protect_long_numbers),
        _ => {}
    }
}

/// Digits in the mantissa of a number literal (sign, point and exponent excluded)
fn digit_count(literal: &str) -> usize {
    literal
        .chars()
        .take_while(|c| !matches!(c, 'e' | 'E'))
        .filter(char::is_ascii_digit)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_integer_id_kept_exact() {
        let value = SafeDecoder::parse(r#"{"orderId": 1234567890123456789}"#).unwrap();
        assert_eq!(value["orderId"], Value::String("1234567890123456789".into()));
    }

    #[test]
    fn test_long_fraction_kept_exact() {
        let value = SafeDecoder::parse(r#"{"qty": 0.1000000000000000055511}"#).unwrap();
        assert_eq!(value["qty"], "0.1000000000000000055511");
    }

    #[test]
    fn test_short_numbers_stay_numbers() {
        let value = SafeDecoder::parse(r#"{"price": 12.5, "lever": 20, "id": 12345678901234}"#).unwrap();
        assert_eq!(value["price"].as_f64(), Some(12.5));
        assert_eq!(value["lever"].as_u64(), Some(20));
        // 14 digits is below the threshold
        assert_eq!(value["id"].as_u64(), Some(12_345_678_901_234));
    }

    #[test]
    fn test_threshold_boundary() {
        let value = SafeDecoder::parse("[123456789012345, -12345678901234.5]").unwrap();
        assert_eq!(value[0], "123456789012345");
        assert_eq!(value[1], "-12345678901234.5");
    }

    #[test]
    fn test_nested_structures() {
        let raw = r#"{"code": "0", "data": [{"orderId": 987654321098765432, "fills": [{"sz": 1}]}]}"#;
        let value = SafeDecoder::parse(raw).unwrap();
        assert_eq!(value["code"], "0");
        assert_eq!(value["data"][0]["orderId"], "987654321098765432");
        assert_eq!(value["data"][0]["fills"][0]["sz"].as_u64(), Some(1));
    }

    #[test]
    fn test_strings_untouched() {
        let value = SafeDecoder::parse(r#"{"qty": "12.345", "ok": true, "none": null}"#).unwrap();
        assert_eq!(value["qty"], "12.345");
        assert_eq!(value["ok"], true);
        assert!(value["none"].is_null());
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(SafeDecoder::parse("{not json").is_err());
        assert!(SafeDecoder::parse("").is_err());
    }
}
