//! Common utilities shared across the harness

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Decode `0x`-prefixed (or bare) hex into bytes
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| Error::InvalidInput(format!("Invalid hex '{}': {}", value, e)))
}

/// Encode bytes as `0x`-prefixed hex
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse an Ethereum-style hex quantity (`"0x1a"`) or a JSON number
pub fn parse_quantity(value: &serde_json::Value) -> Result<u128> {
    match value {
        serde_json::Value::String(s) => {
            let digits = s
                .strip_prefix("0x")
                .ok_or_else(|| Error::Protocol(format!("Quantity '{}' is not 0x-prefixed", s)))?;
            if digits.is_empty() {
                return Ok(0);
            }
            u128::from_str_radix(digits, 16)
                .map_err(|e| Error::Protocol(format!("Invalid quantity '{}': {}", s, e)))
        }
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| Error::Protocol(format!("Invalid quantity {}", n))),
        other => Err(Error::Protocol(format!("Expected quantity, got {}", other))),
    }
}

/// Format a number as an Ethereum-style hex quantity
pub fn format_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x1a")).unwrap(), 26);
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!(7)).unwrap(), 7);
        assert!(parse_quantity(&json!("12")).is_err());
        assert!(parse_quantity(&json!(null)).is_err());
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(decode_hex("0a").unwrap(), vec![10]);
        assert!(decode_hex("0xzz").is_err());
        assert_eq!(encode_hex(&[0xde, 0xad]), "0xdead");
        assert_eq!(format_quantity(255), "0xff");
    }
}
