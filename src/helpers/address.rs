//! Ethereum-style 20-byte account addresses

use std::fmt;
use std::str::FromStr;

use crate::common::{decode_hex, encode_hex, Error, Result};

/// A 20-byte account id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

/// Parse a `0x`-prefixed 20-byte hex address
pub fn parse_address(s: &str) -> Result<Address> {
    s.parse()
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.starts_with("0x") {
            return Err(Error::InvalidInput(format!(
                "Address '{}' must be 0x-prefixed",
                s
            )));
        }
        let bytes = decode_hex(s)?;
        let bytes: [u8; 20] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "Address '{}' must be 20 bytes, got {}",
                s,
                bytes.len()
            ))
        })?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode_hex(&self.0))
    }
}

impl Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0xf24FF3a9CF04c71Dbc94D0b566f7A27B94566cac").unwrap();
        assert_eq!(addr.to_string(), "0xf24ff3a9cf04c71dbc94d0b566f7a27b94566cac");
    }

    #[test]
    fn test_reject_bad_addresses() {
        assert!(parse_address("f24ff3a9cf04c71dbc94d0b566f7a27b94566cac").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzz4ff3a9cf04c71dbc94d0b566f7a27b94566cac").is_err());
    }
}
