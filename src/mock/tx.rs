//! Payloads understood by the mock node
//!
//! The mock node does not verify signatures or decode SCALE. Its
//! "transactions" are JSON documents, hex-encoded so they travel through
//! `eth_sendRawTransaction` and `author_submitExtrinsic` like real ones.

use serde::{Deserialize, Serialize};

use crate::chain::storage::{storage_key, StorageKeyArg};
use crate::chain::Extrinsic;
use crate::common::{decode_hex, encode_hex, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MockTx {
    /// Move `value` wei (hex quantity) from one account to another
    Transfer {
        from: String,
        to: String,
        value: String,
        /// Force the dispatch to fail
        #[serde(default)]
        fail: bool,
    },
    /// Write a raw storage value
    SetStorage { key: String, value: String },
}

/// Transfer between two accounts
pub fn transfer(from: &str, to: &str, value: u128) -> MockTx {
    MockTx::Transfer {
        from: from.to_lowercase(),
        to: to.to_lowercase(),
        value: crate::common::format_quantity(value),
        fail: false,
    }
}

/// A transaction that is included but fails on dispatch
pub fn failing(from: &str) -> MockTx {
    MockTx::Transfer {
        from: from.to_lowercase(),
        to: from.to_lowercase(),
        value: "0x0".to_string(),
        fail: true,
    }
}

/// Write `value` (hex) to a plain storage item
pub fn set_storage(pallet: &str, item: &str, value: &str) -> MockTx {
    set_storage_at(pallet, item, &[], value)
}

/// Write `value` (hex) to a storage map entry
pub fn set_storage_at(pallet: &str, item: &str, keys: &[StorageKeyArg], value: &str) -> MockTx {
    MockTx::SetStorage {
        key: encode_hex(&storage_key(pallet, item, keys)),
        value: value.to_string(),
    }
}

impl MockTx {
    /// Hex payload
    pub fn encode(&self) -> String {
        // Serializing a plain enum of strings cannot fail
        encode_hex(serde_json::to_string(self).unwrap_or_default().as_bytes())
    }

    pub fn decode(payload: &str) -> Result<Self> {
        let bytes = decode_hex(payload)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidInput(format!("Not a mock transaction: {}", e)))
    }

    pub fn into_ethereum(self) -> Extrinsic {
        Extrinsic::Ethereum(self.encode())
    }

    pub fn into_substrate(self) -> Extrinsic {
        Extrinsic::Substrate(self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_hex_json() {
        let tx = transfer("0xAA", "0xBB", 16);
        let payload = tx.encode();
        assert!(payload.starts_with("0x"));
        assert_eq!(MockTx::decode(&payload).unwrap(), tx);
        assert!(tx.into_ethereum().validate().is_ok());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(MockTx::decode("0xdeadbeef").is_err());
    }
}
