//! Storage keys and raw storage values
//!
//! A storage key is `twox128(pallet) ++ twox128(item) ++ hashed map keys`,
//! where each map key is hashed with the hasher the pallet declares.

use xxhash_rust::xxh64::xxh64;

use crate::common::{decode_hex, encode_hex, Error, Result};

/// Hashers usable for storage map keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageHasher {
    Identity,
    Twox64Concat,
    Twox128,
    Twox256,
}

impl StorageHasher {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::Identity),
            "twox64concat" | "twox64_concat" => Ok(Self::Twox64Concat),
            "twox128" => Ok(Self::Twox128),
            "twox256" => Ok(Self::Twox256),
            other => Err(Error::InvalidInput(format!(
                "Unknown storage hasher '{}'. Supported: identity, twox64concat, twox128, twox256",
                other
            ))),
        }
    }

    /// Hash an encoded key
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Identity => data.to_vec(),
            Self::Twox64Concat => {
                let mut out = twox_64(data).to_vec();
                out.extend_from_slice(data);
                out
            }
            Self::Twox128 => twox_128(data).to_vec(),
            Self::Twox256 => twox_256(data).to_vec(),
        }
    }
}

/// xxHash64 rounds with seeds `0..N`, concatenated little-endian
fn twox<const N: usize>(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(N * 8);
    for seed in 0..N as u64 {
        out.extend_from_slice(&xxh64(data, seed).to_le_bytes());
    }
    out
}

pub fn twox_64(data: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&twox::<1>(data));
    out
}

pub fn twox_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&twox::<2>(data));
    out
}

pub fn twox_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&twox::<4>(data));
    out
}

/// One storage map key together with its hasher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeyArg {
    pub hasher: StorageHasher,
    /// SCALE-encoded key bytes
    pub encoded: Vec<u8>,
}

impl StorageKeyArg {
    pub fn new(hasher: StorageHasher, encoded: Vec<u8>) -> Self {
        Self { hasher, encoded }
    }

    /// Parse `hasher:0x<hex>` (e.g. `twox64concat:0x0102`)
    pub fn parse(s: &str) -> Result<Self> {
        let (hasher, key) = s.split_once(':').ok_or_else(|| {
            Error::InvalidInput(format!("Storage key '{}' must look like hasher:0x<hex>", s))
        })?;
        Ok(Self {
            hasher: StorageHasher::parse(hasher)?,
            encoded: decode_hex(key)?,
        })
    }
}

/// Full storage key for a pallet item and its map keys
pub fn storage_key(pallet: &str, item: &str, keys: &[StorageKeyArg]) -> Vec<u8> {
    let mut key = twox_128(pallet.as_bytes()).to_vec();
    key.extend_from_slice(&twox_128(item.as_bytes()));
    for arg in keys {
        key.extend_from_slice(&arg.hasher.hash(&arg.encoded));
    }
    key
}

/// Raw value read from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageValue(pub Vec<u8>);

impl StorageValue {
    /// Parse the hex string returned by `state_getStorage`
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_hex(s).map(Self)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        encode_hex(&self.0)
    }

    fn le_bytes<const N: usize>(&self) -> Result<[u8; N]> {
        if self.0.len() < N {
            return Err(Error::Protocol(format!(
                "Storage value has {} bytes, need {}",
                self.0.len(),
                N
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.0[..N]);
        Ok(out)
    }

    pub fn as_u32_le(&self) -> Result<u32> {
        self.le_bytes::<4>().map(u32::from_le_bytes)
    }

    pub fn as_u64_le(&self) -> Result<u64> {
        self.le_bytes::<8>().map(u64::from_le_bytes)
    }

    pub fn as_u128_le(&self) -> Result<u128> {
        self.le_bytes::<16>().map(u128::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_prefixes() {
        assert_eq!(
            hex::encode(twox_128(b"System")),
            "26aa394eea5630e07c48ae0c9558cef7"
        );
        assert_eq!(
            hex::encode(storage_key("System", "Account", &[])),
            "26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9"
        );
    }

    #[test]
    fn test_twox64_concat_keeps_key() {
        let arg = StorageKeyArg::parse("twox64concat:0x0102").unwrap();
        let hashed = arg.hasher.hash(&arg.encoded);
        assert_eq!(hashed.len(), 10);
        assert_eq!(&hashed[8..], &[1, 2]);
        assert_eq!(&hashed[..8], &twox_64(&[1, 2]));
    }

    #[test]
    fn test_storage_key_arg_errors() {
        assert!(StorageKeyArg::parse("0x0102").is_err());
        assert!(StorageKeyArg::parse("blake2:0x01").is_err());
        assert!(StorageKeyArg::parse("identity:xyz").is_err());
    }

    #[test]
    fn test_storage_value_decoding() {
        let value = StorageValue::from_hex("0x2a000000000000000000000000000000").unwrap();
        assert_eq!(value.as_u32_le().unwrap(), 42);
        assert_eq!(value.as_u128_le().unwrap(), 42);
        assert!(StorageValue(vec![1]).as_u64_le().is_err());
    }
}
