//! Dev account keys for operator commands
//!
//! A signer comes from a raw secp256k1 private key or from a BIP-39 mnemonic
//! derived along `m/44'/60'/0'/0/<index>`. The account is the last 20 bytes
//! of the Keccak-256 hash of the uncompressed public key. Keys are only
//! used to resolve the account; the secret is never kept or printed.

use std::fmt;

use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

use crate::common::{Error, Result};

use super::address::Address;

/// BIP-44 path of Ethereum accounts, without the index
pub const ETH_DERIVATION_PREFIX: &str = "m/44'/60'/0'/0";

/// Mnemonic of the well-known funded dev accounts
pub const DEV_MNEMONIC: &str = "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerOrigin {
    PrivateKey,
    Mnemonic { index: u32 },
}

/// An account resolved from key material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    pub address: Address,
    pub origin: SignerOrigin,
}

impl Signer {
    /// From a `0x`-prefixed (or bare) 32-byte hex private key
    pub fn from_private_key(key: &str) -> Result<Self> {
        let digits = key.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        // Error messages never echo the key
        let bytes = hex::decode(digits)
            .map_err(|_| Error::InvalidInput("Private key is not valid hex".to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidInput(format!(
                "Private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(&bytes).map_err(|_| {
            Error::InvalidInput("Private key is not a valid secp256k1 secret".to_string())
        })?;
        Ok(Self {
            address: address_of(&key),
            origin: SignerOrigin::PrivateKey,
        })
    }

    /// Account `index` of an English BIP-39 mnemonic (empty passphrase)
    pub fn from_mnemonic(phrase: &str, index: u32) -> Result<Self> {
        let mnemonic = Mnemonic::parse_normalized(phrase.trim())
            .map_err(|e| Error::InvalidInput(format!("Invalid mnemonic: {}", e)))?;
        let seed = mnemonic.to_seed_normalized("");

        let path: DerivationPath = format!("{}/{}", ETH_DERIVATION_PREFIX, index)
            .parse()
            .map_err(|e| Error::InvalidInput(format!("Invalid account index {}: {}", index, e)))?;
        let xprv = XPrv::derive_from_path(seed, &path)
            .map_err(|e| Error::Internal(format!("Key derivation failed: {}", e)))?;

        Ok(Self {
            address: address_of(xprv.private_key()),
            origin: SignerOrigin::Mnemonic { index },
        })
    }

    /// Resolve the signer selected by CLI flags, if any
    ///
    /// `account_index` only applies to a mnemonic and defaults to 0.
    pub fn from_args(
        private_key: Option<&str>,
        mnemonic: Option<&str>,
        account_index: Option<u32>,
    ) -> Result<Option<Self>> {
        match (private_key, mnemonic) {
            (Some(_), Some(_)) => Err(Error::InvalidInput(
                "Use either --private-key or --mnemonic, not both".to_string(),
            )),
            (Some(key), None) => {
                if account_index.is_some() {
                    return Err(Error::InvalidInput(
                        "--account-index needs --mnemonic".to_string(),
                    ));
                }
                Self::from_private_key(key).map(Some)
            }
            (None, Some(phrase)) => Self::from_mnemonic(phrase, account_index.unwrap_or(0)).map(Some),
            (None, None) => match account_index {
                Some(_) => Err(Error::InvalidInput(
                    "--account-index needs --mnemonic".to_string(),
                )),
                None => Ok(None),
            },
        }
    }
}

impl fmt::Display for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            SignerOrigin::PrivateKey => write!(f, "{} (private key)", self.address),
            SignerOrigin::Mnemonic { index } => write!(f, "{} (mnemonic #{})", self.address, index),
        }
    }
}

fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().as_affine().to_encoded_point(false);
    // Skip the 0x04 SEC1 tag
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::parse_address;
    use crate::mock::DEV_ACCOUNTS;

    const ALITH_KEY: &str = "0x5fb92d6e98884f76de468fa3f6278f8807c48bebc13595d45af5bdc4da702133";

    #[test]
    fn test_dev_mnemonic_matches_dev_accounts() {
        for (index, expected) in DEV_ACCOUNTS.iter().take(2).enumerate() {
            let signer = Signer::from_mnemonic(DEV_MNEMONIC, index as u32).unwrap();
            assert_eq!(signer.address, parse_address(expected).unwrap());
        }
    }

    #[test]
    fn test_private_key_and_mnemonic_agree() {
        let from_key = Signer::from_private_key(ALITH_KEY).unwrap();
        let from_phrase = Signer::from_mnemonic(DEV_MNEMONIC, 0).unwrap();
        assert_eq!(from_key.address, from_phrase.address);
        assert_eq!(
            from_key.to_string(),
            "0xf24ff3a9cf04c71dbc94d0b566f7a27b94566cac (private key)"
        );
    }

    #[test]
    fn test_rejects_bad_keys_without_echoing_them() {
        let short = Signer::from_private_key("0x1234").unwrap_err();
        assert_eq!(short.to_string(), "Invalid input: Private key must be 32 bytes, got 2");

        let zero = format!("0x{}", "00".repeat(32));
        assert!(matches!(Signer::from_private_key(&zero), Err(Error::InvalidInput(_))));

        let garbage = Signer::from_private_key("0xnothex").unwrap_err();
        assert!(!garbage.to_string().contains("nothex"));
    }

    #[test]
    fn test_rejects_bad_mnemonics() {
        assert!(Signer::from_mnemonic("bottom drive obey", 0).is_err());
        assert!(Signer::from_mnemonic(&DEV_MNEMONIC.replace("walk", "wlak"), 0).is_err());
    }

    #[test]
    fn test_from_args_combinations() {
        assert_eq!(Signer::from_args(None, None, None).unwrap(), None);
        assert!(Signer::from_args(Some(ALITH_KEY), Some(DEV_MNEMONIC), None).is_err());
        assert!(Signer::from_args(Some(ALITH_KEY), None, Some(1)).is_err());
        assert!(Signer::from_args(None, None, Some(1)).is_err());

        let second = Signer::from_args(None, Some(DEV_MNEMONIC), Some(1)).unwrap().unwrap();
        assert_eq!(second.origin, SignerOrigin::Mnemonic { index: 1 });
        assert_eq!(second.address, parse_address(DEV_ACCOUNTS[1]).unwrap());
    }
}
