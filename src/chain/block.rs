//! Block production types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{decode_hex, Error, Result};

/// Identifies one block whose state is used for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockRef {
    /// Block hash, `0x`-prefixed
    Hash(String),
    /// Block number on the best chain
    Number(u64),
}

impl BlockRef {
    /// Parse `0x<hash>` or a decimal block number
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("0x") {
            let bytes = decode_hex(s)?;
            if bytes.len() != 32 {
                return Err(Error::InvalidInput(format!(
                    "Block hash must be 32 bytes, got {}",
                    bytes.len()
                )));
            }
            Ok(BlockRef::Hash(s.to_lowercase()))
        } else {
            s.parse::<u64>()
                .map(BlockRef::Number)
                .map_err(|_| Error::InvalidInput(format!("Invalid block reference: {}", s)))
        }
    }
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockRef::Hash(h) => write!(f, "{}", h),
            BlockRef::Number(n) => write!(f, "#{}", n),
        }
    }
}

/// A signed, encoded operation ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrinsic {
    /// Raw signed Ethereum transaction (`eth_sendRawTransaction`)
    Ethereum(String),
    /// Encoded Substrate extrinsic (`author_submitExtrinsic`)
    Substrate(String),
}

impl Extrinsic {
    /// Encoded payload
    pub fn payload(&self) -> &str {
        match self {
            Extrinsic::Ethereum(raw) | Extrinsic::Substrate(raw) => raw,
        }
    }

    /// Submission method for this kind
    pub fn submit_method(&self) -> &'static str {
        match self {
            Extrinsic::Ethereum(_) => "eth_sendRawTransaction",
            Extrinsic::Substrate(_) => "author_submitExtrinsic",
        }
    }

    /// Reject payloads that are not hex before anything is sent
    pub fn validate(&self) -> Result<()> {
        let payload = self.payload();
        if !payload.starts_with("0x") {
            return Err(Error::InvalidInput(format!(
                "Extrinsic payload must be 0x-prefixed hex: {}",
                payload
            )));
        }
        decode_hex(payload).map(|_| ())
    }
}

/// Options for [`ChainContext::create_block`](super::ChainContext::create_block)
#[derive(Debug, Clone, Default)]
pub struct CreateBlockOptions {
    /// Label of the account that signed the extrinsics (logging only)
    pub signer: Option<String>,
    /// Report failed extrinsics instead of failing the call
    pub allow_failures: bool,
    /// Events (`section.method`) that must appear in the block
    pub expect_events: Vec<String>,
}

impl CreateBlockOptions {
    pub fn allow_failures() -> Self {
        Self {
            allow_failures: true,
            ..Default::default()
        }
    }

    pub fn expect_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expect_events: events.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// An event emitted while dispatching an extrinsic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub section: String,
    pub method: String,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn new(section: &str, method: &str, data: Value) -> Self {
        Self {
            section: section.to_string(),
            method: method.to_string(),
            data,
        }
    }

    /// `section.method`
    pub fn name(&self) -> String {
        format!("{}.{}", self.section, self.method)
    }

    /// Whether this event matches `section.method` (case-insensitive)
    pub fn is(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name)
    }
}

/// Why an included extrinsic failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchFailure {
    pub module: String,
    pub reason: String,
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.reason)
    }
}

/// Dispatch result for one submitted extrinsic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicResult {
    /// Hash returned on submission
    pub hash: String,
    pub success: bool,
    pub events: Vec<Event>,
    pub error: Option<DispatchFailure>,
}

/// Outcome of authoring one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockResult {
    pub hash: String,
    pub number: u64,
    pub extrinsics: Vec<ExtrinsicResult>,
}

impl BlockResult {
    /// Reference to the produced block
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::Hash(self.hash.clone())
    }

    /// Whether every extrinsic dispatched successfully
    pub fn all_succeeded(&self) -> bool {
        self.extrinsics.iter().all(|e| e.success)
    }

    /// All events of the block, in extrinsic order
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.extrinsics.iter().flat_map(|e| e.events.iter())
    }

    /// Listed event names that do not appear in the block
    pub fn missing_events<'a>(&self, expected: &'a [String]) -> Vec<&'a str> {
        expected
            .iter()
            .filter(|name| !self.events().any(|e| e.is(name)))
            .map(String::as_str)
            .collect()
    }

    /// First failed extrinsic, if any
    pub fn first_failure(&self) -> Option<&ExtrinsicResult> {
        self.extrinsics.iter().find(|e| !e.success)
    }
}
