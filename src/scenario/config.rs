//! Scenario file types
//!
//! Defines the data structures for deserializing YAML suite files.

use serde::Deserialize;
use serde_json::Value;

use crate::chain::{BlockRef, Extrinsic, StorageKeyArg};
use crate::common::config::Foundation;
use crate::common::{decode_hex, Error, Result};

/// Value of `at` naming the block produced by the latest `create_block` step
pub const LAST_BLOCK: &str = "last";

/// A suite loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioFile {
    /// Suite id, e.g. `D0101`
    pub id: String,
    pub title: String,
    /// Optional description of what the suite verifies
    pub description: Option<String>,
    #[serde(default)]
    pub foundation: Foundation,
    /// Network to run on instead of the run's default
    pub network: Option<String>,
    /// Default timeout for the suite's cases
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub before_all: Vec<Step>,
    #[serde(default)]
    pub before_each: Vec<Step>,
    #[serde(default)]
    pub after_each: Vec<Step>,
    #[serde(default)]
    pub after_all: Vec<Step>,
    pub tests: Vec<ScenarioTest>,
}

/// One test case of a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioTest {
    /// Case id, e.g. `T01`
    pub id: String,
    pub title: String,
    pub timeout_secs: Option<u64>,
    /// Skip the case with this reason
    pub skip: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A single step
///
/// String params equal to `{last_block_hash}` or `{last_block_number}` are
/// replaced with the latest block produced by this suite.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Issue a raw RPC call
    Rpc {
        method: String,
        #[serde(default)]
        params: Vec<Value>,
        /// Endpoint name; the network default otherwise
        endpoint: Option<String>,
        expect: Option<RpcExpectation>,
    },
    /// Author a block
    CreateBlock {
        #[serde(default)]
        extrinsics: Vec<Extrinsic>,
        #[serde(default)]
        allow_failures: bool,
        /// Events (`section.method`) that must appear
        #[serde(default)]
        expect_events: Vec<String>,
        /// Exact number of failed extrinsics (implies allow_failures)
        expect_failures: Option<usize>,
    },
    /// Read a storage item
    Query {
        pallet: String,
        item: String,
        /// Map keys as `hasher:0x<hex>`
        #[serde(default)]
        keys: Vec<String>,
        /// Block number, block hash or `last`
        at: Option<String>,
        expect: Option<QueryExpectation>,
    },
    /// End the case as skipped
    Skip { reason: String },
}

/// Expectations for an RPC result
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RpcExpectation {
    /// Expected result value (exact match)
    pub result: Option<Value>,
    /// Substring the error message must contain
    pub error_contains: Option<String>,
    /// Regular expression the error message must match
    pub error_matches: Option<String>,
    /// Compare the result with this snapshot, stored per test as `<case id>_<name>`
    pub snapshot: Option<String>,
}

impl RpcExpectation {
    /// Pattern the error must match, if a failure is expected
    pub fn error_pattern(&self) -> Option<String> {
        match (&self.error_matches, &self.error_contains) {
            (Some(pattern), _) => Some(pattern.clone()),
            (None, Some(text)) => Some(regex::escape(text)),
            (None, None) => None,
        }
    }
}

/// Expectations for a storage read
#[derive(Deserialize, Debug, Clone, Default)]
pub struct QueryExpectation {
    /// Expected raw value as hex
    pub value: Option<String>,
    /// The item must be absent
    #[serde(default)]
    pub none: bool,
}

/// Parse the `at` field of a query step; `None` means `last`
pub fn parse_at(at: &str) -> Result<Option<BlockRef>> {
    if at == LAST_BLOCK {
        Ok(None)
    } else {
        BlockRef::parse(at).map(Some)
    }
}

impl Step {
    /// Check everything that can be checked without a node
    pub fn validate(&self) -> Result<()> {
        match self {
            Step::Rpc { method, expect, .. } => {
                if method.trim().is_empty() {
                    return Err(Error::InvalidInput("rpc step needs a method".to_string()));
                }
                if let Some(expect) = expect {
                    if expect.result.is_some() && expect.error_pattern().is_some() {
                        return Err(Error::InvalidInput(format!(
                            "rpc step {}: expect either a result or an error, not both",
                            method
                        )));
                    }
                    if let Some(pattern) = expect.error_pattern() {
                        regex::Regex::new(&pattern).map_err(|e| {
                            Error::InvalidInput(format!("Invalid error pattern '{}': {}", pattern, e))
                        })?;
                    }
                }
                Ok(())
            }
            Step::CreateBlock { extrinsics, .. } => {
                extrinsics.iter().try_for_each(Extrinsic::validate)
            }
            Step::Query {
                keys, at, expect, ..
            } => {
                for key in keys {
                    StorageKeyArg::parse(key)?;
                }
                if let Some(at) = at {
                    parse_at(at)?;
                }
                if let Some(QueryExpectation {
                    value: Some(value), ..
                }) = expect
                {
                    decode_hex(value)?;
                }
                Ok(())
            }
            Step::Skip { .. } => Ok(()),
        }
    }
}

impl ScenarioFile {
    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: ScenarioFile = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse scenario: {}", e)))?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        let hooks = self
            .before_all
            .iter()
            .chain(&self.before_each)
            .chain(&self.after_each)
            .chain(&self.after_all);
        for step in hooks {
            step.validate()
                .map_err(|e| Error::InvalidInput(format!("Suite {} hook: {}", self.id, e)))?;
        }
        for test in &self.tests {
            for step in &test.steps {
                step.validate().map_err(|e| {
                    Error::InvalidInput(format!("{}{}: {}", self.id, test.id, e))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
id: D0101
title: Transaction index
foundation: dev
timeout_secs: 30
tests:
  - id: T01
    title: first transaction is at index 0
    steps:
      - action: create_block
        extrinsics:
          - ethereum: "0x7b7d"
        expect_events: [ethereum.Executed]
      - action: rpc
        method: eth_getTransactionByBlockNumberAndIndex
        params: ["{last_block_number}", "0x1"]
        expect:
          error_contains: out of bounds
  - id: T02
    title: storage is empty
    skip: needs a relay chain
    steps:
      - action: query
        pallet: System
        item: Account
        keys: ["twox64concat:0x01"]
        at: last
        expect:
          none: true
"#;

    #[test]
    fn test_parse_scenario() {
        let file = ScenarioFile::from_yaml(SAMPLE).unwrap();
        assert_eq!(file.id, "D0101");
        assert_eq!(file.foundation, Foundation::Dev);
        assert_eq!(file.tests.len(), 2);
        assert!(matches!(
            &file.tests[0].steps[0],
            Step::CreateBlock { extrinsics, .. } if extrinsics == &vec![Extrinsic::Ethereum("0x7b7d".into())]
        ));
        assert_eq!(file.tests[1].skip.as_deref(), Some("needs a relay chain"));
    }

    #[test]
    fn test_invalid_steps_are_rejected_at_load() {
        let bad_key = SAMPLE.replace("twox64concat:0x01", "blake9:0x01");
        assert!(matches!(
            ScenarioFile::from_yaml(&bad_key),
            Err(Error::InvalidInput(_))
        ));

        let bad_hex = SAMPLE.replace("\"0x7b7d\"", "\"7b7d\"");
        assert!(ScenarioFile::from_yaml(&bad_hex).is_err());

        let unknown_action = SAMPLE.replace("action: query", "action: teleport");
        assert!(matches!(
            ScenarioFile::from_yaml(&unknown_action),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_error_pattern() {
        let contains = RpcExpectation {
            error_contains: Some("1 is out of bounds (index)".into()),
            ..Default::default()
        };
        assert_eq!(
            contains.error_pattern().unwrap(),
            r"1 is out of bounds \(index\)"
        );
        assert!(RpcExpectation::default().error_pattern().is_none());
    }
}
