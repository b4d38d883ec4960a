//! Configuration file handling

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::paths::{self, config_path};
use super::{Error, Result};

/// Environment variable selecting the network
pub const NETWORK_ENV: &str = "HARNESS_NETWORK";

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Snapshot settings
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Chain constants shared by every network
    #[serde(default)]
    pub constants: BTreeMap<String, serde_json::Value>,

    /// Networks the harness can target
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,
}

/// Backing environment a suite requires
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Foundation {
    /// Ephemeral node dedicated to one suite
    #[default]
    Dev,
    /// Shared, already running node; queries only
    ReadOnly,
}

impl std::fmt::Display for Foundation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Foundation::Dev => write!(f, "dev"),
            Foundation::ReadOnly => write!(f, "read_only"),
        }
    }
}

/// Configuration for one network
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Foundation suites get on this network
    #[serde(default)]
    pub foundation: Foundation,

    /// Named endpoint URLs (`para`, `relay`, ...); `{port}` is replaced
    /// with the launched node's port
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,

    /// Endpoint used when a call does not name one
    #[serde(default)]
    pub default_endpoint: Option<String>,

    /// How to launch an ephemeral node (dev foundation only)
    #[serde(default)]
    pub launch: Option<LaunchConfig>,

    /// Per-network overrides of the global constants
    #[serde(default)]
    pub constants: BTreeMap<String, serde_json::Value>,
}

/// Command used to launch an ephemeral dev node
#[derive(Debug, Deserialize, Clone)]
pub struct LaunchConfig {
    /// Node executable, resolved through PATH when relative
    pub command: PathBuf,

    /// Arguments; `{port}` is replaced with a free local port
    #[serde(default)]
    pub args: Vec<String>,
}

/// Default settings
#[derive(Debug, Deserialize, Clone)]
pub struct Defaults {
    /// Network used when none is given
    #[serde(default = "default_network")]
    pub network: String,

    /// Maximum suites running at once
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            network: default_network(),
            jobs: default_jobs(),
        }
    }
}

fn default_network() -> String {
    "dev".to_string()
}
fn default_jobs() -> usize {
    1
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for a single RPC request
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// Default timeout for a test case body
    #[serde(default = "default_test_case")]
    pub test_case_secs: u64,

    /// How long to wait for a launched node to answer RPC
    #[serde(default = "default_node_startup")]
    pub node_startup_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request(),
            test_case_secs: default_test_case(),
            node_startup_secs: default_node_startup(),
        }
    }
}

fn default_request() -> u64 {
    30
}
fn default_test_case() -> u64 {
    120
}
fn default_node_startup() -> u64 {
    60
}

/// Snapshot settings
#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    /// Directory holding snapshot files
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,

    /// Rewrite snapshots instead of comparing
    #[serde(default)]
    pub update: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
            update: false,
        }
    }
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_SNAPSHOT_DIR)
}

/// A network with environment overrides applied and constants merged
#[derive(Debug, Clone)]
pub struct ResolvedNetwork {
    pub name: String,
    pub foundation: Foundation,
    pub endpoints: BTreeMap<String, String>,
    pub default_endpoint: String,
    pub launch: Option<LaunchConfig>,
    pub constants: BTreeMap<String, serde_json::Value>,
    pub timeouts: Timeouts,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Pick the network name: explicit choice, then `HARNESS_NETWORK`, then defaults
    pub fn network_name(&self, explicit: Option<&str>) -> String {
        if let Some(name) = explicit {
            return name.to_string();
        }
        match std::env::var(NETWORK_ENV) {
            Ok(name) if !name.is_empty() => name,
            _ => self.defaults.network.clone(),
        }
    }

    /// Resolve a network by name
    ///
    /// The built-in `dev` network (local node on port 9944) is available
    /// even without a config file.
    pub fn network(&self, name: &str) -> Result<ResolvedNetwork> {
        let network = match self.networks.get(name) {
            Some(network) => network.clone(),
            None if name == "dev" => builtin_dev_network(),
            None => return Err(Error::UnknownNetwork(name.to_string())),
        };

        let mut endpoints = network.endpoints.clone();
        for (endpoint, url) in endpoints.iter_mut() {
            if let Ok(value) = std::env::var(endpoint_env_var(endpoint)) {
                if !value.is_empty() {
                    tracing::debug!(endpoint = %endpoint, url = %value, "Endpoint overridden from environment");
                    *url = value;
                }
            }
        }

        if endpoints.is_empty() {
            return Err(Error::Config(format!(
                "Network '{}' has no endpoints",
                name
            )));
        }

        let default_endpoint = match &network.default_endpoint {
            Some(endpoint) if endpoints.contains_key(endpoint) => endpoint.clone(),
            Some(endpoint) => return Err(Error::UnknownEndpoint(endpoint.clone())),
            None if endpoints.contains_key("para") => "para".to_string(),
            None => endpoints.keys().next().cloned().unwrap_or_default(),
        };

        if network.launch.is_some() && network.foundation == Foundation::ReadOnly {
            return Err(Error::Config(format!(
                "Network '{}' is read_only and cannot launch a node",
                name
            )));
        }

        let mut constants = self.constants.clone();
        constants.extend(network.constants.clone());

        Ok(ResolvedNetwork {
            name: name.to_string(),
            foundation: network.foundation,
            endpoints,
            default_endpoint,
            launch: network.launch,
            constants,
            timeouts: self.timeouts.clone(),
        })
    }

    /// Whether snapshots should be rewritten
    pub fn update_snapshots(&self) -> bool {
        self.snapshots.update
            || matches!(
                std::env::var("HARNESS_UPDATE_SNAPSHOTS").as_deref(),
                Ok("1") | Ok("true") | Ok("yes")
            )
    }
}

/// Environment variable overriding an endpoint URL: `para` -> `HARNESS_PARA_URL`
pub fn endpoint_env_var(endpoint: &str) -> String {
    let name: String = endpoint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("HARNESS_{}_URL", name)
}

fn builtin_dev_network() -> NetworkConfig {
    let mut endpoints = BTreeMap::new();
    endpoints.insert("para".to_string(), "http://127.0.0.1:9944".to_string());
    NetworkConfig {
        foundation: Foundation::Dev,
        endpoints,
        default_endpoint: None,
        launch: None,
        constants: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
network = "local"

[timeouts]
request_secs = 5

[constants]
genesis_balance = "1207825819614629174706176"
spec_version = 3400

[networks.local]
foundation = "dev"
endpoints = { para = "http://127.0.0.1:{port}" }
launch = { command = "mock-node", args = ["--port", "{port}"] }

[networks.local.constants]
spec_version = 3500

[networks.moonbase]
foundation = "read_only"
default_endpoint = "relay"
endpoints = { para = "wss://moonbase.example/ws", relay = "wss://relay.example/ws" }
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.defaults.network, "local");
        assert_eq!(config.timeouts.request_secs, 5);
        assert_eq!(config.timeouts.test_case_secs, 120);
        assert_eq!(config.networks.len(), 2);
        assert!(!config.snapshots.update);
    }

    #[test]
    fn test_network_constants_override_global() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let local = config.network("local").unwrap();
        assert_eq!(local.constants["spec_version"], serde_json::json!(3500));
        assert_eq!(
            local.constants["genesis_balance"],
            serde_json::json!("1207825819614629174706176")
        );

        let moonbase = config.network("moonbase").unwrap();
        assert_eq!(moonbase.constants["spec_version"], serde_json::json!(3400));
    }

    #[test]
    fn test_default_endpoint_resolution() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.network("local").unwrap().default_endpoint, "para");
        assert_eq!(config.network("moonbase").unwrap().default_endpoint, "relay");
        assert_eq!(
            config.network("moonbase").unwrap().foundation,
            Foundation::ReadOnly
        );
    }

    #[test]
    fn test_unknown_network() {
        let config = Config::default();
        assert!(matches!(
            config.network("nope"),
            Err(Error::UnknownNetwork(_))
        ));
        // built-in dev network is always there
        let dev = config.network("dev").unwrap();
        assert_eq!(dev.endpoints["para"], "http://127.0.0.1:9944");
    }

    #[test]
    fn test_read_only_network_cannot_launch() {
        let config = Config::from_toml_str(
            r#"
[networks.bad]
foundation = "read_only"
endpoints = { para = "http://127.0.0.1:{port}" }
launch = { command = "node" }
"#,
        )
        .unwrap();
        assert!(matches!(config.network("bad"), Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_env_var_name() {
        assert_eq!(endpoint_env_var("para"), "HARNESS_PARA_URL");
        assert_eq!(endpoint_env_var("asset-hub"), "HARNESS_ASSET_HUB_URL");
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let err = Config::from_toml_str("[timeouts]\nrequest_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }
}
