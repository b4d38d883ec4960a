//! Chain context: the handle test code uses to drive a node
//!
//! Owns the RPC clients for every named endpoint of a network and, on dev
//! networks with a launch command, the node process itself.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::common::config::{Foundation, ResolvedNetwork};
use crate::common::{encode_hex, parse_quantity, Error, Result};
use crate::rpc::RpcClient;

use super::block::{BlockRef, BlockResult, CreateBlockOptions, Extrinsic};
use super::inspector::{DispatchInspector, ReceiptInspector, Submitted};
use super::node::DevNode;
use super::storage::{storage_key, StorageKeyArg, StorageValue};

/// Live handle to a node for one suite (dev) or the whole process (read_only)
pub struct ChainContext {
    network: String,
    foundation: Foundation,
    /// RPC client per endpoint name
    clients: BTreeMap<String, RpcClient>,
    default_endpoint: String,
    constants: BTreeMap<String, Value>,
    inspector: Box<dyn DispatchInspector>,
    /// Node launched for this context, if any
    node: Mutex<Option<DevNode>>,
}

impl std::fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainContext")
            .field("network", &self.network)
            .field("foundation", &self.foundation)
            .field("endpoints", &self.clients.keys().collect::<Vec<_>>())
            .field("default_endpoint", &self.default_endpoint)
            .finish()
    }
}

async fn connect_all(
    endpoints: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<BTreeMap<String, RpcClient>> {
    let mut clients = BTreeMap::new();
    for (name, url) in endpoints {
        tracing::debug!(endpoint = %name, %url, "Connecting");
        clients.insert(name.clone(), RpcClient::connect(url, timeout).await?);
    }
    Ok(clients)
}

impl ChainContext {
    /// Connect to the network's endpoints without launching anything
    pub async fn connect(network: &ResolvedNetwork) -> Result<Self> {
        let timeout = Duration::from_secs(network.timeouts.request_secs);
        let clients = connect_all(&network.endpoints, timeout).await?;
        Ok(Self::from_clients(network, clients, None))
    }

    /// Create the context for one dev suite
    ///
    /// With a launch command a fresh node is started and awaited; without
    /// one the configured (externally managed) endpoints are used.
    pub async fn launch(network: &ResolvedNetwork, suite_id: &str) -> Result<Self> {
        let Some(launch) = &network.launch else {
            return Self::connect(network).await;
        };

        let (mut node, endpoints) = DevNode::launch(launch, &network.endpoints, suite_id).await?;

        let default_url = endpoints
            .get(&network.default_endpoint)
            .ok_or_else(|| Error::UnknownEndpoint(network.default_endpoint.clone()))?;
        let startup = Duration::from_secs(network.timeouts.node_startup_secs);
        if let Err(e) = node.wait_ready(default_url, startup).await {
            let _ = node.terminate().await;
            return Err(e);
        }

        let timeout = Duration::from_secs(network.timeouts.request_secs);
        let clients = match connect_all(&endpoints, timeout).await {
            Ok(clients) => clients,
            Err(e) => {
                let _ = node.terminate().await;
                return Err(e);
            }
        };

        Ok(Self::from_clients(network, clients, Some(node)))
    }

    fn from_clients(
        network: &ResolvedNetwork,
        clients: BTreeMap<String, RpcClient>,
        node: Option<DevNode>,
    ) -> Self {
        Self {
            network: network.name.clone(),
            foundation: network.foundation,
            clients,
            default_endpoint: network.default_endpoint.clone(),
            constants: network.constants.clone(),
            inspector: Box::new(ReceiptInspector),
            node: Mutex::new(node),
        }
    }

    /// Replace the dispatch inspector
    pub fn with_inspector(mut self, inspector: Box<dyn DispatchInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Restrict the context to queries
    pub fn into_read_only(mut self) -> Self {
        self.foundation = Foundation::ReadOnly;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn foundation(&self) -> Foundation {
        self.foundation
    }

    /// Client for a named endpoint (`para`, `relay`, ...)
    pub fn rpc(&self, endpoint: &str) -> Result<&RpcClient> {
        self.clients
            .get(endpoint)
            .ok_or_else(|| Error::UnknownEndpoint(endpoint.to_string()))
    }

    /// Client for the default endpoint
    pub fn default_rpc(&self) -> &RpcClient {
        // from_clients is only reached with the default endpoint connected
        &self.clients[&self.default_endpoint]
    }

    /// Chain constant from configuration
    pub fn constant<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .constants
            .get(name)
            .ok_or_else(|| Error::Config(format!("Constant '{}' is not configured", name)))?;
        serde_json::from_value(value.clone())
            .map_err(|e| Error::Config(format!("Constant '{}' has the wrong type: {}", name, e)))
    }

    /// Author one block containing the given extrinsics
    pub async fn create_block(
        &self,
        extrinsics: Vec<Extrinsic>,
        options: CreateBlockOptions,
    ) -> Result<BlockResult> {
        if self.foundation == Foundation::ReadOnly {
            return Err(Error::Config(format!(
                "Network '{}' is read_only; blocks cannot be produced",
                self.network
            )));
        }
        for extrinsic in &extrinsics {
            extrinsic.validate()?;
        }

        let rpc = self.default_rpc();

        let mut submitted = Vec::with_capacity(extrinsics.len());
        for extrinsic in extrinsics {
            let hash = rpc
                .request(extrinsic.submit_method(), vec![json!(extrinsic.payload())])
                .await?;
            let hash = hash
                .as_str()
                .ok_or_else(|| Error::Protocol(format!("Submission returned {}", hash)))?
                .to_string();
            tracing::debug!(
                signer = options.signer.as_deref().unwrap_or("-"),
                %hash,
                "Submitted extrinsic"
            );
            submitted.push(Submitted { extrinsic, hash });
        }

        let created = rpc
            .request("engine_createBlock", vec![json!(true), json!(true), Value::Null])
            .await?;
        let block_hash = created
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol(format!("engine_createBlock returned {}", created)))?
            .to_string();

        let header = rpc
            .request("chain_getHeader", vec![json!(block_hash)])
            .await?;
        let number = header
            .get("number")
            .ok_or_else(|| Error::Protocol(format!("Header of {} has no number", block_hash)))
            .and_then(parse_quantity)?;
        let number = u64::try_from(number)
            .map_err(|_| Error::Protocol(format!("Block number {} out of range", number)))?;

        let results = self.inspector.inspect(rpc, &block_hash, &submitted).await?;
        let block = BlockResult {
            hash: block_hash,
            number,
            extrinsics: results,
        };

        tracing::info!(
            network = %self.network,
            number = block.number,
            hash = %block.hash,
            extrinsics = block.extrinsics.len(),
            "Block created"
        );

        if !options.allow_failures {
            if let Some(failed) = block.first_failure() {
                let reason = failed
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown dispatch error".to_string());
                return Err(Error::dispatch(&failed.hash, &reason));
            }
        }

        let missing = block.missing_events(&options.expect_events);
        if !missing.is_empty() {
            return Err(Error::Assertion(format!(
                "Block #{} is missing expected events: {}",
                block.number,
                missing.join(", ")
            )));
        }

        Ok(block)
    }

    /// Hash of the best-chain block with this number
    pub async fn block_hash(&self, number: u64) -> Result<String> {
        let hash = self
            .default_rpc()
            .request("chain_getBlockHash", vec![json!(number)])
            .await?;
        match hash {
            Value::String(hash) => Ok(hash),
            Value::Null => Err(Error::InvalidInput(format!("Block #{} does not exist", number))),
            other => Err(Error::Protocol(format!("chain_getBlockHash returned {}", other))),
        }
    }

    /// Number of the best block
    pub async fn latest_number(&self) -> Result<u64> {
        let header = self.default_rpc().request("chain_getHeader", vec![]).await?;
        let number = header
            .get("number")
            .ok_or_else(|| Error::Protocol("Best header has no number".to_string()))
            .and_then(parse_quantity)?;
        u64::try_from(number)
            .map_err(|_| Error::Protocol(format!("Block number {} out of range", number)))
    }

    /// Resolve a block reference to the hash of one immutable block
    pub async fn resolve(&self, at: &BlockRef) -> Result<String> {
        match at {
            BlockRef::Hash(hash) => Ok(hash.clone()),
            BlockRef::Number(number) => self.block_hash(*number).await,
        }
    }

    /// Read a storage item, at the best block when `at` is `None`
    pub async fn query(
        &self,
        pallet: &str,
        item: &str,
        keys: &[StorageKeyArg],
        at: Option<BlockRef>,
    ) -> Result<Option<StorageValue>> {
        let key = encode_hex(&storage_key(pallet, item, keys));
        let mut params = vec![json!(key)];
        if let Some(at) = &at {
            params.push(json!(self.resolve(at).await?));
        }

        let value = self
            .default_rpc()
            .request("state_getStorage", params)
            .await?;
        match value {
            Value::Null => Ok(None),
            Value::String(hex) => StorageValue::from_hex(&hex).map(Some),
            other => Err(Error::Protocol(format!("state_getStorage returned {}", other))),
        }
    }

    /// Read a storage item at an explicit block
    pub async fn query_at(
        &self,
        pallet: &str,
        item: &str,
        keys: &[StorageKeyArg],
        at: BlockRef,
    ) -> Result<Option<StorageValue>> {
        self.query(pallet, item, keys, Some(at)).await
    }

    /// Close connections and stop the owned node
    pub async fn close(&self) {
        for client in self.clients.values() {
            client.close().await;
        }
        if let Some(mut node) = self.node.lock().await.take() {
            if let Err(e) = node.terminate().await {
                tracing::warn!(error = %e, "Failed to stop dev node");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::block::CreateBlockOptions;
    use crate::common::config::{Config, Foundation};
    use crate::mock;

    async fn mock_context() -> (ChainContext, tokio::task::JoinHandle<()>) {
        let (addr, handle) = mock::spawn_local().await.unwrap();
        let config = Config::from_toml_str(&format!(
            "[networks.mockctx]\nendpoints = {{ para = \"http://{}\" }}\n",
            addr
        ))
        .unwrap();
        let network = config.network("mockctx").unwrap();
        (ChainContext::connect(&network).await.unwrap(), handle)
    }

    fn transfer(to: &str, value: u128) -> Extrinsic {
        mock::tx::transfer(mock::DEV_ACCOUNTS[0], to, value).into_ethereum()
    }

    #[tokio::test]
    async fn test_create_empty_block() {
        let (ctx, _server) = mock_context().await;
        let first = ctx.create_block(vec![], Default::default()).await.unwrap();
        let second = ctx.create_block(vec![], Default::default()).await.unwrap();
        assert_eq!(second.number, first.number + 1);
        assert_eq!(ctx.latest_number().await.unwrap(), second.number);
        assert_eq!(ctx.block_hash(second.number).await.unwrap(), second.hash);
    }

    #[tokio::test]
    async fn test_failing_extrinsic_needs_allow_failures() {
        let (ctx, _server) = mock_context().await;
        let bad = mock::tx::failing(mock::DEV_ACCOUNTS[0]).into_ethereum();

        let err = ctx
            .create_block(vec![bad.clone()], Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Dispatch { .. }), "{err}");

        let block = ctx
            .create_block(vec![bad], CreateBlockOptions::allow_failures())
            .await
            .unwrap();
        assert!(!block.all_succeeded());
        assert!(block.events().any(|e| e.is("system.ExtrinsicFailed")));
    }

    #[tokio::test]
    async fn test_failing_substrate_extrinsic_needs_allow_failures() {
        let (ctx, _server) = mock_context().await;
        let forced = mock::tx::failing(mock::DEV_ACCOUNTS[0]).into_substrate();
        let broke = mock::tx::transfer(mock::DEV_ACCOUNTS[1], mock::DEV_ACCOUNTS[2], u128::MAX)
            .into_substrate();

        for bad in [forced.clone(), broke] {
            let err = ctx
                .create_block(vec![bad], Default::default())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Dispatch { .. }), "{err}");
        }

        let ok = mock::tx::transfer(mock::DEV_ACCOUNTS[0], mock::DEV_ACCOUNTS[3], 7).into_substrate();
        let block = ctx
            .create_block(vec![ok, forced], CreateBlockOptions::allow_failures())
            .await
            .unwrap();
        assert!(block.extrinsics[0].success);
        assert!(block.extrinsics[0].events.iter().any(|e| e.is("balances.Transfer")));
        let failure = block.extrinsics[1].error.as_ref().unwrap();
        assert_eq!((failure.module.as_str(), failure.reason.as_str()), ("mock", "Forced"));
        assert!(block.extrinsics[1].events.iter().any(|e| e.is("system.ExtrinsicFailed")));
    }

    #[tokio::test]
    async fn test_expected_events() {
        let (ctx, _server) = mock_context().await;
        let to = mock::DEV_ACCOUNTS[1];

        let ok = ctx
            .create_block(
                vec![transfer(to, 1)],
                CreateBlockOptions::expect_events(["ethereum.Executed"]),
            )
            .await;
        assert!(ok.is_ok());

        let err = ctx
            .create_block(
                vec![transfer(to, 1)],
                CreateBlockOptions::expect_events(["balances.Slashed"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Assertion(ref m) if m.contains("balances.Slashed")));
    }

    #[tokio::test]
    async fn test_query_at_block_is_stable() {
        let (ctx, _server) = mock_context().await;
        let set = |value: &str| mock::tx::set_storage("Harness", "Counter", value).into_substrate();

        let first = ctx.create_block(vec![set("0x01000000")], Default::default()).await.unwrap();
        let before = ctx
            .query_at("Harness", "Counter", &[], first.block_ref())
            .await
            .unwrap();
        assert_eq!(before.as_ref().map(|v| v.as_u32_le().unwrap()), Some(1));

        ctx.create_block(vec![set("0x02000000")], Default::default()).await.unwrap();

        let again = ctx
            .query_at("Harness", "Counter", &[], BlockRef::Number(first.number))
            .await
            .unwrap();
        assert_eq!(before, again);

        let latest = ctx.query("Harness", "Counter", &[], None).await.unwrap();
        assert_eq!(latest.map(|v| v.as_u32_le().unwrap()), Some(2));
    }

    #[tokio::test]
    async fn test_missing_storage_is_none() {
        let (ctx, _server) = mock_context().await;
        assert_eq!(ctx.query("Nope", "Nothing", &[], None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_and_constant() {
        let (ctx, _server) = mock_context().await;
        assert!(matches!(ctx.rpc("relay"), Err(Error::UnknownEndpoint(_))));
        assert!(ctx.rpc("para").is_ok());
        assert!(matches!(ctx.constant::<u64>("missing"), Err(Error::Config(_))));
        assert_eq!(ctx.foundation(), Foundation::Dev);
    }
}
