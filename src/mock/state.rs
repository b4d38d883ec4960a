//! In-memory manual-seal chain
//!
//! Every authored block keeps a full copy of the post-block state, so reads
//! at an old block never observe later changes.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Value};

use crate::chain::block::Event;
use crate::chain::inspector::{system_events_key, EventRecord};
use crate::chain::storage::twox_256;
use crate::common::{decode_hex, encode_hex, format_quantity, parse_quantity};
use crate::rpc::codes;

use super::tx::MockTx;
use super::DEV_ACCOUNTS;

/// Balance of every dev account at genesis
pub const GENESIS_BALANCE: u128 = 1_208_925_819_614_629_174_706_176;

/// Gas charged for every Ethereum transaction
pub const TRANSFER_GAS: u128 = 21_000;

/// Gas price in wei
pub const GAS_PRICE: u128 = 1_000_000_000;

/// Ethereum chain id reported by `eth_chainId`
pub const CHAIN_ID: u64 = 1281;

/// `keccak256("Transfer(address,address,uint256)")`
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// JSON-RPC error produced by the mock
pub type RpcError = (i64, String);

type RpcResult = std::result::Result<Value, RpcError>;

fn internal(message: impl Into<String>) -> RpcError {
    (codes::INTERNAL_ERROR, message.into())
}

fn invalid_params(message: impl Into<String>) -> RpcError {
    (codes::INVALID_PARAMS, message.into())
}

#[derive(Debug, Clone, Default)]
struct State {
    balances: HashMap<String, u128>,
    nonces: HashMap<String, u64>,
    /// Hex storage key -> hex value
    storage: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Ethereum,
    Substrate,
}

#[derive(Debug, Clone)]
struct PendingTx {
    kind: Kind,
    payload: String,
    hash: String,
    tx: MockTx,
}

#[derive(Debug, Clone)]
struct EthTx {
    hash: String,
    from: String,
    to: String,
    value: u128,
    nonce: u64,
    input: String,
    success: bool,
    logs: Vec<Value>,
}

#[derive(Debug, Clone)]
struct Block {
    number: u64,
    hash: String,
    parent_hash: String,
    extrinsics: Vec<String>,
    eth_txs: Vec<EthTx>,
    state: State,
}

impl Block {
    fn header(&self) -> Value {
        json!({
            "parentHash": self.parent_hash,
            "number": format_quantity(u128::from(self.number)),
            "stateRoot": encode_hex(&twox_256(format!("state-{}", self.hash).as_bytes())),
            "extrinsicsRoot": encode_hex(&twox_256(self.extrinsics.concat().as_bytes())),
            "digest": { "logs": [] },
        })
    }

    fn eth_tx_json(&self, index: usize, tx: &EthTx) -> Value {
        json!({
            "hash": tx.hash,
            "blockHash": self.hash,
            "blockNumber": format_quantity(u128::from(self.number)),
            "transactionIndex": format_quantity(index as u128),
            "from": tx.from,
            "to": tx.to,
            "value": format_quantity(tx.value),
            "nonce": format_quantity(u128::from(tx.nonce)),
            "gas": format_quantity(TRANSFER_GAS),
            "gasPrice": format_quantity(GAS_PRICE),
            "input": tx.input,
        })
    }
}

/// Chain state of one mock node
#[derive(Debug, Clone)]
pub struct MockChain {
    blocks: Vec<Block>,
    pending: Vec<PendingTx>,
    /// Tx hash -> (block index, tx index)
    eth_index: HashMap<String, (usize, usize)>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Chain with only the genesis block; dev accounts are funded
    pub fn new() -> Self {
        let mut state = State::default();
        for account in DEV_ACCOUNTS {
            state.balances.insert(account.to_lowercase(), GENESIS_BALANCE);
        }
        let genesis = Block {
            number: 0,
            hash: encode_hex(&twox_256(b"mock-genesis")),
            parent_hash: encode_hex(&[0u8; 32]),
            extrinsics: Vec::new(),
            eth_txs: Vec::new(),
            state,
        };
        Self {
            blocks: vec![genesis],
            pending: Vec::new(),
            eth_index: HashMap::new(),
        }
    }

    fn best(&self) -> &Block {
        // blocks always holds at least genesis
        &self.blocks[self.blocks.len() - 1]
    }

    fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.hash.eq_ignore_ascii_case(hash))
    }

    fn block_by_number(&self, number: u64) -> Option<&Block> {
        usize::try_from(number).ok().and_then(|i| self.blocks.get(i))
    }

    /// Block named by an optional Substrate hash parameter
    fn block_at(&self, at: Option<&Value>) -> std::result::Result<&Block, RpcError> {
        match at {
            None | Some(Value::Null) => Ok(self.best()),
            Some(Value::String(hash)) => self
                .block_by_hash(hash)
                .ok_or_else(|| internal(format!("Unknown block {}", hash))),
            Some(other) => Err(invalid_params(format!("Invalid block hash {}", other))),
        }
    }

    /// Block named by an Ethereum block parameter
    fn block_at_tag(&self, tag: Option<&Value>) -> std::result::Result<&Block, RpcError> {
        match tag {
            None | Some(Value::Null) => Ok(self.best()),
            Some(Value::String(s)) if s == "latest" || s == "pending" || s == "finalized" || s == "safe" => {
                Ok(self.best())
            }
            Some(Value::String(s)) if s == "earliest" => Ok(&self.blocks[0]),
            Some(Value::Object(map)) => match map.get("blockHash").and_then(Value::as_str) {
                Some(hash) => self
                    .block_by_hash(hash)
                    .ok_or_else(|| internal(format!("Unknown block {}", hash))),
                None => Err(invalid_params("Block object needs blockHash")),
            },
            Some(value) => {
                let number = parse_quantity(value).map_err(|e| invalid_params(e.to_string()))?;
                u64::try_from(number)
                    .ok()
                    .and_then(|n| self.block_by_number(n))
                    .ok_or_else(|| internal(format!("Block {} not found", number)))
            }
        }
    }

    fn submit(&mut self, kind: Kind, params: &[Value]) -> RpcResult {
        let payload = params
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_params("Expected a hex payload"))?;
        let tx = MockTx::decode(payload).map_err(|e| internal(format!("Invalid transaction: {}", e)))?;

        let mut seed = decode_hex(payload).map_err(|e| invalid_params(e.to_string()))?;
        seed.extend_from_slice(&(self.blocks.len() as u64).to_le_bytes());
        seed.extend_from_slice(&(self.pending.len() as u64).to_le_bytes());
        let hash = encode_hex(&twox_256(&seed));

        self.pending.push(PendingTx {
            kind,
            payload: payload.to_lowercase(),
            hash: hash.clone(),
            tx,
        });
        Ok(json!(hash))
    }

    /// Author a block from the pending pool
    fn create_block(&mut self, params: &[Value]) -> RpcResult {
        let create_empty = params.first().and_then(Value::as_bool).unwrap_or(true);
        if !create_empty && self.pending.is_empty() {
            return Err(internal("No transactions to include"));
        }
        if let Some(parent) = params.get(2).and_then(Value::as_str) {
            if !parent.eq_ignore_ascii_case(&self.best().hash) {
                return Err(internal("Forking is not supported"));
            }
        }

        let parent = self.best();
        let number = parent.number + 1;
        let parent_hash = parent.hash.clone();
        let mut state = parent.state.clone();
        let mut extrinsics = Vec::new();
        let mut eth_txs = Vec::new();
        let mut events = Vec::new();

        for (index, pending) in std::mem::take(&mut self.pending).into_iter().enumerate() {
            extrinsics.push(pending.payload.clone());
            let outcome = match pending.kind {
                Kind::Ethereum => {
                    let tx = apply_ethereum(&mut state, &pending);
                    let outcome = if tx.success {
                        Ok(vec![Event::new("ethereum", "Executed", json!({ "transactionHash": tx.hash }))])
                    } else {
                        Err(("ethereum", "Reverted"))
                    };
                    eth_txs.push(tx);
                    outcome
                }
                Kind::Substrate => apply_substrate(&mut state, &pending.tx),
            };
            push_dispatch_events(&mut events, index, outcome);
        }

        // Events only live for the block that emitted them
        let events = serde_json::to_vec(&events)
            .map_err(|e| internal(format!("Cannot encode events: {}", e)))?;
        state.storage.insert(system_events_key(), encode_hex(&events));

        let mut seed = parent_hash.clone().into_bytes();
        seed.extend_from_slice(&number.to_le_bytes());
        seed.extend_from_slice(extrinsics.concat().as_bytes());
        let hash = encode_hex(&twox_256(&seed));

        let block_index = self.blocks.len();
        for (i, tx) in eth_txs.iter().enumerate() {
            self.eth_index.insert(tx.hash.clone(), (block_index, i));
        }
        self.blocks.push(Block {
            number,
            hash: hash.clone(),
            parent_hash,
            extrinsics,
            eth_txs,
            state,
        });

        tracing::debug!(number, %hash, "Mock block authored");
        Ok(json!({ "hash": hash, "aux": { "header_only": false, "size": 0 } }))
    }

    fn receipt(&self, params: &[Value]) -> RpcResult {
        let hash = params
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_params("Expected a transaction hash"))?;
        let Some(&(block_index, index)) = self.eth_index.get(&hash.to_lowercase()) else {
            return Ok(Value::Null);
        };
        let block = &self.blocks[block_index];
        let tx = &block.eth_txs[index];
        Ok(json!({
            "transactionHash": tx.hash,
            "transactionIndex": format_quantity(index as u128),
            "blockHash": block.hash,
            "blockNumber": format_quantity(u128::from(block.number)),
            "from": tx.from,
            "to": tx.to,
            "gasUsed": format_quantity(TRANSFER_GAS),
            "effectiveGasPrice": format_quantity(GAS_PRICE),
            "status": if tx.success { "0x1" } else { "0x0" },
            "logs": tx.logs,
        }))
    }

    fn tx_by_block_and_index(&self, params: &[Value]) -> RpcResult {
        let block = self.block_at_tag(params.first())?;
        let index = params
            .get(1)
            .ok_or_else(|| invalid_params("Expected a transaction index"))
            .and_then(|v| parse_quantity(v).map_err(|e| invalid_params(e.to_string())))?;
        let tx = usize::try_from(index)
            .ok()
            .and_then(|i| block.eth_txs.get(i))
            .ok_or_else(|| internal(format!("{} is out of bounds", index)))?;
        Ok(block.eth_tx_json(index as usize, tx))
    }

    fn account_param(params: &[Value]) -> std::result::Result<String, RpcError> {
        params
            .first()
            .and_then(Value::as_str)
            .map(str::to_lowercase)
            .ok_or_else(|| invalid_params("Expected an address"))
    }

    /// Answer one JSON-RPC call
    pub fn handle(&mut self, method: &str, params: &[Value]) -> RpcResult {
        match method {
            "system_health" => Ok(json!({ "peers": 0, "isSyncing": false, "shouldHavePeers": false })),
            "system_chain" => Ok(json!("Mock Dev")),
            "system_name" => Ok(json!("mock-node")),

            "engine_createBlock" => self.create_block(params),
            "eth_sendRawTransaction" => self.submit(Kind::Ethereum, params),
            "author_submitExtrinsic" => self.submit(Kind::Substrate, params),
            "author_pendingExtrinsics" => Ok(json!(self
                .pending
                .iter()
                .map(|p| p.payload.clone())
                .collect::<Vec<_>>())),

            "chain_getBlockHash" => {
                let block = match params.first() {
                    None | Some(Value::Null) => Some(self.best()),
                    Some(value) => parse_quantity(value)
                        .ok()
                        .and_then(|n| u64::try_from(n).ok())
                        .and_then(|n| self.block_by_number(n)),
                };
                Ok(block.map(|b| json!(b.hash)).unwrap_or(Value::Null))
            }
            "chain_getHeader" => match params.first() {
                Some(Value::String(hash)) => {
                    Ok(self.block_by_hash(hash).map(Block::header).unwrap_or(Value::Null))
                }
                _ => Ok(self.best().header()),
            },
            "chain_getBlock" => {
                let block = match params.first() {
                    Some(Value::String(hash)) => self.block_by_hash(hash),
                    _ => Some(self.best()),
                };
                Ok(block
                    .map(|b| {
                        json!({
                            "block": { "header": b.header(), "extrinsics": b.extrinsics },
                            "justifications": null,
                        })
                    })
                    .unwrap_or(Value::Null))
            }
            "chain_getFinalizedHead" => Ok(json!(self.best().hash)),
            "state_getStorage" => {
                let key = params
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid_params("Expected a storage key"))?;
                let block = self.block_at(params.get(1))?;
                Ok(block
                    .state
                    .storage
                    .get(&key.to_lowercase())
                    .map(|v| json!(v))
                    .unwrap_or(Value::Null))
            }

            "eth_chainId" => Ok(json!(format_quantity(u128::from(CHAIN_ID)))),
            "eth_gasPrice" => Ok(json!(format_quantity(GAS_PRICE))),
            "eth_blockNumber" => Ok(json!(format_quantity(u128::from(self.best().number)))),
            "eth_getBalance" => {
                let account = Self::account_param(params)?;
                let block = self.block_at_tag(params.get(1))?;
                let balance = block.state.balances.get(&account).copied().unwrap_or(0);
                Ok(json!(format_quantity(balance)))
            }
            "eth_getTransactionCount" => {
                let account = Self::account_param(params)?;
                let block = self.block_at_tag(params.get(1))?;
                let nonce = block.state.nonces.get(&account).copied().unwrap_or(0);
                Ok(json!(format_quantity(u128::from(nonce))))
            }
            "eth_getTransactionReceipt" => self.receipt(params),
            "eth_getTransactionByBlockNumberAndIndex" => self.tx_by_block_and_index(params),

            _ => Err((codes::METHOD_NOT_FOUND, "Method not found".to_string())),
        }
    }
}

fn apply_ethereum(state: &mut State, pending: &PendingTx) -> EthTx {
    let fee = TRANSFER_GAS * GAS_PRICE;

    let (from, to, value, fail) = match &pending.tx {
        MockTx::Transfer {
            from,
            to,
            value,
            fail,
        } => (
            from.to_lowercase(),
            to.to_lowercase(),
            parse_quantity(&json!(value)).ok(),
            *fail,
        ),
        MockTx::SetStorage { .. } => {
            // Storage writes are not Ethereum transactions
            let from = DEV_ACCOUNTS[0].to_lowercase();
            (from.clone(), from, None, true)
        }
    };

    let nonce = state.nonces.get(&from).copied().unwrap_or(0);
    state.nonces.insert(from.clone(), nonce + 1);

    let sender = state.balances.get(&from).copied().unwrap_or(0);
    let after_fee = sender.saturating_sub(fee);
    state.balances.insert(from.clone(), after_fee);

    let success = match value {
        Some(value) if !fail && after_fee >= value => {
            state.balances.insert(from.clone(), after_fee - value);
            let recipient = state.balances.get(&to).copied().unwrap_or(0);
            state.balances.insert(to.clone(), recipient.saturating_add(value));
            true
        }
        _ => false,
    };

    let logs = if success {
        vec![json!({
            "address": to,
            "topics": [TRANSFER_TOPIC],
            "data": format_quantity(value.unwrap_or(0)),
        })]
    } else {
        Vec::new()
    };

    EthTx {
        hash: pending.hash.clone(),
        from,
        to,
        value: value.unwrap_or(0),
        nonce,
        input: pending.payload.clone(),
        success,
        logs,
    }
}

/// Events of a dispatched extrinsic, or the module and reason it failed with
type Dispatch = std::result::Result<Vec<Event>, (&'static str, &'static str)>;

fn push_dispatch_events(records: &mut Vec<EventRecord>, index: usize, outcome: Dispatch) {
    let mut push = |event: Event| {
        records.push(EventRecord {
            extrinsic_index: Some(index),
            event,
        })
    };
    match outcome {
        Ok(events) => {
            events.into_iter().for_each(&mut push);
            push(Event::new("system", "ExtrinsicSuccess", json!({})));
        }
        Err((module, reason)) => push(Event::new(
            "system",
            "ExtrinsicFailed",
            json!({ "module": module, "reason": reason }),
        )),
    }
}

fn apply_substrate(state: &mut State, tx: &MockTx) -> Dispatch {
    match tx {
        MockTx::SetStorage { key, value } => {
            state.storage.insert(key.to_lowercase(), value.to_lowercase());
            Ok(Vec::new())
        }
        MockTx::Transfer {
            from,
            to,
            value,
            fail,
        } => {
            if *fail {
                return Err(("mock", "Forced"));
            }
            let Ok(amount) = parse_quantity(&json!(value)) else {
                return Err(("balances", "InvalidAmount"));
            };
            let (from, to) = (from.to_lowercase(), to.to_lowercase());
            let sender = state.balances.get(&from).copied().unwrap_or(0);
            if sender < amount {
                return Err(("balances", "InsufficientBalance"));
            }
            state.balances.insert(from.clone(), sender - amount);
            let recipient = state.balances.get(&to).copied().unwrap_or(0);
            state.balances.insert(to.clone(), recipient.saturating_add(amount));
            Ok(vec![Event::new(
                "balances",
                "Transfer",
                json!({ "from": from, "to": to, "amount": format_quantity(amount) }),
            )])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::tx;

    fn call(chain: &mut MockChain, method: &str, params: Value) -> RpcResult {
        let params = params.as_array().cloned().unwrap_or_default();
        chain.handle(method, &params)
    }

    #[test]
    fn test_genesis() {
        let mut chain = MockChain::new();
        assert_eq!(call(&mut chain, "eth_blockNumber", json!([])).unwrap(), json!("0x0"));
        let balance = call(&mut chain, "eth_getBalance", json!([DEV_ACCOUNTS[1], "latest"])).unwrap();
        assert_eq!(parse_quantity(&balance).unwrap(), GENESIS_BALANCE);
    }

    #[test]
    fn test_transfer_moves_value_and_charges_fee() {
        let mut chain = MockChain::new();
        let (alith, baltathar) = (DEV_ACCOUNTS[0], DEV_ACCOUNTS[1]);
        let payload = tx::transfer(alith, baltathar, 1_000).encode();

        let hash = call(&mut chain, "eth_sendRawTransaction", json!([payload])).unwrap();
        call(&mut chain, "engine_createBlock", json!([true, true, null])).unwrap();

        let receipt = call(&mut chain, "eth_getTransactionReceipt", json!([hash])).unwrap();
        assert_eq!(receipt["status"], json!("0x1"));

        let get = |chain: &mut MockChain, who: &str| {
            parse_quantity(&call(chain, "eth_getBalance", json!([who, "latest"])).unwrap()).unwrap()
        };
        assert_eq!(get(&mut chain, baltathar), GENESIS_BALANCE + 1_000);
        assert_eq!(
            get(&mut chain, alith),
            GENESIS_BALANCE - 1_000 - TRANSFER_GAS * GAS_PRICE
        );

        // Old block still shows genesis balances
        let at_genesis = call(&mut chain, "eth_getBalance", json!([baltathar, "0x0"])).unwrap();
        assert_eq!(parse_quantity(&at_genesis).unwrap(), GENESIS_BALANCE);
    }

    #[test]
    fn test_index_out_of_bounds_names_index() {
        let mut chain = MockChain::new();
        let payload = tx::transfer(DEV_ACCOUNTS[0], DEV_ACCOUNTS[1], 0).encode();
        call(&mut chain, "eth_sendRawTransaction", json!([payload])).unwrap();
        call(&mut chain, "engine_createBlock", json!([true, true, null])).unwrap();

        let tx = call(&mut chain, "eth_getTransactionByBlockNumberAndIndex", json!(["0x1", "0x0"])).unwrap();
        assert_eq!(tx["transactionIndex"], json!("0x0"));

        let (code, message) =
            call(&mut chain, "eth_getTransactionByBlockNumberAndIndex", json!(["0x1", "0x1"])).unwrap_err();
        assert_eq!(code, codes::INTERNAL_ERROR);
        assert_eq!(message, "1 is out of bounds");
    }

    #[test]
    fn test_unknown_method() {
        let mut chain = MockChain::new();
        let (code, message) = call(&mut chain, "eth_compileSolidity", json!(["contract A {}"])).unwrap_err();
        assert_eq!(code, codes::METHOD_NOT_FOUND);
        assert_eq!(message, "Method not found");
    }

    #[test]
    fn test_substrate_failures_are_recorded_in_system_events() {
        let mut chain = MockChain::new();
        let ok = tx::transfer(DEV_ACCOUNTS[0], DEV_ACCOUNTS[1], 5).encode();
        let broke = tx::transfer(DEV_ACCOUNTS[1], DEV_ACCOUNTS[2], u128::MAX).encode();
        call(&mut chain, "author_submitExtrinsic", json!([ok])).unwrap();
        call(&mut chain, "author_submitExtrinsic", json!([broke])).unwrap();
        call(&mut chain, "engine_createBlock", json!([true, true, null])).unwrap();

        let raw = call(&mut chain, "state_getStorage", json!([system_events_key()])).unwrap();
        let bytes = decode_hex(raw.as_str().unwrap()).unwrap();
        let records: Vec<EventRecord> = serde_json::from_slice(&bytes).unwrap();

        let names: Vec<_> = records
            .iter()
            .map(|r| (r.extrinsic_index.unwrap(), r.event.name()))
            .collect();
        assert_eq!(
            names,
            vec![
                (0, "balances.Transfer".to_string()),
                (0, "system.ExtrinsicSuccess".to_string()),
                (1, "system.ExtrinsicFailed".to_string()),
            ]
        );
        assert_eq!(records[2].event.data["reason"], json!("InsufficientBalance"));

        // The failed transfer left the sender untouched
        let balance = call(&mut chain, "eth_getBalance", json!([DEV_ACCOUNTS[1], "latest"])).unwrap();
        assert_eq!(parse_quantity(&balance).unwrap(), GENESIS_BALANCE + 5);

        // The next block starts with an empty event list
        call(&mut chain, "engine_createBlock", json!([true, true, null])).unwrap();
        let raw = call(&mut chain, "state_getStorage", json!([system_events_key()])).unwrap();
        assert_eq!(raw, json!(encode_hex(b"[]")));
    }

    #[test]
    fn test_create_block_without_empty_blocks() {
        let mut chain = MockChain::new();
        assert!(call(&mut chain, "engine_createBlock", json!([false, true, null])).is_err());
    }
}
