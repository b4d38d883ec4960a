//! Dispatch inspection
//!
//! Turns "this extrinsic was submitted and a block was authored" into a
//! per-extrinsic success flag, events and dispatch error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::common::{decode_hex, encode_hex, Error, Result};
use crate::rpc::RpcClient;

use super::block::{DispatchFailure, Event, Extrinsic, ExtrinsicResult};
use super::storage::storage_key;

/// One entry of a block's `System.Events` list in its JSON form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Position of the emitting extrinsic in the block body
    pub extrinsic_index: Option<usize>,
    pub event: Event,
}

/// Storage key of `System.Events`
pub fn system_events_key() -> String {
    encode_hex(&storage_key("System", "Events", &[]))
}

/// An extrinsic together with the hash the node returned on submission
#[derive(Debug, Clone)]
pub struct Submitted {
    pub extrinsic: Extrinsic,
    pub hash: String,
}

/// Resolves dispatch results for the extrinsics of one block
#[async_trait]
pub trait DispatchInspector: Send + Sync {
    async fn inspect(
        &self,
        rpc: &RpcClient,
        block_hash: &str,
        submitted: &[Submitted],
    ) -> Result<Vec<ExtrinsicResult>>;
}

/// Reads Ethereum receipts and the block body
///
/// Ethereum transactions: status `0x1` is success; every log becomes an
/// `evm.Log` event, followed by `ethereum.Executed` and
/// `system.ExtrinsicSuccess` / `system.ExtrinsicFailed`.
///
/// Substrate extrinsics: the encoded extrinsic must be part of the authored
/// block. Its outcome comes from the `System.Events` records attributed to
/// its position in the body; `system.ExtrinsicFailed` carries the module and
/// reason. When the node stores events in a form other than JSON records,
/// inclusion alone counts as success.
#[derive(Debug, Default, Clone)]
pub struct ReceiptInspector;

impl ReceiptInspector {
    async fn ethereum_result(
        &self,
        rpc: &RpcClient,
        block_hash: &str,
        hash: &str,
    ) -> Result<ExtrinsicResult> {
        let receipt = rpc
            .request("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;

        if receipt.is_null() {
            return Ok(not_included(hash, "ethereum"));
        }

        if let Some(included_in) = receipt.get("blockHash").and_then(Value::as_str) {
            // Receipts report the Ethereum block hash, which differs from the
            // Substrate hash on Frontier nodes; only log the discrepancy.
            if !included_in.eq_ignore_ascii_case(block_hash) {
                tracing::trace!(tx = %hash, %included_in, %block_hash, "Receipt block hash differs");
            }
        }

        let success = receipt.get("status").and_then(Value::as_str) == Some("0x1");

        let mut events: Vec<Event> = receipt
            .get("logs")
            .and_then(Value::as_array)
            .map(|logs| {
                logs.iter()
                    .map(|log| Event::new("evm", "Log", log.clone()))
                    .collect()
            })
            .unwrap_or_default();

        events.push(Event::new(
            "ethereum",
            "Executed",
            json!({
                "from": receipt.get("from").cloned().unwrap_or(Value::Null),
                "to": receipt.get("to").cloned().unwrap_or(Value::Null),
                "transactionHash": hash,
                "exitReason": if success { "Succeed" } else { "Revert" },
            }),
        ));

        let error = if success {
            events.push(Event::new("system", "ExtrinsicSuccess", json!({})));
            None
        } else {
            let reason = receipt
                .get("revertReason")
                .and_then(Value::as_str)
                .unwrap_or("Reverted")
                .to_string();
            events.push(Event::new(
                "system",
                "ExtrinsicFailed",
                json!({ "module": "ethereum", "reason": reason }),
            ));
            Some(DispatchFailure {
                module: "ethereum".to_string(),
                reason,
            })
        };

        Ok(ExtrinsicResult {
            hash: hash.to_string(),
            success,
            events,
            error,
        })
    }
}

fn not_included(hash: &str, module: &str) -> ExtrinsicResult {
    ExtrinsicResult {
        hash: hash.to_string(),
        success: false,
        events: Vec::new(),
        error: Some(DispatchFailure {
            module: module.to_string(),
            reason: "NotIncluded".to_string(),
        }),
    }
}

/// Encoded extrinsics of a block as returned by `chain_getBlock`
async fn block_extrinsics(rpc: &RpcClient, block_hash: &str) -> Result<Vec<String>> {
    let block = rpc
        .request("chain_getBlock", vec![json!(block_hash)])
        .await?;
    let extrinsics = block
        .pointer("/block/extrinsics")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Error::Protocol(format!("Block {} has no extrinsics list", block_hash))
        })?;
    Ok(extrinsics
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_lowercase)
        .collect())
}

/// `System.Events` at `block_hash`, if the node stores them as JSON records
async fn event_records(rpc: &RpcClient, block_hash: &str) -> Result<Option<Vec<EventRecord>>> {
    let raw = rpc
        .request("state_getStorage", vec![json!(system_events_key()), json!(block_hash)])
        .await?;
    let Some(raw) = raw.as_str() else {
        return Ok(None);
    };
    let bytes = decode_hex(raw)?;
    match serde_json::from_slice::<Vec<EventRecord>>(&bytes) {
        Ok(records) => Ok(Some(records)),
        Err(e) => {
            tracing::trace!(%block_hash, error = %e, "System.Events not readable as records");
            Ok(None)
        }
    }
}

/// Outcome of the Substrate extrinsic at `index` from the block's event records
fn substrate_result(hash: &str, index: usize, records: &[EventRecord]) -> ExtrinsicResult {
    let events: Vec<Event> = records
        .iter()
        .filter(|r| r.extrinsic_index == Some(index))
        .map(|r| r.event.clone())
        .collect();

    let error = events
        .iter()
        .find(|e| e.is("system.ExtrinsicFailed"))
        .map(|e| DispatchFailure {
            module: e
                .data
                .get("module")
                .and_then(Value::as_str)
                .unwrap_or("system")
                .to_string(),
            reason: e
                .data
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("Other")
                .to_string(),
        });

    ExtrinsicResult {
        hash: hash.to_string(),
        success: error.is_none(),
        events,
        error,
    }
}

#[async_trait]
impl DispatchInspector for ReceiptInspector {
    async fn inspect(
        &self,
        rpc: &RpcClient,
        block_hash: &str,
        submitted: &[Submitted],
    ) -> Result<Vec<ExtrinsicResult>> {
        let needs_body = submitted
            .iter()
            .any(|s| matches!(s.extrinsic, Extrinsic::Substrate(_)));
        let (body, records) = if needs_body {
            (
                block_extrinsics(rpc, block_hash).await?,
                event_records(rpc, block_hash).await?,
            )
        } else {
            (Vec::new(), None)
        };

        let mut results = Vec::with_capacity(submitted.len());
        for item in submitted {
            let result = match &item.extrinsic {
                Extrinsic::Ethereum(_) => self.ethereum_result(rpc, block_hash, &item.hash).await?,
                Extrinsic::Substrate(payload) => {
                    let payload = payload.to_lowercase();
                    match (body.iter().position(|p| *p == payload), &records) {
                        (None, _) => not_included(&item.hash, "system"),
                        (Some(index), Some(records)) => {
                            substrate_result(&item.hash, index, records)
                        }
                        (Some(_), None) => ExtrinsicResult {
                            hash: item.hash.clone(),
                            success: true,
                            events: Vec::new(),
                            error: None,
                        },
                    }
                }
            };
            results.push(result);
        }
        Ok(results)
    }
}
