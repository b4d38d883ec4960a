//! Ethereum RPC helpers

use serde_json::{json, Value};

use crate::chain::{BlockRef, ChainContext};
use crate::common::{format_quantity, parse_quantity, Error, Result};

use super::address::Address;

/// Ethereum block parameter for a reference; `latest` when absent
///
/// Hashes use the EIP-1898 object form.
pub fn block_tag(at: Option<&BlockRef>) -> Value {
    match at {
        None => json!("latest"),
        Some(BlockRef::Number(n)) => json!(format_quantity(u128::from(*n))),
        Some(BlockRef::Hash(h)) => json!({ "blockHash": h }),
    }
}

/// Free balance of an account in wei
pub async fn balance(ctx: &ChainContext, address: &Address, at: Option<&BlockRef>) -> Result<u128> {
    let value = ctx
        .default_rpc()
        .request("eth_getBalance", vec![json!(address.to_string()), block_tag(at)])
        .await?;
    parse_quantity(&value)
}

/// Nonce of an account
pub async fn transaction_count(
    ctx: &ChainContext,
    address: &Address,
    at: Option<&BlockRef>,
) -> Result<u64> {
    let value = ctx
        .default_rpc()
        .request(
            "eth_getTransactionCount",
            vec![json!(address.to_string()), block_tag(at)],
        )
        .await?;
    let count = parse_quantity(&value)?;
    u64::try_from(count).map_err(|_| Error::Protocol(format!("Nonce {} out of range", count)))
}

/// Best Ethereum block number
pub async fn block_number(ctx: &ChainContext) -> Result<u64> {
    let value = ctx.default_rpc().request("eth_blockNumber", vec![]).await?;
    let number = parse_quantity(&value)?;
    u64::try_from(number)
        .map_err(|_| Error::Protocol(format!("Block number {} out of range", number)))
}

/// Transaction at `index` of block `number`
///
/// Node errors (e.g. an index out of bounds) come back unchanged.
pub async fn transaction_by_block_and_index(
    ctx: &ChainContext,
    number: u64,
    index: u64,
) -> Result<Value> {
    ctx.default_rpc()
        .request(
            "eth_getTransactionByBlockNumberAndIndex",
            vec![
                json!(format_quantity(u128::from(number))),
                json!(format_quantity(u128::from(index))),
            ],
        )
        .await
}

/// Receipt of a transaction, `None` while it is not included
pub async fn receipt(ctx: &ChainContext, tx_hash: &str) -> Result<Option<Value>> {
    let value = ctx
        .default_rpc()
        .request("eth_getTransactionReceipt", vec![json!(tx_hash)])
        .await?;
    Ok(if value.is_null() { None } else { Some(value) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_tag() {
        assert_eq!(block_tag(None), json!("latest"));
        assert_eq!(block_tag(Some(&BlockRef::Number(26))), json!("0x1a"));
        assert_eq!(
            block_tag(Some(&BlockRef::Hash("0xab".into()))),
            json!({ "blockHash": "0xab" })
        );
    }
}
