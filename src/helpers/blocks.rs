//! Block exploration

use std::future::Future;

use futures_util::future::try_join_all;
use serde_json::{json, Value};

use crate::chain::ChainContext;
use crate::common::{parse_quantity, Error, Result};

/// A block as returned by `chain_getBlock`
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDetails {
    pub hash: String,
    pub number: u64,
    pub parent_hash: String,
    /// Encoded extrinsics, in block order
    pub extrinsics: Vec<String>,
    /// Full header as returned by the node
    pub header: Value,
}

/// Fetch one block by hash
pub async fn block_details(ctx: &ChainContext, hash: &str) -> Result<BlockDetails> {
    tracing::debug!(%hash, "Querying block");
    let block = ctx
        .default_rpc()
        .request("chain_getBlock", vec![json!(hash)])
        .await?;
    if block.is_null() {
        return Err(Error::InvalidInput(format!("Block {} not found", hash)));
    }

    let header = block
        .pointer("/block/header")
        .cloned()
        .ok_or_else(|| Error::Protocol(format!("Block {} has no header", hash)))?;
    let number = header
        .get("number")
        .ok_or_else(|| Error::Protocol(format!("Header of {} has no number", hash)))
        .and_then(parse_quantity)?;
    let parent_hash = header
        .get("parentHash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let extrinsics = block
        .pointer("/block/extrinsics")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(BlockDetails {
        hash: hash.to_string(),
        number: u64::try_from(number)
            .map_err(|_| Error::Protocol(format!("Block number {} out of range", number)))?,
        parent_hash,
        extrinsics,
        header,
    })
}

/// Visit blocks `from..=to` in order
///
/// Blocks are fetched `concurrency` at a time; the callback always sees
/// them in ascending order and one at a time.
pub async fn explore_block_range<F, Fut>(
    ctx: &ChainContext,
    from: u64,
    to: u64,
    concurrency: usize,
    mut callback: F,
) -> Result<()>
where
    F: FnMut(BlockDetails) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if from > to {
        return Err(Error::InvalidInput(format!(
            "Block range {}..={} is empty",
            from, to
        )));
    }
    let concurrency = concurrency.max(1) as u64;

    let mut current = from;
    while current <= to {
        let last = to.min(current.saturating_add(concurrency - 1));
        let chunk = try_join_all((current..=last).map(|number| async move {
            let hash = ctx.block_hash(number).await?;
            block_details(ctx, &hash).await
        }))
        .await?;

        for details in chunk {
            callback(details).await?;
        }

        if last == u64::MAX {
            break;
        }
        current = last + 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Config;

    async fn context() -> (ChainContext, tokio::task::JoinHandle<()>) {
        let (addr, handle) = crate::mock::spawn_local().await.unwrap();
        let config = Config::from_toml_str(&format!(
            "[networks.blocks]\nendpoints = {{ para = \"http://{}\" }}\n",
            addr
        ))
        .unwrap();
        let ctx = ChainContext::connect(&config.network("blocks").unwrap())
            .await
            .unwrap();
        (ctx, handle)
    }

    #[tokio::test]
    async fn test_explore_visits_in_order() {
        let (ctx, _server) = context().await;
        for _ in 0..5 {
            ctx.create_block(vec![], Default::default()).await.unwrap();
        }

        let mut seen = Vec::new();
        explore_block_range(&ctx, 1, 5, 2, |details| {
            seen.push(details.number);
            async { Ok(()) }
        })
        .await
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_block_details_links_parent() {
        let (ctx, _server) = context().await;
        let first = ctx.create_block(vec![], Default::default()).await.unwrap();
        let second = ctx.create_block(vec![], Default::default()).await.unwrap();
        let details = block_details(&ctx, &second.hash).await.unwrap();
        assert_eq!(details.number, second.number);
        assert_eq!(details.parent_hash, first.hash);
    }

    #[tokio::test]
    async fn test_empty_range_rejected() {
        let (ctx, _server) = context().await;
        let result = explore_block_range(&ctx, 3, 2, 1, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
