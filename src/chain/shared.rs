//! Process-wide read-only context
//!
//! Read-only suites share one connection. It is created by the first
//! [`initialize`] call and released by [`teardown`] when the process is
//! done running suites.

use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;

use crate::common::config::ResolvedNetwork;
use crate::common::{Error, Result};

use super::context::ChainContext;

/// Suite id used for the log file of a node launched for the shared context
const SHARED_ID: &str = "shared";

static SHARED: OnceLock<Mutex<Option<Arc<ChainContext>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<ChainContext>>> {
    SHARED.get_or_init(|| Mutex::new(None))
}

/// Connect the shared context once; later calls return the same handle
///
/// Asking for a different network while one is live is an error.
pub async fn initialize(network: &ResolvedNetwork) -> Result<Arc<ChainContext>> {
    let mut guard = slot().lock().await;

    if let Some(context) = guard.as_ref() {
        if context.network() != network.name {
            return Err(Error::Config(format!(
                "Shared context is connected to '{}', not '{}'",
                context.network(),
                network.name
            )));
        }
        return Ok(Arc::clone(context));
    }

    tracing::info!(network = %network.name, "Connecting shared read-only context");
    let context = Arc::new(ChainContext::launch(network, SHARED_ID).await?.into_read_only());
    *guard = Some(Arc::clone(&context));
    Ok(context)
}

/// The shared context, if initialized
pub async fn current() -> Option<Arc<ChainContext>> {
    slot().lock().await.clone()
}

/// Close the shared context
pub async fn teardown() {
    let context = slot().lock().await.take();
    if let Some(context) = context {
        tracing::debug!(network = %context.network(), "Tearing down shared context");
        context.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::{Config, Foundation};
    use crate::mock;

    #[tokio::test]
    async fn test_shared_lifecycle() {
        let (addr, _server) = mock::spawn_local().await.unwrap();
        let config = Config::from_toml_str(&format!(
            "[networks.sharedtest]\nfoundation = \"read_only\"\nendpoints = {{ para = \"http://{}\" }}\n\n[networks.other]\nfoundation = \"read_only\"\nendpoints = {{ para = \"http://{}\" }}\n",
            addr, addr
        ))
        .unwrap();
        let network = config.network("sharedtest").unwrap();

        let first = initialize(&network).await.unwrap();
        let second = initialize(&network).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.foundation(), Foundation::ReadOnly);

        let other = config.network("other").unwrap();
        assert!(matches!(initialize(&other).await, Err(Error::Config(_))));

        teardown().await;
        assert!(current().await.is_none());
    }
}
