//! Where suites get their chain context from

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::common::config::{Config, Foundation};
use crate::common::{Error, Result};

use super::context::ChainContext;
use super::shared;

/// What a provider needs to know about the suite asking for a context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteMeta {
    pub id: String,
    pub foundation: Foundation,
    /// Network override; the provider's default otherwise
    pub network: Option<String>,
}

/// Hands out chain contexts to suites and takes them back
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn acquire(&self, suite: &SuiteMeta) -> Result<Arc<ChainContext>>;

    async fn release(&self, context: Arc<ChainContext>);
}

/// Contexts built from configuration
///
/// Dev suites get a fresh context (and node, when the network launches one)
/// each; read-only suites share the process-wide context.
///
/// A dev network without a launch command is one externally managed node,
/// so its dev suites hold a per-network lease from acquire to release and
/// run one at a time whatever the job count.
#[derive(Debug, Clone)]
pub struct NetworkProvider {
    config: Config,
    network: String,
    leases: Arc<Leases>,
}

#[derive(Debug, Default)]
struct Leases {
    /// One lock per externally managed network
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Guards held by contexts that have not been released yet
    held: Mutex<Vec<(Arc<ChainContext>, OwnedMutexGuard<()>)>>,
}

impl Leases {
    fn lock_for(&self, network: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(network.to_string()).or_default())
    }

    fn hold(&self, context: &Arc<ChainContext>, guard: OwnedMutexGuard<()>) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.push((Arc::clone(context), guard));
    }

    fn give_back(&self, context: &Arc<ChainContext>) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.retain(|(leased, _)| !Arc::ptr_eq(leased, context));
    }
}

impl NetworkProvider {
    pub fn new(config: Config, network: impl Into<String>) -> Self {
        Self {
            config,
            network: network.into(),
            leases: Arc::default(),
        }
    }
}

#[async_trait]
impl ContextProvider for NetworkProvider {
    async fn acquire(&self, suite: &SuiteMeta) -> Result<Arc<ChainContext>> {
        let name = suite.network.as_deref().unwrap_or(&self.network);
        let network = self.config.network(name)?;

        match suite.foundation {
            Foundation::Dev => {
                if network.foundation == Foundation::ReadOnly {
                    return Err(Error::Config(format!(
                        "Suite {} needs a dev foundation but network '{}' is read_only",
                        suite.id, network.name
                    )));
                }
                if network.launch.is_some() {
                    let context = ChainContext::launch(&network, &suite.id).await?;
                    return Ok(Arc::new(context));
                }

                let lock = self.leases.lock_for(&network.name);
                let guard = match Arc::clone(&lock).try_lock_owned() {
                    Ok(guard) => guard,
                    Err(_) => {
                        tracing::info!(
                            suite = %suite.id,
                            network = %network.name,
                            "Network has no launch command; waiting for the running dev suite"
                        );
                        lock.lock_owned().await
                    }
                };
                let context = Arc::new(ChainContext::connect(&network).await?);
                self.leases.hold(&context, guard);
                Ok(context)
            }
            Foundation::ReadOnly => shared::initialize(&network).await,
        }
    }

    async fn release(&self, context: Arc<ChainContext>) {
        // The shared context outlives its suites
        if context.foundation() == Foundation::Dev {
            context.close().await;
            self.leases.give_back(&context);
        }
    }
}

/// Always hands out the same context; nothing is closed on release
#[derive(Debug, Clone)]
pub struct StaticProvider {
    context: Arc<ChainContext>,
}

impl StaticProvider {
    pub fn new(context: Arc<ChainContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ContextProvider for StaticProvider {
    async fn acquire(&self, _suite: &SuiteMeta) -> Result<Arc<ChainContext>> {
        Ok(Arc::clone(&self.context))
    }

    async fn release(&self, _context: Arc<ChainContext>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(foundation: Foundation, network: Option<&str>) -> SuiteMeta {
        SuiteMeta {
            id: "P01".to_string(),
            foundation,
            network: network.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_dev_suite_on_read_only_network_is_rejected() {
        let config = Config::from_toml_str(
            "[networks.live]\nfoundation = \"read_only\"\nendpoints = { para = \"http://127.0.0.1:1\" }\n",
        )
        .unwrap();
        let provider = NetworkProvider::new(config, "live");
        let err = provider
            .acquire(&meta(Foundation::Dev, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_unknown_network_override() {
        let provider = NetworkProvider::new(Config::default(), "dev");
        let err = provider
            .acquire(&meta(Foundation::Dev, Some("nowhere")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownNetwork(_)));
    }

    #[tokio::test]
    async fn test_dev_context_is_fresh_per_suite() {
        let (addr, _server) = crate::mock::spawn_local().await.unwrap();
        let config = Config::from_toml_str(&format!(
            "[networks.ext]\nendpoints = {{ para = \"http://{}\" }}\n",
            addr
        ))
        .unwrap();
        let provider = NetworkProvider::new(config, "ext");
        let a = provider.acquire(&meta(Foundation::Dev, None)).await.unwrap();
        provider.release(Arc::clone(&a)).await;
        let b = provider.acquire(&meta(Foundation::Dev, None)).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        provider.release(b).await;
    }

    #[tokio::test]
    async fn test_dev_suites_wait_for_external_node() {
        let (addr, _server) = crate::mock::spawn_local().await.unwrap();
        let config = Config::from_toml_str(&format!(
            "[networks.ext]\nendpoints = {{ para = \"http://{}\" }}\n",
            addr
        ))
        .unwrap();
        let provider = NetworkProvider::new(config, "ext");

        let first = provider.acquire(&meta(Foundation::Dev, None)).await.unwrap();
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            provider.acquire(&meta(Foundation::Dev, None)),
        )
        .await;
        assert!(waiting.is_err(), "second dev suite got a context while the first held one");

        provider.release(first).await;
        let second = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            provider.acquire(&meta(Foundation::Dev, None)),
        )
        .await
        .unwrap()
        .unwrap();
        provider.release(second).await;
    }
}
