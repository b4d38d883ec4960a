//! RPC client for talking to a node endpoint
//!
//! `RpcClient` is cheap to clone and safe to share between tasks; each
//! call gets its own request id and waits only for its own response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::common::{Error, Result};

use super::codec;
use super::transport::{HttpTransport, Transport, WsTransport};
use super::types::{RequestMessage, RpcOutcome};

struct Inner {
    transport: Box<dyn Transport>,
    next_id: AtomicU64,
    timeout: Duration,
}

/// JSON-RPC client for one node endpoint
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("url", &self.url())
            .finish()
    }
}

impl RpcClient {
    /// Connect to an endpoint, picking the transport from the URL scheme
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let transport: Box<dyn Transport> = if url.starts_with("ws://") || url.starts_with("wss://")
        {
            Box::new(WsTransport::connect(url).await?)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Box::new(HttpTransport::new(url)?)
        } else {
            return Err(Error::Config(format!(
                "Unsupported endpoint URL '{}': expected http(s):// or ws(s)://",
                url
            )));
        };

        tracing::debug!(url = %url, "Connected RPC client");
        Ok(Self::from_transport(transport, timeout))
    }

    /// Wrap an existing transport
    pub fn from_transport(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                next_id: AtomicU64::new(1),
                timeout,
            }),
        }
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        self.inner.transport.url()
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and wait for its decoded result
    pub async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id();
        let request = RequestMessage::new(id, method, params);
        let payload = codec::encode_request(&request)?;
        tracing::debug!(id, method, "RPC >>> {}", payload);

        let call = self.inner.transport.call(id, payload);
        let response = match tokio::time::timeout(self.inner.timeout, call).await {
            Ok(response) => response?,
            Err(_) => {
                self.inner.transport.forget(id);
                return Err(Error::Transport(format!(
                    "Request '{}' to {} timed out after {} seconds",
                    method,
                    self.url(),
                    self.inner.timeout.as_secs()
                )));
            }
        };

        tracing::debug!(id, method, "RPC <<< {:?}", response);
        response.into_result()
    }

    /// Send a request and deserialize the result
    pub async fn request_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            Error::Protocol(format!("Failed to parse {} response: {}", method, e))
        })
    }

    /// Send a request and return a tagged outcome instead of an error
    pub async fn outcome(&self, method: &str, params: Vec<Value>) -> RpcOutcome {
        self.request(method, params).await.into()
    }

    /// Send several requests as one JSON-RPC batch
    ///
    /// Outcomes are returned in call order whatever order the node answers in.
    pub async fn batch(&self, calls: Vec<(String, Vec<Value>)>) -> Result<Vec<RpcOutcome>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<RequestMessage> = calls
            .into_iter()
            .map(|(method, params)| RequestMessage::new(self.next_id(), method, params))
            .collect();
        let ids: Vec<u64> = requests.iter().map(|r| r.id).collect();
        let payload = codec::encode_batch(&requests)?;
        tracing::debug!(count = ids.len(), "RPC batch >>> {}", payload);

        let call = self.inner.transport.call_batch(&ids, payload);
        let responses = match tokio::time::timeout(self.inner.timeout, call).await {
            Ok(responses) => responses?,
            Err(_) => {
                ids.iter().for_each(|id| self.inner.transport.forget(*id));
                return Err(Error::Transport(format!(
                    "Batch to {} timed out after {} seconds",
                    self.url(),
                    self.inner.timeout.as_secs()
                )));
            }
        };

        Ok(responses
            .into_iter()
            .map(|r| r.into_result().into())
            .collect())
    }

    /// Close the underlying connection
    pub async fn close(&self) {
        self.inner.transport.close().await;
    }
}
