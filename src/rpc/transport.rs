//! Node transports
//!
//! HTTP issues one POST per call, so concurrent calls are independent by
//! construction. WebSocket shares one connection: a reader task routes
//! every response to the caller waiting on its id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::common::{Error, Result};

use super::codec::{self, Incoming};
use super::types::ResponseMessage;

/// A connection able to carry JSON-RPC frames to one node endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one encoded request and wait for the response carrying `id`
    async fn call(&self, id: u64, payload: String) -> Result<ResponseMessage>;

    /// Send one encoded batch and wait for a response for every id
    ///
    /// Responses are returned in the same order as `ids`.
    async fn call_batch(&self, ids: &[u64], payload: String) -> Result<Vec<ResponseMessage>>;

    /// Drop bookkeeping for a call the client gave up on
    fn forget(&self, _id: u64) {}

    /// Close the connection
    async fn close(&self) {}

    /// Endpoint URL
    fn url(&self) -> &str;
}

/// Order batch responses to match the request ids
fn order_batch(ids: &[u64], responses: Vec<ResponseMessage>) -> Result<Vec<ResponseMessage>> {
    let mut by_id: HashMap<u64, ResponseMessage> = responses
        .into_iter()
        .filter_map(|r| r.numeric_id().map(|id| (id, r)))
        .collect();

    ids.iter()
        .map(|id| {
            by_id
                .remove(id)
                .ok_or_else(|| Error::Protocol(format!("Batch response missing id {}", id)))
        })
        .collect()
}

// ============== HTTP ==============

/// JSON-RPC over HTTP(S)
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn post(&self, payload: String) -> Result<Incoming> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Some nodes answer JSON-RPC errors with non-2xx statuses; keep the
        // body when it decodes.
        match codec::decode_frame(&body) {
            Ok(incoming) => Ok(incoming),
            Err(_) if !status.is_success() => Err(Error::Transport(format!(
                "HTTP {} from {}",
                status, self.url
            ))),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, id: u64, payload: String) -> Result<ResponseMessage> {
        match self.post(payload).await? {
            Incoming::Single(response) => {
                // Errors the node cannot attribute come back with id null
                if response.numeric_id().is_some_and(|rid| rid != id) {
                    return Err(Error::Protocol(format!(
                        "Response ID mismatch: expected {}, got {}",
                        id, response.id
                    )));
                }
                Ok(response)
            }
            other => Err(Error::Protocol(format!(
                "Expected a single response, got {:?}",
                other
            ))),
        }
    }

    async fn call_batch(&self, ids: &[u64], payload: String) -> Result<Vec<ResponseMessage>> {
        match self.post(payload).await? {
            Incoming::Batch(responses) => order_batch(ids, responses),
            // A batch rejected as a whole comes back as one error object
            Incoming::Single(response) if response.error.is_some() => {
                Ok(ids.iter().map(|_| response.clone()).collect())
            }
            other => Err(Error::Protocol(format!(
                "Expected a batch response, got {:?}",
                other
            ))),
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}

// ============== WebSocket ==============

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseMessage>>>>;

/// JSON-RPC over WebSocket with response multiplexing
pub struct WsTransport {
    url: String,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsTransport {
    /// Open the WebSocket and start the reader/writer tasks
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Transport(format!("Failed to connect to {}: {}", url, e)))?;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    tracing::warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = {
            let pending = pending.clone();
            let closed = closed.clone();
            let url = url.to_string();
            tokio::spawn(async move {
                while let Some(msg) = source.next().await {
                    let text = match msg {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(_) => {
                                tracing::warn!("Ignoring non UTF-8 binary frame");
                                continue;
                            }
                        },
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!("WebSocket read from {} failed: {}", url, e);
                            break;
                        }
                    };
                    route_frame(&pending, &text);
                }

                // Fail new calls first, then wake everyone still waiting
                closed.store(true, Ordering::SeqCst);
                if let Ok(mut map) = pending.lock() {
                    map.clear();
                }
                tracing::debug!("WebSocket reader for {} finished", url);
            })
        };

        Ok(Self {
            url: url.to_string(),
            outgoing,
            pending,
            closed,
            reader,
            writer,
        })
    }

    fn register(&self, id: u64) -> Result<oneshot::Receiver<ResponseMessage>> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| Error::Internal("pending map poisoned".to_string()))?
            .insert(id, tx);

        if self.closed.load(Ordering::SeqCst) {
            self.forget(id);
            return Err(Error::Transport(format!("Connection to {} closed", self.url)));
        }
        Ok(rx)
    }

    fn send(&self, payload: String) -> Result<()> {
        self.outgoing
            .send(Message::Text(payload))
            .map_err(|_| Error::Transport(format!("Connection to {} closed", self.url)))
    }

    async fn wait(&self, rx: oneshot::Receiver<ResponseMessage>) -> Result<ResponseMessage> {
        rx.await.map_err(|_| {
            Error::Transport(format!(
                "Connection to {} closed before the response arrived",
                self.url
            ))
        })
    }
}

/// Hand each response in a frame to the caller waiting on its id
fn route_frame(pending: &Pending, text: &str) {
    let responses = match codec::decode_frame(text) {
        Ok(Incoming::Single(response)) => vec![response],
        Ok(Incoming::Batch(responses)) => responses,
        Ok(Incoming::Notification { method, .. }) => {
            tracing::trace!("Ignoring notification {}", method);
            return;
        }
        Err(e) => {
            tracing::warn!("Dropping undecodable frame: {}", e);
            return;
        }
    };

    let Ok(mut map) = pending.lock() else {
        return;
    };
    for response in responses {
        match response.numeric_id().and_then(|id| map.remove(&id)) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::warn!("Response for unknown request id {}", response.id),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn call(&self, id: u64, payload: String) -> Result<ResponseMessage> {
        let rx = self.register(id)?;
        if let Err(e) = self.send(payload) {
            self.forget(id);
            return Err(e);
        }
        self.wait(rx).await
    }

    async fn call_batch(&self, ids: &[u64], payload: String) -> Result<Vec<ResponseMessage>> {
        let mut receivers = Vec::with_capacity(ids.len());
        for id in ids {
            match self.register(*id) {
                Ok(rx) => receivers.push(rx),
                Err(e) => {
                    ids.iter().for_each(|id| self.forget(*id));
                    return Err(e);
                }
            }
        }
        if let Err(e) = self.send(payload) {
            ids.iter().for_each(|id| self.forget(*id));
            return Err(e);
        }

        let mut responses = Vec::with_capacity(ids.len());
        for rx in receivers {
            responses.push(self.wait(rx).await?);
        }
        Ok(responses)
    }

    fn forget(&self, id: u64) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(&id);
        }
    }

    async fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
    }

    fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
