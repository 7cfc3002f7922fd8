use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_types::api::PushResponse;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::sse::{EventTree, SseDecoder};
use crate::store::{RealtimeStore, Snapshot, SnapshotStream};

/// The server sends a keep-alive every 30 seconds; three missed ones mean
/// the stream is dead even if the socket is still open.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Database root, e.g. `https://example-default-rtdb.firebaseio.com`.
    pub base_url: String,
    /// ID token or database secret sent as the `auth` query parameter.
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Client for a hosted realtime database speaking JSON over HTTPS, with
/// server-sent events for watches.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    stream_client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Unreachable(format!("HTTP client setup failed: {}", e)))?;

        // Event streams stay open indefinitely, so no overall timeout here
        let stream_client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Unreachable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token,
        })
    }

    fn url(&self, path: &StorePath) -> String {
        format!("{}/{}.json", self.base_url, path)
    }

    async fn send(&self, req: RequestBuilder, path: &StorePath) -> Result<Response, StoreError> {
        let req = match &self.auth_token {
            Some(token) => req.query(&[("auth", token)]),
            None => req,
        };

        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(format!("{}: {}", path, e)))?;

        check_status(resp, path).await
    }
}

async fn check_status(resp: Response, path: &StorePath) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(StoreError::PermissionDenied(format!("{}: {}", path, body.trim())))
        }
        _ => Err(StoreError::Unreachable(format!(
            "{}: HTTP {} {}",
            path,
            status,
            body.trim()
        ))),
    }
}

#[async_trait]
impl RealtimeStore for RestStore {
    async fn push(&self, collection: &StorePath, value: Value) -> Result<String, StoreError> {
        let resp = self
            .send(self.client.post(self.url(collection)).json(&value), collection)
            .await?;

        let pushed: PushResponse = resp.json().await.map_err(|e| StoreError::Decode {
            path: collection.to_string(),
            reason: e.to_string(),
        })?;

        debug!("Pushed {}/{}", collection, pushed.name);
        Ok(pushed.name)
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.send(self.client.put(self.url(path)).json(&value), path)
            .await?;
        Ok(())
    }

    async fn update(&self, path: &StorePath, fields: Value) -> Result<(), StoreError> {
        if !fields.is_object() {
            return Err(StoreError::Decode {
                path: path.to_string(),
                reason: "update expects an object".into(),
            });
        }

        self.send(self.client.patch(self.url(path)).json(&fields), path)
            .await?;
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.send(self.client.delete(self.url(path)), path).await?;
        Ok(())
    }

    async fn get(&self, collection: &StorePath) -> Result<Snapshot, StoreError> {
        let resp = self
            .send(self.client.get(self.url(collection)), collection)
            .await?;

        let value: Value = resp.json().await.map_err(|e| StoreError::Decode {
            path: collection.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Snapshot::from_value(collection.clone(), value))
    }

    async fn watch(&self, collection: &StorePath) -> Result<SnapshotStream, StoreError> {
        let req = self
            .stream_client
            .get(self.url(collection))
            .header(ACCEPT, "text/event-stream");
        let resp = self.send(req, collection).await?;

        info!("Event stream open on '{}'", collection);

        let (tx, stream) = SnapshotStream::channel(16);
        tokio::spawn(run_event_stream(resp, collection.clone(), tx));
        Ok(stream)
    }
}

/// Pump one event stream into snapshots until it fails or the watcher goes away.
async fn run_event_stream(
    resp: Response,
    path: StorePath,
    tx: mpsc::Sender<Result<Snapshot, StoreError>>,
) {
    let mut bytes = Box::pin(resp.bytes_stream());
    let mut decoder = SseDecoder::default();
    let mut tree = EventTree::new(path.clone());

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("Event stream on '{}' no longer watched", path);
                return;
            }
            next = tokio::time::timeout(STREAM_IDLE_TIMEOUT, bytes.next()) => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                let _ = tx.send(Err(StoreError::Unreachable(format!("{}: {}", path, e)))).await;
                return;
            }
            Ok(None) => {
                let _ = tx
                    .send(Err(StoreError::Unreachable(format!("{}: event stream ended", path))))
                    .await;
                return;
            }
            Err(_) => {
                warn!("No traffic on '{}' for {:?}, dropping stream", path, STREAM_IDLE_TIMEOUT);
                let _ = tx
                    .send(Err(StoreError::Unreachable(format!("{}: event stream idle", path))))
                    .await;
                return;
            }
        };

        for event in decoder.feed(&chunk) {
            match tree.apply(&event) {
                Ok(true) => {
                    if tx.send(Ok(tree.snapshot())).await.is_err() {
                        return;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }
}
