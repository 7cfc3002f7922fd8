use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::StoreError;
use crate::path::StorePath;

/// Full contents of one collection at a point in time, ordered by key.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: StorePath,
    pub children: Vec<(String, Value)>,
}

impl Snapshot {
    pub fn empty(path: StorePath) -> Self {
        Self {
            path,
            children: Vec::new(),
        }
    }

    /// Build a snapshot from the JSON value stored at `path`.
    /// `null` is an empty collection; any other non-object is treated the same.
    pub fn from_value(path: StorePath, value: Value) -> Self {
        let mut children: Vec<(String, Value)> = match value {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => Vec::new(),
            other => {
                warn!("Expected a collection at '{}', found {}", path, type_name(&other));
                Vec::new()
            }
        };
        children.sort_by(|a, b| a.0.cmp(&b.0));

        Self { path, children }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Receiving end of a watch: the initial snapshot, then one per change.
///
/// An `Err` item or the end of the stream means the watch is gone and the
/// caller has to watch again. Dropping the stream stops the producer.
pub struct SnapshotStream {
    rx: mpsc::Receiver<Result<Snapshot, StoreError>>,
}

impl SnapshotStream {
    pub fn new(rx: mpsc::Receiver<Result<Snapshot, StoreError>>) -> Self {
        Self { rx }
    }

    /// Create a connected sender/stream pair for backend implementations.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<Snapshot, StoreError>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        self.rx.recv().await
    }
}

/// A keyed, push-capable JSON store.
///
/// Collections are addressed by path and their children by key. Keys created
/// by [`push`](RealtimeStore::push) sort in creation order, so snapshots
/// list pushed children in the order they were written.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Append `value` under a freshly generated key and return that key.
    async fn push(&self, collection: &StorePath, value: Value) -> Result<String, StoreError>;

    /// Replace the value at `path`.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Shallow-merge the fields of `fields` (an object) into the value at `path`.
    async fn update(&self, path: &StorePath, fields: Value) -> Result<(), StoreError>;

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    async fn get(&self, collection: &StorePath) -> Result<Snapshot, StoreError>;

    async fn watch(&self, collection: &StorePath) -> Result<SnapshotStream, StoreError>;
}
