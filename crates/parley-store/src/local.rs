use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::Database;
use crate::error::StoreError;
use crate::notify::ChangeNotifier;
use crate::path::StorePath;
use crate::push_id::PushIdGenerator;
use crate::store::{RealtimeStore, Snapshot, SnapshotStream};

/// Realtime store backed by a local SQLite database.
///
/// Values form one JSON tree: a write at any depth is visible from every
/// ancestor. Each write announces the path it touched on an in-process change
/// feed, and watchers above or below that path re-read.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    db: Database,
    ids: PushIdGenerator,
    changes: ChangeNotifier,
}

impl LocalStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::with_database(Database::open(path)?))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::with_database(Database::open_in_memory()?))
    }

    fn with_database(db: Database) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                db,
                ids: PushIdGenerator::new(),
                changes: ChangeNotifier::new(),
            }),
        }
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&LocalInner) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StoreError::Unreachable(format!("database task failed: {}", e))
            })?
            .map_err(StoreError::from)
    }
}

/// Writes below the root only; the root holds every collection.
fn check_writable(path: &StorePath) -> Result<(), StoreError> {
    if path.is_root() {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "cannot write the root",
        });
    }
    Ok(())
}

#[async_trait]
impl RealtimeStore for LocalStore {
    async fn push(&self, collection: &StorePath, value: Value) -> Result<String, StoreError> {
        let key = self.inner.ids.next_id();
        let path = collection.child(&key)?;

        let target = path.clone();
        self.blocking(move |inner| inner.db.write_tree(&target, &value))
            .await?;

        debug!("Pushed {}", path);
        self.inner.changes.notify(path);
        Ok(key)
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        check_writable(path)?;

        let target = path.clone();
        self.blocking(move |inner| inner.db.write_tree(&target, &value))
            .await?;

        self.inner.changes.notify(path.clone());
        Ok(())
    }

    async fn update(&self, path: &StorePath, fields: Value) -> Result<(), StoreError> {
        let Value::Object(fields) = fields else {
            return Err(StoreError::Decode {
                path: path.to_string(),
                reason: "update expects an object".into(),
            });
        };
        check_writable(path)?;

        let target = path.clone();
        self.blocking(move |inner| inner.db.merge_tree(&target, &fields))
            .await?;

        self.inner.changes.notify(path.clone());
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    async fn get(&self, path: &StorePath) -> Result<Snapshot, StoreError> {
        let target = path.clone();
        let value = self
            .blocking(move |inner| inner.db.read_tree(&target))
            .await?;

        Ok(match value {
            Some(value) => Snapshot::from_value(path.clone(), value),
            None => Snapshot::empty(path.clone()),
        })
    }

    async fn watch(&self, collection: &StorePath) -> Result<SnapshotStream, StoreError> {
        // Subscribe before the first read so no write can slip in between
        let mut changes = self.inner.changes.subscribe();
        let (tx, stream) = SnapshotStream::channel(16);

        let store = self.clone();
        let path = collection.clone();
        tokio::spawn(async move {
            if tx.send(store.get(&path).await).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    changed = changes.recv() => match changed {
                        Ok(changed) if changed.overlaps(&path) => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(n)) => {
                            debug!("Watcher on '{}' lagged by {} changes, re-reading", path, n);
                        }
                        Err(RecvError::Closed) => {
                            let _ = tx.send(Err(StoreError::Closed)).await;
                            break;
                        }
                    },
                }

                if tx.send(store.get(&path).await).await.is_err() {
                    break;
                }
            }

            debug!("Watcher on '{}' stopped", path);
        });

        info!("Watching '{}'", collection);
        Ok(stream)
    }
}
