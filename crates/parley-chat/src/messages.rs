use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use parley_store::{RealtimeStore, Snapshot, StorePath};
use parley_types::api::MessageRecord;
use parley_types::models::{Message, NewMessage};

use crate::channel::ChannelId;
use crate::error::ChatError;
use crate::subscription::{RetryPolicy, Subscription, spawn_watch};

/// Root collection holding one child collection per channel.
pub const MESSAGES_ROOT: &str = "messages";

/// Reads and writes the messages of direct-message channels.
#[derive(Clone)]
pub struct MessageStore {
    store: Arc<dyn RealtimeStore>,
    retry: RetryPolicy,
}

impl MessageStore {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Write `message` to the channel and return the id the store assigned.
    ///
    /// Every live subscription to the channel, including the writer's own,
    /// sees the message in its next snapshot.
    pub async fn append(&self, channel: &ChannelId, message: &NewMessage) -> Result<String, ChatError> {
        if message.is_blank() {
            return Err(ChatError::ValidationFailed(
                "message has no content and no attachment".into(),
            ));
        }

        let path = collection(channel)?;
        let record = serde_json::to_value(MessageRecord::from(message))
            .map_err(|e| ChatError::ValidationFailed(format!("unencodable message: {e}")))?;

        let id = self
            .store
            .push(&path, record)
            .await
            .map_err(ChatError::WriteFailed)?;

        debug!("Appended message '{}' to '{}'", id, channel);
        Ok(id)
    }

    /// One-shot read of the channel's messages in store order.
    pub async fn fetch(&self, channel: &ChannelId) -> Result<Vec<Message>, ChatError> {
        let path = collection(channel)?;
        let snapshot = self.store.get(&path).await.map_err(ChatError::ReadFailed)?;
        Ok(decode_snapshot(snapshot))
    }

    /// Delete one message by id. Removing an id that does not exist succeeds.
    pub async fn remove(&self, channel: &ChannelId, message_id: &str) -> Result<(), ChatError> {
        let path = collection(channel)?
            .child(message_id)
            .map_err(|_| ChatError::ValidationFailed(format!("invalid message id '{message_id}'")))?;

        self.store.remove(&path).await.map_err(ChatError::WriteFailed)?;
        debug!("Removed message '{}' from '{}'", message_id, channel);
        Ok(())
    }

    /// Deliver the channel's full message list to `on_update`, first with the
    /// current contents and again after every change, until the returned
    /// handle is cancelled or dropped.
    pub fn subscribe<F>(&self, channel: &ChannelId, mut on_update: F) -> Result<Subscription, ChatError>
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        let path = collection(channel)?;
        Ok(spawn_watch(self.store.clone(), path, self.retry, move |snapshot| {
            on_update(decode_snapshot(snapshot))
        }))
    }
}

fn collection(channel: &ChannelId) -> Result<StorePath, ChatError> {
    StorePath::root()
        .child(MESSAGES_ROOT)
        .and_then(|root| root.child(channel.as_str()))
        .map_err(|_| ChatError::InvalidIdentifier(channel.to_string()))
}

/// Records that cannot be read as messages are skipped so one corrupt entry
/// does not hide the rest of the conversation.
fn decode_snapshot(snapshot: Snapshot) -> Vec<Message> {
    let path = snapshot.path;
    snapshot
        .children
        .into_iter()
        .filter_map(|(id, value)| decode_record(&path, id, value))
        .collect()
}

fn decode_record(path: &StorePath, id: String, value: Value) -> Option<Message> {
    match serde_json::from_value::<MessageRecord>(value) {
        Ok(record) => Some(record.into_message(id)),
        Err(e) => {
            warn!("Skipping unreadable message '{}' in '{}': {}", id, path, e);
            None
        }
    }
}
