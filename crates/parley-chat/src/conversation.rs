use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use parley_types::models::{Message, NewMessage, ParticipantId};

use crate::attachment::attach_media;
use crate::channel::ChannelId;
use crate::compose::Draft;
use crate::error::ChatError;
use crate::feed::{Bucket, FeedView};
use crate::messages::MessageStore;
use crate::subscription::Subscription;
use crate::upload::MediaUploader;

/// The direct-message channel between the session participant and one peer.
#[derive(Clone)]
pub struct Conversation {
    channel: ChannelId,
    me: ParticipantId,
    peer: ParticipantId,
    messages: MessageStore,
    uploader: Arc<dyn MediaUploader>,
}

impl Conversation {
    pub(crate) fn new(
        channel: ChannelId,
        me: ParticipantId,
        peer: ParticipantId,
        messages: MessageStore,
        uploader: Arc<dyn MediaUploader>,
    ) -> Self {
        Self {
            channel,
            me,
            peer,
            messages,
            uploader,
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    /// Send the draft and return the stored message id.
    ///
    /// A pending file is uploaded first and the message carries only the
    /// media reference. If the upload or the write fails nothing is stored
    /// and the draft is left as it was.
    pub async fn send(&self, draft: &mut Draft) -> Result<String, ChatError> {
        if draft.is_sent() {
            return Err(ChatError::ValidationFailed("draft was already sent".into()));
        }
        if draft.is_blank() {
            return Err(ChatError::ValidationFailed(
                "message has no content and no attachment".into(),
            ));
        }

        let mut message = NewMessage::text(self.me.clone(), draft.text(), Utc::now().timestamp_millis());

        if let Some(file) = draft.file() {
            let url = self.uploader.upload(file).await.inspect_err(|e| {
                warn!("Upload of {} for '{}' failed: {}", file.file_name, self.channel, e);
            })?;
            message = attach_media(message, &url, file.kind)?;
        }

        let id = self.messages.append(&self.channel, &message).await?;
        draft.mark_sent(id.clone());
        info!("Sent message '{}' to '{}'", id, self.channel);
        Ok(id)
    }

    pub async fn history(&self) -> Result<Vec<Message>, ChatError> {
        self.messages.fetch(&self.channel).await
    }

    pub async fn remove(&self, message_id: &str) -> Result<(), ChatError> {
        self.messages.remove(&self.channel, message_id).await
    }

    pub fn subscribe<F>(&self, on_update: F) -> Result<Subscription, ChatError>
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        self.messages.subscribe(&self.channel, on_update)
    }

    /// Like [`subscribe`](Self::subscribe), but hands out the day-bucketed
    /// feed in `zone`, rebuilt from scratch on every snapshot.
    pub fn watch_feed<Tz, F>(&self, zone: Tz, mut on_feed: F) -> Result<Subscription, ChatError>
    where
        Tz: TimeZone + Send + 'static,
        F: FnMut(&[Bucket]) + Send + 'static,
    {
        let channel = self.channel.clone();
        let mut view = FeedView::new(zone);
        self.subscribe(move |messages| {
            view.replace(messages, Utc::now());
            debug!("Feed for '{}' holds {} messages", channel, view.message_count());
            on_feed(view.buckets())
        })
    }
}
