pub mod attachment;
pub mod channel;
pub mod compose;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod feed;
pub mod messages;
pub mod session;
pub mod subscription;
pub mod upload;

use std::sync::Arc;

use tracing::warn;

use parley_store::RealtimeStore;
use parley_types::models::{ParticipantId, ParticipantProfile};

pub use channel::{ChannelId, resolve};
pub use compose::{Draft, DraftState};
pub use conversation::Conversation;
pub use directory::{Directory, RosterEntry};
pub use error::ChatError;
pub use feed::{Bucket, BucketLabel, FeedView, assemble};
pub use messages::MessageStore;
pub use session::Session;
pub use subscription::{RetryPolicy, Subscription};
pub use upload::{HttpUploader, MediaFile, MediaUploader, UnconfiguredUploader};

/// Entry point for one signed-in participant.
#[derive(Clone)]
pub struct ChatClient {
    session: Session,
    messages: MessageStore,
    directory: Directory,
    uploader: Arc<dyn MediaUploader>,
}

impl ChatClient {
    pub fn new(store: Arc<dyn RealtimeStore>, uploader: Arc<dyn MediaUploader>, session: Session) -> Self {
        Self {
            session,
            messages: MessageStore::new(store.clone()),
            directory: Directory::new(store),
            uploader,
        }
    }

    /// Backoff used when a subscription loses its store connection.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.messages = self.messages.with_retry(retry);
        self.directory = self.directory.with_retry(retry);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Put the session participant in the directory so other clients can
    /// find them. An avatar is uploaded first; if that fails the profile is
    /// still registered, without a picture.
    pub async fn register_self(&self, avatar: Option<MediaFile>) -> Result<ParticipantProfile, ChatError> {
        let image_url = match avatar {
            Some(file) => match self.uploader.upload(&file).await {
                Ok(url) => url,
                Err(e) => {
                    warn!("Avatar {} not uploaded: {}", file.file_name, e);
                    String::new()
                }
            },
            None => String::new(),
        };

        let profile = ParticipantProfile {
            name: self.session.participant().to_string(),
            email: self.session.email().unwrap_or_default().to_string(),
            image_url,
        };
        self.directory
            .register(self.session.participant(), &profile)
            .await?;
        Ok(profile)
    }

    /// Open the direct-message channel with `peer`.
    pub fn conversation(&self, peer: &ParticipantId) -> Result<Conversation, ChatError> {
        let me = self.session.participant().clone();
        let channel = resolve(&me, peer)?;
        Ok(Conversation::new(
            channel,
            me,
            peer.clone(),
            self.messages.clone(),
            self.uploader.clone(),
        ))
    }
}
