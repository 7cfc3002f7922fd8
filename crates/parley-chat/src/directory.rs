use std::sync::Arc;

use tracing::{info, warn};

use parley_store::{RealtimeStore, Snapshot, StorePath};
use parley_types::models::{ParticipantId, ParticipantProfile};

use crate::channel::check_identifier;
use crate::error::ChatError;
use crate::subscription::{RetryPolicy, Subscription, spawn_watch};

/// Collection of participant profiles, keyed by participant id.
pub const ROSTER_ROOT: &str = "student_list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub profile: ParticipantProfile,
}

/// Who can be messaged. Profiles are written once at sign-up and read by
/// every client to list possible peers.
#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn RealtimeStore>,
    retry: RetryPolicy,
}

impl Directory {
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

    /// Store `profile` under `id`, replacing any earlier profile.
    pub async fn register(&self, id: &ParticipantId, profile: &ParticipantProfile) -> Result<(), ChatError> {
        check_identifier(id)?;
        let path = roster_path()?
            .child(id.as_str())
            .map_err(|_| ChatError::InvalidIdentifier(id.to_string()))?;
        let value = serde_json::to_value(profile)
            .map_err(|e| ChatError::ValidationFailed(format!("unencodable profile: {e}")))?;

        self.store.set(&path, value).await.map_err(ChatError::WriteFailed)?;
        info!("Registered participant '{}'", id);
        Ok(())
    }

    /// All registered participants, ordered by id.
    pub async fn roster(&self) -> Result<Vec<RosterEntry>, ChatError> {
        let snapshot = self
            .store
            .get(&roster_path()?)
            .await
            .map_err(ChatError::ReadFailed)?;
        Ok(decode_roster(snapshot))
    }

    pub fn watch<F>(&self, mut on_update: F) -> Result<Subscription, ChatError>
    where
        F: FnMut(Vec<RosterEntry>) + Send + 'static,
    {
        Ok(spawn_watch(self.store.clone(), roster_path()?, self.retry, move |snapshot| {
            on_update(decode_roster(snapshot))
        }))
    }
}

fn roster_path() -> Result<StorePath, ChatError> {
    StorePath::parse(ROSTER_ROOT).map_err(ChatError::ReadFailed)
}

fn decode_roster(snapshot: Snapshot) -> Vec<RosterEntry> {
    snapshot
        .children
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value(value) {
            Ok(profile) => Some(RosterEntry {
                id: ParticipantId::new(id),
                profile,
            }),
            Err(e) => {
                warn!("Skipping unreadable profile '{}': {}", id, e);
                None
            }
        })
        .collect()
}
