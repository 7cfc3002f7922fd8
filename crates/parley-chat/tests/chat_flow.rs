//! End-to-end flows over an in-memory local store: two participants share a
//! channel, subscriptions see every write, and failed sends keep the draft.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use parley_chat::{
    BucketLabel, ChatClient, ChatError, Draft, MediaFile, MediaUploader, RetryPolicy, Session,
    UnconfiguredUploader,
};
use parley_store::{LocalStore, RealtimeStore, Snapshot, SnapshotStream, StoreError, StorePath};
use parley_types::models::{Attachment, MediaKind, Message, ParticipantId, ParticipantProfile};

const WAIT: Duration = Duration::from_secs(5);

struct StubUploader;

#[async_trait]
impl MediaUploader for StubUploader {
    async fn upload(&self, file: &MediaFile) -> Result<String, ChatError> {
        Ok(format!("https://media.example.com/{}", file.file_name))
    }
}

/// Reads work, every write fails.
struct ReadOnlyStore(LocalStore);

#[async_trait]
impl RealtimeStore for ReadOnlyStore {
    async fn push(&self, collection: &StorePath, _: Value) -> Result<String, StoreError> {
        Err(StoreError::Unreachable(format!("{collection}: offline")))
    }

    async fn set(&self, path: &StorePath, _: Value) -> Result<(), StoreError> {
        Err(StoreError::PermissionDenied(path.to_string()))
    }

    async fn update(&self, path: &StorePath, _: Value) -> Result<(), StoreError> {
        Err(StoreError::PermissionDenied(path.to_string()))
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        Err(StoreError::PermissionDenied(path.to_string()))
    }

    async fn get(&self, collection: &StorePath) -> Result<Snapshot, StoreError> {
        self.0.get(collection).await
    }

    async fn watch(&self, collection: &StorePath) -> Result<SnapshotStream, StoreError> {
        self.0.watch(collection).await
    }
}

/// The first watch delivers one snapshot and then drops the connection;
/// later watches behave normally.
struct FlakyStore {
    inner: LocalStore,
    watches: AtomicUsize,
}

#[async_trait]
impl RealtimeStore for FlakyStore {
    async fn push(&self, collection: &StorePath, value: Value) -> Result<String, StoreError> {
        self.inner.push(collection, value).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &StorePath, fields: Value) -> Result<(), StoreError> {
        self.inner.update(path, fields).await
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.inner.remove(path).await
    }

    async fn get(&self, collection: &StorePath) -> Result<Snapshot, StoreError> {
        self.inner.get(collection).await
    }

    async fn watch(&self, collection: &StorePath) -> Result<SnapshotStream, StoreError> {
        if self.watches.fetch_add(1, Ordering::SeqCst) > 0 {
            return self.inner.watch(collection).await;
        }

        let (tx, stream) = SnapshotStream::channel(2);
        let first = self.inner.get(collection).await;
        let _ = tx.send(first).await;
        let _ = tx
            .send(Err(StoreError::Unreachable("connection reset".into())))
            .await;
        Ok(stream)
    }
}

fn client(store: Arc<dyn RealtimeStore>, uploader: Arc<dyn MediaUploader>, id: &str) -> ChatClient {
    let session = Session::new(ParticipantId::new(id), None).unwrap();
    ChatClient::new(store, uploader, session).with_retry(RetryPolicy::new(
        Duration::from_millis(10),
        Duration::from_millis(50),
    ))
}

async fn next_update(rx: &mut mpsc::UnboundedReceiver<Vec<Message>>) -> Vec<Message> {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for update")
        .expect("subscription ended")
}

/// Skip updates until one has `len` messages.
async fn update_with(rx: &mut mpsc::UnboundedReceiver<Vec<Message>>, len: usize) -> Vec<Message> {
    loop {
        let update = next_update(rx).await;
        if update.len() == len {
            return update;
        }
    }
}

#[tokio::test]
async fn both_participants_see_each_message() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let ann = client(store.clone(), Arc::new(StubUploader), "ann");
    let bob = client(store, Arc::new(StubUploader), "bob");

    let ann_chat = ann.conversation(&ParticipantId::new("bob")).unwrap();
    let bob_chat = bob.conversation(&ParticipantId::new("ann")).unwrap();
    assert_eq!(ann_chat.channel(), bob_chat.channel());
    assert_eq!(ann_chat.channel().as_str(), "ann_bob");

    let (ann_tx, mut ann_rx) = mpsc::unbounded_channel();
    let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
    let _ann_sub = ann_chat
        .subscribe(move |m| {
            let _ = ann_tx.send(m);
        })
        .unwrap();
    let _bob_sub = bob_chat
        .subscribe(move |m| {
            let _ = bob_tx.send(m);
        })
        .unwrap();
    assert!(next_update(&mut ann_rx).await.is_empty());
    assert!(next_update(&mut bob_rx).await.is_empty());

    let before = Utc::now().timestamp_millis();
    let mut draft = Draft::with_text("hi bob");
    let id = ann_chat.send(&mut draft).await.unwrap();
    assert!(draft.is_sent());
    assert_eq!(draft.text(), "");

    // The writer's own subscription echoes the message too
    for rx in [&mut ann_rx, &mut bob_rx] {
        let update = update_with(rx, 1).await;
        let msg = &update[0];
        assert_eq!(msg.id, id);
        assert_eq!(msg.sender.as_str(), "ann");
        assert_eq!(msg.content, "hi bob");
        assert!(msg.timestamp >= before);
        assert!(msg.attachment.is_none());
    }

    let mut reply = Draft::with_text("hey ann");
    let reply_id = bob_chat.send(&mut reply).await.unwrap();
    let update = update_with(&mut ann_rx, 2).await;
    let ids: Vec<&str> = update.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, [id.as_str(), reply_id.as_str()]);
}

#[tokio::test]
async fn cancelled_subscription_stops_receiving() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let ann = client(store, Arc::new(StubUploader), "ann");
    let chat = ann.conversation(&ParticipantId::new("bob")).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = chat
        .subscribe(move |m| {
            let _ = tx.send(m);
        })
        .unwrap();
    next_update(&mut rx).await;

    assert!(sub.cancel());
    assert!(!sub.cancel());

    chat.send(&mut Draft::with_text("after cancel")).await.unwrap();
    let after = timeout(WAIT, rx.recv()).await.expect("sender should be dropped");
    assert!(after.is_none());
}

#[tokio::test]
async fn sent_draft_cannot_be_resent() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let chat = client(store, Arc::new(StubUploader), "ann")
        .conversation(&ParticipantId::new("bob"))
        .unwrap();

    let mut draft = Draft::with_text("once");
    chat.send(&mut draft).await.unwrap();
    let err = chat.send(&mut draft).await.unwrap_err();
    assert!(matches!(err, ChatError::ValidationFailed(_)));
    assert_eq!(chat.history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_draft_is_rejected() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let chat = client(store, Arc::new(StubUploader), "ann")
        .conversation(&ParticipantId::new("bob"))
        .unwrap();

    let mut draft = Draft::with_text("   ");
    let err = chat.send(&mut draft).await.unwrap_err();
    assert!(matches!(err, ChatError::ValidationFailed(_)));
    assert!(!draft.is_sent());
    assert!(chat.history().await.unwrap().is_empty());
}

#[tokio::test]
async fn attachment_is_uploaded_and_bound() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let chat = client(store, Arc::new(StubUploader), "ann")
        .conversation(&ParticipantId::new("bob"))
        .unwrap();

    let mut draft = Draft::with_text("look at this");
    draft.attach_file(MediaFile::new("cat.png", MediaKind::Image, vec![0x89, b'P', b'N', b'G']));
    chat.send(&mut draft).await.unwrap();

    let history = chat.history().await.unwrap();
    assert_eq!(history[0].content, "");
    assert_eq!(
        history[0].attachment,
        Some(Attachment {
            url: "https://media.example.com/cat.png".into(),
            kind: MediaKind::Image,
        })
    );
}

#[tokio::test]
async fn failed_upload_sends_nothing_and_keeps_draft() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let chat = client(store, Arc::new(UnconfiguredUploader), "ann")
        .conversation(&ParticipantId::new("bob"))
        .unwrap();

    let mut draft = Draft::with_text("caption");
    draft.attach_file(MediaFile::new("song.mp3", MediaKind::Audio, vec![1u8; 4]));
    let before = draft.clone();

    let err = chat.send(&mut draft).await.unwrap_err();
    assert!(matches!(err, ChatError::UploadFailed(_)));
    assert_eq!(draft, before);
    assert!(chat.history().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_write_keeps_draft() {
    let local = LocalStore::in_memory().unwrap();
    let store: Arc<dyn RealtimeStore> = Arc::new(ReadOnlyStore(local));
    let chat = client(store, Arc::new(StubUploader), "ann")
        .conversation(&ParticipantId::new("bob"))
        .unwrap();

    let mut draft = Draft::with_text("hello?");
    let err = chat.send(&mut draft).await.unwrap_err();
    assert!(matches!(err, ChatError::WriteFailed(StoreError::Unreachable(_))));
    assert_eq!(draft.text(), "hello?");
    assert!(!draft.is_sent());
}

#[tokio::test]
async fn lost_subscription_resubscribes_and_catches_up() {
    let local = LocalStore::in_memory().unwrap();
    let flaky: Arc<dyn RealtimeStore> = Arc::new(FlakyStore {
        inner: local.clone(),
        watches: AtomicUsize::new(0),
    });
    let chat = client(flaky, Arc::new(StubUploader), "ann")
        .conversation(&ParticipantId::new("bob"))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = chat
        .subscribe(move |m| {
            let _ = tx.send(m);
        })
        .unwrap();
    assert!(next_update(&mut rx).await.is_empty());

    // Written while the first watch is down; the new watch's first snapshot has it
    let id = chat.send(&mut Draft::with_text("during the gap")).await.unwrap();
    let update = update_with(&mut rx, 1).await;
    assert_eq!(update[0].id, id);
}

#[tokio::test]
async fn removed_message_disappears_from_feed() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let chat = client(store, Arc::new(StubUploader), "ann")
        .conversation(&ParticipantId::new("bob"))
        .unwrap();

    let keep = chat.send(&mut Draft::with_text("keep")).await.unwrap();
    let gone = chat.send(&mut Draft::with_text("gone")).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = chat
        .watch_feed(Utc, move |buckets| {
            let _ = tx.send(buckets.to_vec());
        })
        .unwrap();

    let feed = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].label, BucketLabel::Today);
    assert_eq!(feed[0].messages.len(), 2);

    chat.remove(&gone).await.unwrap();
    let feed = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let ids: Vec<&str> = feed[0].messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, [keep.as_str()]);
}

#[tokio::test]
async fn directory_lists_registered_participants() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let ann = client(store, Arc::new(StubUploader), "ann");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = ann
        .directory()
        .watch(move |roster| {
            let _ = tx.send(roster.len());
        })
        .unwrap();
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(0));

    for (id, name) in [("bob", "Bob"), ("ann", "Ann")] {
        let profile = ParticipantProfile {
            name: name.into(),
            email: format!("{id}@example.com"),
            image_url: String::new(),
        };
        ann.directory().register(&ParticipantId::new(id), &profile).await.unwrap();
    }

    let roster = ann.directory().roster().await.unwrap();
    let ids: Vec<&str> = roster.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["ann", "bob"]);

    loop {
        let len = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        if len == 2 {
            break;
        }
    }
}

#[tokio::test]
async fn invalid_peer_is_rejected() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let ann = client(store, Arc::new(StubUploader), "ann");

    let err = ann.conversation(&ParticipantId::new("bob_smith")).err().unwrap();
    assert!(matches!(err, ChatError::InvalidIdentifier(id) if id == "bob_smith"));
}

#[tokio::test]
async fn registration_uploads_the_avatar() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let session = Session::new(ParticipantId::new("ann"), Some("ann@example.com".into())).unwrap();
    let ann = ChatClient::new(store, Arc::new(StubUploader), session);

    let avatar = MediaFile::new("ann.png", MediaKind::Image, vec![1u8; 16]);
    let profile = ann.register_self(Some(avatar)).await.unwrap();
    assert_eq!(profile.image_url, "https://media.example.com/ann.png");

    let roster = ann.directory().roster().await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].profile, profile);
    assert_eq!(roster[0].profile.email, "ann@example.com");
}

#[tokio::test]
async fn failed_avatar_upload_still_registers() {
    let store: Arc<dyn RealtimeStore> = Arc::new(LocalStore::in_memory().unwrap());
    let ann = client(store, Arc::new(UnconfiguredUploader), "ann");

    let avatar = MediaFile::new("ann.png", MediaKind::Image, vec![1u8; 16]);
    let profile = ann.register_self(Some(avatar)).await.unwrap();
    assert!(profile.image_url.is_empty());

    let roster = ann.directory().roster().await.unwrap();
    assert_eq!(roster[0].id.as_str(), "ann");
    assert!(roster[0].profile.image_url.is_empty());
}
