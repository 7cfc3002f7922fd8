use parley_store::StoreError;
use thiserror::Error;

/// Every failure the chat core reports. None of them is fatal: the caller
/// keeps its draft and may retry.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A participant id was empty, contained the channel separator, or
    /// cannot be used as a store key.
    #[error("invalid participant identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("message rejected: {0}")]
    ValidationFailed(String),

    #[error("write failed")]
    WriteFailed(#[source] StoreError),

    #[error("read failed")]
    ReadFailed(#[source] StoreError),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("unsupported attachment kind '{0}'")]
    UnsupportedKind(String),

    /// The store connection behind a subscription dropped. Subscriptions
    /// resubscribe on their own; this is reported through logs.
    #[error("subscription lost")]
    SubscriptionLost(#[source] StoreError),
}
