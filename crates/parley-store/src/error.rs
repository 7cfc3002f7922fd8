use thiserror::Error;

/// Failures reported by a realtime store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network failure, server error, or a dropped event stream.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// The store rejected the request (bad credentials or security rules).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("malformed data at '{path}': {reason}")]
    Decode { path: String, reason: String },

    /// The change feed behind a watch shut down.
    #[error("change feed closed")]
    Closed,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// True for failures where retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Closed | Self::Backend(_))
    }
}
