use parley_types::models::{Attachment, MediaKind, NewMessage};

use crate::error::ChatError;

/// Bind an uploaded media reference to a message.
///
/// `kind` must name one of the supported media kinds. The message text is
/// cleared: an attachment message carries only the media.
pub fn attach(draft: NewMessage, media_url: &str, kind: &str) -> Result<NewMessage, ChatError> {
    let kind: MediaKind = kind
        .parse()
        .map_err(|_| ChatError::UnsupportedKind(kind.to_string()))?;
    attach_media(draft, media_url, kind)
}

pub fn attach_media(
    mut draft: NewMessage,
    media_url: &str,
    kind: MediaKind,
) -> Result<NewMessage, ChatError> {
    if media_url.trim().is_empty() {
        return Err(ChatError::ValidationFailed("attachment url is empty".into()));
    }

    draft.content.clear();
    draft.attachment = Some(Attachment {
        url: media_url.to_string(),
        kind,
    });
    Ok(draft)
}
