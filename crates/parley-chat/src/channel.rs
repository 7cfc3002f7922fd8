use std::fmt;

use parley_types::models::ParticipantId;

use crate::error::ChatError;

/// Joins the two participant ids of a direct-message channel.
pub const CHANNEL_SEPARATOR: char = '_';

/// Address of the conversation between exactly two participants.
///
/// Only [`resolve`] builds one, so every `ChannelId` is the sorted pair of
/// two valid participant ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the channel shared by `a` and `b`.
///
/// The ids are ordered by plain byte comparison and joined with `_`, so the
/// result does not depend on who asks. Ids that are empty or contain `_`
/// would make the join ambiguous and are rejected.
pub fn resolve(a: &ParticipantId, b: &ParticipantId) -> Result<ChannelId, ChatError> {
    check_identifier(a)?;
    check_identifier(b)?;

    let (first, second) = if a.as_str() <= b.as_str() { (a, b) } else { (b, a) };
    Ok(ChannelId(format!("{}{}{}", first, CHANNEL_SEPARATOR, second)))
}

pub fn check_identifier(id: &ParticipantId) -> Result<(), ChatError> {
    if id.as_str().is_empty() || id.as_str().contains(CHANNEL_SEPARATOR) {
        return Err(ChatError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}
