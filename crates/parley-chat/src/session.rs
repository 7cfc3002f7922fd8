use parley_types::models::ParticipantId;

use crate::channel::check_identifier;
use crate::error::ChatError;

/// The signed-in participant, as reported by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    participant: ParticipantId,
    email: Option<String>,
}

impl Session {
    pub fn new(participant: ParticipantId, email: Option<String>) -> Result<Self, ChatError> {
        check_identifier(&participant)?;
        Ok(Self { participant, email })
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}
