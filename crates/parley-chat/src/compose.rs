use crate::upload::MediaFile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftState {
    Composing,
    /// Written to the store under `id`.
    Sent { id: String },
}

/// Text and an optional file waiting to be sent.
///
/// A draft is single-use: once sent it is cleared and stays `Sent`.
/// A failed send leaves it exactly as it was so the user can retry.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    text: String,
    file: Option<MediaFile>,
    state: DraftState,
}

impl Draft {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            file: None,
            state: DraftState::Composing,
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::new()
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Replaces any file attached earlier.
    pub fn attach_file(&mut self, file: MediaFile) {
        self.file = Some(file);
    }

    pub fn clear_file(&mut self) -> Option<MediaFile> {
        self.file.take()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn file(&self) -> Option<&MediaFile> {
        self.file.as_ref()
    }

    pub fn state(&self) -> &DraftState {
        &self.state
    }

    pub fn is_sent(&self) -> bool {
        matches!(self.state, DraftState::Sent { .. })
    }

    /// Nothing to send: blank text and no file.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.file.is_none()
    }

    pub(crate) fn mark_sent(&mut self, id: String) {
        self.text.clear();
        self.file = None;
        self.state = DraftState::Sent { id };
    }
}

impl Default for Draft {
    fn default() -> Self {
        Self::new()
    }
}
