use std::fmt;

use crate::error::StoreError;

/// Characters the hosted store refuses inside a key.
const FORBIDDEN: [char; 5] = ['.', '#', '$', '[', ']'];

/// A `/`-separated location in the store, e.g. `messages/u1_u2/-NxQ...`.
/// The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a path, ignoring leading and trailing slashes.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut path = Self::root();
        for segment in trimmed.split('/') {
            check_segment(raw, segment)?;
            path.segments.push(segment.to_string());
        }
        Ok(path)
    }

    pub fn child(&self, key: &str) -> Result<Self, StoreError> {
        check_segment(key, key)?;
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Ok(Self { segments })
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Last segment, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &StorePath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// True if a write at one path can change the value at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

fn check_segment(path: &str, segment: &str) -> Result<(), StoreError> {
    let reason = if segment.is_empty() {
        "empty segment"
    } else if segment.contains('/') {
        "key contains '/'"
    } else if segment.contains(FORBIDDEN) {
        "key contains one of . # $ [ ]"
    } else if segment.chars().any(char::is_control) {
        "key contains a control character"
    } else {
        return Ok(());
    };

    Err(StoreError::InvalidPath {
        path: path.to_string(),
        reason,
    })
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let path = StorePath::parse("/messages/u1_u2/").unwrap();
        assert_eq!(path.segments(), ["messages", "u1_u2"]);
        assert_eq!(path.to_string(), "messages/u1_u2");
        assert_eq!(path.key(), Some("u1_u2"));
        assert_eq!(path.parent().unwrap().to_string(), "messages");
    }

    #[test]
    fn overlap_is_by_whole_segments() {
        let chan = StorePath::parse("messages/a_b").unwrap();
        assert!(chan.overlaps(&StorePath::parse("messages/a_b/-N1/content").unwrap()));
        assert!(chan.overlaps(&StorePath::parse("messages").unwrap()));
        assert!(chan.overlaps(&StorePath::root()));
        assert!(!chan.overlaps(&StorePath::parse("messages/a_bc").unwrap()));
        assert!(!chan.overlaps(&StorePath::parse("student_list/a_b").unwrap()));
    }

    #[test]
    fn root_has_no_parent() {
        let root = StorePath::parse("").unwrap();
        assert!(root.is_root());
        assert!(root.parent().is_none());
        assert_eq!(root.key(), None);
    }

    #[test]
    fn rejects_bad_segments() {
        assert!(StorePath::parse("messages//x").is_err());
        assert!(StorePath::parse("student_list/a.b").is_err());
        assert!(StorePath::parse("messages/$x").is_err());

        let messages = StorePath::parse("messages").unwrap();
        assert!(messages.child("a/b").is_err());
        assert!(messages.child("").is_err());
        assert!(messages.child("[0]").is_err());
        assert_eq!(messages.child("-Nab_9").unwrap().to_string(), "messages/-Nab_9");
    }
}
