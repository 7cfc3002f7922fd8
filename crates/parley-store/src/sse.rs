//! Server-sent event decoding for the REST store's streaming endpoint.
//!
//! The hosted database pushes `put` and `patch` events carrying
//! `{"path": ..., "data": ...}`. [`EventTree`] applies them to a local copy
//! of the watched value so each change can be handed out as a full snapshot.

use serde_json::Value;
use tracing::debug;

use parley_types::api::StreamEventBody;

use crate::error::StoreError;
use crate::path::StorePath;
use crate::store::Snapshot;
use crate::tree::set_at;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` parser. Chunks may split lines and UTF-8
/// sequences anywhere.
#[derive(Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: String,
    data: String,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = value.to_string(),
                "data" => {
                    self.data.push_str(value);
                    self.data.push('\n');
                }
                _ => {}
            }
        }
        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        let mut data = std::mem::take(&mut self.data);
        if event.is_empty() && data.is_empty() {
            return None;
        }
        if data.ends_with('\n') {
            data.pop();
        }

        Some(SseEvent {
            event: if event.is_empty() { "message".into() } else { event },
            data,
        })
    }
}

/// Local mirror of the value at a watched path.
pub struct EventTree {
    path: StorePath,
    root: Value,
}

impl EventTree {
    pub fn new(path: StorePath) -> Self {
        Self {
            path,
            root: Value::Null,
        }
    }

    /// Apply one event. Returns `Ok(true)` when the tree changed.
    pub fn apply(&mut self, event: &SseEvent) -> Result<bool, StoreError> {
        match event.event.as_str() {
            "put" => {
                let body = self.parse_body(&event.data)?;
                set_at(&mut self.root, &split(&body.path), body.data);
                Ok(true)
            }
            "patch" => {
                let body = self.parse_body(&event.data)?;
                let Value::Object(fields) = body.data else {
                    return Err(self.decode_error("patch data is not an object".into()));
                };
                let base = split(&body.path);
                for (key, value) in fields {
                    let mut segments = base.clone();
                    segments.extend(split(&key));
                    set_at(&mut self.root, &segments, value);
                }
                Ok(true)
            }
            "keep-alive" => Ok(false),
            "cancel" => Err(StoreError::PermissionDenied(format!(
                "server cancelled the listener on '{}'",
                self.path
            ))),
            "auth_revoked" => Err(StoreError::PermissionDenied(
                "auth token revoked or expired".into(),
            )),
            other => {
                debug!("Ignoring '{}' event on '{}'", other, self.path);
                Ok(false)
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_value(self.path.clone(), self.root.clone())
    }

    fn parse_body(&self, data: &str) -> Result<StreamEventBody, StoreError> {
        serde_json::from_str(data).map_err(|e| self.decode_error(e.to_string()))
    }

    fn decode_error(&self, reason: String) -> StoreError {
        StoreError::Decode {
            path: self.path.to_string(),
            reason,
        }
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
