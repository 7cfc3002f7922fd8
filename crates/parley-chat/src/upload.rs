//! Media upload to the hosted file service. The service stores the bytes
//! and answers with a public `secure_url` that messages reference.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::{error, info};

use parley_types::api::UploadResponse;
use parley_types::models::MediaKind;

use crate::error::ChatError;

/// 50 MB upload limit for media files
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

pub const DEFAULT_UPLOAD_API: &str = "https://api.cloudinary.com/v1_1";

/// Whole-request limit; a 50 MB file on a slow link needs a few minutes.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A file picked for sending, read fully into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub file_name: String,
    pub kind: MediaKind,
    pub bytes: Bytes,
}

impl MediaFile {
    pub fn new(file_name: impl Into<String>, kind: MediaKind, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            kind,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk. Without an explicit `kind` it is inferred from
    /// the extension.
    pub async fn from_path(path: &Path, kind: Option<MediaKind>) -> Result<Self, ChatError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ChatError::UploadFailed(format!("not a file: {}", path.display())))?
            .to_string();

        let kind = match kind.or_else(|| MediaKind::infer(&file_name)) {
            Some(kind) => kind,
            None => return Err(ChatError::UnsupportedKind(file_name)),
        };

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            error!("Failed to read {}: {}", path.display(), e);
            ChatError::UploadFailed(format!("cannot read {}: {}", path.display(), e))
        })?;

        Ok(Self::new(file_name, kind, bytes))
    }
}

/// Turns a local file into a hosted url.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file: &MediaFile) -> Result<String, ChatError>;
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub api_base: String,
    pub cloud_name: String,
    pub upload_preset: String,
    pub request_timeout: Duration,
}

impl UploadConfig {
    pub fn new(cloud_name: impl Into<String>, upload_preset: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_UPLOAD_API.into(),
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
            request_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

/// Unsigned multipart upload to a Cloudinary-style endpoint.
#[derive(Clone)]
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    upload_preset: String,
}

impl HttpUploader {
    pub fn new(config: UploadConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChatError::UploadFailed(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/upload",
                config.api_base.trim_end_matches('/'),
                config.cloud_name
            ),
            upload_preset: config.upload_preset,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MediaUploader for HttpUploader {
    async fn upload(&self, file: &MediaFile) -> Result<String, ChatError> {
        check_size(file)?;

        let part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChatError::UploadFailed(format!("{}: {}", file.file_name, e)))?;

        let status = resp.status();
        let body: UploadResponse = resp.json().await.map_err(|e| {
            ChatError::UploadFailed(format!("{}: HTTP {} with unreadable body: {}", file.file_name, status, e))
        })?;

        if !status.is_success() {
            let reason = body.error.map(|e| e.message).unwrap_or_default();
            return Err(ChatError::UploadFailed(format!(
                "{}: HTTP {} {}",
                file.file_name, status, reason
            )));
        }

        let url = body
            .secure_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ChatError::UploadFailed(format!("{}: response has no secure_url", file.file_name)))?;

        info!("Uploaded {} ({} bytes, {})", file.file_name, file.bytes.len(), file.kind);
        Ok(url)
    }
}

/// Stand-in used when no upload service is configured; every upload fails
/// and text messages keep working.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredUploader;

#[async_trait]
impl MediaUploader for UnconfiguredUploader {
    async fn upload(&self, file: &MediaFile) -> Result<String, ChatError> {
        Err(ChatError::UploadFailed(format!(
            "{}: no upload service configured",
            file.file_name
        )))
    }
}

fn check_size(file: &MediaFile) -> Result<(), ChatError> {
    if file.bytes.is_empty() {
        return Err(ChatError::UploadFailed(format!("{} is empty", file.file_name)));
    }
    if file.bytes.len() > MAX_UPLOAD_SIZE {
        return Err(ChatError::UploadFailed(format!(
            "{} is {} bytes, over the {} byte limit",
            file.file_name,
            file.bytes.len(),
            MAX_UPLOAD_SIZE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn uploader(api_base: &str) -> HttpUploader {
        let mut config = UploadConfig::new("demo", "unsigned");
        config.api_base = api_base.into();
        config.request_timeout = Duration::from_secs(5);
        HttpUploader::new(config).unwrap()
    }

    /// Answer every connection with `response` once the request is read.
    async fn serve(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let response = response.clone();
                tokio::spawn(async move {
                    read_request(&mut socket).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    /// Read the head, then the body by Content-Length or up to the last chunk.
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            let done = match length {
                Some(length) => buf.len() - end - 4 >= length,
                None => !head.contains("chunked") || buf.ends_with(b"0\r\n\r\n"),
            };
            if done {
                return;
            }
        }
    }

    fn json_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    fn photo() -> MediaFile {
        MediaFile::new("a.png", MediaKind::Image, vec![1u8; 64])
    }

    #[test]
    fn endpoint_joins_cloud_name() {
        assert_eq!(
            uploader("https://api.cloudinary.com/v1_1/").endpoint(),
            "https://api.cloudinary.com/v1_1/demo/upload"
        );
    }

    #[test]
    fn size_limits() {
        let empty = MediaFile::new("a.png", MediaKind::Image, Vec::new());
        assert!(matches!(check_size(&empty), Err(ChatError::UploadFailed(_))));

        let huge = MediaFile::new("a.zip", MediaKind::Document, vec![0u8; MAX_UPLOAD_SIZE + 1]);
        assert!(matches!(check_size(&huge), Err(ChatError::UploadFailed(_))));

        let ok = MediaFile::new("a.png", MediaKind::Image, vec![1u8; 16]);
        assert!(check_size(&ok).is_ok());
    }

    #[tokio::test]
    async fn empty_file_is_not_sent() {
        // Nothing listens on port 9; an empty file must fail before connecting
        let err = uploader("http://127.0.0.1:9")
            .upload(&MediaFile::new("a.png", MediaKind::Image, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UploadFailed(msg) if msg.contains("empty")));
    }

    #[tokio::test]
    async fn unreachable_service_fails_upload() {
        let err = uploader("http://127.0.0.1:9")
            .upload(&MediaFile::new("a.png", MediaKind::Image, vec![1u8; 8]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UploadFailed(_)));
    }

    #[tokio::test]
    async fn unconfigured_uploader_always_fails() {
        let err = UnconfiguredUploader
            .upload(&MediaFile::new("a.png", MediaKind::Image, vec![1u8; 8]))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UploadFailed(_)));
    }

    #[tokio::test]
    async fn from_path_infers_kind() {
        let path = std::env::temp_dir().join(format!("parley-upload-{}.mp3", std::process::id()));
        tokio::fs::write(&path, b"ID3").await.unwrap();

        let file = MediaFile::from_path(&path, None).await.unwrap();
        assert_eq!(file.kind, MediaKind::Audio);
        assert_eq!(file.bytes.as_ref(), b"ID3");

        let forced = MediaFile::from_path(&path, Some(MediaKind::Document)).await.unwrap();
        assert_eq!(forced.kind, MediaKind::Document);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn from_path_rejects_unknown_extension() {
        let err = MediaFile::from_path(Path::new("/tmp/sheet.xlsx"), None).await.unwrap_err();
        assert!(matches!(err, ChatError::UnsupportedKind(name) if name == "sheet.xlsx"));
    }

    #[tokio::test]
    async fn hosted_url_is_returned() {
        let body = r#"{"secure_url":"https://res.example.com/demo/a.png","public_id":"a"}"#;
        let base = serve(json_response("200 OK", body)).await;

        let url = uploader(&base).upload(&photo()).await.unwrap();
        assert_eq!(url, "https://res.example.com/demo/a.png");
    }

    #[tokio::test]
    async fn rejected_upload_carries_the_service_message() {
        let body = r#"{"error":{"message":"Upload preset not found"}}"#;
        let base = serve(json_response("400 Bad Request", body)).await;

        let err = uploader(&base).upload(&photo()).await.unwrap_err();
        assert!(matches!(&err, ChatError::UploadFailed(msg) if msg.contains("preset not found")), "{:?}", err);
    }

    #[tokio::test]
    async fn success_without_url_fails() {
        let base = serve(json_response("200 OK", "{}")).await;

        let err = uploader(&base).upload(&photo()).await.unwrap_err();
        assert!(matches!(&err, ChatError::UploadFailed(msg) if msg.contains("secure_url")), "{:?}", err);
    }

    #[tokio::test]
    async fn stalled_service_times_out() {
        // Accepts and reads, never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                read_request(&mut socket).await;
                held.push(socket);
            }
        });

        let mut config = UploadConfig::new("demo", "unsigned");
        config.api_base = format!("http://{}", addr);
        config.request_timeout = Duration::from_millis(300);
        let err = HttpUploader::new(config).unwrap().upload(&photo()).await.unwrap_err();
        assert!(matches!(err, ChatError::UploadFailed(_)));
    }
}
