//! Turns file references from inbound events into stored binary attachments.

use std::collections::HashMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chatsync_core::FileRef;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use tracing::warn;
use url::Url;

const FALLBACK_MIME: &str = "application/octet-stream";
const FALLBACK_NAME: &str = "attachment";

static EXTENSION_MIME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("png", "image/png"),
        ("gif", "image/gif"),
        ("webp", "image/webp"),
        ("bmp", "image/bmp"),
        ("svg", "image/svg+xml"),
        ("mp3", "audio/mpeg"),
        ("ogg", "audio/ogg"),
        ("opus", "audio/opus"),
        ("wav", "audio/wav"),
        ("aac", "audio/aac"),
        ("amr", "audio/amr"),
        ("mp4", "video/mp4"),
        ("webm", "video/webm"),
        ("mkv", "video/x-matroska"),
        ("mov", "video/quicktime"),
        ("avi", "video/x-msvideo"),
        ("pdf", "application/pdf"),
        ("doc", "application/msword"),
        (
            "docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        ("xls", "application/vnd.ms-excel"),
        (
            "xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ),
        ("ppt", "application/vnd.ms-powerpoint"),
        (
            "pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ),
        ("zip", "application/zip"),
        ("csv", "text/csv"),
        ("json", "application/json"),
        ("xml", "application/xml"),
        ("txt", "text/plain"),
        ("html", "text/html"),
    ])
});

fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    EXTENSION_MIME.get(ext.as_str()).copied()
}

fn name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}

/// Lowercase hex sha256 over the attachment bytes.
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// One successfully ingested file, ready to be stored.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub source_url: Option<String>,
}

/// Downloads or decodes file references into binary attachments.
///
/// Ingestion is best-effort by contract: a broken reference is reported as
/// `None` and logged, so message creation continues with whatever files did
/// resolve.
pub struct AttachmentIngester {
    http: reqwest::Client,
    timeout: Duration,
}

impl Default for AttachmentIngester {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl AttachmentIngester {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Resolves one file reference. The URL wins when both a URL and inline
    /// data are present.
    pub async fn ingest(&self, file: &FileRef) -> Option<IngestedFile> {
        let result = match (&file.url, &file.data) {
            (Some(url), _) => self.download(url, file).await,
            (None, Some(data)) => self.decode_inline(data, file),
            (None, None) => {
                warn!(name = %file.name, "file reference carries neither url nor data");
                None
            }
        };
        if result.is_none() {
            metrics::counter!("attachment_ingest_failure_total").increment(1);
        }
        result
    }

    /// Fetches a file by URL with a bounded timeout. Mime type comes from the
    /// response header, else the filename extension, else a generic fallback.
    pub async fn download(&self, url: &str, file: &FileRef) -> Option<IngestedFile> {
        let response = match self.http.get(url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(url, error = %err, "attachment download failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(url, status = %response.status(), "attachment download rejected");
            return None;
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                warn!(url, error = %err, "attachment body read failed");
                return None;
            }
        };

        let name = if file.name.is_empty() {
            name_from_url(url).unwrap_or_else(|| FALLBACK_NAME.to_string())
        } else {
            file.name.clone()
        };
        let mime_type = header_mime
            .or_else(|| mime_from_extension(&name).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        Some(IngestedFile {
            name,
            bytes,
            mime_type,
            source_url: Some(url.to_string()),
        })
    }

    /// Decodes inline base64 content, stripping an optional
    /// `data:<mime>;base64,` prefix. The embedded mime type is used when the
    /// reference's explicit field is absent.
    pub fn decode_inline(&self, data: &str, file: &FileRef) -> Option<IngestedFile> {
        let (prefix_mime, payload) = match data.strip_prefix("data:") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((mime, payload)) => (Some(mime.to_string()), payload),
                None => {
                    warn!(name = %file.name, "inline data url is not base64-encoded");
                    return None;
                }
            },
            None => (None, data),
        };

        let bytes = match STANDARD.decode(payload.trim().as_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(name = %file.name, error = %err, "inline data is not valid base64");
                return None;
            }
        };

        let name = if file.name.is_empty() {
            FALLBACK_NAME.to_string()
        } else {
            file.name.clone()
        };
        let mime_type = file
            .mime_type
            .clone()
            .filter(|m| !m.is_empty())
            .or(prefix_mime)
            .or_else(|| mime_from_extension(&name).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        Some(IngestedFile {
            name,
            bytes,
            mime_type,
            source_url: None,
        })
    }
}
