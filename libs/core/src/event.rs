use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::kind::MessageKind;
use crate::provider::ProviderKind;

/// Returns the current instant formatted as RFC 3339.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Reference to a file carried by an inbound event.
///
/// At most one of `data` (base64 inline content) and `url` is expected to be
/// populated; when both are present the URL takes precedence at ingest time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    pub name: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// In-flight message extracted from a provider payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageEvent {
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub provider: ProviderKind,
    pub created_at: String, // ISO-8601
    /// External message id used as the idempotency key.
    pub external_id: Option<String>,
}

/// Normalized inbound chat occurrence, immutable once built from the raw
/// provider payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalEvent {
    pub user_id: String,
    pub user_name: String,
    pub channel_name: String,
    /// Display label of the source channel (e.g. "WhatsApp").
    pub channel_label: String,
    pub incoming: bool,
    pub message: MessageEvent,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}
