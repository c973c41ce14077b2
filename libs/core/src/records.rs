use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::ProviderKind;

/// Store-assigned identifier of a persisted record.
pub type RecordId = u64;

/// Conversation participant. Partners created from webhook events carry the
/// provider's external user id; internal partners (the operator) carry none.
///
/// `external_user_id` is unique store-wide when present; concurrent
/// first-time events for the same external user converge on one row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Partner {
    pub id: RecordId,
    pub external_user_id: Option<String>,
    pub provider: Option<ProviderKind>,
    pub name: String,
    pub external_chat_user: bool,
}

/// Persistent conversation thread tied to one external channel id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: RecordId,
    pub external_channel_id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub member_ids: Vec<RecordId>,
    /// Latest provider metadata snapshot; drives outbound URL construction.
    pub provider_metadata: Value,
}

/// Message persisted in the conversation store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub id: RecordId,
    pub body: String,
    pub author_id: RecordId,
    pub channel_id: RecordId,
    /// External message id; unique when present.
    pub external_id: Option<String>,
    /// True when the message was created from a webhook delivery.
    pub from_webhook: bool,
    /// Suppresses the automatic echo back to the provider.
    pub suppress_forward: bool,
    pub attachment_ids: Vec<RecordId>,
}

/// Stored binary attachment produced by the ingester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: RecordId,
    pub name: String,
    #[serde(with = "serde_bytes_b64")]
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub size: u64,
    pub description: Option<String>,
    /// Lowercase hex sha256 of `bytes`.
    pub checksum: String,
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

mod serde_bytes_b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(de)?;
        STANDARD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}
