//! Normalizer for the Heynow aggregator webhook payloads.
//!
//! Heynow fronts dozens of chat channels behind one webhook shape; the
//! numeric channel code in `event.key.channel` identifies the real source.

use std::collections::{BTreeMap, HashMap};

use chatsync_core::{
    now_rfc3339, CanonicalEvent, FileRef, MessageEvent, MessageKind, ProcessError, ProviderKind,
};
use chatsync_idempotency::derive_key;
use once_cell::sync::Lazy;
use serde_json::Value;

static CHANNEL_LABELS: Lazy<HashMap<u64, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (1, "WhatsApp"),
        (2, "Facebook Messenger"),
        (3, "Twitter"),
        (4, "Web Chat"),
        (5, "Facebook Wall"),
        (6, "Wavy"),
        (7, "Instagram"),
        (8, "Mercado Libre"),
        (9, "Sinch"),
        (10, "Mercado Libre (Mensajes)"),
        (11, "Call"),
        (12, "ps_twilio"),
        (13, "ps_youtube"),
        (14, "ps_smooch-wsp"),
        (15, "ps_twitterDM"),
        (16, "ps_instagram"),
        (17, "ps_wavy"),
        (18, "ps_twitter"),
        (19, "ps_wabox"),
        (20, "ps_messenger"),
        (21, "ps_onemarketer"),
        (22, "ps_twitterTweet"),
        (23, "ps_feed"),
        (24, "Twitter DM"),
        (25, "Google Business Messages"),
        (26, "Mercado Libre Reclamos"),
        (27, "Botmaker"),
        (28, "Teams"),
        (29, "Telegram"),
        (30, "ApiChannel"),
        (31, "Instagram Direct"),
        (32, "SinchSMS"),
        (33, "360Dialog"),
        (34, "twilio"),
        (35, "WhatsApp"),
        (36, "gupshup"),
        (37, "HeyTestChannel"),
        (38, "T2Voice"),
        (39, "MailBot"),
        (40, "Flow Service"),
    ])
});

/// Display label for a Heynow numeric channel code, `"Unknown"` on miss.
///
/// ```
/// use chatsync_normalizer::heynow::channel_label;
///
/// assert_eq!(channel_label(35), "WhatsApp");
/// assert_eq!(channel_label(999), "Unknown");
/// ```
pub fn channel_label(code: u64) -> &'static str {
    CHANNEL_LABELS.get(&code).copied().unwrap_or("Unknown")
}

/// Normalizer for the Heynow webhook payload family.
pub struct HeynowNormalizer;

impl super::PayloadNormalizer for HeynowNormalizer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Heynow
    }

    fn normalize(&self, raw: &Value) -> Result<CanonicalEvent, ProcessError> {
        let key = &raw["event"]["key"];
        let data = &raw["data"];

        let user_id = key["clientId"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("event.key.clientId"))?
            .to_string();

        let channel_code = key["channel"].as_u64().unwrap_or(0);
        let label = channel_label(channel_code);

        // Contact data lives in one of two nested locations depending on the
        // upstream channel; `event.new.__contact` wins.
        let contact = non_null(&raw["event"]["new"]["__contact"])
            .or_else(|| non_null(&data["__contact"]));

        let user_name = match contact {
            Some(c) => format!(
                "{} {}",
                c["first_name"].as_str().unwrap_or(label),
                c["last_name"].as_str().unwrap_or("")
            )
            .trim_end()
            .to_string(),
            None => label.to_string(),
        };

        let channel_name = match contact {
            Some(c) => format!(
                "{} {} - {}",
                c["first_name"].as_str().unwrap_or(""),
                c["last_name"].as_str().unwrap_or(""),
                label
            ),
            None => format!(
                "{} {}",
                label,
                data["contactId"].as_str().unwrap_or("New Contact")
            ),
        };

        let trace = &data["lastMessageTrace"];
        let content = trace["message"].as_str().unwrap_or("").to_string();

        let files = match data["metaData"]["temporal"].as_array() {
            Some(entries) => entries.iter().map(file_ref).collect(),
            None => Vec::new(),
        };

        let kind = files
            .first()
            .and_then(|f: &FileRef| f.mime_type.as_deref())
            .map(MessageKind::from_mime)
            .unwrap_or(MessageKind::Text);

        // When Heynow omits its native message id, derive a stable key from
        // fields that repeat verbatim on redelivery.
        let external_id = match trace["idMessageHey"].as_str().filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => derive_key([
                user_id.as_str(),
                key["session"].as_str().unwrap_or(""),
                &channel_code.to_string(),
                content.as_str(),
            ]),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("clientId".to_string(), key["clientId"].clone());
        metadata.insert("session".to_string(), key["session"].clone());
        metadata.insert("platformId".to_string(), key["platformId"].clone());
        metadata.insert("channel".to_string(), key["channel"].clone());
        metadata.insert("channel_type".to_string(), Value::String(label.to_string()));

        let message = MessageEvent {
            kind,
            content,
            files,
            metadata: data["metaData"]
                .as_object()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            provider: ProviderKind::Heynow,
            created_at: now_rfc3339(),
            external_id: Some(external_id),
        };

        Ok(CanonicalEvent {
            user_id,
            user_name,
            channel_name,
            channel_label: label.to_string(),
            incoming: data["incoming"].as_bool().unwrap_or(false),
            message,
            metadata,
        })
    }
}

fn malformed(field: &str) -> ProcessError {
    ProcessError::MalformedPayload {
        detail: format!("missing required field `{field}`"),
    }
}

fn non_null(value: &Value) -> Option<&Value> {
    value.as_object().map(|_| value)
}

fn file_ref(entry: &Value) -> FileRef {
    let name = entry["name"].as_str().unwrap_or("").to_string();
    let file_channel = entry["channel"].as_u64().unwrap_or(0);
    let mut metadata = BTreeMap::new();
    metadata.insert("encode".to_string(), entry["encode"].clone());
    metadata.insert(
        "channel".to_string(),
        Value::String(channel_label(file_channel).to_string()),
    );
    metadata.insert("platform_id".to_string(), entry["platformId"].clone());
    metadata.insert("temporal_id".to_string(), entry["temporalId"].clone());

    FileRef {
        description: Some(format!(
            "File {} from HeyNow via {}",
            name,
            channel_label(file_channel)
        )),
        name,
        data: entry["data"].as_str().filter(|s| !s.is_empty()).map(Into::into),
        url: entry["urlFileshare"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(Into::into),
        mime_type: entry["mimeType"].as_str().map(Into::into),
        size: entry["size"].as_u64(),
        checksum: None,
        access_token: None,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PayloadNormalizer;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "event": {
                "key": {
                    "clientId": "client-7",
                    "session": "sess-1",
                    "platformId": "plat-3",
                    "channel": 35
                },
                "new": {
                    "__contact": {"first_name": "Ana", "last_name": "Diaz"}
                }
            },
            "data": {
                "incoming": true,
                "contactId": "contact-9",
                "lastMessageTrace": {"message": "hola", "idMessageHey": "abc-1"},
                "metaData": {}
            }
        })
    }

    #[test]
    fn maps_contact_and_channel() {
        let event = HeynowNormalizer.normalize(&payload()).unwrap();
        assert_eq!(event.user_id, "client-7");
        assert_eq!(event.user_name, "Ana Diaz");
        assert_eq!(event.channel_name, "Ana Diaz - WhatsApp");
        assert_eq!(event.channel_label, "WhatsApp");
        assert!(event.incoming);
        assert_eq!(event.message.content, "hola");
        assert_eq!(event.message.kind, MessageKind::Text);
        assert_eq!(event.message.external_id.as_deref(), Some("abc-1"));
        assert_eq!(event.metadata["channel_type"], "WhatsApp");
    }

    #[test]
    fn contact_falls_back_to_data_block() {
        let mut raw = payload();
        raw["event"]["new"] = json!({});
        raw["data"]["__contact"] = json!({"first_name": "Luis", "last_name": null});
        let event = HeynowNormalizer.normalize(&raw).unwrap();
        assert_eq!(event.user_name, "Luis");
    }

    #[test]
    fn missing_contact_uses_channel_label() {
        let mut raw = payload();
        raw["event"]["new"] = json!({});
        let event = HeynowNormalizer.normalize(&raw).unwrap();
        assert_eq!(event.user_name, "WhatsApp");
        assert_eq!(event.channel_name, "WhatsApp contact-9");
    }

    #[test]
    fn unmapped_channel_code_is_unknown() {
        let mut raw = payload();
        raw["event"]["key"]["channel"] = json!(999);
        raw["event"]["new"] = json!({});
        raw["data"].as_object_mut().unwrap().remove("contactId");
        let event = HeynowNormalizer.normalize(&raw).unwrap();
        assert_eq!(event.channel_label, "Unknown");
        assert_eq!(event.channel_name, "Unknown New Contact");
    }

    #[test]
    fn missing_client_id_is_malformed() {
        let mut raw = payload();
        raw["event"]["key"].as_object_mut().unwrap().remove("clientId");
        assert!(matches!(
            HeynowNormalizer.normalize(&raw),
            Err(ProcessError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn file_mime_type_drives_message_kind() {
        let mut raw = payload();
        raw["data"]["metaData"] = json!({
            "temporal": [{
                "name": "note.ogg",
                "mimeType": "audio/ogg",
                "urlFileshare": "https://files.example.com/note.ogg",
                "size": 2048,
                "channel": 35,
                "platformId": 3,
                "temporalId": "tmp-1",
                "encode": ""
            }]
        });
        let event = HeynowNormalizer.normalize(&raw).unwrap();
        assert_eq!(event.message.kind, MessageKind::VoiceNote);
        let file = &event.message.files[0];
        assert_eq!(file.name, "note.ogg");
        assert_eq!(file.url.as_deref(), Some("https://files.example.com/note.ogg"));
        assert!(file.data.is_none());
        assert_eq!(file.size, Some(2048));
        assert_eq!(file.metadata["channel"], "WhatsApp");
    }

    #[test]
    fn missing_message_id_derives_stable_key() {
        let mut raw = payload();
        raw["data"]["lastMessageTrace"]
            .as_object_mut()
            .unwrap()
            .remove("idMessageHey");
        let first = HeynowNormalizer.normalize(&raw).unwrap();
        let second = HeynowNormalizer.normalize(&raw).unwrap();
        assert_eq!(first.message.external_id, second.message.external_id);
        assert_eq!(first.message.external_id.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn non_incoming_defaults_false() {
        let mut raw = payload();
        raw["data"].as_object_mut().unwrap().remove("incoming");
        let event = HeynowNormalizer.normalize(&raw).unwrap();
        assert!(!event.incoming);
    }
}
