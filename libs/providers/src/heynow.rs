//! Outbound endpoint for the Heynow provider.

use chatsync_core::{ProcessError, ProviderConfig, ProviderKind};
use serde_json::{json, Value};

use crate::endpoint::{OutboundMessage, ProviderEndpoint};

pub struct HeynowEndpoint;

impl HeynowEndpoint {
    /// Renders a metadata value as a URL path segment. Heynow stores the
    /// channel code as a number and the rest as strings.
    fn segment(meta: &Value, field: &str) -> String {
        match &meta[field] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }
}

impl ProviderEndpoint for HeynowEndpoint {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Heynow
    }

    fn url(&self, config: &ProviderConfig, channel_meta: &Value) -> Result<String, ProcessError> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(format!(
            "{}{}/{}/{}/{}",
            base,
            Self::segment(channel_meta, "channel"),
            Self::segment(channel_meta, "platformId"),
            Self::segment(channel_meta, "clientId"),
            Self::segment(channel_meta, "session"),
        ))
    }

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)> {
        let mut headers = vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )];
        if !config.auth_token.is_empty() {
            headers.push(("partner-token".to_string(), config.auth_token.clone()));
        }
        headers
    }

    fn payload(
        &self,
        config: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<Value, ProcessError> {
        // The partner user Heynow attributes replies to is deployment
        // configuration, not message data.
        let partner_user = config
            .extra_map()?
            .remove("partnerUser")
            .unwrap_or_else(|| json!({}));

        let mut payload = json!({
            "text": message.text,
            "partnerUser": partner_user,
            "idMessageHey": message.external_id,
        });
        if let Some(file) = &message.file {
            payload["file"] = json!({
                "data": file.data,
                "name": file.name,
                "encode": "base64",
                "mimeType": file.mime_type,
            });
        }
        Ok(payload)
    }
}
