use std::collections::HashMap;

use chatsync_core::{ProcessError, ProviderConfig, ProviderKind};
use serde_json::Value;

use crate::heynow::HeynowEndpoint;

/// Outbound message content handed to an endpoint for payload construction.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    /// Plain text body, already stripped of markup.
    pub text: String,
    /// External message id carried so the provider can correlate echoes.
    pub external_id: Option<String>,
    pub file: Option<OutboundFile>,
}

/// First attachment of an outbound message, base64-encoded for transport.
#[derive(Debug, Clone)]
pub struct OutboundFile {
    pub name: String,
    pub data: String,
    pub mime_type: String,
}

/// Capability interface one provider implements to receive outbound messages.
///
/// The dispatcher is provider-agnostic: adding a provider registers an
/// implementation in the [`EndpointRegistry`] without touching dispatch.
pub trait ProviderEndpoint: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Full endpoint URL for a channel, built from the configuration's base
    /// URL and the channel's provider metadata snapshot.
    fn url(&self, config: &ProviderConfig, channel_meta: &Value) -> Result<String, ProcessError>;

    fn headers(&self, config: &ProviderConfig) -> Vec<(String, String)>;

    fn payload(
        &self,
        config: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<Value, ProcessError>;
}

/// Registry of outbound endpoints keyed by provider kind.
#[derive(Default)]
pub struct EndpointRegistry {
    entries: HashMap<ProviderKind, Box<dyn ProviderEndpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in endpoints registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HeynowEndpoint));
        registry
    }

    pub fn register(&mut self, endpoint: Box<dyn ProviderEndpoint>) {
        self.entries.insert(endpoint.provider(), endpoint);
    }

    pub fn get(&self, kind: ProviderKind) -> Result<&dyn ProviderEndpoint, ProcessError> {
        self.entries
            .get(&kind)
            .map(|e| e.as_ref())
            .ok_or_else(|| ProcessError::UnsupportedProvider {
                name: kind.as_str().to_string(),
            })
    }
}
