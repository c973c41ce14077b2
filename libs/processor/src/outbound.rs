//! Forwarding of operator replies back to the originating provider.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chatsync_core::{Attachment, Channel, Partner, StoredMessage};
use chatsync_providers::{
    strip_html, EndpointRegistry, OutboundFile, OutboundMessage, ProviderServices,
};
use tracing::{debug, instrument, warn};

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwards channel messages to the provider the channel belongs to.
///
/// Dispatch is fire-and-forget: delivery failures are logged and counted but
/// never surfaced to the message author, and webhook-originated messages are
/// filtered out so inbound traffic cannot echo back.
pub struct OutboundDispatcher {
    endpoints: EndpointRegistry,
    services: ProviderServices,
    http: reqwest::Client,
    timeout: Duration,
}

impl OutboundDispatcher {
    pub fn new(services: ProviderServices) -> Self {
        Self {
            endpoints: EndpointRegistry::with_defaults(),
            services,
            http: reqwest::Client::new(),
            timeout: DISPATCH_TIMEOUT,
        }
    }

    pub fn with_endpoints(mut self, endpoints: EndpointRegistry) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Decides whether a message should be forwarded at all.
    ///
    /// Webhook-originated messages, messages flagged to suppress forwarding,
    /// and messages authored by external chat users all stay local.
    pub fn should_dispatch(message: &StoredMessage, author: &Partner) -> bool {
        !(message.from_webhook || message.suppress_forward || author.external_chat_user)
    }

    /// Sends one message to the channel's provider.
    #[instrument(
        name = "outbound.dispatch",
        skip(self, message, author, channel, attachments),
        fields(message_id = message.id, channel_id = channel.id)
    )]
    pub async fn dispatch(
        &self,
        message: &StoredMessage,
        author: &Partner,
        channel: &Channel,
        attachments: &[Attachment],
    ) {
        if !Self::should_dispatch(message, author) {
            debug!("message not eligible for forwarding");
            return;
        }

        let kind = channel.provider;
        let endpoint = match self.endpoints.get(kind) {
            Ok(endpoint) => endpoint,
            Err(err) => return self.give_up(kind.as_str(), "no endpoint", &err),
        };
        let service = match self.services.get_service(kind).await {
            Ok(service) => service,
            Err(err) => return self.give_up(kind.as_str(), "no active configuration", &err),
        };
        if !service.is_valid() {
            warn!(provider = kind.as_str(), "configuration incomplete, dropping outbound message");
            metrics::counter!("outbound_dispatch_failure_total", "provider" => kind.as_str())
                .increment(1);
            return;
        }

        let config = service.config();
        let url = match endpoint.url(config, &channel.provider_metadata) {
            Ok(url) => url,
            Err(err) => return self.give_up(kind.as_str(), "url build failed", &err),
        };

        let outbound = OutboundMessage {
            text: strip_html(&message.body),
            external_id: message.external_id.clone(),
            file: attachments.first().map(|attachment| OutboundFile {
                name: attachment.name.clone(),
                data: B64.encode(&attachment.bytes),
                mime_type: attachment.mime_type.clone(),
            }),
        };
        let payload = match endpoint.payload(config, &outbound) {
            Ok(payload) => payload,
            Err(err) => return self.give_up(kind.as_str(), "payload build failed", &err),
        };

        let mut request = self.http.post(&url).timeout(self.timeout).json(&payload);
        for (name, value) in endpoint.headers(config) {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(provider = kind.as_str(), %url, "outbound message delivered");
            }
            Ok(response) => {
                warn!(
                    provider = kind.as_str(),
                    status = response.status().as_u16(),
                    %url,
                    "provider rejected outbound message"
                );
                metrics::counter!("outbound_dispatch_failure_total", "provider" => kind.as_str())
                    .increment(1);
            }
            Err(err) => {
                warn!(provider = kind.as_str(), %url, error = %err, "outbound delivery failed");
                metrics::counter!("outbound_dispatch_failure_total", "provider" => kind.as_str())
                    .increment(1);
            }
        }
    }

    fn give_up(&self, provider: &'static str, stage: &str, err: &dyn std::fmt::Display) {
        warn!(provider, stage, error = %err, "dropping outbound message");
        metrics::counter!("outbound_dispatch_failure_total", "provider" => provider).increment(1);
    }
}
