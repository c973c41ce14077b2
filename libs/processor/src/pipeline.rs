//! The idempotent webhook processing pipeline.

use std::sync::Arc;

use chatsync_core::{
    Attachment, CanonicalEvent, Channel, MessageKind, Partner, ProcessError, ProcessOutcome,
    ProviderKind,
};
use chatsync_idempotency::Claim;
use chatsync_normalizer::NormalizerRegistry;
use chatsync_providers::ProviderServices;
use chatsync_store::{
    ConversationStore, NewAttachment, NewChannel, NewMessage, NewPartner, StoreError, StoreSession,
};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::attachments::{checksum, AttachmentIngester, IngestedFile};

fn store_err(err: StoreError) -> ProcessError {
    match err {
        StoreError::UniqueViolation { constraint } => {
            ProcessError::Store(anyhow::anyhow!("unhandled unique violation on `{constraint}`"))
        }
        StoreError::Other(err) => ProcessError::Store(err),
    }
}

/// Orchestrates the end-to-end processing of one webhook delivery.
///
/// Every invocation runs inside one store session: a mid-pipeline failure
/// rolls back partial partner/channel/message creation, while skip and
/// duplicate terminate as committed no-ops.
pub struct WebhookProcessor {
    normalizers: NormalizerRegistry,
    services: ProviderServices,
    store: Arc<dyn ConversationStore>,
    ingester: AttachmentIngester,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn ConversationStore>, services: ProviderServices) -> Self {
        Self {
            normalizers: NormalizerRegistry::with_defaults(),
            services,
            store,
            ingester: AttachmentIngester::default(),
        }
    }

    pub fn with_normalizers(mut self, normalizers: NormalizerRegistry) -> Self {
        self.normalizers = normalizers;
        self
    }

    pub fn with_ingester(mut self, ingester: AttachmentIngester) -> Self {
        self.ingester = ingester;
        self
    }

    /// Processes one raw provider payload.
    #[instrument(name = "webhook.process", skip(self, raw), fields(provider = provider_name))]
    pub async fn process(
        &self,
        provider_name: &str,
        raw: &Value,
    ) -> Result<ProcessOutcome, ProcessError> {
        let kind = self.normalizers.provider(provider_name)?;
        let event = self.normalizers.normalize(provider_name, raw)?;

        if !event.incoming {
            info!(provider = provider_name, "skipping non-incoming event");
            metrics::counter!("webhook_skipped_total", "provider" => provider_name.to_string())
                .increment(1);
            return Ok(ProcessOutcome::skipped());
        }

        let mut session = self.store.begin().await.map_err(store_err)?;
        match self.run(session.as_mut(), kind, &event).await {
            Ok(outcome) => {
                session.commit().await.map_err(store_err)?;
                info!(
                    provider = provider_name,
                    status = ?outcome.status,
                    message_id = outcome.message_id,
                    "webhook processed"
                );
                if outcome.status == chatsync_core::ProcessStatus::Duplicate {
                    metrics::counter!("webhook_duplicate_total", "provider" => provider_name.to_string())
                        .increment(1);
                }
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    error!(error = %rollback_err, "rollback failed after pipeline error");
                }
                error!(provider = provider_name, reason = err.reason(), error = %err, "webhook processing failed");
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        session: &mut dyn StoreSession,
        kind: ProviderKind,
        event: &CanonicalEvent,
    ) -> Result<ProcessOutcome, ProcessError> {
        // Duplicate pre-check. A contended claim means a concurrent processor
        // is already working on this key; reporting duplicate is the safe
        // answer for an at-least-once delivery layer.
        if let Some(key) = event.message.external_id.as_deref() {
            match session.try_lock_message_key(key).await.map_err(store_err)? {
                Claim::Fresh => {}
                Claim::Duplicate => {
                    let existing = session
                        .find_message_by_external_id(key)
                        .await
                        .map_err(store_err)?;
                    return Ok(ProcessOutcome::duplicate(existing.map(|m| m.id)));
                }
                Claim::Contended => return Ok(ProcessOutcome::duplicate(None)),
            }
        }

        let service = self.services.get_service(kind).await?;
        if !service.is_valid() {
            return Err(ProcessError::AuthenticationFailed { kind });
        }
        if !service.is_valid_channel(&event.channel_label) {
            return Err(ProcessError::InvalidChannel {
                kind,
                label: event.channel_label.clone(),
            });
        }

        let partner = self.resolve_partner(session, kind, event).await?;
        let operator = session.operator_partner().await.map_err(store_err)?;
        let channel = self
            .resolve_channel(session, kind, event, &[partner.id, operator.id])
            .await?;

        let staged = self.ingest_files(event).await;

        // Final duplicate re-check closes the window between the pre-check
        // claim and message creation. Attachment rows are only created after
        // it so a duplicate leaves no orphans behind.
        if let Some(key) = event.message.external_id.as_deref() {
            if let Some(existing) = session
                .find_message_by_external_id(key)
                .await
                .map_err(store_err)?
            {
                return Ok(ProcessOutcome::duplicate(Some(existing.id)));
            }
        }

        let attachments = self.store_attachments(session, staged).await?;
        let body = render_body(&event.message.content, &attachments);
        let new_message = NewMessage {
            body,
            author_id: partner.id,
            channel_id: channel.id,
            external_id: event.message.external_id.clone(),
            from_webhook: true,
            // Webhook messages must never echo back to the provider.
            suppress_forward: true,
            attachment_ids: attachments.iter().map(|a| a.id).collect(),
        };
        match session.create_message(new_message).await {
            Ok(message) => Ok(ProcessOutcome::success(channel.id, partner.id, message.id)),
            // Uniqueness backstop: a concurrent processor won the commit race.
            Err(StoreError::UniqueViolation { .. }) => {
                for attachment in &attachments {
                    session
                        .delete_attachment(attachment.id)
                        .await
                        .map_err(store_err)?;
                }
                let existing = match event.message.external_id.as_deref() {
                    Some(key) => session
                        .find_message_by_external_id(key)
                        .await
                        .map_err(store_err)?,
                    None => None,
                };
                Ok(ProcessOutcome::duplicate(existing.map(|m| m.id)))
            }
            Err(err) => Err(store_err(err)),
        }
    }

    /// Row-locked lookup by external user id, create on miss, adopt the
    /// concurrent winner on a unique-violation race.
    async fn resolve_partner(
        &self,
        session: &mut dyn StoreSession,
        kind: ProviderKind,
        event: &CanonicalEvent,
    ) -> Result<Partner, ProcessError> {
        if let Some(partner) = session
            .find_partner_by_external_id(&event.user_id)
            .await
            .map_err(store_err)?
        {
            session
                .mark_external_chat_user(partner.id)
                .await
                .map_err(store_err)?;
            return Ok(Partner {
                external_chat_user: true,
                ..partner
            });
        }

        let new = NewPartner {
            external_user_id: event.user_id.clone(),
            provider: kind,
            name: event.user_name.clone(),
        };
        match session.create_partner(new).await {
            Ok(partner) => Ok(partner),
            Err(StoreError::UniqueViolation { .. }) => {
                warn!(user_id = %event.user_id, "partner create raced, adopting winner");
                session
                    .find_partner_by_external_id(&event.user_id)
                    .await
                    .map_err(store_err)?
                    .ok_or_else(|| {
                        ProcessError::Store(anyhow::anyhow!(
                            "partner create raced but winner row is missing"
                        ))
                    })
            }
            Err(err) => Err(store_err(err)),
        }
    }

    /// Lookup by external channel id with membership/metadata reconciliation,
    /// create on miss, reconcile the concurrent winner on a race.
    async fn resolve_channel(
        &self,
        session: &mut dyn StoreSession,
        kind: ProviderKind,
        event: &CanonicalEvent,
        expected_members: &[chatsync_core::RecordId],
    ) -> Result<Channel, ProcessError> {
        let snapshot = Value::Object(
            event
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        // The external user id doubles as the external channel id: one direct
        // conversation per provider contact.
        if let Some(channel) = session
            .find_channel_by_external_id(&event.user_id)
            .await
            .map_err(store_err)?
        {
            return self
                .reconcile_channel(session, channel, expected_members, snapshot)
                .await;
        }

        let new = NewChannel {
            external_channel_id: event.user_id.clone(),
            name: event.channel_name.clone(),
            provider: kind,
            member_ids: expected_members.to_vec(),
            provider_metadata: snapshot.clone(),
        };
        match session.create_channel(new).await {
            Ok(channel) => Ok(channel),
            Err(StoreError::UniqueViolation { .. }) => {
                warn!(external_channel_id = %event.user_id, "channel create raced, adopting winner");
                let channel = session
                    .find_channel_by_external_id(&event.user_id)
                    .await
                    .map_err(store_err)?
                    .ok_or_else(|| {
                        ProcessError::Store(anyhow::anyhow!(
                            "channel create raced but winner row is missing"
                        ))
                    })?;
                self.reconcile_channel(session, channel, expected_members, snapshot)
                    .await
            }
            Err(err) => Err(store_err(err)),
        }
    }

    async fn reconcile_channel(
        &self,
        session: &mut dyn StoreSession,
        mut channel: Channel,
        expected_members: &[chatsync_core::RecordId],
        snapshot: Value,
    ) -> Result<Channel, ProcessError> {
        let missing: Vec<_> = expected_members
            .iter()
            .copied()
            .filter(|m| !channel.member_ids.contains(m))
            .collect();
        if !missing.is_empty() {
            session
                .add_channel_members(channel.id, &missing)
                .await
                .map_err(store_err)?;
            channel.member_ids.extend(missing);
        }
        // Wholesale overwrite on any structural difference; snapshots are
        // idempotent per sender.
        if channel.provider_metadata != snapshot {
            session
                .set_channel_metadata(channel.id, snapshot.clone())
                .await
                .map_err(store_err)?;
            channel.provider_metadata = snapshot;
        }
        Ok(channel)
    }

    /// Ingests every file reference, skipping failures so one broken file
    /// never loses the message. Pure network/decode work, no store writes.
    async fn ingest_files(&self, event: &CanonicalEvent) -> Vec<StagedFile> {
        let mut staged = Vec::new();
        for file in &event.message.files {
            let Some(ingested) = self.ingester.ingest(file).await else {
                warn!(name = %file.name, "skipping attachment that failed to ingest");
                continue;
            };
            staged.push(StagedFile {
                ingested,
                description: file.description.clone(),
                metadata: file.metadata.clone(),
            });
        }
        staged
    }

    async fn store_attachments(
        &self,
        session: &mut dyn StoreSession,
        staged: Vec<StagedFile>,
    ) -> Result<Vec<Attachment>, ProcessError> {
        let mut stored = Vec::new();
        for file in staged {
            let attachment = session
                .create_attachment(NewAttachment {
                    checksum: checksum(&file.ingested.bytes),
                    name: file.ingested.name,
                    bytes: file.ingested.bytes,
                    mime_type: file.ingested.mime_type,
                    description: file.description,
                    source_url: file.ingested.source_url,
                    metadata: file.metadata,
                })
                .await
                .map_err(store_err)?;
            stored.push(attachment);
        }
        Ok(stored)
    }
}

/// Ingested file content waiting for the final duplicate re-check before it
/// becomes a stored attachment row.
struct StagedFile {
    ingested: IngestedFile,
    description: Option<String>,
    metadata: std::collections::BTreeMap<String, Value>,
}

/// Appends an attachment preview fragment to the message text: inline render
/// for images, embed for documents, plain link otherwise.
fn render_body(text: &str, attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return text.to_string();
    }
    let mut body = text.to_string();
    for attachment in attachments {
        let fragment = match MessageKind::from_mime(&attachment.mime_type) {
            MessageKind::Image => format!(
                r#"<img src="/attachments/{}" alt="{}"/>"#,
                attachment.id, attachment.name
            ),
            MessageKind::Document => format!(
                r#"<embed src="/attachments/{}" type="{}" title="{}"/>"#,
                attachment.id, attachment.mime_type, attachment.name
            ),
            _ => format!(
                r#"<a href="/attachments/{}">{}</a>"#,
                attachment.id, attachment.name
            ),
        };
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(&fragment);
    }
    body
}
