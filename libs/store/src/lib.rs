//! Conversation store contract consumed by the webhook processor.
//!
//! The processor owns no locking of its own: deduplication try-locks, unique
//! constraints, and rollback scopes are all delegated to the store through
//! the [`ConversationStore`] / [`StoreSession`] traits, since concurrent
//! processors may not share an address space. [`memory::InMemoryStore`]
//! provides the reference implementation used in tests and single-process
//! deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatsync_core::{
    Attachment, Channel, Partner, ProviderKind, RecordId, StoredMessage,
};
use chatsync_idempotency::Claim;
use serde_json::Value;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryStore;

/// Failures produced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected a create. Callers recover by
    /// re-querying for the row the concurrent winner created.
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Fields for a partner to be created lazily on first reference.
#[derive(Debug, Clone)]
pub struct NewPartner {
    pub external_user_id: String,
    pub provider: ProviderKind,
    pub name: String,
}

/// Fields for a channel to be created lazily on first reference.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub external_channel_id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub member_ids: Vec<RecordId>,
    pub provider_metadata: Value,
}

/// Fields for a message created at the end of the pipeline.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub body: String,
    pub author_id: RecordId,
    pub channel_id: RecordId,
    pub external_id: Option<String>,
    pub from_webhook: bool,
    pub suppress_forward: bool,
    pub attachment_ids: Vec<RecordId>,
}

/// Fields for a stored attachment produced by the ingester.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub description: Option<String>,
    pub checksum: String,
    pub source_url: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Handle to a persistent conversation store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Opens a transactional session. All mutations made through the session
    /// are undone by [`StoreSession::rollback`] and become durable on
    /// [`StoreSession::commit`], savepoint-style: a mid-pipeline failure
    /// never leaves partial partner/channel/message rows behind.
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError>;
}

/// One transactional scope over the conversation store.
#[async_trait]
pub trait StoreSession: Send {
    /// Non-blocking claim of the message row bearing `key`: `Duplicate` when
    /// a committed row exists, `Contended` when another session holds the
    /// claim, `Fresh` when this session acquired it. A fresh claim is held
    /// until the session ends: commit makes it a permanent duplicate,
    /// rollback makes the key claimable again.
    async fn try_lock_message_key(&mut self, key: &str) -> Result<Claim, StoreError>;

    async fn find_message_by_external_id(
        &mut self,
        key: &str,
    ) -> Result<Option<StoredMessage>, StoreError>;

    /// Internal operator partner added to every provider channel.
    async fn operator_partner(&mut self) -> Result<Partner, StoreError>;

    /// Row-locked lookup by external user id.
    async fn find_partner_by_external_id(
        &mut self,
        external_user_id: &str,
    ) -> Result<Option<Partner>, StoreError>;

    /// Idempotently flags a partner as an external chat user.
    async fn mark_external_chat_user(&mut self, partner_id: RecordId) -> Result<(), StoreError>;

    async fn create_partner(&mut self, new: NewPartner) -> Result<Partner, StoreError>;

    async fn find_channel_by_external_id(
        &mut self,
        external_channel_id: &str,
    ) -> Result<Option<Channel>, StoreError>;

    async fn create_channel(&mut self, new: NewChannel) -> Result<Channel, StoreError>;

    /// Adds the given partners to the channel, ignoring existing members.
    async fn add_channel_members(
        &mut self,
        channel_id: RecordId,
        member_ids: &[RecordId],
    ) -> Result<(), StoreError>;

    /// Overwrites the channel's provider metadata snapshot.
    async fn set_channel_metadata(
        &mut self,
        channel_id: RecordId,
        metadata: Value,
    ) -> Result<(), StoreError>;

    async fn create_attachment(&mut self, new: NewAttachment) -> Result<Attachment, StoreError>;

    /// Removes an attachment row, e.g. one staged for a message that lost
    /// the creation race. Deleting an unknown id is a no-op.
    async fn delete_attachment(&mut self, attachment_id: RecordId) -> Result<(), StoreError>;

    async fn create_message(&mut self, new: NewMessage) -> Result<StoredMessage, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
