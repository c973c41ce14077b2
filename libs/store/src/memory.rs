//! In-memory conversation store.
//!
//! Mirrors the concurrency contract of a SQL backend closely enough for the
//! pipeline's correctness properties to be exercised in tests: key try-locks
//! fail fast on contention, uniqueness indexes reject racing creates, and
//! sessions keep an undo journal so rollback removes everything the session
//! touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chatsync_core::{Attachment, Channel, Partner, RecordId, StoredMessage};
use chatsync_idempotency::{Claim, ClaimStore, InMemoryClaimStore};
use serde_json::Value;

use crate::{
    ConversationStore, NewAttachment, NewChannel, NewMessage, NewPartner, StoreError, StoreSession,
};

#[derive(Default)]
struct State {
    partners: HashMap<RecordId, Partner>,
    partner_by_ext: HashMap<String, RecordId>,
    channels: HashMap<RecordId, Channel>,
    channel_by_ext: HashMap<String, RecordId>,
    messages: HashMap<RecordId, StoredMessage>,
    message_by_ext: HashMap<String, RecordId>,
    attachments: HashMap<RecordId, Attachment>,
    operator_id: RecordId,
}

struct Inner {
    state: Mutex<State>,
    claims: InMemoryClaimStore,
    next_id: AtomicU64,
}

/// Shared in-memory store; cheap to clone across concurrent processors.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let inner = Inner {
            state: Mutex::new(State::default()),
            claims: InMemoryClaimStore::new(),
            next_id: AtomicU64::new(1),
        };
        let store = Self {
            inner: Arc::new(inner),
        };
        // Seed the internal operator partner every channel gets as a member.
        {
            let id = store.inner.alloc_id();
            let mut state = store.inner.lock_state();
            state.partners.insert(
                id,
                Partner {
                    id,
                    external_user_id: None,
                    provider: None,
                    name: "Operator".to_string(),
                    external_chat_user: false,
                },
            );
            state.operator_id = id;
        }
        store
    }

    /// Committed message rows, for assertions in tests.
    pub fn messages(&self) -> Vec<StoredMessage> {
        let state = self.inner.lock_state();
        let mut out: Vec<_> = state.messages.values().cloned().collect();
        out.sort_by_key(|m| m.id);
        out
    }

    /// Committed partner rows, for assertions in tests.
    pub fn partners(&self) -> Vec<Partner> {
        let state = self.inner.lock_state();
        let mut out: Vec<_> = state.partners.values().cloned().collect();
        out.sort_by_key(|p| p.id);
        out
    }

    /// Committed channel rows, for assertions in tests.
    pub fn channels(&self) -> Vec<Channel> {
        let state = self.inner.lock_state();
        let mut out: Vec<_> = state.channels.values().cloned().collect();
        out.sort_by_key(|c| c.id);
        out
    }

    /// Committed attachment rows, for assertions in tests.
    pub fn attachments(&self) -> Vec<Attachment> {
        let state = self.inner.lock_state();
        let mut out: Vec<_> = state.attachments.values().cloned().collect();
        out.sort_by_key(|a| a.id);
        out
    }
}

impl Inner {
    fn alloc_id(&self) -> RecordId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Lock poisoning only happens after a panicked mutation; propagating
        // the inner state is the least surprising recovery here.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

enum Undo {
    Partner(RecordId),
    ChatUserFlag(RecordId, bool),
    Channel(RecordId),
    Members(RecordId, Vec<RecordId>),
    Metadata(RecordId, Value),
    Attachment(RecordId),
    RemovedAttachment(Attachment),
    Message(RecordId),
}

pub struct MemorySession {
    inner: Arc<Inner>,
    undo: Vec<Undo>,
    held_keys: Vec<String>,
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
            undo: Vec::new(),
            held_keys: Vec::new(),
        }))
    }
}

impl MemorySession {
    async fn release_held_keys(&mut self) {
        for key in self.held_keys.drain(..) {
            let _ = self.inner.claims.release(&key).await;
        }
    }

    fn unwind(&mut self) {
        let mut state = self.inner.lock_state();
        for undo in self.undo.drain(..).rev() {
            match undo {
                Undo::Partner(id) => {
                    if let Some(partner) = state.partners.remove(&id) {
                        if let Some(ext) = partner.external_user_id {
                            state.partner_by_ext.remove(&ext);
                        }
                    }
                }
                Undo::ChatUserFlag(id, previous) => {
                    if let Some(partner) = state.partners.get_mut(&id) {
                        partner.external_chat_user = previous;
                    }
                }
                Undo::Channel(id) => {
                    if let Some(channel) = state.channels.remove(&id) {
                        state.channel_by_ext.remove(&channel.external_channel_id);
                    }
                }
                Undo::Members(id, added) => {
                    if let Some(channel) = state.channels.get_mut(&id) {
                        channel.member_ids.retain(|m| !added.contains(m));
                    }
                }
                Undo::Metadata(id, previous) => {
                    if let Some(channel) = state.channels.get_mut(&id) {
                        channel.provider_metadata = previous;
                    }
                }
                Undo::Attachment(id) => {
                    state.attachments.remove(&id);
                }
                Undo::RemovedAttachment(attachment) => {
                    state.attachments.insert(attachment.id, attachment);
                }
                Undo::Message(id) => {
                    if let Some(message) = state.messages.remove(&id) {
                        if let Some(ext) = message.external_id {
                            state.message_by_ext.remove(&ext);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn try_lock_message_key(&mut self, key: &str) -> Result<Claim, StoreError> {
        {
            let state = self.inner.lock_state();
            if state.message_by_ext.contains_key(key) {
                return Ok(Claim::Duplicate);
            }
        }
        let claim = self
            .inner
            .claims
            .try_claim(key)
            .await
            .map_err(StoreError::Other)?;
        if claim == Claim::Fresh {
            self.held_keys.push(key.to_string());
        }
        Ok(claim)
    }

    async fn find_message_by_external_id(
        &mut self,
        key: &str,
    ) -> Result<Option<StoredMessage>, StoreError> {
        let state = self.inner.lock_state();
        Ok(state
            .message_by_ext
            .get(key)
            .and_then(|id| state.messages.get(id))
            .cloned())
    }

    async fn operator_partner(&mut self) -> Result<Partner, StoreError> {
        let state = self.inner.lock_state();
        state
            .partners
            .get(&state.operator_id)
            .cloned()
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("operator partner missing")))
    }

    async fn find_partner_by_external_id(
        &mut self,
        external_user_id: &str,
    ) -> Result<Option<Partner>, StoreError> {
        let state = self.inner.lock_state();
        Ok(state
            .partner_by_ext
            .get(external_user_id)
            .and_then(|id| state.partners.get(id))
            .cloned())
    }

    async fn mark_external_chat_user(&mut self, partner_id: RecordId) -> Result<(), StoreError> {
        let mut state = self.inner.lock_state();
        let partner = state
            .partners
            .get_mut(&partner_id)
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("partner {partner_id} missing")))?;
        if !partner.external_chat_user {
            partner.external_chat_user = true;
            self.undo.push(Undo::ChatUserFlag(partner_id, false));
        }
        Ok(())
    }

    async fn create_partner(&mut self, new: NewPartner) -> Result<Partner, StoreError> {
        let id = self.inner.alloc_id();
        let mut state = self.inner.lock_state();
        if state.partner_by_ext.contains_key(&new.external_user_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "partner_external_user_id",
            });
        }
        let partner = Partner {
            id,
            external_user_id: Some(new.external_user_id.clone()),
            provider: Some(new.provider),
            name: new.name,
            external_chat_user: true,
        };
        state.partner_by_ext.insert(new.external_user_id, id);
        state.partners.insert(id, partner.clone());
        self.undo.push(Undo::Partner(id));
        Ok(partner)
    }

    async fn find_channel_by_external_id(
        &mut self,
        external_channel_id: &str,
    ) -> Result<Option<Channel>, StoreError> {
        let state = self.inner.lock_state();
        Ok(state
            .channel_by_ext
            .get(external_channel_id)
            .and_then(|id| state.channels.get(id))
            .cloned())
    }

    async fn create_channel(&mut self, new: NewChannel) -> Result<Channel, StoreError> {
        let id = self.inner.alloc_id();
        let mut state = self.inner.lock_state();
        if state.channel_by_ext.contains_key(&new.external_channel_id) {
            return Err(StoreError::UniqueViolation {
                constraint: "channel_external_channel_id",
            });
        }
        let channel = Channel {
            id,
            external_channel_id: new.external_channel_id.clone(),
            name: new.name,
            provider: new.provider,
            member_ids: new.member_ids,
            provider_metadata: new.provider_metadata,
        };
        state.channel_by_ext.insert(new.external_channel_id, id);
        state.channels.insert(id, channel.clone());
        self.undo.push(Undo::Channel(id));
        Ok(channel)
    }

    async fn add_channel_members(
        &mut self,
        channel_id: RecordId,
        member_ids: &[RecordId],
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock_state();
        let channel = state
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("channel {channel_id} missing")))?;
        let added: Vec<RecordId> = member_ids
            .iter()
            .copied()
            .filter(|m| !channel.member_ids.contains(m))
            .collect();
        if !added.is_empty() {
            channel.member_ids.extend(added.iter().copied());
            self.undo.push(Undo::Members(channel_id, added));
        }
        Ok(())
    }

    async fn set_channel_metadata(
        &mut self,
        channel_id: RecordId,
        metadata: Value,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock_state();
        let channel = state
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| StoreError::Other(anyhow::anyhow!("channel {channel_id} missing")))?;
        let previous = std::mem::replace(&mut channel.provider_metadata, metadata);
        self.undo.push(Undo::Metadata(channel_id, previous));
        Ok(())
    }

    async fn delete_attachment(&mut self, attachment_id: RecordId) -> Result<(), StoreError> {
        let mut state = self.inner.lock_state();
        if let Some(attachment) = state.attachments.remove(&attachment_id) {
            self.undo.push(Undo::RemovedAttachment(attachment));
        }
        Ok(())
    }

    async fn create_attachment(&mut self, new: NewAttachment) -> Result<Attachment, StoreError> {
        let id = self.inner.alloc_id();
        let attachment = Attachment {
            id,
            name: new.name,
            size: new.bytes.len() as u64,
            bytes: new.bytes,
            mime_type: new.mime_type,
            description: new.description,
            checksum: new.checksum,
            source_url: new.source_url,
            metadata: new.metadata,
        };
        let mut state = self.inner.lock_state();
        state.attachments.insert(id, attachment.clone());
        self.undo.push(Undo::Attachment(id));
        Ok(attachment)
    }

    async fn create_message(&mut self, new: NewMessage) -> Result<StoredMessage, StoreError> {
        let id = self.inner.alloc_id();
        let mut state = self.inner.lock_state();
        if let Some(key) = &new.external_id {
            if state.message_by_ext.contains_key(key) {
                return Err(StoreError::UniqueViolation {
                    constraint: "message_external_id",
                });
            }
        }
        let message = StoredMessage {
            id,
            body: new.body,
            author_id: new.author_id,
            channel_id: new.channel_id,
            external_id: new.external_id.clone(),
            from_webhook: new.from_webhook,
            suppress_forward: new.suppress_forward,
            attachment_ids: new.attachment_ids,
        };
        if let Some(key) = new.external_id {
            state.message_by_ext.insert(key, id);
        }
        state.messages.insert(id, message.clone());
        self.undo.push(Undo::Message(id));
        Ok(message)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.undo.clear();
        // Held claims become permanent duplicates: later try-locks answer
        // without reaching the row lookup.
        for key in self.held_keys.drain(..) {
            self.inner.claims.commit(&key).await.map_err(StoreError::Other)?;
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        self.unwind();
        self.release_held_keys().await;
        Ok(())
    }
}
