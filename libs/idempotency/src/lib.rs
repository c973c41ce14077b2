//! Idempotency coordination for webhook processing.
//!
//! Providers deliver at-least-once, and multiple processors may replay the
//! same delivery concurrently without sharing an address space. This crate
//! defines the claim contract those processors use to agree on who creates
//! the message for a given external id: a non-blocking try-lock that fails
//! immediately on contention instead of waiting.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Derives a deterministic idempotency key from stable payload fields.
///
/// Used when a provider omits its native message id: a random fallback would
/// defeat deduplication under redelivery, whereas hashing the same stable
/// fields yields the same key for every delivery of the same event.
///
/// ```
/// use chatsync_idempotency::derive_key;
///
/// let a = derive_key(["user-1", "sess-9", "35", "hola"]);
/// let b = derive_key(["user-1", "sess-9", "35", "hola"]);
/// assert_eq!(a, b);
/// assert_ne!(a, derive_key(["user-1", "sess-9", "35", "adios"]));
/// ```
pub fn derive_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        // Field separator so ["ab","c"] and ["a","bc"] hash differently.
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Outcome of a non-blocking claim attempt on an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// No committed row and no concurrent holder: the caller should process.
    Fresh,
    /// A committed row already bears this key.
    Duplicate,
    /// Another processor currently holds the claim. Treated as a duplicate
    /// by callers: correctness over liveness.
    Contended,
}

/// Contract implemented by claim stores.
///
/// A `Fresh` claim is held until the caller either `commit`s it (the message
/// row now exists and all later claims are duplicates) or `release`s it
/// (rollback; the key becomes claimable again).
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn try_claim(&self, key: &str) -> Result<Claim>;
    async fn commit(&self, key: &str) -> Result<()>;
    async fn release(&self, key: &str) -> Result<()>;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Slot {
    Held,
    Committed,
}

/// In-memory claim store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryClaimStore {
    slots: DashMap<String, Slot>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn try_claim(&self, key: &str) -> Result<Claim> {
        match self.slots.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => match entry.get() {
                Slot::Committed => Ok(Claim::Duplicate),
                Slot::Held => {
                    warn!(key, "idempotency claim contended");
                    Ok(Claim::Contended)
                }
            },
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Slot::Held);
                Ok(Claim::Fresh)
            }
        }
    }

    async fn commit(&self, key: &str) -> Result<()> {
        self.slots.insert(key.to_string(), Slot::Committed);
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<()> {
        // Only drop held claims; committed keys stay duplicates forever.
        self.slots
            .remove_if(key, |_, slot| *slot == Slot::Held);
        Ok(())
    }
}
