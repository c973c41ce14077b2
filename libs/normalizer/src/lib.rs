//! Helpers for normalizing provider-native webhook payloads into canonical events.
//!
//! The main entry point is the [`PayloadNormalizer`] trait, implemented once per
//! supported provider and dispatched through a name-keyed [`NormalizerRegistry`].
//! Normalizers never mutate the raw payload and return `MalformedPayload` when a
//! required field is missing.

use std::collections::HashMap;

use chatsync_core::{CanonicalEvent, ProcessError, ProviderKind};
use serde_json::Value;

pub mod heynow;

pub use heynow::HeynowNormalizer;

/// Parses one provider's native JSON document into a [`CanonicalEvent`].
pub trait PayloadNormalizer: Send + Sync {
    /// Provider this normalizer handles.
    fn provider(&self) -> ProviderKind;

    fn normalize(&self, raw: &Value) -> Result<CanonicalEvent, ProcessError>;
}

/// Registry of normalizers keyed by inbound provider name.
///
/// Adding a provider registers an implementation here; the processor itself
/// never branches on provider names.
#[derive(Default)]
pub struct NormalizerRegistry {
    entries: HashMap<&'static str, Box<dyn PayloadNormalizer>>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in providers registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HeynowNormalizer));
        registry
    }

    pub fn register(&mut self, normalizer: Box<dyn PayloadNormalizer>) {
        self.entries
            .insert(normalizer.provider().as_str(), normalizer);
    }

    /// Resolves the provider kind for an inbound name.
    pub fn provider(&self, name: &str) -> Result<ProviderKind, ProcessError> {
        self.entries
            .get(name)
            .map(|n| n.provider())
            .ok_or_else(|| ProcessError::UnsupportedProvider {
                name: name.to_string(),
            })
    }

    /// Normalizes `raw` using the provider registered under `name`.
    pub fn normalize(&self, name: &str, raw: &Value) -> Result<CanonicalEvent, ProcessError> {
        let normalizer =
            self.entries
                .get(name)
                .ok_or_else(|| ProcessError::UnsupportedProvider {
                    name: name.to_string(),
                })?;
        normalizer.normalize(raw)
    }
}
