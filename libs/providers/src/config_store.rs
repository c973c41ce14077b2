use anyhow::Result;
use async_trait::async_trait;
use chatsync_core::{ProviderConfig, ProviderKind};
use dashmap::DashMap;

/// Read-only view of the externally managed provider configuration rows.
///
/// The at-most-one-active-per-kind invariant is enforced by the admin surface
/// at write time and assumed here at read time.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the active configuration for `kind`, if any.
    async fn active_config(&self, kind: ProviderKind) -> Result<Option<ProviderConfig>>;
}

/// In-memory configuration rows for tests and single-process deployments.
///
/// Keyed by provider kind, which makes the one-active-per-kind invariant
/// structural.
#[derive(Default)]
pub struct InMemoryConfigStore {
    rows: DashMap<ProviderKind, ProviderConfig>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) the configuration for its provider kind.
    pub fn put(&self, config: ProviderConfig) {
        self.rows.insert(config.kind, config);
    }

    pub fn remove(&self, kind: ProviderKind) {
        self.rows.remove(&kind);
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn active_config(&self, kind: ProviderKind) -> Result<Option<ProviderConfig>> {
        Ok(self
            .rows
            .get(&kind)
            .filter(|row| row.active)
            .map(|row| row.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn config(active: bool) -> ProviderConfig {
        ProviderConfig {
            id: 1,
            name: "HeyNow".into(),
            kind: ProviderKind::Heynow,
            active,
            base_url: "https://api.example.com".into(),
            auth_token: "tok".into(),
            allowed_channels: BTreeSet::new(),
            extra: None,
        }
    }

    #[tokio::test]
    async fn inactive_rows_are_invisible() {
        let store = InMemoryConfigStore::new();
        store.put(config(false));
        assert!(store
            .active_config(ProviderKind::Heynow)
            .await
            .unwrap()
            .is_none());

        store.put(config(true));
        assert!(store
            .active_config(ProviderKind::Heynow)
            .await
            .unwrap()
            .is_some());
    }
}
