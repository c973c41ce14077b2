use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chatsync_core::{ProcessError, ProviderConfig, ProviderKind};
use serde_json::Value;

use crate::config_store::ConfigStore;

/// Resolves provider services from the configuration store.
pub struct ProviderServices {
    store: Arc<dyn ConfigStore>,
    supported: HashSet<ProviderKind>,
}

impl ProviderServices {
    /// Registry with the built-in provider set.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            supported: HashSet::from([ProviderKind::Heynow]),
        }
    }

    /// Marks an additional provider kind as supported.
    pub fn with_provider(mut self, kind: ProviderKind) -> Self {
        self.supported.insert(kind);
        self
    }

    /// Resolves the service for `kind`, loading its active configuration.
    pub async fn get_service(&self, kind: ProviderKind) -> Result<ProviderService, ProcessError> {
        if !self.supported.contains(&kind) {
            return Err(ProcessError::UnsupportedProvider {
                name: kind.as_str().to_string(),
            });
        }
        let config = self
            .store
            .active_config(kind)
            .await
            .map_err(ProcessError::Store)?
            .ok_or(ProcessError::NoActiveConfiguration { kind })?;
        Ok(ProviderService {
            kind,
            config,
            store: Arc::clone(&self.store),
        })
    }
}

/// One provider's resolved configuration snapshot.
///
/// The snapshot is loaded once at resolve time; callers that need fresher
/// configuration call [`ProviderService::reload`] explicitly rather than
/// paying a store round-trip per read.
pub struct ProviderService {
    kind: ProviderKind,
    config: ProviderConfig,
    store: Arc<dyn ConfigStore>,
}

impl std::fmt::Debug for ProviderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderService")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl ProviderService {
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// True iff the snapshot carries a token and base URL and is active.
    pub fn is_valid(&self) -> bool {
        !self.config.auth_token.is_empty() && !self.config.base_url.is_empty() && self.config.active
    }

    /// True iff `label` exactly matches a configured allowed-channel name.
    pub fn is_valid_channel(&self, label: &str) -> bool {
        self.config.allowed_channels.contains(label)
    }

    pub fn allowed_channels(&self) -> &BTreeSet<String> {
        &self.config.allowed_channels
    }

    pub fn auth_token(&self) -> &str {
        &self.config.auth_token
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Parsed free-form extra configuration.
    pub fn extra_map(&self) -> Result<BTreeMap<String, Value>, ProcessError> {
        self.config.extra_map()
    }

    /// Replaces the snapshot with the store's current active configuration.
    pub async fn reload(&mut self) -> Result<(), ProcessError> {
        self.config = self
            .store
            .active_config(self.kind)
            .await
            .map_err(ProcessError::Store)?
            .ok_or(ProcessError::NoActiveConfiguration { kind: self.kind })?;
        Ok(())
    }
}
