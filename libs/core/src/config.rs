use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProcessError;
use crate::provider::ProviderKind;

/// Active configuration row for one provider, as handed over by the external
/// admin surface. The auth token arrives already decrypted and is opaque to
/// this pipeline. At most one active configuration exists per provider kind;
/// the constraint is enforced at configuration-write time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub id: u64,
    pub name: String,
    pub kind: ProviderKind,
    pub active: bool,
    pub base_url: String,
    pub auth_token: String,
    #[serde(default)]
    pub allowed_channels: BTreeSet<String>,
    /// Free-form extra configuration, JSON-encoded.
    #[serde(default)]
    pub extra: Option<String>,
}

impl ProviderConfig {
    /// Parses the free-form extra configuration into a key/value map.
    ///
    /// Returns an empty map when no extra configuration is set and
    /// `MalformedPayload` when the stored text is not valid JSON.
    pub fn extra_map(&self) -> Result<BTreeMap<String, Value>, ProcessError> {
        match self.extra.as_deref() {
            None | Some("") => Ok(BTreeMap::new()),
            Some(raw) => serde_json::from_str(raw).map_err(|_| ProcessError::MalformedPayload {
                detail: "provider extra configuration is not valid JSON".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            id: 1,
            name: "HeyNow prod".into(),
            kind: ProviderKind::Heynow,
            active: true,
            base_url: "https://api.example.com/messages".into(),
            auth_token: "tok".into(),
            allowed_channels: BTreeSet::from(["WhatsApp".to_string()]),
            extra: extra.map(str::to_string),
        }
    }

    #[test]
    fn extra_map_parses_json_object() {
        let cfg = config(Some(r#"{"partnerUser": {"id": 49}}"#));
        let extra = cfg.extra_map().unwrap();
        assert_eq!(extra["partnerUser"]["id"], 49);
    }

    #[test]
    fn extra_map_defaults_empty() {
        assert!(config(None).extra_map().unwrap().is_empty());
        assert!(config(Some("")).extra_map().unwrap().is_empty());
    }

    #[test]
    fn extra_map_rejects_bad_json() {
        assert!(matches!(
            config(Some("{nope")).extra_map(),
            Err(ProcessError::MalformedPayload { .. })
        ));
    }
}
