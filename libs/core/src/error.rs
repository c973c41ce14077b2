use thiserror::Error;

use crate::provider::ProviderKind;

/// Failure taxonomy surfaced to the webhook boundary.
///
/// Duplicate and skipped deliveries are successful no-op outcomes and live in
/// [`crate::outcome::ProcessStatus`], not here. Per-file attachment failures
/// and recoverable store create-races never surface through this type.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The inbound provider name or kind has no registered implementation.
    #[error("unsupported provider `{name}`")]
    UnsupportedProvider { name: String },

    /// A required payload field is missing or unparseable.
    #[error("malformed payload: {detail}")]
    MalformedPayload { detail: String },

    /// The provider has no active configuration row.
    #[error("no active configuration for provider `{kind}`")]
    NoActiveConfiguration { kind: ProviderKind },

    /// The resolved configuration misses its token or base URL, or is inactive.
    #[error("authentication failed for provider `{kind}`")]
    AuthenticationFailed { kind: ProviderKind },

    /// The event's source channel is not in the provider's allowed set.
    #[error("channel `{label}` is not allowed for provider `{kind}`")]
    InvalidChannel { kind: ProviderKind, label: String },

    /// Unhandled store failure; the surrounding session is rolled back.
    #[error("store failure")]
    Store(#[from] anyhow::Error),
}

impl ProcessError {
    /// Stable machine-readable reason used by the boundary when mapping to
    /// transport-level responses.
    pub fn reason(&self) -> &'static str {
        match self {
            ProcessError::UnsupportedProvider { .. } => "unsupported_provider",
            ProcessError::MalformedPayload { .. } => "malformed_payload",
            ProcessError::NoActiveConfiguration { .. } => "no_active_configuration",
            ProcessError::AuthenticationFailed { .. } => "authentication_failed",
            ProcessError::InvalidChannel { .. } => "invalid_channel",
            ProcessError::Store(_) => "store_failure",
        }
    }
}
