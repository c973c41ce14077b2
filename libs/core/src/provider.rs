use serde::{Deserialize, Serialize};

/// Supported chat providers (kept small and stable).
///
/// ```
/// use chatsync_core::ProviderKind;
///
/// let p = ProviderKind::Heynow;
/// assert_eq!(p.as_str(), "heynow");
/// assert_eq!(ProviderKind::from_name("heynow"), Some(ProviderKind::Heynow));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Heynow,
    Botpress,
    Twilio,
    WhatsApp,
    Telegram,
    Facebook,
    Slack,
    Discord,
}

impl ProviderKind {
    /// Returns the lowercase identifier used in webhook routes and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Heynow => "heynow",
            ProviderKind::Botpress => "botpress",
            ProviderKind::Twilio => "twilio",
            ProviderKind::WhatsApp => "whatsapp",
            ProviderKind::Telegram => "telegram",
            ProviderKind::Facebook => "facebook",
            ProviderKind::Slack => "slack",
            ProviderKind::Discord => "discord",
        }
    }

    /// Resolves a provider name as it appears on the inbound route.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "heynow" => Some(ProviderKind::Heynow),
            "botpress" => Some(ProviderKind::Botpress),
            "twilio" => Some(ProviderKind::Twilio),
            "whatsapp" => Some(ProviderKind::WhatsApp),
            "telegram" => Some(ProviderKind::Telegram),
            "facebook" => Some(ProviderKind::Facebook),
            "slack" => Some(ProviderKind::Slack),
            "discord" => Some(ProviderKind::Discord),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
