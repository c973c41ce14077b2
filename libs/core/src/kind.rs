use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Kind of an in-flight message, derived from the attached file's mime type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Html,
    Image,
    Audio,
    Video,
    Document,
    Location,
    Contact,
    Sticker,
    VoiceNote,
    File,
    Unknown,
}

static MIME_KIND: Lazy<HashMap<&'static str, MessageKind>> = Lazy::new(|| {
    use MessageKind::*;
    HashMap::from([
        ("text/plain", Text),
        ("text/html", Html),
        ("image/jpeg", Image),
        ("image/jpg", Image),
        ("image/png", Image),
        ("image/gif", Image),
        ("image/webp", Image),
        ("image/bmp", Image),
        ("image/tiff", Image),
        ("image/svg+xml", Image),
        ("audio/mpeg", Audio),
        ("audio/mp3", Audio),
        ("audio/mp4", Audio),
        ("audio/x-wav", Audio),
        ("audio/wav", Audio),
        ("audio/aac", Audio),
        ("audio/ogg", VoiceNote),
        ("audio/opus", VoiceNote),
        ("audio/webm", Audio),
        ("audio/amr", VoiceNote),
        ("video/mp4", Video),
        ("video/x-matroska", Video),
        ("video/webm", Video),
        ("video/ogg", Video),
        ("video/quicktime", Video),
        ("video/x-msvideo", Video),
        ("video/x-ms-wmv", Video),
        ("application/pdf", Document),
        ("application/msword", Document),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Document,
        ),
        ("application/vnd.ms-excel", Document),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Document,
        ),
        ("application/vnd.ms-powerpoint", Document),
        (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            Document,
        ),
        ("application/zip", Document),
        ("application/x-rar-compressed", Document),
        ("application/json", Document),
        ("text/csv", Document),
        ("application/xml", Document),
        ("application/x-location", Location),
        ("application/x-contact", Contact),
        ("application/x-sticker", Sticker),
    ])
});

impl MessageKind {
    /// Maps a mime type onto a message kind, `Unknown` for unmapped types.
    ///
    /// ```
    /// use chatsync_core::MessageKind;
    ///
    /// assert_eq!(MessageKind::from_mime("audio/ogg"), MessageKind::VoiceNote);
    /// assert_eq!(MessageKind::from_mime("application/pdf"), MessageKind::Document);
    /// assert_eq!(MessageKind::from_mime("application/x-haiku"), MessageKind::Unknown);
    /// ```
    pub fn from_mime(mime: &str) -> Self {
        MIME_KIND.get(mime).copied().unwrap_or(MessageKind::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_note_mimes() {
        assert_eq!(MessageKind::from_mime("audio/ogg"), MessageKind::VoiceNote);
        assert_eq!(MessageKind::from_mime("audio/opus"), MessageKind::VoiceNote);
        assert_eq!(MessageKind::from_mime("audio/amr"), MessageKind::VoiceNote);
        assert_eq!(MessageKind::from_mime("audio/mpeg"), MessageKind::Audio);
    }

    #[test]
    fn documents_and_unknown() {
        assert_eq!(
            MessageKind::from_mime("application/pdf"),
            MessageKind::Document
        );
        assert_eq!(MessageKind::from_mime("text/csv"), MessageKind::Document);
        assert_eq!(MessageKind::from_mime(""), MessageKind::Unknown);
        assert_eq!(
            MessageKind::from_mime("application/x-frobnicate"),
            MessageKind::Unknown
        );
    }
}
