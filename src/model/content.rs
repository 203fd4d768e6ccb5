//! Content categories for message payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The classified kind of a message's payload.
///
/// `Status` doubles as the terminal marker for soft-deleted records: a
/// successful DELETE rewrites the record's content-type tag to `Status`
/// instead of erasing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Chat,
    Snap,
    Note,
    Sticker,
    ExternalMedia,
    Status,
    Unknown,
}

impl ContentType {
    /// Categories an operator can select for a sweep refinement.
    /// `Status` and `Unknown` are excluded: the former marks processed
    /// records, the latter is a catch-all, and neither is actionable.
    pub const SELECTABLE: [ContentType; 5] = [
        ContentType::Chat,
        ContentType::Snap,
        ContentType::Note,
        ContentType::Sticker,
        ContentType::ExternalMedia,
    ];

    /// Whether a record with this tag is already in a terminal state and
    /// must be excluded from further destructive actions.
    pub fn is_terminal(self) -> bool {
        matches!(self, ContentType::Status)
    }

    /// Whether payloads of this category can carry media references.
    pub fn bears_attachments(self) -> bool {
        !matches!(self, ContentType::Chat | ContentType::Status | ContentType::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Chat => "chat",
            ContentType::Snap => "snap",
            ContentType::Note => "note",
            ContentType::Sticker => "sticker",
            ContentType::ExternalMedia => "external_media",
            ContentType::Status => "status",
            ContentType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(ContentType::Chat),
            "snap" => Ok(ContentType::Snap),
            "note" => Ok(ContentType::Note),
            "sticker" => Ok(ContentType::Sticker),
            "external_media" | "external-media" => Ok(ContentType::ExternalMedia),
            "status" => Ok(ContentType::Status),
            "unknown" => Ok(ContentType::Unknown),
            other => Err(format!("unknown content type '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state() {
        assert!(ContentType::Status.is_terminal());
        assert!(!ContentType::Chat.is_terminal());
        assert!(!ContentType::Unknown.is_terminal());
    }

    #[test]
    fn test_attachment_bearing_categories() {
        assert!(ContentType::Snap.bears_attachments());
        assert!(ContentType::Note.bears_attachments());
        assert!(ContentType::Sticker.bears_attachments());
        assert!(ContentType::ExternalMedia.bears_attachments());
        assert!(!ContentType::Chat.bears_attachments());
        assert!(!ContentType::Status.bears_attachments());
        assert!(!ContentType::Unknown.bears_attachments());
    }

    #[test]
    fn test_parse_round_trip() {
        for ct in [
            ContentType::Chat,
            ContentType::Snap,
            ContentType::Note,
            ContentType::Sticker,
            ContentType::ExternalMedia,
            ContentType::Status,
            ContentType::Unknown,
        ] {
            assert_eq!(ct.as_str().parse::<ContentType>(), Ok(ct));
        }
        assert!("snapchat".parse::<ContentType>().is_err());
    }
}
