//! Attachment descriptors extracted from message payloads.
//!
//! The media content itself is never loaded here. A descriptor carries
//! just enough to hand the download collaborator a request.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of media an attachment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Unknown,
}

impl MediaType {
    /// Map the companion discriminator value from a media-reference entry.
    pub fn from_discriminator(value: u64) -> Self {
        match value {
            1 => MediaType::Image,
            2 => MediaType::Video,
            3 => MediaType::Audio,
            _ => MediaType::Unknown,
        }
    }

    /// File extension used when building download output paths.
    pub fn extension(self) -> &'static str {
        match self {
            MediaType::Image => "jpg",
            MediaType::Video => "mp4",
            MediaType::Audio => "m4a",
            MediaType::Unknown => "bin",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Reference to one piece of media associated with a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    /// Media unique identifier. Never empty: extraction that cannot
    /// produce one yields no descriptor at all.
    media_id: String,

    /// Kind of media.
    pub media_type: MediaType,

    /// Opaque bytes copied verbatim from the payload; the download
    /// collaborator needs them to build its request.
    pub metadata: Vec<u8>,
}

impl AttachmentDescriptor {
    /// Build a descriptor. Returns `None` for an empty media id — such an
    /// entry is "no attachment", not a malformed one.
    pub fn new(media_id: String, media_type: MediaType, metadata: Vec<u8>) -> Option<Self> {
        if media_id.is_empty() {
            return None;
        }
        Some(Self {
            media_id,
            media_type,
            metadata,
        })
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }
}
