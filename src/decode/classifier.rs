//! Content classification by discriminator probing.
//!
//! A top-level message container carries its category as the presence of
//! one well-known field. Classification probes those fields in a fixed
//! priority order and returns on the first hit — it never descends into
//! the category payload, so it is cheap enough to run as a pre-filter
//! before any full decode.

use crate::model::ContentType;
use crate::proto::PayloadReader;

/// Discriminator fields in probe order. First match wins; the order is
/// part of the contract (a status overlay coexists with stale category
/// fields on edited records, so `Status` must probe first).
const DISCRIMINATORS: [(u32, ContentType); 6] = [
    (STATUS_FIELD, ContentType::Status),
    (CHAT_FIELD, ContentType::Chat),
    (SNAP_FIELD, ContentType::Snap),
    (NOTE_FIELD, ContentType::Note),
    (STICKER_FIELD, ContentType::Sticker),
    (EXTERNAL_MEDIA_FIELD, ContentType::ExternalMedia),
];

pub(crate) const CHAT_FIELD: u32 = 2;
pub(crate) const EXTERNAL_MEDIA_FIELD: u32 = 3;
pub(crate) const STICKER_FIELD: u32 = 4;
pub(crate) const NOTE_FIELD: u32 = 6;
pub(crate) const STATUS_FIELD: u32 = 8;
pub(crate) const SNAP_FIELD: u32 = 11;

/// Path of the plain-text body inside a chat container.
pub const CHAT_TEXT_PATH: [(u32, usize); 2] = [(CHAT_FIELD, 0), (1, 0)];

/// Classify a decoded container.
///
/// Total and deterministic: every input maps to exactly one category,
/// `Unknown` when no discriminator is populated.
pub fn classify(container: &PayloadReader<'_>) -> ContentType {
    for (field, category) in DISCRIMINATORS {
        if container.has(field) {
            return category;
        }
    }
    ContentType::Unknown
}

/// The chat text of a container, if it is a chat and carries one.
pub fn chat_text(container: &PayloadReader<'_>) -> Option<String> {
    container.read_string(&CHAT_TEXT_PATH)
}

/// The discriminator field announcing `category`, if it has one.
pub(crate) fn discriminator_field(category: ContentType) -> Option<u32> {
    DISCRIMINATORS
        .iter()
        .find(|(_, c)| *c == category)
        .map(|&(f, _)| f)
}
