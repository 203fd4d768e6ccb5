//! Attachment extraction from attachment-bearing containers.
//!
//! Layout of a media-reference entry inside a category payload:
//! repeated entries under [`MEDIA_ENTRY_FIELD`], each with a locator
//! sub-message (field 1) whose field 2 holds the raw media key bytes,
//! a media-type discriminator varint (field 2), and opaque download
//! metadata bytes (field 3).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::model::{AttachmentDescriptor, MediaType};
use crate::proto::PayloadReader;

use super::classifier::classify;

/// Repeated media-reference field inside a category payload.
const MEDIA_ENTRY_FIELD: u32 = 3;
/// Path of the raw media key inside one entry.
const MEDIA_KEY_PATH: [(u32, usize); 2] = [(1, 0), (2, 0)];
/// Media-type discriminator inside one entry.
const MEDIA_TYPE_PATH: [(u32, usize); 1] = [(2, 0)];
/// Opaque download metadata inside one entry.
const METADATA_PATH: [(u32, usize); 1] = [(3, 0)];

/// Extract every usable media reference from a container.
///
/// Non-attachment-bearing categories (chat, status, unknown) yield an
/// empty list. An entry with a missing or malformed media key is skipped,
/// never an error, and never aborts extraction of the entries after it.
pub fn extract_attachments(container: &PayloadReader<'_>) -> Vec<AttachmentDescriptor> {
    let category = classify(container);
    if !category.bears_attachments() {
        return Vec::new();
    }

    let field = match super::classifier::discriminator_field(category) {
        Some(f) => f,
        None => return Vec::new(),
    };
    let envelope = match container.read_message(&[(field, 0)]) {
        Some(e) => e,
        None => return Vec::new(),
    };

    let mut descriptors = Vec::new();
    for (index, entry) in envelope.messages(MEDIA_ENTRY_FIELD).iter().enumerate() {
        match decode_entry(entry) {
            Some(descriptor) => descriptors.push(descriptor),
            None => {
                debug!(index, %category, "Skipping media entry without usable key");
            }
        }
    }
    descriptors
}

/// Decode a single media-reference entry, or `None` if it has no usable
/// media key.
fn decode_entry(entry: &PayloadReader<'_>) -> Option<AttachmentDescriptor> {
    let key = entry.read_bytes(&MEDIA_KEY_PATH)?;
    let media_type = entry
        .read_varint(&MEDIA_TYPE_PATH)
        .map(MediaType::from_discriminator)
        .unwrap_or(MediaType::Unknown);
    let metadata = entry
        .read_bytes(&METADATA_PATH)
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    AttachmentDescriptor::new(STANDARD.encode(key), media_type, metadata)
}
