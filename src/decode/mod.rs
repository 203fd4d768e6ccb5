//! Payload decoding: content classification and attachment extraction.

pub mod attachment;
pub mod classifier;

pub use attachment::extract_attachments;
pub use classifier::{chat_text, classify};
