//! Schema-less reading of tag/length-delimited binary payloads.
//!
//! Message payloads arrive as opaque byte buffers. This module walks their
//! wire structure (varint field tags, length-prefixed nested messages)
//! without any compiled schema: callers address fields by a path of
//! (field number, occurrence index) steps and get back `Option` — a corrupt
//! or missing field is "absent", never an error.

pub mod reader;
pub mod wire;

#[cfg(test)]
pub(crate) mod testenc;

pub use reader::{PayloadReader, Value};
