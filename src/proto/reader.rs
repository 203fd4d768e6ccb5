//! Lazy, path-addressed field access over a wire buffer.

use byteorder::{ByteOrder, LittleEndian};

use super::wire::{read_tag, read_varint, WireType};

/// A decoded field value.
///
/// Nested messages arrive as `Bytes` — they share the length-delimited wire
/// type with strings, so interpretation is the caller's choice (wrap the
/// bytes in a new [`PayloadReader`] to descend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    Bytes(&'a [u8]),
}

/// Read-only view over a tag/length-delimited payload.
///
/// The reader holds no state beyond the wrapped buffer: every access walks
/// the wire structure from the start of its view. Constructing nested views
/// is free (no copying), so it is normal to build many readers over the
/// same message during one decode pass.
///
/// There is no error channel. A missing field, a type mismatch, and a
/// buffer corrupted at any point before the requested field all look the
/// same to a caller: `None`.
#[derive(Debug, Clone, Copy)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    /// Wrap a buffer. No validation happens here; decoding is per-access.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Iterate `(field_number, value)` pairs in buffer order.
    ///
    /// Iteration stops silently at the first malformed tag or truncated
    /// value; everything decoded before that point is still yielded.
    pub fn fields(&self) -> FieldIter<'a> {
        FieldIter {
            buf: self.buf,
            pos: 0,
        }
    }

    /// The value at `path`, an ordered list of (field number, occurrence
    /// index) steps. Every step but the last must be a nested message.
    pub fn value(&self, path: &[(u32, usize)]) -> Option<Value<'a>> {
        let (&(field, index), parents) = path.split_last()?;
        let mut reader = *self;
        for &(f, i) in parents {
            reader = reader.nth_message(f, i)?;
        }
        reader.nth_value(field, index)
    }

    /// UTF-8 string at `path`. Invalid UTF-8 is a type mismatch: absent.
    pub fn read_string(&self, path: &[(u32, usize)]) -> Option<String> {
        match self.value(path)? {
            Value::Bytes(b) => std::str::from_utf8(b).ok().map(str::to_owned),
            _ => None,
        }
    }

    /// Raw byte string at `path`.
    pub fn read_bytes(&self, path: &[(u32, usize)]) -> Option<&'a [u8]> {
        match self.value(path)? {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Varint scalar at `path`.
    pub fn read_varint(&self, path: &[(u32, usize)]) -> Option<u64> {
        match self.value(path)? {
            Value::Varint(v) => Some(v),
            _ => None,
        }
    }

    /// Nested message at `path`, as a new reader over its bytes.
    pub fn read_message(&self, path: &[(u32, usize)]) -> Option<PayloadReader<'a>> {
        let mut reader = *self;
        for &(f, i) in path {
            reader = reader.nth_message(f, i)?;
        }
        Some(reader)
    }

    /// Whether at least one occurrence of `field` exists at this level.
    ///
    /// This is the cheap discriminator probe used for classification: it
    /// never descends and never decodes length-delimited contents.
    pub fn has(&self, field: u32) -> bool {
        self.fields().any(|(f, _)| f == field)
    }

    /// All occurrences of `field` that decode as nested messages, in
    /// buffer order.
    pub fn messages(&self, field: u32) -> Vec<PayloadReader<'a>> {
        self.fields()
            .filter_map(|(f, v)| match v {
                Value::Bytes(b) if f == field => Some(PayloadReader::new(b)),
                _ => None,
            })
            .collect()
    }

    /// The `index`-th occurrence of `field` at this level.
    fn nth_value(&self, field: u32, index: usize) -> Option<Value<'a>> {
        self.fields()
            .filter(|(f, _)| *f == field)
            .nth(index)
            .map(|(_, v)| v)
    }

    /// The `index`-th occurrence of `field`, required to be a nested message.
    fn nth_message(&self, field: u32, index: usize) -> Option<PayloadReader<'a>> {
        match self.nth_value(field, index)? {
            Value::Bytes(b) => Some(PayloadReader::new(b)),
            _ => None,
        }
    }
}

/// Iterator over the top-level fields of one buffer.
pub struct FieldIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = (u32, Value<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        match self.step() {
            Some(item) => Some(item),
            None => {
                // Mis-parse: everything from here on is absent.
                self.pos = self.buf.len();
                None
            }
        }
    }
}

impl<'a> FieldIter<'a> {
    fn step(&mut self) -> Option<(u32, Value<'a>)> {
        let (field, wire, pos) = read_tag(self.buf, self.pos)?;
        let (value, next) = match wire {
            WireType::Varint => {
                let (v, next) = read_varint(self.buf, pos)?;
                (Value::Varint(v), next)
            }
            WireType::Fixed64 => {
                let bytes = self.buf.get(pos..pos + 8)?;
                (Value::Fixed64(LittleEndian::read_u64(bytes)), pos + 8)
            }
            WireType::Fixed32 => {
                let bytes = self.buf.get(pos..pos + 4)?;
                (Value::Fixed32(LittleEndian::read_u32(bytes)), pos + 4)
            }
            WireType::LengthDelimited => {
                let (len, start) = read_varint(self.buf, pos)?;
                let len = usize::try_from(len).ok()?;
                let end = start.checked_add(len)?;
                (Value::Bytes(self.buf.get(start..end)?), end)
            }
        };
        self.pos = next;
        Some((field, value))
    }
}
