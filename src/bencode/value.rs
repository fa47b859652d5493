use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Range;

/// A decoded bencode value together with the byte range it occupied in its
/// source stream.
///
/// The span is what makes the decoder useful for torrent files: the info
/// hash is the SHA-1 of the *exact* bytes of the `info` dictionary, so the
/// parser must be able to point back into the original buffer instead of
/// re-serializing (which would canonicalize key order and lose fidelity).
///
/// # Examples
///
/// ```
/// use riptide::bencode::decode;
///
/// let value = decode(b"l4:spami42ee").unwrap();
/// assert_eq!(value.span(), 0..12);
///
/// let list = value.as_list().unwrap();
/// assert_eq!(list[0].span(), 1..7);
/// assert_eq!(list[1].as_integer(), Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    /// The payload of this value.
    pub kind: ValueKind,
    /// Offset of the first byte of this value in the source stream.
    pub start: usize,
    /// Offset one past the last byte of this value in the source stream.
    pub end: usize,
}

/// The four bencode data types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// A signed 64-bit integer.
    Integer(i64),
    /// A byte string (may or may not be valid UTF-8).
    Bytes(Bytes),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A dictionary with byte string keys.
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    pub(crate) fn new(kind: ValueKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }

    /// Returns the `[start, end)` byte range this value occupied in its
    /// source stream.
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Returns the exact source bytes of this value.
    ///
    /// `source` must be the buffer the value was decoded from.
    pub fn raw<'a>(&self, source: &'a [u8]) -> &'a [u8] {
        &source[self.start..self.end]
    }

    /// Returns the value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match &self.kind {
            ValueKind::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a byte string, if it is one.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.kind {
            ValueKind::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as a UTF-8 string, if it is a valid UTF-8 byte
    /// string.
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the value as a list, if it is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match &self.kind {
            ValueKind::List(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the value as a dictionary, if it is one.
    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        match &self.kind {
            ValueKind::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up a key in this value if it is a dictionary.
    ///
    /// Returns `None` if the value is not a dictionary or the key is not
    /// present.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }
}
