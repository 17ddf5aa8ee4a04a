//! Attribute-as-text codec, shared by variable and dataset-wide attributes.

use bytes::Bytes;

use crate::dataset::AttrValue;

/// Text form of an attribute: its display value with exactly one trailing
/// newline, unless the value is empty or already newline-terminated.
pub fn encode(value: &AttrValue) -> Bytes {
    let mut s = value.to_string();
    if !s.is_empty() && !s.ends_with('\n') {
        s.push('\n');
    }
    Bytes::from(s)
}

pub fn size(value: &AttrValue) -> u64 {
    encode(value).len() as u64
}
