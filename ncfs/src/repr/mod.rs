//! Representation codecs: pure transformations between a dataset value and
//! the bytes a virtual file shows for it. Sizes are always derived from the
//! encoding itself so size and content can never disagree.

pub mod attrs;
pub mod dims;
pub mod vardata;

pub use vardata::{BinaryVardata, FlatTextVardata, VardataCodec};

use bytes::Bytes;

/// Common byte-range rule for every codec: clamp to the encoded length; an
/// offset past the end yields empty bytes, never an error.
pub fn byte_range(encoded: &Bytes, offset: u64, size: u32) -> Bytes {
    let len = encoded.len() as u64;
    if offset >= len {
        return Bytes::new();
    }
    let end = len.min(offset + u64::from(size));
    encoded.slice(offset as usize..end as usize)
}
