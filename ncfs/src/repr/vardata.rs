//! Array-content codecs for `DATA_REPR` files.
//!
//! Both codecs are pure array-to-bytes transformations. Because encoding a
//! whole array is the expensive path, results are memoized in a cache keyed
//! by `(variable name, dataset revision)`; any dataset mutation bumps the
//! revision, so a cached encoding can never be served after a write.

use bytes::Bytes;
use moka::sync::Cache;

const CACHE_CAPACITY: u64 = 1024;

/// Encoder for a variable's array contents. `size` is defined as the length
/// of the encoding, never computed separately.
pub trait VardataCodec: Send + Sync {
    fn encode(&self, name: &str, revision: u64, data: &[f64]) -> Bytes;

    fn size(&self, name: &str, revision: u64, data: &[f64]) -> u64 {
        self.encode(name, revision, data).len() as u64
    }
}

/// Raw native-endian bytes of the flattened row-major array. Read-only:
/// there is no decode, so writes through this representation are rejected.
pub struct BinaryVardata {
    cache: Cache<(String, u64), Bytes>,
}

impl BinaryVardata {
    pub fn new() -> Self {
        Self {
            cache: Cache::new(CACHE_CAPACITY),
        }
    }
}

impl Default for BinaryVardata {
    fn default() -> Self {
        Self::new()
    }
}

impl VardataCodec for BinaryVardata {
    fn encode(&self, name: &str, revision: u64, data: &[f64]) -> Bytes {
        self.cache.get_with((name.to_string(), revision), || {
            let mut out = Vec::with_capacity(data.len() * 8);
            for v in data {
                out.extend_from_slice(&v.to_ne_bytes());
            }
            Bytes::from(out)
        })
    }
}

/// One value per line in row-major order, fixed-point with a configurable
/// number of fractional digits.
pub struct FlatTextVardata {
    precision: usize,
    cache: Cache<(String, u64), Bytes>,
}

impl FlatTextVardata {
    pub fn new() -> Self {
        Self::with_precision(6)
    }

    pub fn with_precision(precision: usize) -> Self {
        Self {
            precision,
            cache: Cache::new(CACHE_CAPACITY),
        }
    }
}

impl Default for FlatTextVardata {
    fn default() -> Self {
        Self::new()
    }
}

impl VardataCodec for FlatTextVardata {
    fn encode(&self, name: &str, revision: u64, data: &[f64]) -> Bytes {
        self.cache.get_with((name.to_string(), revision), || {
            let mut out = String::new();
            for v in data {
                out.push_str(&format!("{v:.prec$}\n", prec = self.precision));
            }
            Bytes::from(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_text_is_one_value_per_line() {
        let codec = FlatTextVardata::new();
        let encoded = codec.encode("v", 0, &[1.0, 2.5, -3.0]);
        assert_eq!(encoded, "1.000000\n2.500000\n-3.000000\n");
    }

    #[test]
    fn flat_text_precision_is_configurable() {
        let codec = FlatTextVardata::with_precision(2);
        assert_eq!(codec.encode("v", 0, &[1.0]), "1.00\n");
    }

    #[test]
    fn binary_is_eight_bytes_per_element() {
        let codec = BinaryVardata::new();
        let encoded = codec.encode("v", 0, &[1.0, 2.0]);
        assert_eq!(encoded.len(), 16);
        assert_eq!(&encoded[..8], &1.0f64.to_ne_bytes());
    }

    #[test]
    fn size_is_the_encoding_length() {
        let codec = FlatTextVardata::new();
        let data = [0.5, 1.5];
        assert_eq!(
            codec.size("v", 0, &data),
            codec.encode("v", 0, &data).len() as u64
        );
    }

    #[test]
    fn a_new_revision_re_encodes() {
        let codec = FlatTextVardata::new();
        let first = codec.encode("v", 1, &[1.0]);
        // Same key: served from cache even though the slice differs.
        assert_eq!(codec.encode("v", 1, &[9.0]), first);
        // Bumped revision: fresh encoding.
        assert_eq!(codec.encode("v", 2, &[9.0]), "9.000000\n");
    }

    #[test]
    fn empty_array_encodes_to_nothing() {
        assert_eq!(FlatTextVardata::new().encode("v", 0, &[]), Bytes::new());
        assert_eq!(BinaryVardata::new().encode("v", 0, &[]), Bytes::new());
    }
}
