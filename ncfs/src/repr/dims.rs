//! Dimension-names codec: the text form of a variable's ordered
//! dimension-name tuple, one name per line.

use bytes::Bytes;

pub const SEPARATOR: char = '\n';

/// `""` for an empty tuple, otherwise newline-joined names with a trailing
/// newline.
pub fn encode(names: &[String]) -> Bytes {
    if names.is_empty() {
        return Bytes::new();
    }
    let mut s = names.join("\n");
    s.push(SEPARATOR);
    Bytes::from(s)
}

/// Inverse of [`encode`] for separator-free names: `decode(encode(xs)) == xs`.
pub fn decode(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.trim()
        .split(SEPARATOR)
        .map(str::to_string)
        .collect()
}

pub fn size(names: &[String]) -> u64 {
    encode(names).len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn round_trip() {
        for xs in [names(&[]), names(&["x"]), names(&["x", "y", "time"])] {
            assert_eq!(decode(std::str::from_utf8(&encode(&xs)).unwrap()), xs);
        }
    }

    #[test]
    fn empty_encodes_to_empty() {
        assert_eq!(encode(&[]), Bytes::new());
        assert_eq!(decode(""), Vec::<String>::new());
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(decode("x\ny\n"), names(&["x", "y"]));
        assert_eq!(decode("x\ny"), names(&["x", "y"]));
    }
}
