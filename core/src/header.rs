//! Canonical, multi-valued HTTP header map.
//!
//! # Design
//! Keys are canonicalized on every insertion so `content-type` and
//! `Content-Type` always land under the same entry. Each key holds its values
//! in append order. Reading a key that is absent yields an empty value rather
//! than an error.

use std::collections::BTreeMap;

/// Returns the canonical form of a header key.
///
/// The first letter and any letter following a hyphen are upper-cased, all
/// other letters are lower-cased (`content-type` becomes `Content-Type`).
/// Keys containing a space or a byte outside the HTTP token set are returned
/// unchanged.
pub fn canonical_header_key(key: &str) -> String {
    if !key.bytes().all(is_token_byte) {
        return key.to_string();
    }
    let mut upper = true;
    key.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

/// Header map keyed by canonical header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    entries: BTreeMap<String, Vec<String>>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` to the values stored under `key`.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(canonical_header_key(key))
            .or_default()
            .push(value.into());
    }

    /// Replace all values stored under `key` with `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .insert(canonical_header_key(key), vec![value.into()]);
    }

    /// First value for `key`, or `""` if the key is absent.
    pub fn get(&self, key: &str) -> &str {
        self.get_all(key).first().map(String::as_str).unwrap_or("")
    }

    /// All values for `key` in append order; empty if the key is absent.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&canonical_header_key(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&canonical_header_key(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(&canonical_header_key(key))
    }

    /// Iterate over `(key, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flatten into one `(key, value)` pair per stored value, keeping the
    /// per-key append order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.clone(), v.clone())))
            .collect()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Header {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = Header::new();
        for (k, v) in iter {
            header.add(k.as_ref(), v);
        }
        header
    }
}
