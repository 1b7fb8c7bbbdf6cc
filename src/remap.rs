// src/remap.rs

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maps a file's remote path to the destination path in storage.
///
/// Remote manifests and the destination storage do not always agree on
/// percent-escaping, so lookups accept a key in any of its encodings:
/// as given, percent-decoded, or percent-encoded per path segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct RemapTable {
    entries: HashMap<String, String>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, original: impl Into<String>, destination: impl Into<String>) {
        self.entries.insert(original.into(), destination.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the destination for `path`, falling back through its encodings.
    pub fn lookup(&self, path: &str) -> Option<&str> {
        if let Some(dest) = self.entries.get(path) {
            return Some(dest);
        }

        let decoded = decode_path(path);
        if let Some(dest) = self.entries.get(decoded.as_ref()) {
            return Some(dest);
        }

        let encoded = encode_path(&decoded);
        if let Some(dest) = self.entries.get(&encoded) {
            return Some(dest);
        }

        // Stored keys may use a partial or mixed escaping; compare decoded forms.
        // When several keys decode to the same path, the lexicographically
        // smallest key wins.
        self.entries
            .iter()
            .filter(|(key, _)| decode_path(key) == decoded)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, dest)| dest.as_str())
    }

    /// Destination for `path`, or `path` itself when the table has no entry.
    pub fn destination_for<'a>(&'a self, path: &'a str) -> &'a str {
        self.lookup(path).unwrap_or(path)
    }
}

impl FromIterator<(String, String)> for RemapTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Percent-decodes `path`; invalid UTF-8 sequences leave it untouched.
pub fn decode_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}

/// Percent-encodes each `/`-separated segment of `path`, keeping separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}
