/// Shared data structures for the generation and cache layers
///
/// These types flow between the priority queue, the two-tier cache and
/// whatever presentation layer subscribes to generation events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a catalogued asset (e.g. a file handle path or UUID)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic, filesystem-safe file name for a cached blob.
    ///
    /// Percent-encodes everything outside the URI-component unreserved set,
    /// so distinct ids never collide on disk.
    pub fn cache_file_name(&self) -> String {
        format!("{}.jpg", encode_component(&self.0))
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AssetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// URI-component percent encoding (same unreserved set as ECMAScript)
fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        let unreserved = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')');
        if unreserved {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
