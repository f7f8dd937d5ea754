//! Stable external identifier for artists.
//!
//! [`ArtistId`] wraps the provider's opaque string id. It is the only key used
//! for equality, hashing and container indexing across the workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider-assigned artist identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtistId(pub String);

impl ArtistId {
    /// Creates an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        ArtistId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtistId {
    fn from(id: &str) -> Self {
        ArtistId(id.to_string())
    }
}

impl From<String> for ArtistId {
    fn from(id: String) -> Self {
        ArtistId(id)
    }
}
