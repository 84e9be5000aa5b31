//! Basic type definitions for the chat service
//!
//! Provides the `Usid` newtype: the per-connection session identifier
//! assigned by the server when a socket is accepted.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-connection session identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe session identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Usid(pub Uuid);

impl Usid {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero ID, sent by clients that have not logged in yet
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for Usid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Usid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Usid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
