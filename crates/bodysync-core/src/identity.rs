//! Identity types for rigid bodies and network sources

use serde::{Deserialize, Serialize};
use std::fmt;

/// Write a 128-bit value in hyphenated GUID form (8-4-4-4-12)
fn fmt_guid(raw: u128, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let hex = format!("{:032x}", raw);
    write!(
        f,
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Stable identifier of a rigid body, shared by every participant
///
/// Ordered so that snapshots and body lists can be kept sorted by id and
/// walked with co-ordinated linear scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub u128);

impl BodyId {
    /// Create a new body ID
    pub fn new(id: u128) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_guid(self.0, f)
    }
}

impl From<u128> for BodyId {
    fn from(id: u128) -> Self {
        Self(id)
    }
}

/// Identifier of a network participant that sends snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u128);

impl SourceId {
    /// Create a new source ID
    pub fn new(id: u128) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_guid(self.0, f)
    }
}

impl From<u128> for SourceId {
    fn from(id: u128) -> Self {
        Self(id)
    }
}
