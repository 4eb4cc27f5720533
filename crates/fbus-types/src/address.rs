//! Peer ids and bus addresses.
//!
//! Every connection gets a monotonically allocated [`PeerId`], rendered on
//! the wire as the unique name `:1.<id>`. A destination string is parsed
//! into an [`Address`], which distinguishes the reserved driver name, unique
//! names of this broker, and well-known names.

use std::fmt;

use crate::protocol::{DRIVER_NAME, UNIQUE_NAME_PREFIX};

/// Identifier of a connected peer.
///
/// Ids are allocated monotonically and never reused for the lifetime of the
/// bus, so a `PeerId` is a stable handle even across disconnects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct PeerId(u64);

impl PeerId {
    /// Wrap a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Render the unique name of this peer, `:1.<id>`.
    #[must_use]
    pub fn unique_name(self) -> String {
        format!("{UNIQUE_NAME_PREFIX}{}", self.0)
    }

    /// Parse a unique name of this broker back into a peer id.
    ///
    /// Returns `None` for anything that is not exactly `:1.<decimal>`;
    /// unique names of foreign brokers (e.g. `:2.0`) never resolve here.
    #[must_use]
    pub fn from_unique_name(name: &str) -> Option<Self> {
        let digits = name.strip_prefix(UNIQUE_NAME_PREFIX)?;
        if digits.is_empty() || digits.bytes().any(|b| !b.is_ascii_digit()) {
            return None;
        }
        // Reject redundant leading zeros so every peer has one spelling.
        if digits.len() > 1 && digits.starts_with('0') {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{UNIQUE_NAME_PREFIX}{}", self.0)
    }
}

/// A parsed destination or sender address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address<'a> {
    /// The reserved bus name, `org.freedesktop.DBus`.
    Driver,
    /// A unique name of this broker.
    Unique(PeerId),
    /// A well-known name.
    WellKnown(&'a str),
}

impl<'a> Address<'a> {
    /// Classify an address string.
    ///
    /// Returns `None` if the string can name nothing on this bus: malformed
    /// strings, and unique names that this broker never allocates.
    #[must_use]
    pub fn parse(s: &'a str) -> Option<Self> {
        if s == DRIVER_NAME {
            Some(Self::Driver)
        } else if s.starts_with(':') {
            PeerId::from_unique_name(s).map(Self::Unique)
        } else if crate::validate::validate_well_known_name(s) {
            Some(Self::WellKnown(s))
        } else {
            None
        }
    }
}
