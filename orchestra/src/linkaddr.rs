/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! IEEE 802.15.4 link-layer addresses.
//!
//! A [`LinkAddress`] is only ever used as a hash input and an equality key:
//! it is copied around freely and never mutated once assigned.
//!
//! Two textual forms are accepted wherever an address is read from YAML or the
//! command line:
//!
//! ```text
//! 00:12:4b:00:00:00:00:03    full 8-octet extended address
//! #3                         node-id shorthand (id in the last two octets)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Number of octets in an extended link-layer address.
pub const LINKADDR_SIZE: usize = 8;

// ── Parse errors ──────────────────────────────────────────────────────────────

/// Why a string could not be turned into a [`LinkAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("expected {expected} octets, found {found}")]
    WrongLength { expected: usize, found: usize },

    #[error("invalid hex octet '{0}'")]
    InvalidOctet(String),

    #[error("invalid node id '{0}' (expected #<0-65535>)")]
    InvalidNodeId(String),
}

// ── LinkAddress ───────────────────────────────────────────────────────────────

/// Fixed-width hardware address identifying a node.
///
/// `Ord` is derived so addresses can key `BTreeMap`/`BTreeSet` collections and
/// iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkAddress([u8; LINKADDR_SIZE]);

impl LinkAddress {
    /// The all-zero address; a frame addressed to it has no unicast receiver.
    pub const NULL: LinkAddress = LinkAddress([0x00; LINKADDR_SIZE]);

    /// Wildcard target used by shared links that any neighbor may use.
    pub const BROADCAST: LinkAddress = LinkAddress([0xff; LINKADDR_SIZE]);

    /// Wraps raw octets, most significant first.
    pub const fn new(octets: [u8; LINKADDR_SIZE]) -> Self {
        Self(octets)
    }

    /// Builds the address a simulated node with `id` would carry: the id is
    /// stored big-endian in the last two octets, everything else is zero.
    pub fn from_node_id(id: u16) -> Self {
        let mut octets = [0u8; LINKADDR_SIZE];
        octets[LINKADDR_SIZE - 2..].copy_from_slice(&id.to_be_bytes());
        Self(octets)
    }

    /// The raw octets, most significant first.
    pub fn octets(&self) -> &[u8; LINKADDR_SIZE] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{octet:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for LinkAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(id) = s.strip_prefix('#') {
            return id
                .parse::<u16>()
                .map(Self::from_node_id)
                .map_err(|_| AddressParseError::InvalidNodeId(s.to_string()));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != LINKADDR_SIZE {
            return Err(AddressParseError::WrongLength {
                expected: LINKADDR_SIZE,
                found: parts.len(),
            });
        }

        let mut octets = [0u8; LINKADDR_SIZE];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(AddressParseError::InvalidOctet(part.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| AddressParseError::InvalidOctet(part.to_string()))?;
        }
        Ok(Self(octets))
    }
}

// Serde goes through the textual form so configuration files stay readable.

impl Serialize for LinkAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LinkAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
