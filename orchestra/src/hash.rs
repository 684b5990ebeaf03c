/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Address → timeslot mapping.
//!
//! Every node evaluates the same pure function over the same address, so two
//! neighbors agree on where a node listens without exchanging a single frame.
//! No collision detection happens here: unrelated nodes that land on the same
//! slot are left to the shared-link backoff of the TSCH engine.

use serde::{Deserialize, Serialize};

use crate::linkaddr::{LinkAddress, LINKADDR_SIZE};

/// Which octets of the address feed the slot hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkAddrHash {
    /// Last octet only. Enough for networks of up to 256 nodes numbered
    /// sequentially.
    #[default]
    LastByte,

    /// Last two octets, big-endian.
    LastTwoBytes,
}

impl LinkAddrHash {
    /// The selected trailing octets of `addr` read as an integer.
    pub fn hash(self, addr: &LinkAddress) -> u16 {
        let octets = addr.octets();
        match self {
            LinkAddrHash::LastByte => u16::from(octets[LINKADDR_SIZE - 1]),
            LinkAddrHash::LastTwoBytes => {
                u16::from(octets[LINKADDR_SIZE - 1]) + 256 * u16::from(octets[LINKADDR_SIZE - 2])
            }
        }
    }
}

/// Timeslot at which `addr` is scheduled within a slotframe of `period` slots.
///
/// Returns `None` – the "unassigned slot" – when there is no address or when
/// `period` is `0`.  A rule whose period is `0` is therefore never able to
/// place a link or claim a packet.
pub fn node_timeslot(addr: Option<&LinkAddress>, period: u16, hash: LinkAddrHash) -> Option<u16> {
    let addr = addr?;
    if period == 0 {
        return None;
    }
    Some(hash.hash(addr) % period)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
