/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The frame currently staged for transmission, as seen by the rules.

use serde::{Deserialize, Serialize};

use crate::linkaddr::LinkAddress;

/// IEEE 802.15.4 frame type of the staged frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Beacon,
    #[default]
    Data,
    Ack,
    Command,
}

/// Destination and type of an outgoing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Link-layer receiver.  `None` or [`LinkAddress::NULL`] both mean
    /// "no unicast receiver".
    pub receiver: Option<LinkAddress>,
    pub frame_type: FrameType,
}

impl Packet {
    pub fn new(receiver: Option<LinkAddress>, frame_type: FrameType) -> Self {
        Self {
            receiver,
            frame_type,
        }
    }

    pub fn unicast_data(receiver: LinkAddress) -> Self {
        Self::new(Some(receiver), FrameType::Data)
    }

    pub fn broadcast_data() -> Self {
        Self::new(None, FrameType::Data)
    }

    /// An enhanced beacon; beacons never carry a unicast receiver.
    pub fn beacon() -> Self {
        Self::new(None, FrameType::Beacon)
    }

    /// Unicast receiver, with the null address filtered out.
    pub fn destination(&self) -> Option<&LinkAddress> {
        self.receiver.as_ref().filter(|addr| !addr.is_null())
    }

    /// `true` for a data frame with a non-null receiver.
    pub fn is_unicast_data(&self) -> bool {
        self.frame_type == FrameType::Data && self.destination().is_some()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
