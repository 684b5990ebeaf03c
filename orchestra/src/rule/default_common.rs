/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Common shared slotframe: one cell at timeslot 0 that every node both
//! listens and transmits in.  Catches whatever higher-priority rules decline
//! (broadcasts, RPL control traffic, and beacons when no EB rule is active).

use tracing::{info, warn};

use super::{install_slotframe, NodeView, PacketSlot, Rule, RuleContext};
use crate::linkaddr::LinkAddress;
use crate::packet::Packet;
use crate::schedule::{ChannelOffset, Link, LinkOptions, LinkType, ScheduleError};

pub const DEFAULT_COMMON_CHANNEL_OFFSET: u16 = 1;

#[derive(Debug, Clone)]
pub struct DefaultCommon {
    period: u16,
    link_type: LinkType,
    handle: Option<u16>,
}

impl DefaultCommon {
    /// With `eb_rule_active`, beacons have their own slotframe and the common
    /// cell becomes a normal one; otherwise it also advertises.
    pub fn new(period: u16, eb_rule_active: bool) -> Self {
        let link_type = if eb_rule_active {
            LinkType::Normal
        } else {
            LinkType::Advertising
        };
        Self {
            period,
            link_type,
            handle: None,
        }
    }
}

impl Rule for DefaultCommon {
    fn name(&self) -> &'static str {
        "default common"
    }

    fn init(
        &mut self,
        slotframe_handle: u16,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        if self.period == 0 {
            warn!(
                handle = slotframe_handle,
                "common shared period is 0, rule stays inactive"
            );
            return Ok(());
        }

        let link = Link::shared(
            0,
            ChannelOffset::Fixed(DEFAULT_COMMON_CHANNEL_OFFSET),
            LinkOptions::RX | LinkOptions::TX | LinkOptions::SHARED,
        )
        .with_type(self.link_type);
        install_slotframe(ctx, slotframe_handle, self.period, |ctx| {
            ctx.schedule.add_link(slotframe_handle, link)
        })?;
        self.handle = Some(slotframe_handle);

        info!(
            handle = slotframe_handle,
            period = self.period,
            link_type = %self.link_type,
            "common shared slotframe ready"
        );
        Ok(())
    }

    fn new_time_source(
        &mut self,
        _old: Option<&LinkAddress>,
        _new: Option<&LinkAddress>,
        _ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        Ok(())
    }

    fn select_packet(&self, _packet: &Packet, _node: &NodeView<'_>) -> Option<PacketSlot> {
        self.handle.map(|slotframe| PacketSlot {
            slotframe,
            timeslot: 0,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
