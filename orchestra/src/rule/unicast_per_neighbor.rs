/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Receiver-based unicast slotframe for RPL storing mode.
//!
//! A node listens only at its own slot and adds a Tx cell at the slot of
//! every neighbor it has a unicast relationship with: its parent and each
//! child.  Unlike MSF, cells come and go with the neighbor set, so removal
//! must check whether anybody else still hashes to the cell before dropping
//! it.

use tracing::{debug, info, warn};

use super::{install_slotframe, NodeView, PacketSlot, Rule, RuleContext, SavedCell};
use crate::linkaddr::LinkAddress;
use crate::packet::Packet;
use crate::schedule::{ChannelOffset, Link, LinkOptions, ScheduleError};

/// Channel offset used when multi-channel operation is off.
pub const UNICAST_CHANNEL_OFFSET: u16 = 2;

const OWN_OPTIONS: LinkOptions = LinkOptions::RX;
const NEIGHBOR_OPTIONS: LinkOptions = LinkOptions::TX.union(LinkOptions::SHARED);

#[derive(Debug, Clone)]
pub struct UnicastPerNeighborRplStoring {
    period: u16,
    channel_offset: ChannelOffset,
    handle: Option<u16>,
}

impl UnicastPerNeighborRplStoring {
    pub fn new(period: u16, multiple_channels: bool) -> Self {
        let channel_offset = if multiple_channels {
            ChannelOffset::Dynamic
        } else {
            ChannelOffset::Fixed(UNICAST_CHANNEL_OFFSET)
        };
        Self {
            period,
            channel_offset,
            handle: None,
        }
    }

    fn write_link(
        &self,
        handle: u16,
        timeslot: u16,
        options: LinkOptions,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        ctx.schedule
            .add_link(handle, Link::shared(timeslot, self.channel_offset, options))
    }

    /// `true` if the parent or this node has a unicast relationship with
    /// `addr`.
    fn has_unicast_link(node: &NodeView<'_>, addr: &LinkAddress) -> bool {
        node.time_source == Some(addr) || node.routes.is_known_child(addr)
    }

    fn add_neighbor_link(
        &self,
        handle: u16,
        addr: Option<&LinkAddress>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(timeslot) = ctx.node.timeslot_of(addr, self.period) else {
            return Ok(());
        };
        let mut options = NEIGHBOR_OPTIONS;
        if Some(timeslot) == ctx.node.own_timeslot(self.period) {
            options |= OWN_OPTIONS;
        }
        debug!(timeslot, options = %options, "per-neighbor: Tx cell added");
        self.write_link(handle, timeslot, options, ctx)
    }

    /// Drops the Tx cell of `addr` unless the parent or another child still
    /// needs it.  Our own cell survives with its original options.
    fn remove_neighbor_link(
        &self,
        handle: u16,
        addr: Option<&LinkAddress>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(addr) = addr else {
            return Ok(());
        };
        let Some(timeslot) = ctx.node.timeslot_of(Some(addr), self.period) else {
            return Ok(());
        };
        if ctx.schedule.link(handle, timeslot).is_none() {
            return Ok(());
        }

        let node = ctx.node;
        if node.timeslot_of(node.time_source, self.period) == Some(timeslot) {
            return Ok(());
        }
        let still_needed = node
            .routes
            .children()
            .iter()
            .filter(|child| *child != addr)
            .any(|child| node.timeslot_of(Some(child), self.period) == Some(timeslot));
        if still_needed {
            return Ok(());
        }

        if Some(timeslot) == node.own_timeslot(self.period) {
            self.write_link(handle, timeslot, OWN_OPTIONS, ctx)
        } else {
            debug!(timeslot, "per-neighbor: Tx cell removed");
            ctx.schedule.remove_link(handle, timeslot).map(|_| ())
        }
    }
}

impl Rule for UnicastPerNeighborRplStoring {
    fn name(&self) -> &'static str {
        "unicast per neighbor storing"
    }

    fn init(
        &mut self,
        slotframe_handle: u16,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(own) = ctx.node.own_timeslot(self.period) else {
            warn!(
                handle = slotframe_handle,
                "unicast period is 0, rule stays inactive"
            );
            return Ok(());
        };
        install_slotframe(ctx, slotframe_handle, self.period, |ctx| {
            self.write_link(slotframe_handle, own, OWN_OPTIONS, ctx)
        })?;
        self.handle = Some(slotframe_handle);

        info!(
            handle = slotframe_handle,
            period = self.period,
            rx_timeslot = own,
            "per-neighbor unicast slotframe ready"
        );
        Ok(())
    }

    fn new_time_source(
        &mut self,
        old: Option<&LinkAddress>,
        new: Option<&LinkAddress>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        if old == new {
            return Ok(());
        }
        let Some(handle) = self.handle else {
            return Ok(());
        };
        let saved = ctx
            .node
            .timeslot_of(old, self.period)
            .map(|ts| SavedCell::take(ctx, handle, ts));

        self.remove_neighbor_link(handle, old, ctx)?;
        if let Err(err) = self.add_neighbor_link(handle, new, ctx) {
            if let Some(saved) = saved {
                saved.restore(ctx)?;
            }
            return Err(err);
        }
        Ok(())
    }

    fn select_packet(&self, packet: &Packet, node: &NodeView<'_>) -> Option<PacketSlot> {
        let handle = self.handle?;
        if !packet.is_unicast_data() {
            return None;
        }
        let dest = packet.destination()?;
        if !Self::has_unicast_link(node, dest) {
            return None;
        }
        Some(PacketSlot {
            slotframe: handle,
            timeslot: node.timeslot_of(Some(dest), self.period)?,
        })
    }

    fn handles_children(&self) -> bool {
        true
    }

    fn child_added(
        &mut self,
        addr: &LinkAddress,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        match self.handle {
            Some(handle) => self.add_neighbor_link(handle, Some(addr), ctx),
            None => Ok(()),
        }
    }

    fn child_removed(
        &mut self,
        addr: &LinkAddress,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        match self.handle {
            Some(handle) => self.remove_neighbor_link(handle, Some(addr), ctx),
            None => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
