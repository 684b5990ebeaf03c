/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! MSF unicast slotframe (6TiSCH Minimal Scheduling Function, storing mode).
//!
//! Every node listens at `hash(own) % period` and also at
//! `hash(parent) % period`; every other cell is a shared Tx cell, so a node
//! can reach any neighbor in the cell where that neighbor listens.
//!
//! ```text
//! period = 7, hash(self) = 3, hash(parent) = 5
//!
//! ts    0      1      2      3         4      5         6
//!     Tx|Sh  Tx|Sh  Tx|Sh  Tx|Rx|Sh  Tx|Sh  Tx|Rx|Sh  Tx|Sh
//!                          ^ own              ^ parent
//! ```
//!
//! Packet selection is deliberately asymmetric:
//!
//! * to a **child** – the local node's own slot (the child listens there,
//!   because this node is its parent);
//! * to **anyone else**, parent included – the destination's slot.

use tracing::{debug, info, warn};

use super::{install_slotframe, NodeView, PacketSlot, Rule, RuleContext, SavedCell};
use crate::linkaddr::LinkAddress;
use crate::packet::Packet;
use crate::schedule::{ChannelOffset, Link, LinkOptions, ScheduleError};

/// Channel offset used when multi-channel operation is off.
pub const MSF_CHANNEL_OFFSET: u16 = 1;

/// MSF unicast rule.  Holds only its configuration and slotframe handle.
#[derive(Debug, Clone)]
pub struct UnicastMsf {
    period: u16,
    channel_offset: ChannelOffset,
    /// `None` before `init` and forever when `period == 0`.
    handle: Option<u16>,
}

impl UnicastMsf {
    pub fn new(period: u16, multiple_channels: bool) -> Self {
        let channel_offset = if multiple_channels {
            ChannelOffset::Dynamic
        } else {
            ChannelOffset::Fixed(MSF_CHANNEL_OFFSET)
        };
        Self {
            period,
            channel_offset,
            handle: None,
        }
    }

    pub fn period(&self) -> u16 {
        self.period
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

    /// Turns the parent's cell into a listening cell.  The cell stays a
    /// generic shared one (broadcast target), not a dedicated link.
    fn add_parent_link(
        &self,
        handle: u16,
        parent: Option<&LinkAddress>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(timeslot) = ctx.node.timeslot_of(parent, self.period) else {
            return Ok(());
        };
        let options = LinkOptions::RX | LinkOptions::TX | LinkOptions::SHARED;
        debug!(timeslot, "MSF: listening at parent slot");
        self.write_link(handle, timeslot, options, ctx)
    }

    /// Drops Rx from the former parent's cell, unless the cell is also this
    /// node's own listening cell.
    fn remove_parent_link(
        &self,
        handle: u16,
        parent: Option<&LinkAddress>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(timeslot) = ctx.node.timeslot_of(parent, self.period) else {
            return Ok(());
        };
        let mut options = LinkOptions::TX | LinkOptions::SHARED;
        if Some(timeslot) == ctx.node.own_timeslot(self.period) {
            options |= LinkOptions::RX;
        }
        debug!(timeslot, options = %options, "MSF: leaving parent slot");
        self.write_link(handle, timeslot, options, ctx)
    }
}

impl Rule for UnicastMsf {
    fn name(&self) -> &'static str {
        "unicast MSF"
    }

    fn init(
        &mut self,
        slotframe_handle: u16,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(rx_timeslot) = ctx.node.own_timeslot(self.period) else {
            warn!(
                handle = slotframe_handle,
                "MSF: unicast period is 0, rule stays inactive"
            );
            return Ok(());
        };

        install_slotframe(ctx, slotframe_handle, self.period, |ctx| {
            // Tx everywhere, Rx additionally at our own slot.
            for timeslot in 0..self.period {
                let mut options = LinkOptions::SHARED | LinkOptions::TX;
                if timeslot == rx_timeslot {
                    options |= LinkOptions::RX;
                }
                self.write_link(slotframe_handle, timeslot, options, ctx)?;
            }
            Ok(())
        })?;
        self.handle = Some(slotframe_handle);

        info!(
            handle = slotframe_handle,
            period = self.period,
            rx_timeslot,
            channel_offset = %self.channel_offset,
            "MSF: unicast slotframe ready"
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

        self.remove_parent_link(handle, old, ctx)?;
        if let Err(err) = self.add_parent_link(handle, new, ctx) {
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

        let timeslot = if node.routes.is_known_child(dest) {
            node.own_timeslot(self.period)?
        } else {
            node.timeslot_of(Some(dest), self.period)?
        };

        Some(PacketSlot {
            slotframe: handle,
            timeslot,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FrameType;
    use crate::rule::testing::{addr, Harness};
    use crate::schedule::{InMemorySchedule, TschSchedule};
    use proptest::prelude::*;

    const TXSH: LinkOptions = LinkOptions::TX.union(LinkOptions::SHARED);
    const TXRXSH: LinkOptions = TXSH.union(LinkOptions::RX);

    fn options_at(h: &Harness, ts: u16) -> LinkOptions {
        h.schedule.link(0, ts).unwrap().options
    }

    fn init_rule(h: &mut Harness, period: u16) -> UnicastMsf {
        let mut rule = UnicastMsf::new(period, false);
        h.with_ctx(|ctx| rule.init(0, ctx)).unwrap();
        rule
    }

    // ── init ──────────────────────────────────────────────────────────────────

    #[test]
    fn init_installs_one_rx_cell_and_tx_everywhere() {
        let mut h = Harness::new(3);
        init_rule(&mut h, 7);

        let sf = h.schedule.slotframe(0).unwrap();
        assert_eq!(sf.size(), 7);
        assert_eq!(sf.link_count(), 7);
        for ts in 0..7 {
            let expected = if ts == 3 { TXRXSH } else { TXSH };
            assert_eq!(options_at(&h, ts), expected, "timeslot {ts}");
            let link = sf.link(ts).unwrap();
            assert_eq!(link.address, LinkAddress::BROADCAST);
            assert_eq!(link.channel_offset, ChannelOffset::Fixed(MSF_CHANNEL_OFFSET));
        }
    }

    #[test]
    fn multiple_channels_use_dynamic_offset() {
        let mut h = Harness::new(3);
        let mut rule = UnicastMsf::new(7, true);
        h.with_ctx(|ctx| rule.init(0, ctx)).unwrap();
        assert_eq!(
            h.schedule.link(0, 0).unwrap().channel_offset,
            ChannelOffset::Dynamic
        );
    }

    #[test]
    fn zero_period_leaves_rule_inactive() {
        let mut h = Harness::new(3);
        let mut rule = init_rule(&mut h, 0);

        assert!(h.schedule.slotframe(0).is_none());
        assert_eq!(
            rule.select_packet(&Packet::unicast_data(addr(5)), &h.view()),
            None
        );
        h.change_parent(&mut rule, Some(5));
        assert!(h.schedule.slotframe_handles().is_empty());
    }

    #[test]
    fn init_propagates_link_table_exhaustion() {
        let mut h = Harness::new(3);
        h.schedule = InMemorySchedule::with_capacity(1, 4);
        let mut rule = UnicastMsf::new(7, false);
        let err = h.with_ctx(|ctx| rule.init(0, ctx)).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::LinkTableFull { timeslot: 4, .. }
        ));
    }

    #[test]
    fn refused_init_leaves_table_untouched_and_can_be_retried() {
        let mut h = Harness::new(3);
        h.schedule = InMemorySchedule::with_capacity(4, 4);
        let before = h.schedule.clone();
        let mut rule = UnicastMsf::new(7, false);

        let err = h.with_ctx(|ctx| rule.init(0, ctx)).unwrap_err();
        assert!(matches!(err, ScheduleError::LinkTableFull { .. }));
        assert_eq!(h.schedule, before, "no half-filled slotframe left behind");
        assert_eq!(
            rule.select_packet(&Packet::unicast_data(addr(5)), &h.view()),
            None
        );

        let again = h.with_ctx(|ctx| rule.init(0, ctx)).unwrap_err();
        assert_eq!(again, err);
        assert_eq!(h.schedule, before);
    }

    // ── new_time_source ───────────────────────────────────────────────────────

    #[test]
    fn end_to_end_parent_switch_keeps_own_rx_cell() {
        // self = #3 → slot 3; P = #5 → slot 5; Q = #10 → slot 3
        let mut h = Harness::new(3);
        let mut rule = init_rule(&mut h, 7);

        h.change_parent(&mut rule, Some(5));
        assert_eq!(options_at(&h, 5), TXRXSH);
        assert_eq!(options_at(&h, 3), TXRXSH);

        h.change_parent(&mut rule, Some(10));
        assert_eq!(options_at(&h, 5), TXSH, "old parent cell reverts");
        assert_eq!(options_at(&h, 3), TXRXSH, "own cell keeps Rx");
        for ts in [0, 1, 2, 4, 6] {
            assert_eq!(options_at(&h, ts), TXSH);
        }
    }

    #[test]
    fn losing_parent_that_shares_own_slot_keeps_rx() {
        let mut h = Harness::new(3);
        let mut rule = init_rule(&mut h, 7);

        h.change_parent(&mut rule, Some(10)); // hash 10 % 7 == 3
        h.change_parent(&mut rule, None);
        assert_eq!(options_at(&h, 3), TXRXSH);
    }

    #[test]
    fn same_time_source_is_a_no_op() {
        let mut h = Harness::new(3);
        let mut rule = init_rule(&mut h, 7);
        h.change_parent(&mut rule, Some(5));

        let before = h.schedule.clone();
        let p = addr(5);
        h.with_ctx(|ctx| rule.new_time_source(Some(&p), Some(&p), ctx))
            .unwrap();
        h.with_ctx(|ctx| rule.new_time_source(None, None, ctx))
            .unwrap();
        assert_eq!(h.schedule, before);
    }

    // ── select_packet ─────────────────────────────────────────────────────────

    #[test]
    fn child_destination_uses_own_slot() {
        let mut h = Harness::new(3);
        let rule = init_rule(&mut h, 7);
        h.routes.insert(addr(12)); // 12 % 7 == 5

        let slot = rule
            .select_packet(&Packet::unicast_data(addr(12)), &h.view())
            .unwrap();
        assert_eq!(
            slot,
            PacketSlot {
                slotframe: 0,
                timeslot: 3
            }
        );
    }

    #[test]
    fn non_child_destination_uses_its_own_slot() {
        let mut h = Harness::new(3);
        let mut rule = init_rule(&mut h, 7);
        h.change_parent(&mut rule, Some(5));

        let to_parent = rule
            .select_packet(&Packet::unicast_data(addr(5)), &h.view())
            .unwrap();
        assert_eq!(to_parent.timeslot, 5);

        let to_stranger = rule
            .select_packet(&Packet::unicast_data(addr(13)), &h.view())
            .unwrap();
        assert_eq!(to_stranger.timeslot, 6);
    }

    #[test]
    fn declines_broadcast_and_non_data_frames() {
        let mut h = Harness::new(3);
        let rule = init_rule(&mut h, 7);

        assert_eq!(
            rule.select_packet(&Packet::broadcast_data(), &h.view()),
            None
        );
        assert_eq!(rule.select_packet(&Packet::beacon(), &h.view()), None);
        let cmd = Packet::new(Some(addr(5)), FrameType::Command);
        assert_eq!(rule.select_packet(&cmd, &h.view()), None);
    }

    #[test]
    fn declines_before_init() {
        let h = Harness::new(3);
        let rule = UnicastMsf::new(7, false);
        assert_eq!(
            rule.select_packet(&Packet::unicast_data(addr(5)), &h.view()),
            None
        );
    }

    // ── invariants ────────────────────────────────────────────────────────────

    proptest! {
        #[test]
        fn own_slot_keeps_rx_across_any_parent_sequence(
            own in 0u16..256,
            period in 1u16..32,
            parents in proptest::collection::vec(
                proptest::option::of(0u16..256),
                0..12,
            ),
        ) {
            let mut h = Harness::new(own);
            let mut rule = init_rule(&mut h, period);
            let own_slot = own % period;

            for parent in parents {
                h.change_parent(&mut rule, parent);
                prop_assert!(options_at(&h, own_slot).contains(LinkOptions::RX));
            }
        }

        #[test]
        fn add_then_remove_parent_restores_init_schedule(
            own in 0u16..256,
            parent in 0u16..256,
            period in 1u16..32,
        ) {
            let mut h = Harness::new(own);
            let mut rule = init_rule(&mut h, period);
            let after_init = h.schedule.clone();

            h.change_parent(&mut rule, Some(parent));
            h.change_parent(&mut rule, None);
            prop_assert_eq!(&h.schedule, &after_init);
        }
    }
}
