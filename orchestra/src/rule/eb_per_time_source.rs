/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Enhanced-beacon slotframe, one sending cell per node.
//!
//! Each node sends its beacons at its own slot and listens only at the slot
//! of its time source, so beacon reception follows the synchronisation tree.

use tracing::{debug, info, warn};

use super::{install_slotframe, NodeView, PacketSlot, Rule, RuleContext, SavedCell};
use crate::linkaddr::LinkAddress;
use crate::packet::{FrameType, Packet};
use crate::schedule::{ChannelOffset, Link, LinkOptions, LinkType, ScheduleError};

pub const EB_CHANNEL_OFFSET: u16 = 0;

#[derive(Debug, Clone)]
pub struct EbPerTimeSource {
    period: u16,
    handle: Option<u16>,
}

impl EbPerTimeSource {
    pub fn new(period: u16) -> Self {
        Self {
            period,
            handle: None,
        }
    }

    fn eb_link(timeslot: u16, options: LinkOptions) -> Link {
        Link::shared(timeslot, ChannelOffset::Fixed(EB_CHANNEL_OFFSET), options)
            .with_type(LinkType::AdvertisingOnly)
    }
}

impl Rule for EbPerTimeSource {
    fn name(&self) -> &'static str {
        "EB per time source"
    }

    fn init(
        &mut self,
        slotframe_handle: u16,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(own) = ctx.node.own_timeslot(self.period) else {
            warn!(
                handle = slotframe_handle,
                "EB period is 0, rule stays inactive"
            );
            return Ok(());
        };
        install_slotframe(ctx, slotframe_handle, self.period, |ctx| {
            ctx.schedule
                .add_link(slotframe_handle, Self::eb_link(own, LinkOptions::TX))
        })?;
        self.handle = Some(slotframe_handle);

        info!(
            handle = slotframe_handle,
            period = self.period,
            tx_timeslot = own,
            "EB slotframe ready"
        );
        Ok(())
    }

    fn new_time_source(
        &mut self,
        old: Option<&LinkAddress>,
        new: Option<&LinkAddress>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        let Some(handle) = self.handle else {
            return Ok(());
        };
        let old_ts = ctx.node.timeslot_of(old, self.period);
        let new_ts = ctx.node.timeslot_of(new, self.period);
        if old_ts == new_ts {
            return Ok(());
        }
        let own = ctx.node.own_timeslot(self.period);
        let saved = old_ts.map(|ts| SavedCell::take(ctx, handle, ts));

        if let Some(ts) = old_ts {
            if Some(ts) == own {
                // Shared with our sending cell: keep it, drop Rx.
                ctx.schedule
                    .add_link(handle, Self::eb_link(ts, LinkOptions::TX))?;
            } else {
                ctx.schedule.remove_link(handle, ts)?;
            }
            debug!(timeslot = ts, "EB: stopped listening to old time source");
        }

        if let Some(ts) = new_ts {
            let mut options = LinkOptions::RX;
            if Some(ts) == own {
                options |= LinkOptions::TX;
            }
            if let Err(err) = ctx.schedule.add_link(handle, Self::eb_link(ts, options)) {
                if let Some(saved) = saved {
                    saved.restore(ctx)?;
                }
                return Err(err);
            }
            debug!(
                timeslot = ts,
                options = %options,
                "EB: listening to new time source"
            );
        }
        Ok(())
    }

    fn select_packet(&self, packet: &Packet, node: &NodeView<'_>) -> Option<PacketSlot> {
        let handle = self.handle?;
        if packet.frame_type != FrameType::Beacon {
            return None;
        }
        Some(PacketSlot {
            slotframe: handle,
            timeslot: node.own_timeslot(self.period)?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::testing::{addr, Harness};
    use crate::schedule::{InMemorySchedule, TschSchedule};

    const PERIOD: u16 = 11;

    fn init_rule(h: &mut Harness) -> EbPerTimeSource {
        let mut rule = EbPerTimeSource::new(PERIOD);
        h.with_ctx(|ctx| rule.init(0, ctx)).unwrap();
        rule
    }

    #[test]
    fn init_installs_advertising_only_tx_cell_at_own_slot() {
        let mut h = Harness::new(4);
        init_rule(&mut h);

        let sf = h.schedule.slotframe(0).unwrap();
        assert_eq!(sf.link_count(), 1);
        let link = sf.link(4).unwrap();
        assert_eq!(link.options, LinkOptions::TX);
        assert_eq!(link.link_type, LinkType::AdvertisingOnly);
        assert_eq!(link.channel_offset, ChannelOffset::Fixed(EB_CHANNEL_OFFSET));
    }

    #[test]
    fn listens_only_at_current_time_source() {
        let mut h = Harness::new(4);
        let mut rule = init_rule(&mut h);

        h.change_parent(&mut rule, Some(7));
        assert_eq!(h.schedule.link(0, 7).unwrap().options, LinkOptions::RX);

        h.change_parent(&mut rule, Some(9));
        assert!(h.schedule.link(0, 7).is_none(), "old Rx cell removed");
        assert_eq!(h.schedule.link(0, 9).unwrap().options, LinkOptions::RX);
        assert_eq!(h.schedule.slotframe(0).unwrap().link_count(), 2);
    }

    #[test]
    fn time_source_on_own_slot_merges_and_restores() {
        let mut h = Harness::new(4);
        let mut rule = init_rule(&mut h);

        h.change_parent(&mut rule, Some(15)); // 15 % 11 == 4
        assert_eq!(
            h.schedule.link(0, 4).unwrap().options,
            LinkOptions::TX | LinkOptions::RX
        );

        h.change_parent(&mut rule, None);
        assert_eq!(h.schedule.link(0, 4).unwrap().options, LinkOptions::TX);
    }

    #[test]
    fn parents_on_same_slot_are_a_no_op() {
        let mut h = Harness::new(4);
        let mut rule = init_rule(&mut h);
        h.change_parent(&mut rule, Some(7));
        let before = h.schedule.clone();

        h.change_parent(&mut rule, Some(18)); // 18 % 11 == 7
        assert_eq!(h.schedule, before);
    }

    #[test]
    fn refused_switch_keeps_listening_to_old_time_source() {
        let mut h = Harness::new(4);
        h.schedule = InMemorySchedule::with_capacity(1, 1);
        let mut rule = init_rule(&mut h);
        h.change_parent(&mut rule, Some(15)); // shares own slot 4
        let before = h.schedule.clone();

        let (old, new) = (addr(15), addr(7));
        h.parent = Some(new);
        let err = h
            .with_ctx(|ctx| rule.new_time_source(Some(&old), Some(&new), ctx))
            .unwrap_err();

        assert!(matches!(
            err,
            ScheduleError::LinkTableFull { timeslot: 7, .. }
        ));
        assert_eq!(h.schedule, before);
        assert_eq!(
            h.schedule.link(0, 4).unwrap().options,
            LinkOptions::TX | LinkOptions::RX
        );
    }

    #[test]
    fn full_table_still_moves_rx_cell_between_foreign_slots() {
        let mut h = Harness::new(4);
        h.schedule = InMemorySchedule::with_capacity(1, 2);
        let mut rule = init_rule(&mut h);
        h.change_parent(&mut rule, Some(7));

        h.change_parent(&mut rule, Some(9));
        assert!(h.schedule.link(0, 7).is_none());
        assert_eq!(h.schedule.link(0, 9).unwrap().options, LinkOptions::RX);
    }

    #[test]
    fn claims_only_beacons_at_own_slot() {
        let mut h = Harness::new(4);
        let rule = init_rule(&mut h);

        assert_eq!(
            rule.select_packet(&Packet::beacon(), &h.view()),
            Some(PacketSlot {
                slotframe: 0,
                timeslot: 4
            })
        );
        assert_eq!(
            rule.select_packet(&Packet::unicast_data(addr(7)), &h.view()),
            None
        );
    }
}
