/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduling rules.
//!
//! A rule is one scheduling policy that owns one slotframe.  Rules keep no
//! topology state of their own: everything they "remember" is written into
//! their slotframe, and every decision is recomputed from the node identity,
//! the current time source and the routing table handed to them in a
//! [`NodeView`].
//!
//! | Rule | Slotframe | Claims |
//! |---|---|---|
//! | [`EbPerTimeSource`] | `ebsf_period` | enhanced beacons |
//! | [`UnicastMsf`] | `unicast_period` | unicast data |
//! | [`UnicastPerNeighborRplStoring`] | `unicast_period` | unicast data to parent / children |
//! | [`DefaultCommon`] | `common_shared_period` | everything else |

pub mod default_common;
pub mod eb_per_time_source;
pub mod unicast_msf;
pub mod unicast_per_neighbor;

pub use default_common::DefaultCommon;
pub use eb_per_time_source::EbPerTimeSource;
pub use unicast_msf::UnicastMsf;
pub use unicast_per_neighbor::UnicastPerNeighborRplStoring;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hash::{node_timeslot, LinkAddrHash};
use crate::linkaddr::LinkAddress;
use crate::packet::Packet;
use crate::routing::RoutingTable;
use crate::schedule::{Link, ScheduleError, TschSchedule};

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Default length of the unicast slotframe.
pub const DEFAULT_UNICAST_PERIOD: u16 = 17;

/// Default length of the common shared slotframe.
pub const DEFAULT_COMMON_SHARED_PERIOD: u16 = 31;

/// Default length of the enhanced-beacon slotframe.
pub const DEFAULT_EBSF_PERIOD: u16 = 397;

// ── Rule inputs / outputs ─────────────────────────────────────────────────────

/// Read-only facts about the node a rule may base decisions on.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    pub node_addr: &'a LinkAddress,
    pub hash: LinkAddrHash,
    /// Current time source (== RPL parent), already updated when a rule sees
    /// a time-source change.
    pub time_source: Option<&'a LinkAddress>,
    pub routes: &'a dyn RoutingTable,
}

impl<'a> NodeView<'a> {
    pub fn timeslot_of(&self, addr: Option<&LinkAddress>, period: u16) -> Option<u16> {
        node_timeslot(addr, period, self.hash)
    }

    /// The slot keyed by this node's own address.
    pub fn own_timeslot(&self, period: u16) -> Option<u16> {
        self.timeslot_of(Some(self.node_addr), period)
    }
}

/// What a mutating rule hook gets: the node facts plus the link table.
pub struct RuleContext<'a> {
    pub node: NodeView<'a>,
    pub schedule: &'a mut dyn TschSchedule,
}

/// Where a claimed packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSlot {
    pub slotframe: u16,
    pub timeslot: u16,
}

// ── Rule trait ────────────────────────────────────────────────────────────────

/// One scheduling policy.
///
/// The dispatcher calls `init` exactly once, then forwards topology events
/// and packet queries for the rest of the process lifetime.  There is no
/// teardown.
pub trait Rule: Send {
    /// Human-readable name used in logs.
    fn name(&self) -> &'static str;

    /// Creates the rule's slotframe under `slotframe_handle` and installs its
    /// fixed links.  On error the table is left as it was and the rule stays
    /// inactive.
    fn init(
        &mut self,
        slotframe_handle: u16,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError>;

    /// Reacts to a time-source change.  Must be a no-op when `old == new`, and
    /// must leave the slotframe unchanged when it fails.
    fn new_time_source(
        &mut self,
        old: Option<&LinkAddress>,
        new: Option<&LinkAddress>,
        ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError>;

    /// Claims `packet` by returning its slotframe and timeslot, or declines
    /// with `None`.
    fn select_packet(&self, packet: &Packet, node: &NodeView<'_>) -> Option<PacketSlot>;

    /// `true` if the rule's schedule depends on the set of children.  Rules
    /// returning `false` never see child events.
    fn handles_children(&self) -> bool {
        false
    }

    fn child_added(
        &mut self,
        _addr: &LinkAddress,
        _ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        Ok(())
    }

    fn child_removed(
        &mut self,
        _addr: &LinkAddress,
        _ctx: &mut RuleContext<'_>,
    ) -> Result<(), ScheduleError> {
        Ok(())
    }
}

// ── All-or-nothing helpers ────────────────────────────────────────────────────

/// Registers slotframe `handle` and lets `fill` install its links.  If `fill`
/// fails, the slotframe is removed again with whatever links it already got.
pub(crate) fn install_slotframe<F>(
    ctx: &mut RuleContext<'_>,
    handle: u16,
    size: u16,
    fill: F,
) -> Result<(), ScheduleError>
where
    F: FnOnce(&mut RuleContext<'_>) -> Result<(), ScheduleError>,
{
    ctx.schedule.add_slotframe(handle, size)?;
    if let Err(err) = fill(ctx) {
        warn!(handle, error = %err, "slotframe setup refused, removing it");
        ctx.schedule.remove_slotframe(handle)?;
        return Err(err);
    }
    Ok(())
}

/// Saved content of one cell, taken before a multi-step update touches it.
pub(crate) struct SavedCell {
    handle: u16,
    timeslot: u16,
    link: Option<Link>,
}

impl SavedCell {
    pub(crate) fn take(ctx: &RuleContext<'_>, handle: u16, timeslot: u16) -> Self {
        Self {
            handle,
            timeslot,
            link: ctx.schedule.link(handle, timeslot).cloned(),
        }
    }

    /// Writes the saved content back.
    pub(crate) fn restore(self, ctx: &mut RuleContext<'_>) -> Result<(), ScheduleError> {
        warn!(
            handle = self.handle,
            timeslot = self.timeslot,
            "update refused, cell restored"
        );
        match self.link {
            Some(link) => ctx.schedule.add_link(self.handle, link),
            None => ctx
                .schedule
                .remove_link(self.handle, self.timeslot)
                .map(|_| ()),
        }
    }
}

// ── Building rules from configuration ─────────────────────────────────────────

/// Rule variants that can be named in a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    EbPerTimeSource,
    UnicastMsf,
    UnicastPerNeighborRplStoring,
    DefaultCommon,
}

impl RuleKind {
    pub fn build(self, params: &RuleParams) -> Box<dyn Rule> {
        match self {
            RuleKind::EbPerTimeSource => Box::new(EbPerTimeSource::new(params.ebsf_period)),
            RuleKind::UnicastMsf => Box::new(UnicastMsf::new(
                params.unicast_period,
                params.multiple_channels,
            )),
            RuleKind::UnicastPerNeighborRplStoring => Box::new(UnicastPerNeighborRplStoring::new(
                params.unicast_period,
                params.multiple_channels,
            )),
            RuleKind::DefaultCommon => Box::new(DefaultCommon::new(
                params.common_shared_period,
                params.eb_rule_active,
            )),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleKind::EbPerTimeSource => "eb_per_time_source",
            RuleKind::UnicastMsf => "unicast_msf",
            RuleKind::UnicastPerNeighborRplStoring => "unicast_per_neighbor_rpl_storing",
            RuleKind::DefaultCommon => "default_common",
        })
    }
}

/// Slotframe lengths and channel mode shared by all rules of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleParams {
    pub unicast_period: u16,
    pub common_shared_period: u16,
    pub ebsf_period: u16,
    /// Unicast links use an engine-assigned channel offset.
    pub multiple_channels: bool,
    /// An EB rule is part of the rule list, so the common slotframe no longer
    /// needs to carry beacons.
    pub eb_rule_active: bool,
}

impl Default for RuleParams {
    fn default() -> Self {
        Self {
            unicast_period: DEFAULT_UNICAST_PERIOD,
            common_shared_period: DEFAULT_COMMON_SHARED_PERIOD,
            ebsf_period: DEFAULT_EBSF_PERIOD,
            multiple_channels: false,
            eb_rule_active: false,
        }
    }
}

// ── Test support ──────────────────────────────────────────────────────────────
