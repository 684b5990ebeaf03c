/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Slotframes, links and the link-table seam of the TSCH engine.
//!
//! The slot-timing engine that executes the schedule lives outside this crate.
//! Rules only ever talk to it through [`TschSchedule`], which is small enough
//! to be backed by a real MAC or by [`InMemorySchedule`] in tests and in the
//! simulator.
//!
//! Invariant: a slotframe holds at most one link per timeslot.  Adding a link
//! at an occupied timeslot replaces the previous entry instead of creating a
//! second one.

pub mod error;

pub use error::ScheduleError;

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use bitflags::bitflags;
use tracing::debug;

use crate::linkaddr::LinkAddress;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default number of slotframes the in-memory table accepts.
pub const DEFAULT_MAX_SLOTFRAMES: usize = 4;

/// Default number of links (over all slotframes) the in-memory table accepts.
pub const DEFAULT_MAX_LINKS: usize = 64;

// ── Link attributes ───────────────────────────────────────────────────────────

bitflags! {
    /// What a node may do in a link's cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LinkOptions: u8 {
        /// Transmit-capable.
        const TX = 0x01;
        /// Receive-capable.
        const RX = 0x02;
        /// Contention-based: several senders may use the cell with backoff.
        const SHARED = 0x04;
        /// Frames received here resynchronise the clock.
        const TIME_KEEPING = 0x08;
    }
}

impl fmt::Display for LinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(LinkOptions, &str); 4] = [
            (LinkOptions::TX, "Tx"),
            (LinkOptions::RX, "Rx"),
            (LinkOptions::SHARED, "Sh"),
            (LinkOptions::TIME_KEEPING, "Tk"),
        ];
        if self.is_empty() {
            return f.write_str("-");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// Which kinds of frames a link may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkType {
    /// Data and control frames.
    #[default]
    Normal,
    /// Enhanced beacons and regular traffic.
    Advertising,
    /// Enhanced beacons only.
    AdvertisingOnly,
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkType::Normal => "normal",
            LinkType::Advertising => "adv",
            LinkType::AdvertisingOnly => "adv-only",
        })
    }
}

/// Channel offset of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOffset {
    /// Always this logical channel before hopping.
    Fixed(u16),
    /// The engine picks an offset per transmission (multi-channel mode).
    Dynamic,
}

impl fmt::Display for ChannelOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOffset::Fixed(offset) => write!(f, "{offset}"),
            ChannelOffset::Dynamic => f.write_str("dyn"),
        }
    }
}

// ── Link / Slotframe ──────────────────────────────────────────────────────────

/// One cell of a slotframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub timeslot: u16,
    pub channel_offset: ChannelOffset,
    pub options: LinkOptions,
    pub link_type: LinkType,
    /// Neighbor the link is dedicated to, or [`LinkAddress::BROADCAST`].
    pub address: LinkAddress,
}

impl Link {
    /// A [`LinkType::Normal`] link usable with any neighbor.
    pub fn shared(timeslot: u16, channel_offset: ChannelOffset, options: LinkOptions) -> Self {
        Self {
            timeslot,
            channel_offset,
            options,
            link_type: LinkType::Normal,
            address: LinkAddress::BROADCAST,
        }
    }

    pub fn with_type(mut self, link_type: LinkType) -> Self {
        self.link_type = link_type;
        self
    }
}

/// A fixed-length repeating sequence of timeslots and the links placed in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slotframe {
    handle: u16,
    size: u16,
    /// timeslot → link.  Keyed by timeslot so duplicates cannot exist.
    links: BTreeMap<u16, Link>,
}

impl Slotframe {
    fn new(handle: u16, size: u16) -> Self {
        Self {
            handle,
            size,
            links: BTreeMap::new(),
        }
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Number of timeslots in one period.
    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn link(&self, timeslot: u16) -> Option<&Link> {
        self.links.get(&timeslot)
    }

    /// Links in timeslot order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

// ── TschSchedule ──────────────────────────────────────────────────────────────

/// The add/update/remove primitives the TSCH engine exposes to Orchestra.
///
/// Each call is one logical operation: either it is applied completely or it
/// returns an error and nothing changed.
pub trait TschSchedule {
    /// Registers an empty slotframe of `size` timeslots under `handle`.
    fn add_slotframe(&mut self, handle: u16, size: u16) -> Result<(), ScheduleError>;

    /// Unregisters slotframe `handle` together with all of its links and
    /// returns it.
    fn remove_slotframe(&mut self, handle: u16) -> Result<Slotframe, ScheduleError>;

    /// Adds `link` to slotframe `handle`, replacing any link already placed at
    /// the same timeslot.
    fn add_link(&mut self, handle: u16, link: Link) -> Result<(), ScheduleError>;

    /// Removes the link at `timeslot`.  Returns the removed link, or `None` if
    /// the timeslot was empty.
    fn remove_link(
        &mut self,
        handle: u16,
        timeslot: u16,
    ) -> Result<Option<Link>, ScheduleError>;

    fn slotframe(&self, handle: u16) -> Option<&Slotframe>;

    /// Handles of all registered slotframes, ascending.
    fn slotframe_handles(&self) -> Vec<u16>;

    fn link(&self, handle: u16, timeslot: u16) -> Option<&Link> {
        self.slotframe(handle)?.link(timeslot)
    }

    /// Deterministic multi-line listing of the whole schedule.
    fn dump(&self) -> String {
        let mut out = String::new();
        for handle in self.slotframe_handles() {
            let Some(sf) = self.slotframe(handle) else {
                continue;
            };
            let _ = writeln!(
                out,
                "slotframe {} (size {}, {} link(s))",
                sf.handle(),
                sf.size(),
                sf.link_count()
            );
            for link in sf.links() {
                let _ = writeln!(
                    out,
                    "  ts {:>4}  ch {:>3}  {:<9} {:<8} -> {}",
                    link.timeslot,
                    link.channel_offset.to_string(),
                    link.options.to_string(),
                    link.link_type.to_string(),
                    link.address
                );
            }
        }
        out
    }
}

// ── InMemorySchedule ──────────────────────────────────────────────────────────

/// Capacity-bounded link table kept entirely in memory.
///
/// Mirrors the fixed-size slotframe/link pools of an embedded TSCH stack:
/// once `max_links` cells are allocated, only updates of existing cells
/// succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemorySchedule {
    slotframes: BTreeMap<u16, Slotframe>,
    max_slotframes: usize,
    max_links: usize,
}

impl InMemorySchedule {
    /// Creates an empty table with the default capacities.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SLOTFRAMES, DEFAULT_MAX_LINKS)
    }

    pub fn with_capacity(max_slotframes: usize, max_links: usize) -> Self {
        Self {
            slotframes: BTreeMap::new(),
            max_slotframes,
            max_links,
        }
    }

    /// Total number of links over all slotframes.
    pub fn link_count(&self) -> usize {
        self.slotframes.values().map(Slotframe::link_count).sum()
    }

    pub fn max_links(&self) -> usize {
        self.max_links
    }
}

impl Default for InMemorySchedule {
    fn default() -> Self {
        Self::new()
    }
}

impl TschSchedule for InMemorySchedule {
    fn add_slotframe(&mut self, handle: u16, size: u16) -> Result<(), ScheduleError> {
        if self.slotframes.contains_key(&handle) {
            return Err(ScheduleError::DuplicateSlotframe { handle });
        }
        if self.slotframes.len() >= self.max_slotframes {
            return Err(ScheduleError::SlotframeTableFull {
                handle,
                max: self.max_slotframes,
            });
        }
        self.slotframes.insert(handle, Slotframe::new(handle, size));
        debug!(handle, size, "slotframe added");
        Ok(())
    }

    fn remove_slotframe(&mut self, handle: u16) -> Result<Slotframe, ScheduleError> {
        let sf = self
            .slotframes
            .remove(&handle)
            .ok_or(ScheduleError::UnknownSlotframe { handle })?;
        debug!(handle, links = sf.link_count(), "slotframe removed");
        Ok(sf)
    }

    fn add_link(&mut self, handle: u16, link: Link) -> Result<(), ScheduleError> {
        // Capacity is checked before borrowing the slotframe mutably.
        let total = self.link_count();
        let max_links = self.max_links;

        let sf = self
            .slotframes
            .get_mut(&handle)
            .ok_or(ScheduleError::UnknownSlotframe { handle })?;

        if link.timeslot >= sf.size {
            return Err(ScheduleError::TimeslotOutOfRange {
                handle,
                timeslot: link.timeslot,
                size: sf.size,
            });
        }

        let timeslot = link.timeslot;
        if !sf.links.contains_key(&timeslot) && total >= max_links {
            return Err(ScheduleError::LinkTableFull {
                handle,
                timeslot,
                max: max_links,
            });
        }

        debug!(
            handle,
            timeslot,
            channel_offset = %link.channel_offset,
            options = %link.options,
            link_type = %link.link_type,
            address = %link.address,
            "link set"
        );
        sf.links.insert(timeslot, link);
        Ok(())
    }

    fn remove_link(
        &mut self,
        handle: u16,
        timeslot: u16,
    ) -> Result<Option<Link>, ScheduleError> {
        let sf = self
            .slotframes
            .get_mut(&handle)
            .ok_or(ScheduleError::UnknownSlotframe { handle })?;
        let removed = sf.links.remove(&timeslot);
        if removed.is_some() {
            debug!(handle, timeslot, "link removed");
        }
        Ok(removed)
    }

    fn slotframe(&self, handle: u16) -> Option<&Slotframe> {
        self.slotframes.get(&handle)
    }

    fn slotframe_handles(&self) -> Vec<u16> {
        self.slotframes.keys().copied().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
