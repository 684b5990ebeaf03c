/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Errors raised by the TSCH link table.
//!
//! The table either applies a mutation completely or refuses it and leaves
//! its state untouched, so every variant describes a request that had no
//! effect.  None of them is retried inside the scheduler: capacity exhaustion
//! is surfaced to whoever delivered the topology event.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// No room for another slotframe.
    #[error("slotframe table full ({max} slotframes), cannot add handle {handle}")]
    SlotframeTableFull { handle: u16, max: usize },

    /// A slotframe with this handle is already registered.
    #[error("slotframe {handle} already exists")]
    DuplicateSlotframe { handle: u16 },

    #[error("slotframe {handle} does not exist")]
    UnknownSlotframe { handle: u16 },

    /// The requested timeslot is not inside the slotframe's period.
    #[error("timeslot {timeslot} is outside slotframe {handle} of size {size}")]
    TimeslotOutOfRange { handle: u16, timeslot: u16, size: u16 },

    /// Adding a link at a free timeslot would exceed the link table capacity.
    /// Updating an occupied timeslot never produces this error.
    #[error("link table full ({max} links), cannot add slotframe {handle} timeslot {timeslot}")]
    LinkTableFull { handle: u16, timeslot: u16, max: usize },
}
