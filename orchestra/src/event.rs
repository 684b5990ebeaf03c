/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Topology events delivered by the routing/MAC layer.

use std::fmt;

use crate::linkaddr::LinkAddress;

/// One of the three notifications Orchestra reacts to.
///
/// Events are consumed one at a time, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// The time source (RPL preferred parent) changed.  Either side may be
    /// `None`: initial acquisition has no `old`, losing the parent has no
    /// `new`.
    TimeSourceChanged {
        old: Option<LinkAddress>,
        new: Option<LinkAddress>,
    },

    /// A downward route through `addr` now exists.
    ChildAdded { addr: LinkAddress },

    /// The last downward route through `addr` is gone.
    ChildRemoved { addr: LinkAddress },
}

impl fmt::Display for TopologyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(addr: &Option<LinkAddress>) -> String {
            addr.map_or_else(|| "none".to_string(), |a| a.to_string())
        }
        match self {
            TopologyEvent::TimeSourceChanged { old, new } => {
                write!(f, "time source {} -> {}", opt(old), opt(new))
            }
            TopologyEvent::ChildAdded { addr } => write!(f, "child added {addr}"),
            TopologyEvent::ChildRemoved { addr } => write!(f, "child removed {addr}"),
        }
    }
}
