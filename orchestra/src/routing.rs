/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Routing-table seam (storing-mode RPL).
//!
//! Orchestra never builds routes.  It only asks whether a neighbor is a
//! next hop for some downward route, i.e. a child.

use std::collections::BTreeSet;

use crate::event::TopologyEvent;
use crate::linkaddr::LinkAddress;

/// Read access to the node's downward routes.
pub trait RoutingTable {
    /// `true` if `addr` is the next hop of at least one downward route.
    fn is_known_child(&self, addr: &LinkAddress) -> bool;

    /// All current children, in address order.
    fn children(&self) -> Vec<LinkAddress>;

    /// Lets a mirrored table follow child events before Orchestra sees them.
    /// Tables owned by a real routing layer leave this as a no-op.
    fn observe(&mut self, _event: &TopologyEvent) {}
}

/// Children kept in a set; mirrors child events through [`RoutingTable::observe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryRoutes {
    children: BTreeSet<LinkAddress>,
}

impl InMemoryRoutes {
    pub const fn new() -> Self {
        Self {
            children: BTreeSet::new(),
        }
    }

    /// Returns `true` if `addr` was not already a child.
    pub fn insert(&mut self, addr: LinkAddress) -> bool {
        self.children.insert(addr)
    }

    pub fn remove(&mut self, addr: &LinkAddress) -> bool {
        self.children.remove(addr)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl FromIterator<LinkAddress> for InMemoryRoutes {
    fn from_iter<I: IntoIterator<Item = LinkAddress>>(iter: I) -> Self {
        Self {
            children: iter.into_iter().collect(),
        }
    }
}

impl RoutingTable for InMemoryRoutes {
    fn is_known_child(&self, addr: &LinkAddress) -> bool {
        self.children.contains(addr)
    }

    fn children(&self) -> Vec<LinkAddress> {
        self.children.iter().copied().collect()
    }

    fn observe(&mut self, event: &TopologyEvent) {
        match event {
            TopologyEvent::ChildAdded { addr } => {
                self.insert(*addr);
            }
            TopologyEvent::ChildRemoved { addr } => {
                self.remove(addr);
            }
            TopologyEvent::TimeSourceChanged { .. } => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_tracks_child_events() {
        let child = LinkAddress::from_node_id(4);
        let mut routes = InMemoryRoutes::new();

        routes.observe(&TopologyEvent::ChildAdded { addr: child });
        assert!(routes.is_known_child(&child));
        assert_eq!(routes.children(), vec![child]);

        routes.observe(&TopologyEvent::ChildRemoved { addr: child });
        assert!(!routes.is_known_child(&child));
        assert!(routes.is_empty());
    }

    #[test]
    fn time_source_events_do_not_touch_children() {
        let mut routes: InMemoryRoutes = [LinkAddress::from_node_id(2)].into_iter().collect();
        routes.observe(&TopologyEvent::TimeSourceChanged {
            old: None,
            new: Some(LinkAddress::from_node_id(1)),
        });
        assert_eq!(routes.len(), 1);
    }
}
