/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The Orchestra rule dispatcher.
//!
//! [`Orchestra`] owns the ordered rule list, the link table and the current
//! time source.  Order is priority: for every outgoing packet the first rule
//! that claims it decides the slotframe and timeslot.  Topology events are
//! forwarded to every rule, in the same order.
//!
//! Rules never see each other.  Shared state is handed to each rule per call;
//! nothing is global.
//!
//! # Example
//! ```rust
//! use orchestra::dispatcher::Orchestra;
//! use orchestra::hash::LinkAddrHash;
//! use orchestra::linkaddr::LinkAddress;
//! use orchestra::packet::Packet;
//! use orchestra::routing::InMemoryRoutes;
//! use orchestra::rule::{DefaultCommon, Rule, UnicastMsf};
//! use orchestra::schedule::InMemorySchedule;
//!
//! let rules: Vec<Box<dyn Rule>> = vec![
//!     Box::new(UnicastMsf::new(7, false)),
//!     Box::new(DefaultCommon::new(31, false)),
//! ];
//! let mut orchestra = Orchestra::new(
//!     LinkAddress::from_node_id(3),
//!     LinkAddrHash::LastByte,
//!     rules,
//!     InMemorySchedule::new(),
//! );
//! orchestra.init().unwrap();
//!
//! let routes = InMemoryRoutes::new();
//! let sel = orchestra
//!     .select_packet(&Packet::unicast_data(LinkAddress::from_node_id(5)), &routes)
//!     .unwrap();
//! assert_eq!((sel.slotframe, sel.timeslot), (0, 5));
//! ```

pub mod error;

pub use error::OrchestraError;

use tracing::{debug, error, info};

use crate::event::TopologyEvent;
use crate::hash::LinkAddrHash;
use crate::linkaddr::LinkAddress;
use crate::packet::Packet;
use crate::routing::{InMemoryRoutes, RoutingTable};
use crate::rule::{NodeView, Rule, RuleContext};
use crate::schedule::{ScheduleError, TschSchedule};

/// Result of a packet-ready query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSelection {
    /// Position of the claiming rule in the priority list.
    pub rule_index: usize,
    pub rule_name: &'static str,
    pub slotframe: u16,
    pub timeslot: u16,
}

/// Rule dispatcher for one node.
pub struct Orchestra<S: TschSchedule> {
    node_addr: LinkAddress,
    hash: LinkAddrHash,
    rules: Vec<Box<dyn Rule>>,
    schedule: S,
    /// Current time source.  Updated before rules see a change so they can
    /// consult the new parent.
    time_source: Option<LinkAddress>,
    /// Next free slotframe handle; equals the number of initialized rules.
    next_handle: u16,
    initialized: bool,
}

impl<S: TschSchedule> Orchestra<S> {
    /// `rules` is in priority order: index 0 is asked first.
    pub fn new(
        node_addr: LinkAddress,
        hash: LinkAddrHash,
        rules: Vec<Box<dyn Rule>>,
        schedule: S,
    ) -> Self {
        Self {
            node_addr,
            hash,
            rules,
            schedule,
            time_source: None,
            next_handle: 0,
            initialized: false,
        }
    }

    // ── Startup ───────────────────────────────────────────────────────────────

    /// Gives each rule its own slotframe handle, in list order, and lets it
    /// install its fixed links.  Must be called exactly once, before any
    /// event is delivered.
    ///
    /// # Errors
    /// [`OrchestraError::Rule`] if a rule cannot create its slotframe or
    /// links.  The rules after it are not initialized, and the slotframes of
    /// the rules before it are removed again, so the link table is left as
    /// `init` found it and the call may be retried.
    pub fn init(&mut self) -> Result<(), OrchestraError> {
        if self.initialized {
            return Err(OrchestraError::AlreadyInitialized);
        }
        if self.rules.len() > usize::from(u16::MAX) {
            return Err(OrchestraError::TooManyRules {
                count: self.rules.len(),
            });
        }

        info!(
            node = %self.node_addr,
            rule_count = self.rules.len(),
            "=== Orchestra init ==="
        );

        // No children can be known yet.
        let routes = InMemoryRoutes::new();
        let mut failure = None;
        for rule in self.rules.iter_mut() {
            let handle = self.next_handle;
            info!(rule = rule.name(), handle, "initializing rule");

            let mut ctx = RuleContext {
                node: NodeView {
                    node_addr: &self.node_addr,
                    hash: self.hash,
                    time_source: self.time_source.as_ref(),
                    routes: &routes,
                },
                schedule: &mut self.schedule,
            };
            if let Err(source) = rule.init(handle, &mut ctx) {
                error!(rule = rule.name(), handle, error = %source, "rule init failed");
                failure = Some(OrchestraError::Rule {
                    rule: rule.name(),
                    source,
                });
                break;
            }
            self.next_handle += 1;
        }

        if let Some(err) = failure {
            self.discard_slotframes();
            return Err(err);
        }
        self.initialized = true;
        Ok(())
    }

    // ── Packet selection ──────────────────────────────────────────────────────

    /// Asks the rules, in priority order, where `packet` should go.  The first
    /// claim wins.  `None` means no rule claimed it and the TSCH engine
    /// applies its own fallback.
    pub fn select_packet(
        &self,
        packet: &Packet,
        routes: &dyn RoutingTable,
    ) -> Option<PacketSelection> {
        if !self.initialized {
            debug!("select_packet before init, no rule consulted");
            return None;
        }
        let node = self.view(routes);

        let selection = self
            .rules
            .iter()
            .enumerate()
            .find_map(|(rule_index, rule)| {
                rule.select_packet(packet, &node).map(|slot| PacketSelection {
                    rule_index,
                    rule_name: rule.name(),
                    slotframe: slot.slotframe,
                    timeslot: slot.timeslot,
                })
            });

        match &selection {
            Some(sel) => debug!(
                receiver = ?packet.receiver.map(|a| a.to_string()),
                frame_type = ?packet.frame_type,
                rule = sel.rule_name,
                slotframe = sel.slotframe,
                timeslot = sel.timeslot,
                "packet scheduled"
            ),
            None => debug!(
                receiver = ?packet.receiver.map(|a| a.to_string()),
                frame_type = ?packet.frame_type,
                "no rule claimed packet"
            ),
        }
        selection
    }

    // ── Topology events ───────────────────────────────────────────────────────

    /// Routes one topology event to the matching hook.
    pub fn handle_event(
        &mut self,
        event: &TopologyEvent,
        routes: &dyn RoutingTable,
    ) -> Result<(), OrchestraError> {
        match event {
            TopologyEvent::TimeSourceChanged { old, new } => {
                self.new_time_source(old.as_ref(), new.as_ref(), routes)
            }
            TopologyEvent::ChildAdded { addr } => self.child_added(addr, routes),
            TopologyEvent::ChildRemoved { addr } => self.child_removed(addr, routes),
        }
    }

    /// The time source (RPL parent) changed from `old` to `new`.
    ///
    /// Every rule is notified even if an earlier one fails; the first failure
    /// is returned.  A repeated report of the same time source reaches no rule.
    pub fn new_time_source(
        &mut self,
        old: Option<&LinkAddress>,
        new: Option<&LinkAddress>,
        routes: &dyn RoutingTable,
    ) -> Result<(), OrchestraError> {
        self.ensure_initialized()?;
        self.time_source = new.copied();
        if old == new {
            debug!(time_source = ?new.map(|a| a.to_string()), "time source unchanged");
            return Ok(());
        }
        info!(
            old = ?old.map(|a| a.to_string()),
            new = ?new.map(|a| a.to_string()),
            "time source changed"
        );
        self.for_each_rule(routes, |rule, ctx| rule.new_time_source(old, new, ctx))
    }

    /// A downward route through `addr` appeared.  Only rules that handle
    /// children are notified.
    pub fn child_added(
        &mut self,
        addr: &LinkAddress,
        routes: &dyn RoutingTable,
    ) -> Result<(), OrchestraError> {
        self.ensure_initialized()?;
        info!(child = %addr, "child added");
        self.for_each_rule(routes, |rule, ctx| {
            if rule.handles_children() {
                rule.child_added(addr, ctx)
            } else {
                Ok(())
            }
        })
    }

    /// The last downward route through `addr` disappeared.
    pub fn child_removed(
        &mut self,
        addr: &LinkAddress,
        routes: &dyn RoutingTable,
    ) -> Result<(), OrchestraError> {
        self.ensure_initialized()?;
        info!(child = %addr, "child removed");
        self.for_each_rule(routes, |rule, ctx| {
            if rule.handles_children() {
                rule.child_removed(addr, ctx)
            } else {
                Ok(())
            }
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn node_addr(&self) -> &LinkAddress {
        &self.node_addr
    }

    pub fn time_source(&self) -> Option<&LinkAddress> {
        self.time_source.as_ref()
    }

    pub fn schedule(&self) -> &S {
        &self.schedule
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Rule names in priority order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn ensure_initialized(&self) -> Result<(), OrchestraError> {
        if self.initialized {
            Ok(())
        } else {
            Err(OrchestraError::NotInitialized)
        }
    }

    /// Removes the slotframes of the rules initialized so far.
    fn discard_slotframes(&mut self) {
        for handle in 0..self.next_handle {
            // Rules with a zero period never created theirs.
            if self.schedule.remove_slotframe(handle).is_ok() {
                debug!(handle, "slotframe discarded after failed init");
            }
        }
        self.next_handle = 0;
    }

    fn view<'a>(&'a self, routes: &'a dyn RoutingTable) -> NodeView<'a> {
        NodeView {
            node_addr: &self.node_addr,
            hash: self.hash,
            time_source: self.time_source.as_ref(),
            routes,
        }
    }

    /// Runs `f` for every rule in priority order, keeping the first error.
    fn for_each_rule<F>(
        &mut self,
        routes: &dyn RoutingTable,
        mut f: F,
    ) -> Result<(), OrchestraError>
    where
        F: FnMut(&mut dyn Rule, &mut RuleContext<'_>) -> Result<(), ScheduleError>,
    {
        let mut first_error = None;

        for rule in self.rules.iter_mut() {
            let mut ctx = RuleContext {
                node: NodeView {
                    node_addr: &self.node_addr,
                    hash: self.hash,
                    time_source: self.time_source.as_ref(),
                    routes,
                },
                schedule: &mut self.schedule,
            };
            if let Err(source) = f(rule.as_mut(), &mut ctx) {
                error!(rule = rule.name(), error = %source, "rule rejected topology update");
                first_error.get_or_insert(OrchestraError::Rule {
                    rule: rule.name(),
                    source,
                });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
