/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Deterministic multi-node schedule checker.
//!
//! Builds a routing tree, runs one [`Orchestra`] per node and delivers the
//! topology events a storing-mode routing layer would produce.  No slots are
//! executed: [`Simulation::check_links`] only verifies that for every
//! parent/child pair the slot chosen by the sender is a Tx slot for the sender
//! and an Rx slot for the receiver, on the same channel offset.
//!
//! Topology YAML:
//! ```yaml
//! orchestra:                 # optional, same fields as a node configuration
//!   rules: [unicast_per_neighbor_rpl_storing, default_common]
//!   unicast_period: 7
//! nodes:
//!   - address: "#1"          # root
//!   - address: "#2"
//!     parent: "#1"
//! moves:                     # optional parent switches, applied in order
//!   - node: "#2"
//!     new_parent: "#3"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use orchestra::config::OrchestraSettings;
use orchestra::event::TopologyEvent;
use orchestra::linkaddr::LinkAddress;
use orchestra::packet::Packet;
use orchestra::routing::{InMemoryRoutes, RoutingTable};
use orchestra::schedule::{InMemorySchedule, LinkOptions, TschSchedule};
use orchestra::{Orchestra, OrchestraError, PacketSelection};

// ── Topology file ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub address: LinkAddress,
    /// Absent for the root.
    #[serde(default)]
    pub parent: Option<LinkAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Move {
    pub node: LinkAddress,
    pub new_parent: LinkAddress,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub orchestra: OrchestraSettings,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub moves: Vec<Move>,
}

impl Topology {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading topology from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open topology file: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid topology file: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let topology: Self = serde_yaml::from_str(content)
            .context("Failed to parse topology YAML")?;
        topology.orchestra.validate()?;
        Ok(topology)
    }
}

// ── Link verification results ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Child to parent.
    Up,
    /// Parent to child.
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Reachable,
    /// No rule of the sender claimed the packet.
    Unscheduled,
    /// The sender has no Tx link at the selected cell.
    MissingTx,
    /// The receiver does not listen at the selected cell.
    MissingRx,
    ChannelMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCheck {
    pub from: LinkAddress,
    pub to: LinkAddress,
    pub direction: Direction,
    pub selection: Option<PacketSelection>,
    pub verdict: Verdict,
}

impl fmt::Display for LinkCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::Up => "up  ",
            Direction::Down => "down",
        };
        write!(
            f,
            "{arrow} {} -> {}: {:?}",
            self.from, self.to, self.verdict
        )?;
        if let Some(sel) = &self.selection {
            write!(
                f,
                " (rule '{}', slotframe {}, ts {})",
                sel.rule_name, sel.slotframe, sel.timeslot
            )?;
        }
        Ok(())
    }
}

// ── Simulation ────────────────────────────────────────────────────────────────

struct SimNode {
    orchestra: Orchestra<InMemorySchedule>,
    routes: InMemoryRoutes,
    parent: Option<LinkAddress>,
}

impl SimNode {
    fn deliver(&mut self, event: TopologyEvent) -> Result<(), OrchestraError> {
        self.routes.observe(&event);
        self.orchestra.handle_event(&event, &self.routes)
    }
}

/// Every node of the tree with its dispatcher and mirrored routing table.
pub struct Simulation {
    nodes: BTreeMap<LinkAddress, SimNode>,
}

impl Simulation {
    /// Validates the tree, initializes every node and lets each child join
    /// its parent.  `topology.moves` are not applied.
    pub fn build(topology: &Topology) -> Result<Self> {
        let parents = validate_tree(&topology.nodes)?;

        let mut nodes = BTreeMap::new();
        for spec in &topology.nodes {
            let mut orchestra = topology.orchestra.build_orchestra(spec.address);
            orchestra
                .init()
                .with_context(|| format!("node {}: init failed", spec.address))?;
            nodes.insert(
                spec.address,
                SimNode {
                    orchestra,
                    routes: InMemoryRoutes::new(),
                    parent: None,
                },
            );
        }

        let mut sim = Self { nodes };
        for spec in &topology.nodes {
            if let Some(parent) = parents.get(&spec.address).copied().flatten() {
                sim.attach(spec.address, parent)?;
            }
        }
        info!(nodes = sim.nodes.len(), "simulation ready");
        Ok(sim)
    }

    /// Moves `node` under `new_parent`: the node switches time source, the
    /// old parent loses the child, the new parent gains it.
    pub fn reparent(&mut self, node: LinkAddress, new_parent: LinkAddress) -> Result<()> {
        if !self.nodes.contains_key(&new_parent) {
            bail!("unknown new parent {new_parent} for node {node}");
        }
        let old_parent = self
            .nodes
            .get(&node)
            .with_context(|| format!("unknown node {node}"))?
            .parent;
        if old_parent == Some(new_parent) {
            debug!(%node, "reparent to current parent ignored");
            return Ok(());
        }
        if self.is_ancestor_or_self(node, new_parent) {
            bail!("moving {node} under {new_parent} would create a cycle");
        }

        info!(%node, old = ?old_parent.map(|a| a.to_string()), new = %new_parent, "reparent");
        self.deliver(
            node,
            TopologyEvent::TimeSourceChanged {
                old: old_parent,
                new: Some(new_parent),
            },
        )?;
        if let Some(old) = old_parent {
            self.deliver(old, TopologyEvent::ChildRemoved { addr: node })?;
        }
        self.deliver(new_parent, TopologyEvent::ChildAdded { addr: node })?;
        self.set_parent(node, Some(new_parent));
        Ok(())
    }

    /// Applies every move of `topology`, in order.
    pub fn apply_moves(&mut self, moves: &[Move]) -> Result<()> {
        for m in moves {
            self.reparent(m.node, m.new_parent)?;
        }
        Ok(())
    }

    /// Checks both directions of every parent/child pair, in address order.
    pub fn check_links(&self) -> Vec<LinkCheck> {
        let mut checks = Vec::new();
        for (child, node) in &self.nodes {
            if let Some(parent) = node.parent {
                checks.push(self.check_pair(*child, parent, Direction::Up));
                checks.push(self.check_pair(parent, *child, Direction::Down));
            }
        }
        checks
    }

    pub fn addresses(&self) -> impl Iterator<Item = &LinkAddress> {
        self.nodes.keys()
    }

    pub fn orchestra(&self, addr: &LinkAddress) -> Option<&Orchestra<InMemorySchedule>> {
        self.nodes.get(addr).map(|n| &n.orchestra)
    }

    pub fn parent_of(&self, addr: &LinkAddress) -> Option<LinkAddress> {
        self.nodes.get(addr).and_then(|n| n.parent)
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn attach(&mut self, child: LinkAddress, parent: LinkAddress) -> Result<()> {
        self.deliver(
            child,
            TopologyEvent::TimeSourceChanged {
                old: None,
                new: Some(parent),
            },
        )?;
        self.deliver(parent, TopologyEvent::ChildAdded { addr: child })?;
        self.set_parent(child, Some(parent));
        Ok(())
    }

    fn deliver(&mut self, target: LinkAddress, event: TopologyEvent) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&target)
            .with_context(|| format!("unknown node {target}"))?;
        debug!(node = %target, %event, "deliver");
        node.deliver(event.clone())
            .with_context(|| format!("node {target}: {event}"))
    }

    fn set_parent(&mut self, node: LinkAddress, parent: Option<LinkAddress>) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = parent;
        }
    }

    /// `true` if `node` is `candidate` or one of its ancestors.
    fn is_ancestor_or_self(&self, node: LinkAddress, candidate: LinkAddress) -> bool {
        let mut cursor = Some(candidate);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == node {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return true;
            }
            cursor = self.parent_of(&current);
        }
        false
    }

    fn check_pair(&self, from: LinkAddress, to: LinkAddress, direction: Direction) -> LinkCheck {
        let verdict_for = |selection: Option<PacketSelection>, verdict| LinkCheck {
            from,
            to,
            direction,
            selection,
            verdict,
        };
        let (Some(sender), Some(receiver)) = (self.nodes.get(&from), self.nodes.get(&to)) else {
            return verdict_for(None, Verdict::Unscheduled);
        };

        let packet = Packet::unicast_data(to);
        let Some(sel) = sender.orchestra.select_packet(&packet, &sender.routes) else {
            return verdict_for(None, Verdict::Unscheduled);
        };

        let tx = sender
            .orchestra
            .schedule()
            .link(sel.slotframe, sel.timeslot);
        let rx = receiver
            .orchestra
            .schedule()
            .link(sel.slotframe, sel.timeslot);
        let verdict = match (tx, rx) {
            (Some(tx), _) if !tx.options.contains(LinkOptions::TX) => Verdict::MissingTx,
            (None, _) => Verdict::MissingTx,
            (_, Some(rx)) if !rx.options.contains(LinkOptions::RX) => Verdict::MissingRx,
            (_, None) => Verdict::MissingRx,
            (Some(tx), Some(rx)) if tx.channel_offset != rx.channel_offset => {
                Verdict::ChannelMismatch
            }
            _ => Verdict::Reachable,
        };
        debug!(%from, %to, ?verdict, "link checked");
        verdict_for(Some(sel), verdict)
    }
}

/// Checks for duplicate nodes, unknown or self parents and cycles, and
/// returns each node's parent.
fn validate_tree(nodes: &[NodeSpec]) -> Result<BTreeMap<LinkAddress, Option<LinkAddress>>> {
    let mut parents = BTreeMap::new();
    for spec in nodes {
        if parents.insert(spec.address, spec.parent).is_some() {
            bail!("node {} is listed more than once", spec.address);
        }
    }
    for spec in nodes {
        if let Some(parent) = spec.parent {
            if parent == spec.address {
                bail!("node {} is its own parent", spec.address);
            }
            if !parents.contains_key(&parent) {
                bail!("node {} has unknown parent {parent}", spec.address);
            }
        }
    }
    for spec in nodes {
        let mut seen = HashSet::new();
        let mut cursor = Some(spec.address);
        while let Some(current) = cursor {
            if !seen.insert(current) {
                bail!("node {} is part of a parent cycle", spec.address);
            }
            cursor = parents.get(&current).copied().flatten();
        }
    }
    Ok(parents)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: u16) -> LinkAddress {
        LinkAddress::from_node_id(id)
    }

    const TREE: &str = r##"
nodes:
  - address: "#1"
  - address: "#2"
    parent: "#1"
  - address: "#3"
    parent: "#1"
  - address: "#4"
    parent: "#2"
  - address: "#5"
    parent: "#2"
  - address: "#9"
    parent: "#3"
"##;

    const MSF_RULES: &str = "[eb_per_time_source, unicast_msf, default_common]";
    const STORING_RULES: &str = "[unicast_per_neighbor_rpl_storing, default_common]";

    const MOVES: &str = r##"moves:
  - node: "#9"
    new_parent: "#2"
  - node: "#9"
    new_parent: "#5"
"##;

    fn with_rules(rules: &str) -> String {
        format!("orchestra:\n  rules: {rules}\n  unicast_period: 7\n{TREE}")
    }

    fn topology(rules: &str) -> Topology {
        Topology::from_yaml_str(&with_rules(rules)).unwrap()
    }

    fn has_link(sim: &Simulation, node: u16, timeslot: u16) -> bool {
        sim.orchestra(&addr(node))
            .unwrap()
            .schedule()
            .link(0, timeslot)
            .is_some()
    }

    fn all_reachable(checks: &[LinkCheck]) -> bool {
        checks.iter().all(|c| c.verdict == Verdict::Reachable)
    }

    fn claimed_by(check: &LinkCheck) -> Option<&'static str> {
        check.selection.map(|s| s.rule_name)
    }

    #[test]
    fn msf_tree_is_fully_reachable() {
        let sim = Simulation::build(&topology(MSF_RULES)).unwrap();

        let checks = sim.check_links();
        assert_eq!(checks.len(), 10);
        assert!(all_reachable(&checks), "{checks:#?}");
        for check in &checks {
            assert_eq!(claimed_by(check), Some("unicast MSF"));
        }
    }

    #[test]
    fn storing_tree_is_fully_reachable() {
        let sim = Simulation::build(&topology(STORING_RULES)).unwrap();

        let checks = sim.check_links();
        assert!(all_reachable(&checks), "{checks:#?}");
        for check in &checks {
            assert_eq!(claimed_by(check), Some("unicast per neighbor storing"));
        }
    }

    #[test]
    fn reparent_moves_cells_with_the_child() {
        let mut sim = Simulation::build(&topology(STORING_RULES)).unwrap();

        // #4 hashes to slot 4; #2's cell for it must go away.
        assert!(has_link(&sim, 2, 4));
        sim.reparent(addr(4), addr(3)).unwrap();

        assert_eq!(sim.parent_of(&addr(4)), Some(addr(3)));
        assert!(!has_link(&sim, 2, 4));
        assert!(has_link(&sim, 3, 4));
        assert!(all_reachable(&sim.check_links()));
    }

    #[test]
    fn reparent_under_descendant_is_rejected() {
        let mut sim = Simulation::build(&topology("[unicast_msf]")).unwrap();
        let err = sim.reparent(addr(2), addr(4)).unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
        assert_eq!(sim.parent_of(&addr(2)), Some(addr(1)));
    }

    #[test]
    fn moves_from_topology_are_applied_in_order() {
        let yaml = format!("{}{MOVES}", with_rules("[unicast_msf, default_common]"));
        let topo = Topology::from_yaml_str(&yaml).unwrap();
        let mut sim = Simulation::build(&topo).unwrap();
        sim.apply_moves(&topo.moves).unwrap();

        assert_eq!(sim.parent_of(&addr(9)), Some(addr(5)));
        assert_eq!(
            sim.orchestra(&addr(9)).unwrap().time_source(),
            Some(&addr(5))
        );
        assert!(all_reachable(&sim.check_links()));
    }

    #[test]
    fn missing_unicast_rule_leaves_pairs_unscheduled() {
        let sim = Simulation::build(&topology("[eb_per_time_source]")).unwrap();
        for check in sim.check_links() {
            assert_eq!(check.verdict, Verdict::Unscheduled);
            assert!(check.selection.is_none());
        }
    }

    #[test]
    fn invalid_trees_are_rejected() {
        let duplicate = "nodes:\n  - address: \"#1\"\n  - address: \"#1\"\n";
        let unknown = "nodes:\n  - address: \"#1\"\n    parent: \"#7\"\n";
        let own = "nodes:\n  - address: \"#1\"\n    parent: \"#1\"\n";
        let cycle = r##"
nodes:
  - address: "#1"
    parent: "#2"
  - address: "#2"
    parent: "#1"
"##;
        let cases = [
            ("duplicate", duplicate),
            ("unknown parent", unknown),
            ("own parent", own),
            ("cycle", cycle),
        ];
        for (name, yaml) in cases {
            let topo = Topology::from_yaml_str(yaml).unwrap();
            assert!(Simulation::build(&topo).is_err(), "{name} accepted");
        }
    }

    #[test]
    fn load_from_file_reads_topology() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(TREE.as_bytes()).unwrap();

        let topo = Topology::load_from_file(f.path()).unwrap();
        assert_eq!(topo.nodes.len(), 6);
        assert_eq!(topo.orchestra, OrchestraSettings::default());
        assert!(topo.moves.is_empty());
    }
}
