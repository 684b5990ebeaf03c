/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-node Orchestra configuration.
//!
//! The expected YAML structure is:
//! ```yaml
//! node_address: "00:12:4b:00:00:00:00:03"
//! linkaddr_hash: last_byte
//! rules: [eb_per_time_source, unicast_msf, default_common]
//! unicast_period: 17
//! common_shared_period: 31
//! ebsf_period: 397
//! multiple_channels: false
//! schedule:
//!   max_slotframes: 4
//!   max_links: 64
//! ```
//!
//! Only `node_address` is mandatory.  The remaining fields form
//! [`OrchestraSettings`], which the simulator reuses for a whole network.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dispatcher::Orchestra;
use crate::hash::LinkAddrHash;
use crate::linkaddr::LinkAddress;
use crate::rule::{
    Rule, RuleKind, RuleParams, DEFAULT_COMMON_SHARED_PERIOD, DEFAULT_EBSF_PERIOD,
    DEFAULT_UNICAST_PERIOD,
};
use crate::schedule::{InMemorySchedule, DEFAULT_MAX_LINKS, DEFAULT_MAX_SLOTFRAMES};

// ── Private YAML deserialization types ────────────────────────────────────────

/// Maps directly onto the file layout; callers use [`OrchestraConfig`].
#[derive(Debug, Deserialize)]
struct NodeConfigFile {
    node_address: LinkAddress,
    #[serde(flatten)]
    settings: OrchestraSettings,
}

fn default_rules() -> Vec<RuleKind> {
    vec![
        RuleKind::EbPerTimeSource,
        RuleKind::UnicastMsf,
        RuleKind::DefaultCommon,
    ]
}

fn default_unicast_period() -> u16 {
    DEFAULT_UNICAST_PERIOD
}

fn default_common_shared_period() -> u16 {
    DEFAULT_COMMON_SHARED_PERIOD
}

fn default_ebsf_period() -> u16 {
    DEFAULT_EBSF_PERIOD
}

fn default_max_slotframes() -> usize {
    DEFAULT_MAX_SLOTFRAMES
}

fn default_max_links() -> usize {
    DEFAULT_MAX_LINKS
}

// ── Public data structures ────────────────────────────────────────────────────

/// Capacity of the in-memory link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLimits {
    #[serde(default = "default_max_slotframes")]
    pub max_slotframes: usize,
    /// Total links across all slotframes.
    #[serde(default = "default_max_links")]
    pub max_links: usize,
}

impl Default for ScheduleLimits {
    fn default() -> Self {
        Self {
            max_slotframes: DEFAULT_MAX_SLOTFRAMES,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

/// Everything about a node's Orchestra setup except its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestraSettings {
    #[serde(default)]
    pub linkaddr_hash: LinkAddrHash,
    /// Rules in priority order.
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleKind>,
    #[serde(default = "default_unicast_period")]
    pub unicast_period: u16,
    #[serde(default = "default_common_shared_period")]
    pub common_shared_period: u16,
    #[serde(default = "default_ebsf_period")]
    pub ebsf_period: u16,
    #[serde(default)]
    pub multiple_channels: bool,
    #[serde(default)]
    pub schedule: ScheduleLimits,
}

impl Default for OrchestraSettings {
    fn default() -> Self {
        Self {
            linkaddr_hash: LinkAddrHash::default(),
            rules: default_rules(),
            unicast_period: DEFAULT_UNICAST_PERIOD,
            common_shared_period: DEFAULT_COMMON_SHARED_PERIOD,
            ebsf_period: DEFAULT_EBSF_PERIOD,
            multiple_channels: false,
            schedule: ScheduleLimits::default(),
        }
    }
}

impl OrchestraSettings {
    /// Rejects an empty rule list and a rule named twice.
    ///
    /// # Errors
    /// Describes the first offending entry.
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            bail!("rule list is empty, at least one rule is required");
        }
        let mut seen = HashSet::new();
        for kind in &self.rules {
            if !seen.insert(*kind) {
                bail!("rule '{kind}' is listed more than once");
            }
        }
        Ok(())
    }

    pub fn rule_params(&self) -> RuleParams {
        RuleParams {
            unicast_period: self.unicast_period,
            common_shared_period: self.common_shared_period,
            ebsf_period: self.ebsf_period,
            multiple_channels: self.multiple_channels,
            eb_rule_active: self.rules.contains(&RuleKind::EbPerTimeSource),
        }
    }

    /// Fresh rule instances, in priority order.
    pub fn build_rules(&self) -> Vec<Box<dyn Rule>> {
        let params = self.rule_params();
        self.rules.iter().map(|kind| kind.build(&params)).collect()
    }

    pub fn build_schedule(&self) -> InMemorySchedule {
        InMemorySchedule::with_capacity(self.schedule.max_slotframes, self.schedule.max_links)
    }

    /// An uninitialized dispatcher for `node_address`.
    pub fn build_orchestra(&self, node_address: LinkAddress) -> Orchestra<InMemorySchedule> {
        Orchestra::new(
            node_address,
            self.linkaddr_hash,
            self.build_rules(),
            self.build_schedule(),
        )
    }
}

/// A loaded, validated node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestraConfig {
    pub node_address: LinkAddress,
    pub settings: OrchestraSettings,
}

impl OrchestraConfig {
    /// Parses and validates `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is structurally
    /// invalid, or validation fails.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading orchestra configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: NodeConfigFile =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        file.settings.validate()?;

        let config = Self {
            node_address: file.node_address,
            settings: file.settings,
        };
        config.log_summary();
        Ok(config)
    }

    pub fn build_orchestra(&self) -> Orchestra<InMemorySchedule> {
        self.settings.build_orchestra(self.node_address)
    }

    fn log_summary(&self) {
        let s = &self.settings;
        info!(
            node = %self.node_address,
            rules = s.rules.len(),
            "Loaded orchestra configuration"
        );
        for (priority, kind) in s.rules.iter().enumerate() {
            debug!("  Rule {priority}: {kind}");
        }
        debug!(
            "  Periods: unicast {} | common {} | EB {} | multi-channel {}",
            s.unicast_period, s.common_shared_period, s.ebsf_period, s.multiple_channels
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::schedule::TschSchedule;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
node_address: "00:12:4b:00:00:00:00:03"
linkaddr_hash: last_two_bytes
rules: [unicast_per_neighbor_rpl_storing, default_common]
unicast_period: 7
common_shared_period: 13
ebsf_period: 101
multiple_channels: true
schedule:
  max_slotframes: 2
  max_links: 32
"#;
        let f = yaml_tempfile(yaml);
        let cfg = OrchestraConfig::load_from_file(f.path()).unwrap();

        assert_eq!(
            cfg.node_address.octets(),
            &[0x00, 0x12, 0x4b, 0, 0, 0, 0, 3]
        );
        let s = &cfg.settings;
        assert_eq!(s.linkaddr_hash, LinkAddrHash::LastTwoBytes);
        assert_eq!(
            s.rules,
            vec![RuleKind::UnicastPerNeighborRplStoring, RuleKind::DefaultCommon]
        );
        assert_eq!(
            (s.unicast_period, s.common_shared_period, s.ebsf_period),
            (7, 13, 101)
        );
        assert!(s.multiple_channels);
        assert_eq!(
            s.schedule,
            ScheduleLimits {
                max_slotframes: 2,
                max_links: 32
            }
        );
    }

    #[test]
    fn optional_fields_use_defaults_when_absent() {
        let cfg = OrchestraConfig::from_yaml_str("node_address: \"#3\"\n").unwrap();

        assert_eq!(cfg.node_address, LinkAddress::from_node_id(3));
        assert_eq!(cfg.settings, OrchestraSettings::default());
        assert_eq!(cfg.settings.unicast_period, 17);
        assert_eq!(cfg.settings.ebsf_period, 397);
    }

    #[test]
    fn partial_schedule_section_keeps_other_default() {
        let yaml = "node_address: \"#1\"\nschedule: { max_links: 10 }\n";
        let cfg = OrchestraConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.settings.schedule.max_links, 10);
        assert_eq!(
            cfg.settings.schedule.max_slotframes,
            DEFAULT_MAX_SLOTFRAMES
        );
    }

    #[test]
    fn missing_node_address_returns_error() {
        assert!(OrchestraConfig::from_yaml_str("rules: [default_common]\n").is_err());
    }

    #[test]
    fn empty_rule_list_is_rejected() {
        let err = OrchestraConfig::from_yaml_str("node_address: \"#1\"\nrules: []\n").unwrap_err();
        assert!(err.to_string().contains("empty"), "{err}");
    }

    #[test]
    fn duplicate_rule_is_rejected() {
        let yaml = "node_address: \"#1\"\nrules: [default_common, unicast_msf, default_common]\n";
        let err = OrchestraConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("default_common"), "{err}");
    }

    #[test]
    fn unknown_rule_name_is_rejected() {
        let yaml = "node_address: \"#1\"\nrules: [sender_based]\n";
        assert!(OrchestraConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        let result = OrchestraConfig::load_from_file(Path::new("/nonexistent/path/orchestra.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(OrchestraConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn eb_rule_presence_drives_common_link_type() {
        let mut settings = OrchestraSettings::default();
        assert!(settings.rule_params().eb_rule_active);

        settings.rules = vec![RuleKind::DefaultCommon];
        assert!(!settings.rule_params().eb_rule_active);
    }

    #[test]
    fn built_orchestra_follows_configured_order() {
        let cfg = OrchestraConfig::from_yaml_str("node_address: \"#3\"\n").unwrap();
        let mut orchestra = cfg.build_orchestra();
        orchestra.init().unwrap();

        assert_eq!(
            orchestra.rule_names(),
            vec!["EB per time source", "unicast MSF", "default common"]
        );
        assert_eq!(orchestra.schedule().slotframe_handles(), vec![0, 1, 2]);
        assert_eq!(orchestra.schedule().max_links(), DEFAULT_MAX_LINKS);
    }
}
