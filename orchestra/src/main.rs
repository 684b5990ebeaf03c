/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{error, info, warn};

use orchestra::config::{OrchestraConfig, OrchestraSettings};
use orchestra::driver::{self, DriverHandle, DEFAULT_QUEUE_CAPACITY};
use orchestra::linkaddr::LinkAddress;
use orchestra::packet::{FrameType, Packet};
use orchestra::routing::InMemoryRoutes;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Orchestra autonomous TSCH scheduler for a single node.
///
/// Example:
///   orchestra --config node.yaml --scenario join.yaml
#[derive(Debug, Parser)]
#[command(
    name = "orchestra",
    about = "Orchestra autonomous TSCH scheduler – single-node runner",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML node configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Node address, overrides the configuration (`00:12:..` or `#<id>`).
    #[arg(short = 'n', long = "node")]
    node: Option<LinkAddress>,

    /// YAML list of topology events and packets to replay.
    #[arg(short = 's', long = "scenario")]
    scenario: Option<PathBuf>,
}

// ── Scenario file ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    TimeSource {
        #[serde(default)]
        old: Option<LinkAddress>,
        #[serde(default)]
        new: Option<LinkAddress>,
    },
    ChildAdded {
        addr: LinkAddress,
    },
    ChildRemoved {
        addr: LinkAddress,
    },
    /// `to` absent means broadcast.
    Send {
        #[serde(default)]
        to: Option<LinkAddress>,
        #[serde(default)]
        frame: FrameType,
    },
    Dump,
}

fn load_scenario(path: &Path) -> Result<Vec<Step>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open scenario file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file: {}", path.display()))
}

async fn run_step(handle: &DriverHandle, index: usize, step: &Step) -> Result<()> {
    match step {
        Step::TimeSource { old, new } => handle
            .time_source_changed(*old, *new)
            .await
            .with_context(|| format!("step {index}: time source change"))?,
        Step::ChildAdded { addr } => handle
            .child_added(*addr)
            .await
            .with_context(|| format!("step {index}: child {addr} added"))?,
        Step::ChildRemoved { addr } => handle
            .child_removed(*addr)
            .await
            .with_context(|| format!("step {index}: child {addr} removed"))?,
        Step::Send { to, frame } => {
            let packet = Packet::new(*to, *frame);
            let target = to.map_or_else(|| "broadcast".to_string(), |a| a.to_string());
            match handle.packet_ready(packet).await? {
                Some(sel) => println!(
                    "[{index}] {frame:?} -> {target}: rule '{}' slotframe {} timeslot {}",
                    sel.rule_name, sel.slotframe, sel.timeslot
                ),
                None => println!("[{index}] {frame:?} -> {target}: no rule, engine fallback"),
            }
        }
        Step::Dump => {
            let snap = handle.snapshot().await?;
            print!("{}", snap.schedule);
        }
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            let mut cfg = OrchestraConfig::load_from_file(path)?;
            if let Some(node) = cli.node {
                cfg.node_address = node;
            }
            cfg
        }
        None => {
            warn!("No configuration file provided, using default rule settings");
            let node_address = cli
                .node
                .context("--node is required when no --config is given")?;
            OrchestraConfig {
                node_address,
                settings: OrchestraSettings::default(),
            }
        }
    };

    let mut orchestra = config.build_orchestra();
    orchestra.init().context("Orchestra initialization failed")?;

    let steps = match &cli.scenario {
        Some(path) => load_scenario(path)?,
        None => Vec::new(),
    };
    info!(node = %config.node_address, steps = steps.len(), "Running scenario");

    let (handle, drv) = driver::channel(orchestra, InMemoryRoutes::new(), DEFAULT_QUEUE_CAPACITY);
    let task = tokio::spawn(drv.run());

    for (index, step) in steps.iter().enumerate() {
        run_step(&handle, index, step).await?;
    }

    let snap = handle.snapshot().await?;
    drop(handle);
    task.await.context("driver task panicked")?;

    println!("--- final schedule ---");
    match snap.time_source {
        Some(parent) => println!("time source: {parent}"),
        None => println!("time source: none"),
    }
    print!("{}", snap.schedule);
    Ok(())
}

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        config = ?cli.config,
        node = ?cli.node,
        scenario = ?cli.scenario,
        "Orchestra starting up..."
    );

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}
