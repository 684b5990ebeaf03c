/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use orchestra::schedule::TschSchedule;
use orchestra_sim::{LinkCheck, Simulation, Topology, Verdict};

/// Checks that every parent/child pair of a routing tree can reach the other
/// under Orchestra's autonomous schedule.
///
/// Example:
///   tree-sim --topology tree.yaml
#[derive(Debug, Parser)]
#[command(
    name = "tree-sim",
    about = "Orchestra multi-node schedule checker – NOT for production",
    long_about = None,
)]
struct Cli {
    /// Topology YAML: nodes, their parents, rule settings and optional moves.
    #[arg(short = 't', long = "topology")]
    topology: PathBuf,

    /// Print every node's link table after the last phase.
    #[arg(long = "dump", default_value_t = false)]
    dump: bool,
}

/// Prints one phase of checks and returns the number of unreachable pairs.
fn report(phase: &str, checks: &[LinkCheck]) -> usize {
    println!("=== {phase} ===");
    for check in checks {
        println!("  {check}");
    }
    let failed = checks
        .iter()
        .filter(|c| c.verdict != Verdict::Reachable)
        .count();
    println!("  {} pair(s) checked, {failed} unreachable", checks.len());
    failed
}

fn run(cli: &Cli) -> Result<usize> {
    let topology = Topology::load_from_file(&cli.topology)?;
    let mut sim = Simulation::build(&topology)?;

    let mut failed = report("initial tree", &sim.check_links());
    for (index, m) in topology.moves.iter().enumerate() {
        sim.reparent(m.node, m.new_parent)?;
        let phase = format!("move {index}: {} under {}", m.node, m.new_parent);
        failed += report(&phase, &sim.check_links());
    }

    if cli.dump {
        for addr in sim.addresses() {
            if let Some(orchestra) = sim.orchestra(addr) {
                println!("--- {addr} ---");
                print!("{}", orchestra.schedule().dump());
            }
        }
    }
    Ok(failed)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(topology = %cli.topology.display(), "tree-sim starting");

    match run(&cli) {
        Ok(0) => info!("all pairs reachable"),
        Ok(failed) => {
            error!(failed, "unreachable parent/child pairs found");
            process::exit(1);
        }
        Err(e) => {
            error!("{:#}", e);
            process::exit(2);
        }
    }
}
