//! Init command - writes a topology file.

use anyhow::{Context, Result, bail};
use embedkv::TopologyFile;
use embedkv::config::GroupSection;
use std::path::{Path, PathBuf};

pub fn run(
    path: &Path,
    groups: &[String],
    monitors: usize,
    quorum: u32,
    starting_port: u16,
    exec: Option<PathBuf>,
) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }

    let mut topology = TopologyFile {
        executable: exec,
        quorum,
        groups: groups
            .iter()
            .map(|g| parse_group(g))
            .collect::<Result<_>>()?,
        ..TopologyFile::default()
    };
    topology.monitors.count = monitors;
    topology.servers.starting_port = starting_port;

    topology
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote {}", path.display());
    println!("  Monitors: {monitors} (quorum {quorum})");
    for group in &topology.groups {
        println!("  Group {} with {} replica(s)", group.name, group.replicas);
    }
    println!();
    println!("Start it with:");
    println!("  embedkv cluster --config {}", path.display());

    Ok(())
}

/// Parses `NAME` or `NAME:REPLICAS`.
fn parse_group(value: &str) -> Result<GroupSection> {
    let (name, replicas) = match value.split_once(':') {
        Some((name, replicas)) => (
            name,
            replicas
                .parse()
                .with_context(|| format!("Invalid replica count in '{value}'"))?,
        ),
        None => (value, 0),
    };
    if name.is_empty() {
        bail!("Missing group name in '{value}'");
    }
    Ok(GroupSection {
        name: name.to_string(),
        replicas,
    })
}
