//! Cluster command - runs every member of a topology file.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL};
use embedkv::{Cluster, TopologyFile};
use std::path::Path;

pub async fn run(config: &Path) -> Result<()> {
    let topology = TopologyFile::load(config)
        .with_context(|| format!("Failed to load topology from {}", config.display()))?;

    let cluster = topology
        .into_builder()
        .and_then(|builder| builder.build())
        .context("Failed to build cluster")?;

    println!("Cluster from {}", config.display());
    println!();
    println!("{}", members_table(&cluster));

    super::run_until_interrupted(&cluster, "Cluster").await
}

fn members_table(cluster: &Cluster) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Role").fg(Color::Blue),
        Cell::new("Port").fg(Color::Blue),
        Cell::new("TLS Port").fg(Color::Blue),
    ]);

    for member in cluster.monitors().iter().chain(cluster.servers()) {
        let tls = member
            .tls_ports()
            .first()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        table.add_row(vec![
            Cell::new(member.role()),
            Cell::new(member.port()),
            Cell::new(tls),
        ]);
    }

    table
}
