//! Capacity planning.

use anyhow::{Context, Result};
use colored::Colorize;
use disthash::TableConfig;
use std::path::Path;

pub fn run(keys: u64, ranks: u32, load: f64, output: Option<&str>) -> Result<()> {
    let config = TableConfig::sized_for(keys, ranks, load)?;

    println!("{}", "Table Sizing".green().bold());
    println!("  Expected keys:   {}", keys);
    println!("  Ranks:           {}", ranks);
    println!("  Max load factor: {:.2}", load);
    println!(
        "  Slots per rank:  {}",
        config.local_capacity.to_string().cyan()
    );
    println!("  Total slots:     {}", config.logical_capacity());

    if let Some(path) = output {
        config
            .save(Path::new(path))
            .with_context(|| format!("Failed to write {}", path))?;
        println!("{} Wrote {}", "saved".green().bold(), path);
    }
    Ok(())
}
