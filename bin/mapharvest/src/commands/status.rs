use mapharvest_core::QueryUnit;
use mapharvest_storage::{count_rows, ProgressStore};
use std::path::Path;

use super::load_config;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    println!("mapharvest status");
    println!("=================");
    println!();

    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found)" }
    );
    if !config_exists {
        println!();
        println!("Create a config.json with `categories` and `target_locations`.");
        return Ok(());
    }

    let config = load_config(config_path)?;
    let units = QueryUnit::matrix(&config.categories, &config.target_locations);
    println!("Keywords:  {}", config.categories.len());
    println!("Locations: {}", config.target_locations.len());
    println!("Browser:   {} (headless: {})", config.browser.engine, config.browser.headless);
    println!();

    let progress = ProgressStore::open(config.progress_path());
    let (harvested, enriched) = progress.counts();
    println!("Progress:  {}", config.progress_path().display());
    println!("  harvested units: {}/{}", harvested, units.len());
    println!("  enriched links:  {}", enriched);
    println!();

    println!("Output:");
    for (label, path) in [("harvest", config.harvest_path()), ("enrich", config.enriched_path())] {
        let rows = count_rows(&path)?;
        println!(
            "  {:<8} {} ({} rows){}",
            label,
            path.display(),
            rows,
            if path.exists() { "" } else { " - not created yet" }
        );
    }

    Ok(())
}
