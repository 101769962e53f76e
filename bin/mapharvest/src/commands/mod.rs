pub mod doctor;
pub mod enrich;
pub mod harvest;
pub mod run;
pub mod status;

use anyhow::Context;
use mapharvest_browser::ChromeLauncher;
use mapharvest_core::Config;
use mapharvest_pipeline::{Pipeline, StageStats};
use std::future::Future;
use std::path::Path;
use tracing::warn;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}

pub(crate) fn build_pipeline(config: Config) -> Pipeline<ChromeLauncher> {
    let launcher = ChromeLauncher::new(&config.browser, Some(config.base_url.clone()));
    Pipeline::new(config, launcher)
}

/// Drive `work` to completion unless Ctrl-C arrives first. An interrupt is
/// a clean stop: everything marked so far is already on disk.
pub(crate) async fn until_interrupted<T>(
    work: impl Future<Output = mapharvest_core::Result<T>>,
) -> anyhow::Result<Option<T>> {
    tokio::select! {
        result = work => Ok(Some(result?)),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            println!("Stopped by user. Progress is saved; run again to resume.");
            Ok(None)
        }
    }
}

pub(crate) fn print_stats(stage: &str, stats: &StageStats) {
    println!();
    println!("{} summary", stage);
    println!("  processed:   {}", stats.processed);
    println!("  resumed:     {}", stats.resumed);
    println!("  saved:       {}", stats.saved);
    println!("  duplicates:  {}", stats.duplicates);
    println!(
        "  excluded:    {} (closed {}, retail category {}, retail name {})",
        stats.excluded(),
        stats.excluded_closed,
        stats.excluded_retail_category,
        stats.excluded_retail_name
    );
    println!("  timeouts:    {}", stats.timeouts);
    println!("  no phone:    {}", stats.no_phone);
    println!("  failed:      {}", stats.failed);
    println!("  restarts:    {}", stats.restarts);
    println!("  rotations:   {}", stats.rotations);
}
