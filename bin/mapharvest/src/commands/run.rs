use std::path::Path;
use tracing::info;

use super::{build_pipeline, load_config, print_stats, until_interrupted};

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    info!(
        keywords = config.categories.len(),
        locations = config.target_locations.len(),
        "Starting harvest and enrich"
    );
    let mut pipeline = build_pipeline(config);

    if let Some((harvest, enrich)) = until_interrupted(pipeline.run_all()).await? {
        print_stats("Harvest", &harvest);
        print_stats("Enrich", &enrich);
    }
    Ok(())
}
