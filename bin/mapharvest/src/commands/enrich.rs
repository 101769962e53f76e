use std::path::Path;

use super::{build_pipeline, load_config, print_stats, until_interrupted};

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut pipeline = build_pipeline(config);

    if let Some(stats) = until_interrupted(pipeline.run_enrich()).await? {
        print_stats("Enrich", &stats);
    }
    Ok(())
}
