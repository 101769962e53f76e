use mapharvest_browser::Launcher;
use mapharvest_core::{Config, Result};
use mapharvest_storage::ProgressStore;
use tracing::info;

use crate::enrich::EnrichStage;
use crate::harvest::HarvestStage;
use crate::session::SessionManager;
use crate::stats::StageStats;

/// Runs harvest to completion, then enrich to completion, against one
/// progress ledger. Each stage gets its own browser session.
pub struct Pipeline<L: Launcher + Clone> {
    config: Config,
    launcher: L,
    progress: ProgressStore,
}

impl<L: Launcher + Clone> Pipeline<L> {
    pub fn new(config: Config, launcher: L) -> Self {
        let progress = ProgressStore::open(config.progress_path());
        let (harvested, enriched) = progress.counts();
        info!(
            ledger = %progress.path().display(),
            harvested,
            enriched,
            "Progress ledger loaded"
        );
        Self {
            config,
            launcher,
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub async fn run_harvest(&mut self) -> Result<StageStats> {
        let mut session = SessionManager::new(self.launcher.clone(), &self.config.session);
        let result = match HarvestStage::new(&self.config, &mut self.progress) {
            Ok(stage) => stage.run(&mut session).await,
            Err(e) => Err(e),
        };
        session.close().await;
        result
    }

    pub async fn run_enrich(&mut self) -> Result<StageStats> {
        let mut session = SessionManager::new(self.launcher.clone(), &self.config.session);
        let result = match EnrichStage::new(&self.config, &mut self.progress) {
            Ok(stage) => stage.run(&mut session).await,
            Err(e) => Err(e),
        };
        session.close().await;
        result
    }

    /// Harvest then enrich. A failing harvest stops before enrich starts.
    pub async fn run_all(&mut self) -> Result<(StageStats, StageStats)> {
        let harvest = self.run_harvest().await?;
        let enrich = self.run_enrich().await?;
        Ok((harvest, enrich))
    }
}
