use tracing::info;

use crate::filter::Exclusion;

/// Per-stage counters, logged once when the stage ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Units or links worked on in this run.
    pub processed: u32,
    /// Already in the ledger from an earlier run.
    pub resumed: u32,
    pub saved: u32,
    pub duplicates: u32,
    pub excluded_closed: u32,
    pub excluded_retail_category: u32,
    pub excluded_retail_name: u32,
    /// Result surface never rendered.
    pub timeouts: u32,
    pub no_phone: u32,
    /// Skipped after exhausting retries or a non-session error.
    pub failed: u32,
    pub restarts: u32,
    pub rotations: u32,
}

impl StageStats {
    pub fn exclude(&mut self, reason: Exclusion) {
        match reason {
            Exclusion::Closed => self.excluded_closed += 1,
            Exclusion::RetailCategory => self.excluded_retail_category += 1,
            Exclusion::RetailName => self.excluded_retail_name += 1,
        }
    }

    pub fn excluded(&self) -> u32 {
        self.excluded_closed + self.excluded_retail_category + self.excluded_retail_name
    }

    pub fn log_summary(&self, stage: &str) {
        info!(
            stage,
            processed = self.processed,
            resumed = self.resumed,
            saved = self.saved,
            duplicates = self.duplicates,
            excluded_closed = self.excluded_closed,
            excluded_retail_category = self.excluded_retail_category,
            excluded_retail_name = self.excluded_retail_name,
            timeouts = self.timeouts,
            no_phone = self.no_phone,
            failed = self.failed,
            restarts = self.restarts,
            rotations = self.rotations,
            "Stage finished"
        );
    }
}
