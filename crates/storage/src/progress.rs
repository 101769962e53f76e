use mapharvest_core::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Ledger section. `Harvested` holds query-unit keys, `Enriched` holds
/// detail links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Harvested,
    Enriched,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Harvested => "harvested",
            Section::Enriched => "enriched",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    #[serde(default)]
    harvested: Vec<String>,
    #[serde(default)]
    enriched: Vec<String>,
}

/// Durable record of finished work.
///
/// Entries are only ever added. Every new mark rewrites the ledger file
/// before returning, so a crash loses at most the mark in flight.
pub struct ProgressStore {
    path: PathBuf,
    ledger: Ledger,
    harvested: HashSet<String>,
    enriched: HashSet<String>,
}

impl ProgressStore {
    /// Load the ledger at `path`. A missing or unreadable file starts an empty
    /// ledger instead of failing, so the first run needs no setup.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ledger = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Ledger>(&content) {
                Ok(ledger) => ledger,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Progress ledger unreadable, starting empty");
                    Ledger::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No progress ledger yet, starting empty");
                Ledger::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Progress ledger unreadable, starting empty");
                Ledger::default()
            }
        };

        let harvested = ledger.harvested.iter().cloned().collect();
        let enriched = ledger.enriched.iter().cloned().collect();
        Self {
            path,
            ledger,
            harvested,
            enriched,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, section: Section, key: &str) -> bool {
        self.set(section).contains(key)
    }

    /// Record `key` in `section` and flush. Returns `false` when the key was
    /// already present, in which case nothing is written.
    pub fn mark(&mut self, section: Section, key: &str) -> Result<bool> {
        let inserted = match section {
            Section::Harvested => self.harvested.insert(key.to_string()),
            Section::Enriched => self.enriched.insert(key.to_string()),
        };
        if !inserted {
            return Ok(false);
        }
        match section {
            Section::Harvested => self.ledger.harvested.push(key.to_string()),
            Section::Enriched => self.ledger.enriched.push(key.to_string()),
        }
        self.flush()?;
        debug!(section = section.as_str(), key = %key, "Progress marked");
        Ok(true)
    }

    /// Number of distinct entries per section: (harvested, enriched).
    pub fn counts(&self) -> (usize, usize) {
        (self.harvested.len(), self.enriched.len())
    }

    fn set(&self, section: Section) -> &HashSet<String> {
        match section {
            Section::Harvested => &self.harvested,
            Section::Enriched => &self.enriched,
        }
    }

    /// Write to a sibling temp file, then rename over the ledger.
    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp_name = OsString::from(self.path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let content = serde_json::to_string_pretty(&self.ledger)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            e
        })?;
        Ok(())
    }
}
