//! Harvest stage: search every query unit and persist the relevant listings.

use async_trait::async_trait;
use mapharvest_browser::{Browser, BrowserResult, Element, Launcher};
use mapharvest_core::config::SelectorConfig;
use mapharvest_core::{canonical_link, Config, ListingRef, QueryUnit, Result};
use mapharvest_storage::{CsvSink, ProgressStore, Section};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dedup::DedupIndex;
use crate::filter::{self, Verdict};
use crate::pacer::Pacer;
use crate::poll::{poll_until, Polled, POLL_INTERVAL};
use crate::session::{Operation, SessionError, SessionManager};
use crate::stats::StageStats;

/// One listing as shown in the result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub link: String,
    pub category: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingPage {
    Rendered(Vec<Candidate>),
    /// Neither the feed nor any listing appeared in time.
    NotRendered,
}

/// `{base_url}/search/{keyword}+in+{location}` with spaces as `+` and every
/// word percent-encoded, so `/`, `#` and `?` stay inside the path segment.
pub fn search_url(base_url: &str, unit: &QueryUnit) -> String {
    let query = unit
        .query()
        .split_whitespace()
        .map(|word| urlencoding::encode(word).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    format!("{}/search/{}", base_url.trim_end_matches('/'), query)
}

/// Pull category and closure status out of a result card's text.
///
/// Cards read roughly `Name / 4.5(120) / Textile mill · Address / Open ⋅ Closes 7 pm`.
/// The category is the first `·`-separated segment that is not a rating.
pub fn parse_card(name: &str, text: &str) -> (Option<String>, Option<String>) {
    let mut category = None;
    let mut status = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line == name {
            continue;
        }
        let lower = line.to_lowercase();
        if status.is_none() && (lower.contains("permanently closed") || lower.contains("temporarily closed")) {
            status = Some(line.to_string());
            continue;
        }
        if category.is_none() && line.contains('·') {
            let first = line.split('·').next().unwrap_or_default().trim();
            let looks_like_rating = first
                .chars()
                .next()
                .map(|c| c.is_ascii_digit() || c == '(')
                .unwrap_or(true);
            if !looks_like_rating && !first.eq_ignore_ascii_case("no reviews") {
                category = Some(first.to_string());
            }
        }
    }
    (category, status)
}

/// Search one unit, scroll the result list until it stops growing, and read
/// every visible candidate.
pub struct LoadListings {
    url: String,
    selectors: SelectorConfig,
    listing_timeout: Duration,
    settle: Duration,
    scroll_pause: Duration,
    max_scrolls: u32,
}

impl LoadListings {
    pub fn new(config: &Config, unit: &QueryUnit) -> Self {
        Self {
            url: search_url(&config.base_url, unit),
            selectors: config.selectors.clone(),
            listing_timeout: Duration::from_secs(config.harvest.listing_timeout_secs),
            settle: Duration::from_millis(config.harvest.settle_ms),
            scroll_pause: Duration::from_millis(config.harvest.scroll_pause_ms),
            max_scrolls: config.harvest.max_scrolls,
        }
    }

    async fn scroll_until_stable<B: Browser>(&self, browser: &B) -> BrowserResult<()> {
        let Some(feed) = browser.find_one(&self.selectors.feed).await? else {
            return Ok(());
        };
        let mut count = browser.find_all(&self.selectors.listing_anchor).await?.len();
        for scroll in 0..self.max_scrolls {
            browser.scroll_to_bottom(&feed).await?;
            if !self.scroll_pause.is_zero() {
                tokio::time::sleep(self.scroll_pause).await;
            }
            let now = browser.find_all(&self.selectors.listing_anchor).await?.len();
            if now <= count {
                debug!(scrolls = scroll + 1, listings = now, "Result list stable");
                break;
            }
            count = now;
        }
        Ok(())
    }

    async fn read_candidate<B: Browser>(
        &self,
        browser: &B,
        anchor: &Element,
    ) -> BrowserResult<Option<Candidate>> {
        let href = match browser.attribute(anchor, "href").await? {
            Some(href) if !href.trim().is_empty() => href,
            _ => return Ok(None),
        };
        let name = match browser.attribute(anchor, "aria-label").await? {
            Some(label) if !label.trim().is_empty() => label.trim().to_string(),
            _ => browser.text(anchor).await?,
        };
        if name.is_empty() {
            return Ok(None);
        }

        let (category, status) = match browser.closest(anchor, &self.selectors.card).await? {
            Some(card) => parse_card(&name, &browser.text(&card).await?),
            None => (None, None),
        };

        Ok(Some(Candidate {
            name,
            link: canonical_link(&href),
            category,
            status,
        }))
    }
}

#[async_trait]
impl<B: Browser> Operation<B> for LoadListings {
    type Output = ListingPage;

    fn describe(&self) -> String {
        format!("search {}", self.url)
    }

    async fn run(&self, browser: &B) -> BrowserResult<ListingPage> {
        browser.navigate(&self.url).await?;

        let feed = self.selectors.feed.as_str();
        let anchor = self.selectors.listing_anchor.as_str();
        let rendered = poll_until(self.listing_timeout, POLL_INTERVAL, move || {
            results_visible(browser, feed, anchor)
        })
        .await?;
        if rendered == Polled::TimedOut {
            return Ok(ListingPage::NotRendered);
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        self.scroll_until_stable(browser).await?;

        let mut candidates = Vec::new();
        for anchor in browser.find_all(anchor).await? {
            if let Some(candidate) = self.read_candidate(browser, &anchor).await? {
                candidates.push(candidate);
            }
        }
        Ok(ListingPage::Rendered(candidates))
    }
}

async fn results_visible<B: Browser>(browser: &B, feed: &str, anchor: &str) -> BrowserResult<Option<()>> {
    if browser.find_one(feed).await?.is_some() {
        return Ok(Some(()));
    }
    Ok(browser.find_all(anchor).await?.first().map(|_| ()))
}

pub struct HarvestStage<'a> {
    config: &'a Config,
    progress: &'a mut ProgressStore,
    sink: CsvSink<ListingRef>,
    dedup: DedupIndex,
    pacer: Pacer,
    stats: StageStats,
}

impl<'a> HarvestStage<'a> {
    pub fn new(config: &'a Config, progress: &'a mut ProgressStore) -> Result<Self> {
        Ok(Self {
            sink: CsvSink::open(config.harvest_path())?,
            pacer: Pacer::new(config.search_cooldown()),
            dedup: DedupIndex::new(),
            stats: StageStats::default(),
            config,
            progress,
        })
    }

    /// Work through every unit not yet harvested. Only fatal errors
    /// (runtime cannot start, ledger or sheet I/O) end the stage early.
    pub async fn run<L: Launcher>(mut self, session: &mut SessionManager<L>) -> Result<StageStats> {
        let units = QueryUnit::matrix(&self.config.categories, &self.config.target_locations);
        info!(units = units.len(), file = %self.sink.path().display(), "Harvest started");

        for unit in units {
            let key = unit.key();
            if self.progress.has(Section::Harvested, &key) {
                self.stats.resumed += 1;
                debug!(unit = %unit, "Already harvested");
                continue;
            }

            self.stats.processed += 1;
            info!(unit = %unit, "Harvesting");
            let op = LoadListings::new(self.config, &unit);
            match session.execute(&op).await {
                Ok(ListingPage::Rendered(candidates)) => self.accept(&unit, candidates)?,
                Ok(ListingPage::NotRendered) => {
                    self.stats.timeouts += 1;
                    warn!(unit = %unit, "No results rendered, skipping");
                }
                Err(SessionError::Fatal(e)) => return Err(e.into()),
                Err(e) => {
                    self.stats.failed += 1;
                    warn!(unit = %unit, error = %e, "Search failed, skipping");
                }
            }

            self.progress.mark(Section::Harvested, &key)?;
            self.pacer.pause().await;
        }

        self.stats.restarts = session.restarts();
        self.stats.rotations = session.rotations();
        self.stats.log_summary("harvest");
        Ok(self.stats)
    }

    fn accept(&mut self, unit: &QueryUnit, candidates: Vec<Candidate>) -> Result<()> {
        let found = candidates.len();
        let mut saved = 0;
        for candidate in candidates {
            if let Verdict::Excluded(reason) = filter::evaluate(
                &candidate.name,
                candidate.category.as_deref(),
                candidate.status.as_deref(),
            ) {
                debug!(name = %candidate.name, reason = reason.as_str(), "Excluded");
                self.stats.exclude(reason);
                continue;
            }
            if self.dedup.seen(&candidate.name, &candidate.link) {
                self.stats.duplicates += 1;
                continue;
            }

            let listing = ListingRef {
                name: candidate.name,
                link: candidate.link,
                keyword: unit.keyword.clone(),
                location: unit.location.clone(),
            };
            if self.sink.append(&listing)? {
                saved += 1;
                self.stats.saved += 1;
            } else {
                self.stats.duplicates += 1;
            }
            self.dedup.record(&listing.name, &listing.link);
        }
        info!(unit = %unit, found, saved, "Unit harvested");
        Ok(())
    }
}
