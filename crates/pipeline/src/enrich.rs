//! Enrich stage: visit every harvested link and write the contact record.

use async_trait::async_trait;
use mapharvest_browser::{Browser, BrowserResult, Launcher};
use mapharvest_core::config::SelectorConfig;
use mapharvest_core::{Config, EnrichedRecord, ListingRef, Result};
use mapharvest_storage::{read_listings, CsvSink, ProgressStore, Section};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dedup::DedupIndex;
use crate::pacer::Pacer;
use crate::phone::{policy_for_locale, PhonePolicy};
use crate::poll::{poll_until, Polled, POLL_INTERVAL};
use crate::session::{Operation, SessionError, SessionManager};
use crate::stats::StageStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailPage {
    Loaded {
        /// Raw phone text as displayed.
        phone: Option<String>,
        website: Option<String>,
    },
    /// The detail title never appeared.
    NotRendered,
}

/// Open one detail page and read its contact fields.
pub struct ReadDetail {
    link: String,
    selectors: SelectorConfig,
    timeout: Duration,
}

impl ReadDetail {
    pub fn new(config: &Config, link: &str) -> Self {
        Self {
            link: link.to_string(),
            selectors: config.selectors.clone(),
            timeout: Duration::from_secs(config.enrich.detail_timeout_secs),
        }
    }

    async fn read_phone<B: Browser>(&self, browser: &B) -> BrowserResult<Option<String>> {
        let Some(element) = browser.find_one(&self.selectors.phone).await? else {
            return Ok(None);
        };
        let text = browser.text(&element).await?;
        if !text.is_empty() {
            return Ok(Some(text));
        }
        // Icon-only buttons carry the number in `data-item-id="phone:tel:..."`.
        browser.attribute(&element, "data-item-id").await
    }

    async fn read_website<B: Browser>(&self, browser: &B) -> BrowserResult<Option<String>> {
        match browser.find_one(&self.selectors.website).await? {
            Some(element) => Ok(browser
                .attribute(&element, "href")
                .await?
                .filter(|href| !href.trim().is_empty())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<B: Browser> Operation<B> for ReadDetail {
    type Output = DetailPage;

    fn describe(&self) -> String {
        format!("detail {}", self.link)
    }

    async fn run(&self, browser: &B) -> BrowserResult<DetailPage> {
        browser.navigate(&self.link).await?;

        let title = self.selectors.detail_title.as_str();
        let rendered = poll_until(self.timeout, POLL_INTERVAL, move || browser.find_one(title)).await?;
        if rendered == Polled::TimedOut {
            return Ok(DetailPage::NotRendered);
        }

        Ok(DetailPage::Loaded {
            phone: self.read_phone(browser).await?,
            website: self.read_website(browser).await?,
        })
    }
}

pub struct EnrichStage<'a> {
    config: &'a Config,
    progress: &'a mut ProgressStore,
    sink: CsvSink<EnrichedRecord>,
    dedup: DedupIndex,
    phone_policy: Box<dyn PhonePolicy>,
    pacer: Pacer,
    stats: StageStats,
}

impl<'a> EnrichStage<'a> {
    pub fn new(config: &'a Config, progress: &'a mut ProgressStore) -> Result<Self> {
        Ok(Self {
            sink: CsvSink::open(config.enriched_path())?,
            phone_policy: policy_for_locale(&config.phone_locale),
            pacer: Pacer::new(config.click_cooldown()),
            dedup: DedupIndex::new(),
            stats: StageStats::default(),
            config,
            progress,
        })
    }

    /// Resolve every harvested link not yet enriched. Each link visited here
    /// ends with exactly one ledger mark, whatever the outcome.
    pub async fn run<L: Launcher>(mut self, session: &mut SessionManager<L>) -> Result<StageStats> {
        let listings = read_listings(&self.config.harvest_path())?;
        info!(listings = listings.len(), file = %self.sink.path().display(), "Enrich started");

        for listing in listings {
            if self.progress.has(Section::Enriched, &listing.link) {
                self.stats.resumed += 1;
                continue;
            }

            if self.dedup.seen(&listing.name, &listing.link) || self.sink.contains(&listing.link) {
                self.stats.duplicates += 1;
                debug!(link = %listing.link, "Already enriched, skipping");
                self.progress.mark(Section::Enriched, &listing.link)?;
                continue;
            }

            self.stats.processed += 1;
            self.visit(session, &listing).await?;
            self.progress.mark(Section::Enriched, &listing.link)?;
            self.pacer.pause().await;
        }

        self.stats.restarts = session.restarts();
        self.stats.rotations = session.rotations();
        self.stats.log_summary("enrich");
        Ok(self.stats)
    }

    async fn visit<L: Launcher>(
        &mut self,
        session: &mut SessionManager<L>,
        listing: &ListingRef,
    ) -> Result<()> {
        let op = ReadDetail::new(self.config, &listing.link);
        match session.execute(&op).await {
            Ok(DetailPage::Loaded { phone, website }) => {
                let normalized = phone.as_deref().and_then(|raw| self.phone_policy.normalize(raw));
                match normalized {
                    Some(phone) => {
                        let record = EnrichedRecord::from_listing(listing, phone, website);
                        self.sink.append(&record)?;
                        self.dedup.record(&listing.name, &listing.link);
                        self.stats.saved += 1;
                        info!(name = %listing.name, phone = %record.phone, "Lead saved");
                    }
                    None => {
                        self.stats.no_phone += 1;
                        debug!(name = %listing.name, raw = ?phone, "No usable phone");
                    }
                }
            }
            Ok(DetailPage::NotRendered) => {
                self.stats.timeouts += 1;
                warn!(link = %listing.link, "Detail page did not render, skipping");
            }
            Err(SessionError::Fatal(e)) => return Err(e.into()),
            Err(e) => {
                self.stats.failed += 1;
                warn!(link = %listing.link, error = %e, "Detail visit failed, skipping");
            }
        }
        Ok(())
    }
}
