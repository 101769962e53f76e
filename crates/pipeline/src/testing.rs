//! Scripted in-memory browser for pipeline tests.

use async_trait::async_trait;
use mapharvest_browser::{Browser, BrowserError, BrowserResult, Element, Launcher};
use mapharvest_core::config::SelectorConfig;
use mapharvest_core::Config;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct FakeListing {
    pub name: String,
    pub href: String,
    pub card_text: String,
}

impl FakeListing {
    pub fn new(name: &str, href: &str, card_text: &str) -> Self {
        Self {
            name: name.to_string(),
            href: href.to_string(),
            card_text: card_text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDetail {
    pub title: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

impl FakeDetail {
    pub fn new(title: &str, phone: Option<&str>, website: Option<&str>) -> Self {
        Self {
            title: Some(title.to_string()),
            phone: phone.map(str::to_string),
            website: website.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
enum Page {
    Search {
        listings: Vec<FakeListing>,
        initial: usize,
        step: usize,
    },
    Detail(FakeDetail),
}

#[derive(Default)]
struct Inner {
    pages: HashMap<String, Page>,
    always_fault: HashSet<String>,
    faults_left: HashMap<String, u32>,
    protocol_errors: HashSet<String>,
    fail_launches: bool,
    launches: u32,
    closes: u32,
    navigations: HashMap<String, u32>,
}

/// Shared script and counters. Clones observe the same state.
#[derive(Clone, Default)]
pub struct FakeSite(Arc<Mutex<Inner>>);

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.0.lock().unwrap()
    }

    /// A result list showing `initial` anchors, growing by `step` per scroll.
    pub fn search_page(&self, url: &str, listings: Vec<FakeListing>, initial: usize, step: usize) {
        self.lock().pages.insert(
            url.to_string(),
            Page::Search {
                listings,
                initial,
                step,
            },
        );
    }

    pub fn detail_page(&self, url: &str, detail: FakeDetail) {
        self.lock().pages.insert(url.to_string(), Page::Detail(detail));
    }

    /// Every navigation to `url` kills the session.
    pub fn always_fault(&self, url: &str) {
        self.lock().always_fault.insert(url.to_string());
    }

    pub fn fault_times(&self, url: &str, times: u32) {
        self.lock().faults_left.insert(url.to_string(), times);
    }

    pub fn protocol_error(&self, url: &str) {
        self.lock().protocol_errors.insert(url.to_string());
    }

    pub fn fail_launches(&self) {
        self.lock().fail_launches = true;
    }

    pub fn launches(&self) -> u32 {
        self.lock().launches
    }

    pub fn closes(&self) -> u32 {
        self.lock().closes
    }

    pub fn navigations(&self, url: &str) -> u32 {
        self.lock().navigations.get(url).copied().unwrap_or(0)
    }

    pub fn total_navigations(&self) -> u32 {
        self.lock().navigations.values().sum()
    }
}

#[derive(Clone)]
pub struct FakeLauncher {
    site: FakeSite,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self { site }
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    type Session = FakeBrowser;

    async fn launch(&self) -> BrowserResult<FakeBrowser> {
        let mut inner = self.site.lock();
        inner.launches += 1;
        if inner.fail_launches {
            return Err(BrowserError::Launch("chrome not found".to_string()));
        }
        Ok(FakeBrowser {
            site: self.site.clone(),
            selectors: SelectorConfig::default(),
            current: Mutex::new(None),
            visible: Mutex::new(0),
        })
    }
}

pub struct FakeBrowser {
    site: FakeSite,
    selectors: SelectorConfig,
    current: Mutex<Option<String>>,
    visible: Mutex<usize>,
}

impl FakeBrowser {
    fn page(&self) -> Option<Page> {
        let current = self.current.lock().unwrap().clone()?;
        self.site.lock().pages.get(&current).cloned()
    }

    fn detail(&self) -> Option<FakeDetail> {
        match self.page() {
            Some(Page::Detail(detail)) => Some(detail),
            _ => None,
        }
    }

    fn listing(&self, element: &Element, prefix: &str) -> Option<FakeListing> {
        let index: usize = element.id().strip_prefix(prefix)?.parse().ok()?;
        match self.page() {
            Some(Page::Search { listings, .. }) => listings.get(index).cloned(),
            _ => None,
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let initial = {
            let mut inner = self.site.lock();
            *inner.navigations.entry(url.to_string()).or_insert(0) += 1;
            if inner.always_fault.contains(url) {
                return Err(BrowserError::SessionInvalid("renderer crashed".to_string()));
            }
            if let Some(left) = inner.faults_left.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(BrowserError::SessionInvalid("renderer crashed".to_string()));
                }
            }
            if inner.protocol_errors.contains(url) {
                return Err(BrowserError::Protocol("net::ERR_ABORTED".to_string()));
            }
            match inner.pages.get(url) {
                Some(Page::Search { listings, initial, .. }) => (*initial).min(listings.len()),
                _ => 0,
            }
        };
        *self.current.lock().unwrap() = Some(url.to_string());
        *self.visible.lock().unwrap() = initial;
        Ok(())
    }

    async fn current_location(&self) -> BrowserResult<String> {
        Ok(self
            .current
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Element>> {
        if selector != self.selectors.listing_anchor {
            return Ok(Vec::new());
        }
        match self.page() {
            Some(Page::Search { .. }) => {
                let visible = *self.visible.lock().unwrap();
                Ok((0..visible).map(|i| Element::new(format!("anchor:{}", i))).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn find_one(&self, selector: &str) -> BrowserResult<Option<Element>> {
        let found = match self.page() {
            Some(Page::Search { .. }) if selector == self.selectors.feed => Some("feed"),
            Some(Page::Detail(detail)) => {
                if selector == self.selectors.detail_title && detail.title.is_some() {
                    Some("title")
                } else if selector == self.selectors.phone && detail.phone.is_some() {
                    Some("phone")
                } else if selector == self.selectors.website && detail.website.is_some() {
                    Some("website")
                } else {
                    None
                }
            }
            _ => None,
        };
        Ok(found.map(Element::new))
    }

    async fn find_within(&self, _scope: &Element, _selector: &str) -> BrowserResult<Option<Element>> {
        Ok(None)
    }

    async fn closest(&self, element: &Element, selector: &str) -> BrowserResult<Option<Element>> {
        if selector != self.selectors.card {
            return Ok(None);
        }
        Ok(element
            .id()
            .strip_prefix("anchor:")
            .map(|i| Element::new(format!("card:{}", i))))
    }

    async fn text(&self, element: &Element) -> BrowserResult<String> {
        if let Some(listing) = self.listing(element, "card:") {
            return Ok(listing.card_text);
        }
        if let Some(listing) = self.listing(element, "anchor:") {
            return Ok(listing.name);
        }
        let detail = self.detail().unwrap_or_default();
        let text = match element.id() {
            "title" => detail.title,
            "phone" => detail.phone,
            _ => None,
        };
        Ok(text.unwrap_or_default())
    }

    async fn attribute(&self, element: &Element, name: &str) -> BrowserResult<Option<String>> {
        if let Some(listing) = self.listing(element, "anchor:") {
            return Ok(match name {
                "aria-label" => Some(listing.name),
                "href" => Some(listing.href),
                _ => None,
            });
        }
        if element.id() == "website" && name == "href" {
            return Ok(self.detail().and_then(|d| d.website));
        }
        Ok(None)
    }

    async fn scroll_into_view(&self, _element: &Element) -> BrowserResult<()> {
        Ok(())
    }

    async fn scroll_to_bottom(&self, _element: &Element) -> BrowserResult<()> {
        if let Some(Page::Search { listings, step, .. }) = self.page() {
            let mut visible = self.visible.lock().unwrap();
            *visible = (*visible + step).min(listings.len());
        }
        Ok(())
    }

    async fn click(&self, _element: &Element) -> BrowserResult<()> {
        Ok(())
    }

    async fn close(&mut self) {
        self.site.lock().closes += 1;
    }
}

/// Config with every delay zeroed and all files under `dir`.
pub fn test_config(dir: &Path, categories: &[&str], locations: &[&str]) -> Config {
    let mut config = Config {
        categories: categories.iter().map(|s| s.to_string()).collect(),
        target_locations: locations.iter().map(|s| s.to_string()).collect(),
        harvest_file: dir.join("links.csv").to_string_lossy().into_owned(),
        enriched_file: Some(dir.join("leads.csv").to_string_lossy().into_owned()),
        progress_file: dir.join("progress.json").to_string_lossy().into_owned(),
        cooldown_between_searches: 0.0,
        cooldown_between_clicks: 0.0,
        base_url: "https://maps.test".to_string(),
        ..Config::default()
    };
    config.session.restart_cooldown_secs = 0;
    config.harvest.scroll_pause_ms = 0;
    config.harvest.settle_ms = 0;
    config.harvest.listing_timeout_secs = 0;
    config.enrich.detail_timeout_secs = 0;
    config
}
