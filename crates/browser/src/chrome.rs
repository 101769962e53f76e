//! Chrome/Edge launcher and the CDP-backed `Browser`.
//!
//! Every launch gets a fresh throwaway profile directory and its own
//! debugging port, so a replaced session shares nothing with its
//! predecessor.

use async_trait::async_trait;
use mapharvest_core::config::BrowserConfig;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::cdp::CdpClient;
use crate::driver::{Browser, Element, Launcher};
use crate::error::{BrowserError, BrowserResult};

/// Supported browser engines. Both speak CDP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrowserEngine {
    Chrome,
    Edge,
}

impl BrowserEngine {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "edge" | "msedge" => Self::Edge,
            _ => Self::Chrome,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
        }
    }
}

/// Launches headless Chrome/Edge processes with a CDP endpoint.
#[derive(Clone)]
pub struct ChromeLauncher {
    engine: BrowserEngine,
    headless: bool,
    window: (u32, u32),
    page_load_timeout: Duration,
    command_timeout: Duration,
    /// Page loaded once on every fresh session.
    warmup_url: Option<String>,
    profile_root: PathBuf,
}

impl ChromeLauncher {
    pub fn new(config: &BrowserConfig, warmup_url: Option<String>) -> Self {
        Self {
            engine: BrowserEngine::parse(&config.engine),
            headless: config.headless,
            window: (config.window_width, config.window_height),
            page_load_timeout: Duration::from_secs(config.page_load_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            warmup_url: if config.warmup { warmup_url } else { None },
            profile_root: std::env::temp_dir().join("mapharvest-profiles"),
        }
    }

    pub fn engine(&self) -> BrowserEngine {
        self.engine
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    type Session = CdpBrowser;

    async fn launch(&self) -> BrowserResult<CdpBrowser> {
        let browser_path = find_browser_binary(self.engine).ok_or_else(|| {
            BrowserError::Launch(format!("{} not found. Please install it.", self.engine.name()))
        })?;

        // Any early return below drops the profile guard and the child,
        // which removes the directory and kills the process.
        let profile = ProfileDir::create(&self.profile_root)?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, profile.path(), self.headless, self.window);

        info!(
            port = debug_port,
            headless = self.headless,
            browser = self.engine.name(),
            "Launching browser session"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Launch(format!("failed to launch {}: {}", self.engine.name(), e)))?;

        wait_for_cdp_ready(debug_port, 15).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url)
            .await?
            .with_command_timeout(self.command_timeout);

        for domain in ["Page", "Runtime", "DOM"] {
            cdp.enable_domain(domain)
                .await
                .map_err(|e| BrowserError::Launch(format!("failed to enable {}: {}", domain, e)))?;
        }

        debug!(ws_url = %page_ws_url, "CDP connection established (page target)");

        let browser = CdpBrowser {
            cdp,
            process: child,
            profile,
            page_load_timeout: self.page_load_timeout,
        };

        if let Some(url) = &self.warmup_url {
            if let Err(e) = browser.navigate(url).await {
                warn!(url = %url, error = %e, "Warm-up navigation failed");
            }
        }

        Ok(browser)
    }
}

/// A live Chrome process driven over CDP.
pub struct CdpBrowser {
    cdp: CdpClient,
    process: Child,
    page_load_timeout: Duration,
    /// Dropped after `process`, so the kill is issued before removal.
    profile: ProfileDir,
}

impl CdpBrowser {
    async fn call(
        &self,
        element: &Element,
        function: &str,
        args: &[Value],
        by_value: bool,
    ) -> BrowserResult<Value> {
        self.cdp
            .call_function_on(element.id(), function, args, by_value)
            .await
    }

    /// Run a function returning an element and wrap the resulting object.
    async fn call_for_element(
        &self,
        element: &Element,
        function: &str,
        selector: &str,
    ) -> BrowserResult<Option<Element>> {
        let remote = self.call(element, function, &[json!(selector)], false).await?;
        if remote.get("subtype").and_then(|v| v.as_str()) == Some("null") {
            return Ok(None);
        }
        Ok(remote
            .get("objectId")
            .and_then(|v| v.as_str())
            .map(Element::new))
    }

    async fn wait_for_load(&self) -> BrowserResult<()> {
        let deadline = Instant::now() + self.page_load_timeout;
        loop {
            let state = self.cdp.evaluate_js("document.readyState").await;
            match state {
                Ok(Value::String(s)) if s == "complete" => return Ok(()),
                Ok(_) => {}
                // The old execution context is torn down mid-navigation.
                Err(BrowserError::NotFound(_)) | Err(BrowserError::Protocol(_)) => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "page not loaded after {}s",
                    self.page_load_timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let result = self.cdp.navigate(url).await?;
        if let Some(err) = result.get("errorText").and_then(|v| v.as_str()) {
            if !err.is_empty() {
                return Err(BrowserError::Protocol(format!("navigation to {} failed: {}", url, err)));
            }
        }
        self.wait_for_load().await
    }

    async fn current_location(&self) -> BrowserResult<String> {
        let value = self.cdp.evaluate_js("window.location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Element>> {
        let root = self.cdp.document_root().await?;
        let node_ids = self.cdp.query_selector_all(root, selector).await?;
        let mut elements = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            match self.cdp.resolve_node(node_id).await {
                Ok(object_id) => elements.push(Element::new(object_id)),
                // Detached between query and resolve.
                Err(BrowserError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(elements)
    }

    async fn find_one(&self, selector: &str) -> BrowserResult<Option<Element>> {
        let root = self.cdp.document_root().await?;
        match self.cdp.query_selector(root, selector).await? {
            Some(node_id) => match self.cdp.resolve_node(node_id).await {
                Ok(object_id) => Ok(Some(Element::new(object_id))),
                Err(BrowserError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }

    async fn find_within(&self, scope: &Element, selector: &str) -> BrowserResult<Option<Element>> {
        self.call_for_element(scope, "function(s) { return this.querySelector(s); }", selector)
            .await
    }

    async fn closest(&self, element: &Element, selector: &str) -> BrowserResult<Option<Element>> {
        self.call_for_element(element, "function(s) { return this.closest(s); }", selector)
            .await
    }

    async fn text(&self, element: &Element) -> BrowserResult<String> {
        let remote = self
            .call(
                element,
                "function() { return (this.innerText || this.textContent || '').trim(); }",
                &[],
                true,
            )
            .await?;
        Ok(remote
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn attribute(&self, element: &Element, name: &str) -> BrowserResult<Option<String>> {
        // Prefer the resolved property (absolute href) over the raw attribute.
        let remote = self
            .call(
                element,
                "function(n) { const v = this[n]; if (typeof v === 'string' && v) return v; return this.getAttribute(n); }",
                &[json!(name)],
                true,
            )
            .await?;
        Ok(remote
            .get("value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    async fn scroll_into_view(&self, element: &Element) -> BrowserResult<()> {
        self.call(element, "function() { this.scrollIntoView({block: 'center'}); }", &[], true)
            .await?;
        Ok(())
    }

    async fn scroll_to_bottom(&self, element: &Element) -> BrowserResult<()> {
        self.call(element, "function() { this.scrollTop = this.scrollHeight; }", &[], true)
            .await?;
        Ok(())
    }

    async fn click(&self, element: &Element) -> BrowserResult<()> {
        self.call(element, "function() { this.click(); }", &[], true)
            .await?;
        Ok(())
    }

    async fn close(&mut self) {
        // Try graceful close via CDP first
        if let Err(e) = self.cdp.send_command("Browser.close", json!({})).await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        let _ = self.process.kill().await;
        self.profile.remove();
    }
}

impl Drop for CdpBrowser {
    fn drop(&mut self) {
        // Best-effort kill on drop; the profile guard cleans up after it.
        let _ = self.process.start_kill();
    }
}

/// Throwaway profile directory for one session, removed on drop.
struct ProfileDir {
    path: PathBuf,
}

impl ProfileDir {
    fn create(root: &Path) -> BrowserResult<Self> {
        let path = root.join(format!("session-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)
            .map_err(|e| BrowserError::Launch(format!("failed to create user data dir: {}", e)))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Best effort. A directory that is already gone is not an error.
    fn remove(&self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(dir = %self.path.display(), error = %e, "Profile cleanup failed"),
        }
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        self.remove();
    }
}

fn build_browser_args(
    debug_port: u16,
    user_data_dir: &Path,
    headless: bool,
    window: (u32, u32),
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-software-rasterizer".to_string(),
        "--disable-extensions".to_string(),
        "--disable-features=VizDisplayCompositor".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-sync".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!("--window-size={},{}", window.0, window.1));
    args.push("about:blank".to_string());
    args
}

/// Find a browser binary on the system for the given engine.
pub fn find_browser_binary(engine: BrowserEngine) -> Option<String> {
    let candidates = match engine {
        BrowserEngine::Chrome => {
            if cfg!(target_os = "macos") {
                vec![
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                ]
            } else if cfg!(target_os = "linux") {
                vec![
                    "google-chrome", "google-chrome-stable",
                    "chromium", "chromium-browser",
                    "/usr/bin/google-chrome", "/usr/bin/chromium",
                ]
            } else {
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ]
            }
        }
        BrowserEngine::Edge => {
            if cfg!(target_os = "macos") {
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"]
            } else if cfg!(target_os = "linux") {
                vec!["microsoft-edge", "microsoft-edge-stable", "/usr/bin/microsoft-edge"]
            } else {
                vec![
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                ]
            }
        }
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

/// List all available browser engines on the system.
pub fn list_available_browsers() -> Vec<(BrowserEngine, String)> {
    let mut result = Vec::new();
    for engine in [BrowserEngine::Chrome, BrowserEngine::Edge] {
        if let Some(path) = find_browser_binary(engine) {
            result.push((engine, path));
        }
    }
    result
}

async fn find_free_port() -> BrowserResult<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| BrowserError::Launch(format!("failed to bind to find free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| BrowserError::Launch(format!("failed to get local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Polls /json/version until the browser-level endpoint answers.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> BrowserResult<String> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(BrowserError::Launch(format!(
                "CDP not ready after {}s on port {}",
                timeout_secs, port
            )));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// WebSocket URL of the first page target listed by /json/list.
async fn get_page_ws_url(port: u16) -> BrowserResult<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        if let Some(ws_url) = page_ws_url(&targets) {
            return Ok(ws_url);
        }
    }

    Err(BrowserError::Launch("no page target found after retries".to_string()))
}

fn page_ws_url(targets: &[Value]) -> Option<String> {
    targets
        .iter()
        .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
        .find_map(|t| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_parse() {
        assert_eq!(BrowserEngine::parse("msedge"), BrowserEngine::Edge);
        assert_eq!(BrowserEngine::parse("Chrome"), BrowserEngine::Chrome);
        assert_eq!(BrowserEngine::parse("anything"), BrowserEngine::Chrome);
    }

    #[test]
    fn test_profile_dir_removed_on_drop() {
        let root = tempfile::TempDir::new().unwrap();
        let profile = ProfileDir::create(root.path()).unwrap();
        let path = profile.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path.starts_with(root.path()));
        std::fs::write(path.join("Local State"), "{}").unwrap();

        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn test_profile_dir_remove_is_idempotent() {
        let root = tempfile::TempDir::new().unwrap();
        let profile = ProfileDir::create(root.path()).unwrap();
        let path = profile.path().to_path_buf();
        profile.remove();
        assert!(!path.exists());
        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn test_profile_dir_create_failure_is_launch_error() {
        let root = tempfile::TempDir::new().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let err = ProfileDir::create(&blocker).err().unwrap();
        assert!(matches!(err, BrowserError::Launch(_)));
    }

    #[test]
    fn test_launcher_reads_command_timeout() {
        let config = BrowserConfig {
            command_timeout_secs: 7,
            ..BrowserConfig::default()
        };
        let launcher = ChromeLauncher::new(&config, None);
        assert_eq!(launcher.command_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_browser_args() {
        let args = build_browser_args(9222, Path::new("/tmp/p"), true, (1920, 1080));
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/p".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--window-size=1920,1080".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));

        let headed = build_browser_args(9222, Path::new("/tmp/p"), false, (800, 600));
        assert!(!headed.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn test_page_ws_url_skips_non_pages() {
        let targets = vec![
            json!({"type": "service_worker", "webSocketDebuggerUrl": "ws://sw"}),
            json!({"type": "page", "webSocketDebuggerUrl": "ws://page"}),
        ];
        assert_eq!(page_ws_url(&targets).as_deref(), Some("ws://page"));
        assert_eq!(page_ws_url(&[]), None);
    }

    #[test]
    fn test_warmup_respects_config() {
        let mut config = BrowserConfig::default();
        config.warmup = false;
        let launcher = ChromeLauncher::new(&config, Some("https://www.google.com/maps".into()));
        assert!(launcher.warmup_url.is_none());
        assert_eq!(launcher.engine(), BrowserEngine::Chrome);
    }
}
