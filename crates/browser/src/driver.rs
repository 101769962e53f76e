use async_trait::async_trait;

use crate::error::BrowserResult;

/// Opaque handle to a DOM element inside one session.
///
/// Handles are only meaningful to the session that produced them and go
/// stale on navigation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Element {
    id: String,
}

impl Element {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// One live browser context.
///
/// Interaction methods take `&self` so bounded polls can call them
/// repeatedly from a closure.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Load `url` and wait for the document to finish loading.
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    async fn current_location(&self) -> BrowserResult<String>;

    async fn find_all(&self, selector: &str) -> BrowserResult<Vec<Element>>;

    async fn find_one(&self, selector: &str) -> BrowserResult<Option<Element>>;

    /// First descendant of `scope` matching `selector`.
    async fn find_within(&self, scope: &Element, selector: &str) -> BrowserResult<Option<Element>>;

    /// Nearest ancestor of `element` (itself included) matching `selector`.
    async fn closest(&self, element: &Element, selector: &str) -> BrowserResult<Option<Element>>;

    /// Rendered text, trimmed.
    async fn text(&self, element: &Element) -> BrowserResult<String>;

    async fn attribute(&self, element: &Element, name: &str) -> BrowserResult<Option<String>>;

    async fn scroll_into_view(&self, element: &Element) -> BrowserResult<()>;

    /// Scroll a scrollable container to its end to trigger lazy loading.
    async fn scroll_to_bottom(&self, element: &Element) -> BrowserResult<()>;

    async fn click(&self, element: &Element) -> BrowserResult<()>;

    /// Shut the session down. Best effort; never fails.
    async fn close(&mut self);
}

/// Creates fresh browser sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Session: Browser;

    /// Start a new session. An error here means the automation runtime
    /// itself cannot start and is not worth retrying.
    async fn launch(&self) -> BrowserResult<Self::Session>;
}
