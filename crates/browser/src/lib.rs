//! Browser automation boundary.
//!
//! `Browser` and `Launcher` are the seams the pipeline drives. The concrete
//! implementation speaks the Chrome DevTools Protocol over WebSocket to a
//! locally spawned Chrome/Edge process.

pub mod cdp;
pub mod chrome;
pub mod driver;
pub mod error;

pub use chrome::{find_browser_binary, list_available_browsers, BrowserEngine, CdpBrowser, ChromeLauncher};
pub use driver::{Browser, Element, Launcher};
pub use error::{BrowserError, BrowserResult};
