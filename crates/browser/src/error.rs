use thiserror::Error;

/// Failures surfaced by a browser session.
///
/// Only `SessionInvalid` means the session must be thrown away; every other
/// variant leaves the session usable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrowserError {
    #[error("browser session is no longer usable: {0}")]
    SessionInvalid(String),

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("browser could not be started: {0}")]
    Launch(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, BrowserError::SessionInvalid(_))
    }
}

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

impl From<BrowserError> for mapharvest_core::Error {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::Launch(msg) => mapharvest_core::Error::Launch(msg),
            BrowserError::Timeout(msg) => mapharvest_core::Error::Timeout(msg),
            other => mapharvest_core::Error::Browser(other.to_string()),
        }
    }
}
