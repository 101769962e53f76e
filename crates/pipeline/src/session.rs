//! Browser session lifecycle.
//!
//! One `SessionManager` owns at most one live session. It creates the session
//! lazily, replaces it wholesale when it crashes, and recycles it after a
//! fixed number of successful operations. Retry of a unit of work lives here
//! and nowhere else.

use async_trait::async_trait;
use mapharvest_browser::{Browser, BrowserError, BrowserResult, Launcher};
use mapharvest_core::config::SessionConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One browser interaction, re-runnable from scratch on a fresh session.
#[async_trait]
pub trait Operation<B: Browser>: Send + Sync {
    type Output: Send;

    /// Short label for logs.
    fn describe(&self) -> String;

    async fn run(&self, browser: &B) -> BrowserResult<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Active,
    Crashed,
}

#[derive(Error, Debug)]
pub enum SessionError {
    /// Every attempt hit a dead session. The unit should be skipped.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: BrowserError },

    /// The automation runtime could not be started.
    #[error("browser runtime unavailable: {0}")]
    Fatal(BrowserError),

    /// The operation failed on a healthy session. Not retried.
    #[error(transparent)]
    Operation(BrowserError),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Fatal(_))
    }
}

impl From<SessionError> for mapharvest_core::Error {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Fatal(inner) | SessionError::Operation(inner) => inner.into(),
            exhausted => mapharvest_core::Error::Browser(exhausted.to_string()),
        }
    }
}

pub struct SessionManager<L: Launcher> {
    launcher: L,
    session: Option<L::Session>,
    state: SessionState,
    /// Successful operations on the current session.
    ops_in_session: u32,
    max_operations: u32,
    cooldown: Duration,
    max_attempts: u32,
    restarts: u32,
    rotations: u32,
}

impl<L: Launcher> SessionManager<L> {
    pub fn new(launcher: L, config: &SessionConfig) -> Self {
        Self {
            launcher,
            session: None,
            state: SessionState::Absent,
            ops_in_session: 0,
            max_operations: config.max_operations,
            cooldown: config.restart_cooldown(),
            max_attempts: config.max_attempts.max(1),
            restarts: 0,
            rotations: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sessions replaced after a crash.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Sessions replaced preventively.
    pub fn rotations(&self) -> u32 {
        self.rotations
    }

    /// Launch a session if none is live. Launch failure is fatal.
    pub async fn acquire(&mut self) -> Result<(), SessionError> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = self.launcher.launch().await.map_err(|e| {
            warn!(error = %e, "Browser launch failed");
            SessionError::Fatal(e)
        })?;
        self.session = Some(session);
        self.state = SessionState::Active;
        self.ops_in_session = 0;
        debug!("Browser session acquired");
        Ok(())
    }

    /// Run `op`, recovering from session crashes up to the attempt budget.
    ///
    /// Every session-invalid failure is followed by exactly one recovery, so
    /// the next unit always starts on a fresh session.
    pub async fn execute<O>(&mut self, op: &O) -> Result<O::Output, SessionError>
    where
        O: Operation<L::Session>,
    {
        self.rotate_if_due().await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.acquire().await?;

            let result = match self.session.as_ref() {
                Some(session) => op.run(session).await,
                None => Err(BrowserError::SessionInvalid("no live session".to_string())),
            };

            match result {
                Ok(output) => {
                    self.ops_in_session += 1;
                    return Ok(output);
                }
                Err(e) if e.is_session_invalid() => {
                    self.state = SessionState::Crashed;
                    warn!(
                        op = %op.describe(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Browser session crashed"
                    );
                    self.recover().await?;
                    if attempt >= self.max_attempts {
                        return Err(SessionError::Exhausted { attempts: attempt, last: e });
                    }
                }
                Err(e) => {
                    debug!(op = %op.describe(), error = %e, "Operation failed");
                    return Err(SessionError::Operation(e));
                }
            }
        }
    }

    /// Discard the session, wait out the cooldown, start a new one.
    pub async fn recover(&mut self) -> Result<(), SessionError> {
        self.discard().await;
        self.restarts += 1;
        info!(restarts = self.restarts, cooldown_secs = self.cooldown.as_secs(), "Restarting browser session");
        self.cool_down().await;
        self.acquire().await
    }

    /// Recycle the session once it has served `max_operations` operations.
    /// A threshold of zero disables rotation.
    pub async fn rotate_if_due(&mut self) -> Result<(), SessionError> {
        if self.session.is_none()
            || self.max_operations == 0
            || self.ops_in_session < self.max_operations
        {
            return Ok(());
        }
        info!(operations = self.ops_in_session, "Rotating browser session");
        self.discard().await;
        self.rotations += 1;
        self.cool_down().await;
        self.acquire().await
    }

    /// Shut the session down, if any.
    pub async fn close(&mut self) {
        self.discard().await;
    }

    async fn discard(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
        self.state = SessionState::Absent;
        self.ops_in_session = 0;
    }

    async fn cool_down(&self) {
        if !self.cooldown.is_zero() {
            tokio::time::sleep(self.cooldown).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, FakeSite};

    struct Visit(&'static str);

    #[async_trait]
    impl<B: Browser> Operation<B> for Visit {
        type Output = String;

        fn describe(&self) -> String {
            self.0.to_string()
        }

        async fn run(&self, browser: &B) -> BrowserResult<String> {
            browser.navigate(self.0).await?;
            browser.current_location().await
        }
    }

    fn config(max_operations: u32) -> SessionConfig {
        SessionConfig {
            max_operations,
            restart_cooldown_secs: 0,
            max_attempts: 2,
        }
    }

    #[tokio::test]
    async fn test_lazy_acquire() {
        let site = FakeSite::new();
        let mut manager = SessionManager::new(FakeLauncher::new(site.clone()), &config(15));
        assert_eq!(manager.state(), SessionState::Absent);
        assert_eq!(site.launches(), 0);

        let out = manager.execute(&Visit("https://x/1")).await.unwrap();
        assert_eq!(out, "https://x/1");
        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(site.launches(), 1);

        manager.close().await;
        assert_eq!(manager.state(), SessionState::Absent);
        assert_eq!(site.closes(), 1);
    }

    #[tokio::test]
    async fn test_always_faulting_unit_restarts_twice() {
        let site = FakeSite::new();
        site.always_fault("https://x/bad");
        let mut manager = SessionManager::new(FakeLauncher::new(site.clone()), &config(15));

        let err = manager.execute(&Visit("https://x/bad")).await.unwrap_err();
        assert!(matches!(err, SessionError::Exhausted { attempts: 2, .. }));
        assert_eq!(manager.restarts(), 2);

        // The next unit runs on the session brought up by the last recovery.
        let out = manager.execute(&Visit("https://x/good")).await.unwrap();
        assert_eq!(out, "https://x/good");
        assert_eq!(manager.restarts(), 2);
        assert_eq!(site.launches(), 3);
    }

    #[tokio::test]
    async fn test_single_fault_recovers() {
        let site = FakeSite::new();
        site.fault_times("https://x/flaky", 1);
        let mut manager = SessionManager::new(FakeLauncher::new(site.clone()), &config(15));

        let out = manager.execute(&Visit("https://x/flaky")).await.unwrap();
        assert_eq!(out, "https://x/flaky");
        assert_eq!(manager.restarts(), 1);
        assert_eq!(site.navigations("https://x/flaky"), 2);
    }

    #[tokio::test]
    async fn test_rotation_after_threshold() {
        let site = FakeSite::new();
        let mut manager = SessionManager::new(FakeLauncher::new(site.clone()), &config(3));

        for i in 0..3 {
            manager.execute(&Visit("https://x/ok")).await.unwrap();
            assert_eq!(site.launches(), 1, "no rotation before op {}", i + 1);
        }
        manager.execute(&Visit("https://x/ok")).await.unwrap();
        assert_eq!(manager.rotations(), 1);
        assert_eq!(manager.restarts(), 0);
        assert_eq!(site.launches(), 2);
        assert_eq!(site.closes(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_fatal() {
        let site = FakeSite::new();
        site.fail_launches();
        let mut manager = SessionManager::new(FakeLauncher::new(site.clone()), &config(15));

        let err = manager.execute(&Visit("https://x/1")).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(site.launches(), 1);
    }

    #[tokio::test]
    async fn test_non_session_error_not_retried() {
        let site = FakeSite::new();
        site.protocol_error("https://x/broken");
        let mut manager = SessionManager::new(FakeLauncher::new(site.clone()), &config(15));

        let err = manager.execute(&Visit("https://x/broken")).await.unwrap_err();
        assert!(matches!(err, SessionError::Operation(BrowserError::Protocol(_))));
        assert_eq!(manager.restarts(), 0);
        assert_eq!(site.navigations("https://x/broken"), 1);
        assert_eq!(manager.state(), SessionState::Active);
    }
}
