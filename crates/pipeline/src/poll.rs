use mapharvest_browser::BrowserResult;
use std::future::Future;
use std::time::{Duration, Instant};

/// Default gap between two checks of a page condition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of a bounded poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Polled<T> {
    Ready(T),
    TimedOut,
}

impl<T> Polled<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Polled::Ready(v) => Some(v),
            Polled::TimedOut => None,
        }
    }
}

/// Run `check` every `interval` until it yields `Some`, or `timeout` has
/// elapsed. The check always runs at least once. Check errors end the poll
/// immediately so a dead session is never waited on.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> BrowserResult<Polled<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BrowserResult<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check().await? {
            return Ok(Polled::Ready(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(Polled::TimedOut);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
