//! The resumable two-phase crawl.
//!
//! `HarvestStage` turns query units into listing references, `EnrichStage`
//! turns listing references into contact records, and `Pipeline` runs them
//! in order. All browser work goes through a `SessionManager`, which owns
//! crash recovery and preventive rotation.

pub mod dedup;
pub mod enrich;
pub mod filter;
pub mod harvest;
pub mod orchestrator;
pub mod pacer;
pub mod phone;
pub mod poll;
pub mod session;
pub mod stats;

#[cfg(test)]
mod testing;

pub use dedup::DedupIndex;
pub use enrich::{DetailPage, EnrichStage, ReadDetail};
pub use filter::{evaluate, Exclusion, Verdict};
pub use harvest::{search_url, Candidate, HarvestStage, ListingPage, LoadListings};
pub use orchestrator::Pipeline;
pub use pacer::Pacer;
pub use phone::{policy_for_locale, NationalPhonePolicy, PhonePolicy};
pub use poll::{poll_until, Polled};
pub use session::{Operation, SessionError, SessionManager, SessionState};
pub use stats::StageStats;
