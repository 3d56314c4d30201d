//! Outbound HTTP orchestration: the single-slot scheduler (§4.1), the
//! retrying fetcher built on top of it (§4.2), and the per-region year
//! cache shared by the range loaders (§4.3).

pub mod fetcher;
pub mod scheduler;
pub mod year_cache;

pub use fetcher::RetryingFetcher;
pub use scheduler::UpstreamScheduler;
pub(crate) use year_cache::YearCache;
