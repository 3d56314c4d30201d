//! Background sweep that refreshes stale or missing snapshot entries in
//! bounded batches (§4.11). The engine-internal analogue of the lineage's
//! `PollerState`/`SharedPollerState` — no HTTP status route here, just a
//! snapshot struct an embedding surface can expose however it likes.

use crate::config::WeatherCoreConfig;
use crate::region::RegionCatalog;
use crate::resolver::{ResolveInput, ResolveMode, Resolver};
use crate::snapshot::SnapshotStore;
use chrono::{Datelike, DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Counters from the most recently completed batch, readable without
/// blocking an in-progress sweep.
#[derive(Debug, Clone, Default)]
pub struct AutoUpdaterStatus {
    pub running: bool,
    pub last_batch_started_at: Option<DateTime<Utc>>,
    pub last_batch_completed_at: Option<DateTime<Utc>>,
    pub last_batch_refreshed: usize,
    pub last_batch_still_stale: usize,
    pub last_batch_errors: usize,
    pub total_batches: u64,
}

struct AutoUpdaterState {
    last_batch_started_at: Option<DateTime<Utc>>,
    last_batch_completed_at: Option<DateTime<Utc>>,
    last_batch_refreshed: usize,
    last_batch_still_stale: usize,
    last_batch_errors: usize,
    total_batches: u64,
}

impl AutoUpdaterState {
    fn new() -> Self {
        Self {
            last_batch_started_at: None,
            last_batch_completed_at: None,
            last_batch_refreshed: 0,
            last_batch_still_stale: 0,
            last_batch_errors: 0,
            total_batches: 0,
        }
    }
}

/// Sweeps the region × month space for stale or missing snapshot entries
/// and refreshes a bounded batch of them each interval.
pub struct AutoUpdater {
    config: WeatherCoreConfig,
    regions: Arc<RegionCatalog>,
    snapshots: Arc<SnapshotStore>,
    resolver: Arc<Resolver>,
    running: AtomicBool,
    state: Mutex<AutoUpdaterState>,
}

impl AutoUpdater {
    pub fn new(
        config: WeatherCoreConfig,
        regions: Arc<RegionCatalog>,
        snapshots: Arc<SnapshotStore>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            config,
            regions,
            snapshots,
            resolver,
            running: AtomicBool::new(false),
            state: Mutex::new(AutoUpdaterState::new()),
        }
    }

    pub async fn status(&self) -> AutoUpdaterStatus {
        let s = self.state.lock().await;
        AutoUpdaterStatus {
            running: self.running.load(Ordering::SeqCst),
            last_batch_started_at: s.last_batch_started_at,
            last_batch_completed_at: s.last_batch_completed_at,
            last_batch_refreshed: s.last_batch_refreshed,
            last_batch_still_stale: s.last_batch_still_stale,
            last_batch_errors: s.last_batch_errors,
            total_batches: s.total_batches,
        }
    }

    /// Run the background loop. Never returns; spawn via `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        if !self.config.auto_update_enabled {
            tracing::info!("auto-updater disabled, not starting");
            return;
        }
        tracing::info!(interval = ?self.config.auto_update_interval, "auto-updater started");
        loop {
            self.run_batch().await;
            tokio::time::sleep(self.config.auto_update_interval).await;
        }
    }

    /// Run a single batch. A `running` guard prevents overlapping sweeps —
    /// if the previous batch is still in flight (e.g. the interval is
    /// shorter than a batch takes), this call is a no-op.
    pub async fn run_batch(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("auto-updater batch already running, skipping");
            return;
        }

        let started_at = Utc::now();
        {
            let mut s = self.state.lock().await;
            s.last_batch_started_at = Some(started_at);
        }

        let targets = self.collect_stale_targets();
        let total = targets.len();
        tracing::info!(total, "auto-updater batch starting");

        let mut refreshed = 0usize;
        let mut still_stale = 0usize;
        let mut errors = 0usize;

        for (i, (region_id, month, is_coastal)) in targets.into_iter().enumerate() {
            let input = ResolveInput {
                region_id: region_id.clone(),
                month,
                include_marine: is_coastal,
                mode: ResolveMode::RefreshIfStale,
                allow_stale_snapshot: true,
            };
            match self.resolver.resolve_weather_summary_for_region_month(input).await {
                Ok(resolved) => match resolved.source {
                    crate::resolver::ResolveSource::Refreshed => refreshed += 1,
                    _ => still_stale += 1,
                },
                Err(err) => {
                    errors += 1;
                    tracing::warn!(region = %region_id, month, error = %err, "auto-updater target failed");
                }
            }

            if i + 1 < self.config.auto_update_batch_size {
                tokio::time::sleep(self.config.upstream_request_spacing).await;
            }
        }

        {
            let mut s = self.state.lock().await;
            s.last_batch_completed_at = Some(Utc::now());
            s.last_batch_refreshed = refreshed;
            s.last_batch_still_stale = still_stale;
            s.last_batch_errors = errors;
            s.total_batches += 1;
        }

        tracing::info!(refreshed, still_stale, errors, "auto-updater batch complete");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Enumerate `(regionId, month, isCoastal)` targets that are missing or
    /// stale, capped at `auto_update_batch_size` (§4.11). Staleness is
    /// checked against each region's own marine requirement so a coastal
    /// region's marine coverage is swept too, not just its climate/air data.
    fn collect_stale_targets(&self) -> Vec<(String, u32, bool)> {
        let baseline_years = self.config.baseline_years(Utc::now().year());
        let batch_size = self.config.auto_update_batch_size;

        let mut targets = Vec::new();
        'regions: for region_id in self.regions.sorted_ids() {
            let Some(region) = self.regions.get(&region_id) else { continue };
            let file = self.snapshots.read(&region_id);
            for month in 1..=12u32 {
                let missing = file.get_month(month).is_none();
                let stale = !missing
                    && self
                        .snapshots
                        .stale_reason(&file, month, &baseline_years, region.is_coastal)
                        .is_some();
                if missing || stale {
                    targets.push((region_id.clone(), month, region.is_coastal));
                    if targets.len() >= batch_size {
                        break 'regions;
                    }
                }
            }
        }
        targets
    }
}
