//! Tiered cache + upstream orchestration engine for monthly regional
//! climate summaries (§2.1).
//!
//! [`WeatherCore`] is constructed once per process and shared via `Arc`
//! across whatever async tasks call into it — there is no ambient global
//! state here, unlike the lineage's `PgPool`/`YrClient` which travel
//! through `axum` extension state instead.

pub mod aggregator;
pub mod auto_updater;
pub mod builder;
pub mod cache;
pub mod coalescer;
pub mod config;
pub mod errors;
pub mod helpers;
pub mod loaders;
pub mod manual;
pub mod model;
pub mod region;
pub mod resolver;
pub mod snapshot;
pub mod upstream;

use std::sync::Arc;

use auto_updater::{AutoUpdater, AutoUpdaterStatus};
use builder::SummaryBuilder;
use cache::SummaryCache;
use coalescer::SingleFlight;
use config::WeatherCoreConfig;
use loaders::{AirLoader, ClimateLoader, MarineLoader};
use manual::ManualOverrideLoader;
use region::{Region, RegionCatalog};
use resolver::{ResolveInput, ResolvedSummary, Resolver};
use snapshot::SnapshotStore;
use upstream::{RetryingFetcher, UpstreamScheduler};

pub use errors::CoreError;
pub use model::MonthlySummary;
pub use resolver::{ResolveMode, ResolveSource};

/// The engine: one instance per process, wired once at startup and shared
/// via `Arc` from there (§2.1, §5).
pub struct WeatherCore {
    config: WeatherCoreConfig,
    resolver: Arc<Resolver>,
    auto_updater: Arc<AutoUpdater>,
}

impl WeatherCore {
    /// Wire every component from a parsed config and a region catalog:
    /// scheduler → retrying fetcher → the three range loaders → builder,
    /// plus the cache, snapshot store, manual loader, and single-flight
    /// coalescer the Resolver needs, and the auto-updater sitting on top.
    pub fn new(config: WeatherCoreConfig, regions: Vec<Region>) -> Self {
        let regions = Arc::new(RegionCatalog::new(regions));

        let scheduler = Arc::new(UpstreamScheduler::new(config.upstream_request_spacing));
        let fetcher = Arc::new(RetryingFetcher::new(&config, scheduler));
        let climate = Arc::new(ClimateLoader::new(&config, fetcher.clone()));
        let air = Arc::new(AirLoader::new(&config, fetcher.clone()));
        let marine = Arc::new(MarineLoader::new(&config, fetcher));
        let builder = Arc::new(SummaryBuilder::new(climate, air, marine));

        let cache = Arc::new(SummaryCache::new(config.cache_dir.clone()));
        let snapshots = Arc::new(SnapshotStore::new(&config));
        let manual = Arc::new(ManualOverrideLoader::new(Some(config.manual_data_dir.clone())));
        let single_flight = Arc::new(SingleFlight::new());

        let resolver = Arc::new(Resolver::new(
            config.clone(),
            regions.clone(),
            builder,
            cache,
            snapshots.clone(),
            manual,
            single_flight,
        ));

        let auto_updater = Arc::new(AutoUpdater::new(config.clone(), regions, snapshots, resolver.clone()));

        Self { config, resolver, auto_updater }
    }

    /// `resolveWeatherSummaryForRegionMonth` (§6): the full decision
    /// table, including the `source` tag.
    pub async fn resolve_weather_summary_for_region_month(
        &self,
        input: ResolveInput,
    ) -> Result<ResolvedSummary, CoreError> {
        self.resolver.resolve_weather_summary_for_region_month(input).await
    }

    /// `getWeatherSummaryForRegionMonth` (§6): thin wrapper over
    /// [`Self::resolve_weather_summary_for_region_month`] that drops the
    /// `source` tag.
    pub async fn get_weather_summary_for_region_month(
        &self,
        input: ResolveInput,
    ) -> Result<MonthlySummary, CoreError> {
        self.resolver.get_weather_summary_for_region_month(input).await
    }

    /// `listWeatherRegionIds` (§6).
    pub fn list_weather_region_ids(&self) -> Vec<String> {
        self.resolver.list_weather_region_ids()
    }

    /// `startWeatherSnapshotAutoUpdater` (§6): spawns the background sweep
    /// as a detached task. A no-op if `WEATHER_SNAPSHOT_AUTO_UPDATE_ENABLED`
    /// is false (§4.11).
    pub fn start_weather_snapshot_auto_updater(&self) {
        let updater = self.auto_updater.clone();
        tokio::spawn(async move { updater.run().await });
    }

    /// Snapshot of the auto-updater's last completed batch, for an
    /// embedding surface to expose however it likes (§4.11).
    pub async fn auto_updater_status(&self) -> AutoUpdaterStatus {
        self.auto_updater.status().await
    }

    pub fn config(&self) -> &WeatherCoreConfig {
        &self.config
    }
}
