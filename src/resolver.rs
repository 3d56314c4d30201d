//! The public contract (§4.10): combines snapshot freshness, manual
//! overrides, and the requested mode to decide what to return and what,
//! if anything, to refresh.

use crate::builder::SummaryBuilder;
use crate::cache::SummaryCache;
use crate::coalescer::SingleFlight;
use crate::config::WeatherCoreConfig;
use crate::errors::CoreError;
use crate::manual::ManualOverrideLoader;
use crate::model::{CacheKey, MonthlySummary, SnapshotMonthEntry};
use crate::region::RegionCatalog;
use crate::snapshot::SnapshotStore;
use chrono::{Datelike, Utc};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    VerifiedOnly,
    RefreshIfStale,
    ForceRefresh,
}

/// Input to [`Resolver::resolve_weather_summary_for_region_month`] (§4.10).
#[derive(Debug, Clone)]
pub struct ResolveInput {
    pub region_id: String,
    pub month: u32,
    pub include_marine: bool,
    pub mode: ResolveMode,
    pub allow_stale_snapshot: bool,
}

impl ResolveInput {
    pub fn new(region_id: impl Into<String>, month: u32, include_marine: bool, mode: ResolveMode) -> Self {
        Self {
            region_id: region_id.into(),
            month,
            include_marine,
            mode,
            allow_stale_snapshot: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    Refreshed,
    SnapshotFresh,
    SnapshotStale,
}

#[derive(Debug, Clone)]
pub struct ResolvedSummary {
    pub summary: MonthlySummary,
    pub source: ResolveSource,
}

pub struct Resolver {
    config: WeatherCoreConfig,
    regions: Arc<RegionCatalog>,
    builder: Arc<SummaryBuilder>,
    cache: Arc<SummaryCache>,
    snapshots: Arc<SnapshotStore>,
    manual: Arc<ManualOverrideLoader>,
    single_flight: Arc<SingleFlight>,
}

impl Resolver {
    pub fn new(
        config: WeatherCoreConfig,
        regions: Arc<RegionCatalog>,
        builder: Arc<SummaryBuilder>,
        cache: Arc<SummaryCache>,
        snapshots: Arc<SnapshotStore>,
        manual: Arc<ManualOverrideLoader>,
        single_flight: Arc<SingleFlight>,
    ) -> Self {
        Self { config, regions, builder, cache, snapshots, manual, single_flight }
    }

    pub fn list_weather_region_ids(&self) -> Vec<String> {
        self.regions.sorted_ids()
    }

    /// Thin wrapper over the full contract that drops the `source` tag (§6).
    pub async fn get_weather_summary_for_region_month(
        &self,
        input: ResolveInput,
    ) -> Result<MonthlySummary, CoreError> {
        self.resolve_weather_summary_for_region_month(input)
            .await
            .map(|resolved| resolved.summary)
    }

    /// The full decision table (§4.10, first match wins).
    pub async fn resolve_weather_summary_for_region_month(
        &self,
        input: ResolveInput,
    ) -> Result<ResolvedSummary, CoreError> {
        if !(1..=12).contains(&input.month) {
            return Err(CoreError::Validation(format!("month {} out of range 1..12", input.month)));
        }
        let region = self
            .regions
            .get(&input.region_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownRegion(input.region_id.clone()))?;

        let effective_include_marine = input.include_marine && region.is_coastal;
        let current_year = Utc::now().year();
        let baseline_years = self.config.baseline_years(current_year);

        let file = self.snapshots.read(&region.id);
        let existing_entry = file.get_month(input.month).cloned();
        let stale_reason = existing_entry.as_ref().and_then(|_| {
            self.snapshots.stale_reason(&file, input.month, &baseline_years, effective_include_marine)
        });
        let is_fresh = existing_entry.is_some() && stale_reason.is_none();
        let manual_summary = self.manual.get(&region.id, input.month).await;

        if input.mode != ResolveMode::ForceRefresh {
            if is_fresh {
                let entry = existing_entry.as_ref().expect("is_fresh implies Some");
                return Ok(ResolvedSummary {
                    summary: apply_marine_pref(entry.summary.clone(), effective_include_marine),
                    source: ResolveSource::SnapshotFresh,
                });
            }

            if let Some(manual) = manual_summary.clone() {
                return Ok(ResolvedSummary {
                    summary: apply_marine_pref(manual, effective_include_marine),
                    source: ResolveSource::SnapshotFresh,
                });
            }

            if input.mode == ResolveMode::VerifiedOnly {
                if input.allow_stale_snapshot {
                    if let Some(entry) = &existing_entry {
                        return Ok(ResolvedSummary {
                            summary: apply_marine_pref(entry.summary.clone(), effective_include_marine),
                            source: ResolveSource::SnapshotStale,
                        });
                    }
                }
                return Err(CoreError::NoVerifiedData { region_id: region.id.clone(), month: input.month });
            }

            // RefreshIfStale with no fresh snapshot and no manual data falls
            // through to the refresh path below.
        }

        let key = CacheKey::new(&region.id, input.month, effective_include_marine, baseline_years.clone());
        match self.run_build(&region, input.month, &baseline_years, effective_include_marine, &key).await {
            Ok(summary) => {
                self.write_through(&region.id, input.month, effective_include_marine, &baseline_years, &summary)
                    .await?;
                Ok(ResolvedSummary {
                    summary: apply_marine_pref(summary, effective_include_marine),
                    source: ResolveSource::Refreshed,
                })
            }
            Err(build_err) => {
                if input.allow_stale_snapshot {
                    if let Some(entry) = existing_entry {
                        warn!(region = %region.id, month = input.month, error = %build_err, "refresh failed, falling back to stale snapshot");
                        return Ok(ResolvedSummary {
                            summary: apply_marine_pref(entry.summary, effective_include_marine),
                            source: ResolveSource::SnapshotStale,
                        });
                    }
                    if let Some(manual) = manual_summary {
                        warn!(region = %region.id, month = input.month, error = %build_err, "refresh failed, falling back to manual override");
                        return Ok(ResolvedSummary {
                            summary: apply_marine_pref(manual, effective_include_marine),
                            source: ResolveSource::SnapshotStale,
                        });
                    }
                }
                Err(build_err)
            }
        }
    }

    /// Build (or reuse a cached build of) a summary for the exact key,
    /// coalescing concurrent identical requests through the Single-Flight
    /// Coalescer (§4.7). The content-addressed cache is consulted first —
    /// it has no time-based expiry of its own, so a hit here means some
    /// earlier resolve already computed this exact `(region, month,
    /// includeMarine, baselineYears)` combination.
    async fn run_build(
        &self,
        region: &crate::region::Region,
        month: u32,
        baseline_years: &[i32],
        include_marine: bool,
        key: &CacheKey,
    ) -> Result<MonthlySummary, CoreError> {
        if let Some(cached) = self.cache.get(key).await {
            return Ok(cached);
        }

        let builder = self.builder.clone();
        let region = region.clone();
        let baseline_years = baseline_years.to_vec();
        let build_fut = async move { builder.build(&region, month, &baseline_years, include_marine).await };

        self.single_flight
            .run(key.canonical_json(), build_fut)
            .await
            .map(|summary| (*summary).clone())
            .map_err(|err| CoreError::BuildFailed(err.to_string()))
    }

    async fn write_through(
        &self,
        region_id: &str,
        month: u32,
        include_marine: bool,
        baseline_years: &[i32],
        summary: &MonthlySummary,
    ) -> Result<(), CoreError> {
        let key = CacheKey::new(region_id, month, include_marine, baseline_years.to_vec());
        self.cache.put(&key, summary).await?;

        let entry = SnapshotMonthEntry {
            month,
            includes_marine: include_marine,
            baseline_years: baseline_years.to_vec(),
            fetched_at: Utc::now(),
            source: "open-meteo".to_string(),
            summary: summary.clone(),
        };
        self.snapshots.upsert(region_id, entry).await?;
        Ok(())
    }
}

/// `withMarinePreference` (§4.10): every returned summary is nulled of wave
/// fields unless the caller wants marine data and the region carries it.
fn apply_marine_pref(summary: MonthlySummary, include_marine: bool) -> MonthlySummary {
    if include_marine {
        summary
    } else {
        summary.without_marine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::{AirLoader, ClimateLoader, MarineLoader};
    use crate::region::Region;
    use crate::upstream::{RetryingFetcher, UpstreamScheduler};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn coastal_region() -> Region {
        Region { id: "vn-da-nang".to_string(), latitude: 16.05, longitude: 108.2, is_coastal: true }
    }

    fn inland_region() -> Region {
        Region { id: "at-innsbruck".to_string(), latitude: 47.27, longitude: 11.39, is_coastal: false }
    }

    fn climate_body() -> serde_json::Value {
        serde_json::json!({
            "daily": {
                "time": ["2024-07-01", "2024-07-02"],
                "temperature_2m_mean": [20.0, 22.0],
                "precipitation_sum": [1.0, 2.0],
                "relative_humidity_2m_mean": [80.0, 82.0],
                "wind_speed_10m_mean": [10.0, 11.0],
            }
        })
    }

    async fn harness(regions: Vec<Region>) -> (MockServer, tempfile::TempDir, Resolver, WeatherCoreConfig) {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200).set_body_json(climate_body())).mount(&server).await;

        let mut config = WeatherCoreConfig::from_env();
        config.climate_base_urls = vec![server.uri()];
        config.air_quality_base_url = server.uri();
        config.marine_base_url = server.uri();
        config.fetch_timeout = std::time::Duration::from_secs(2);
        config.max_attempts = 1;
        config.upstream_request_spacing = std::time::Duration::from_millis(0);
        config.baseline_years_window = 1;

        let dir = tempfile::tempdir().unwrap();
        config.cache_dir = dir.path().join("cache").to_string_lossy().to_string();
        config.snapshot_dir = dir.path().join("snapshot").to_string_lossy().to_string();
        std::fs::create_dir_all(&config.cache_dir).unwrap();
        std::fs::create_dir_all(&config.snapshot_dir).unwrap();

        let scheduler = Arc::new(UpstreamScheduler::new(config.upstream_request_spacing));
        let fetcher = Arc::new(RetryingFetcher::new(&config, scheduler));
        let climate = Arc::new(ClimateLoader::new(&config, fetcher.clone()));
        let air = Arc::new(AirLoader::new(&config, fetcher.clone()));
        let marine = Arc::new(MarineLoader::new(&config, fetcher));
        let builder = Arc::new(SummaryBuilder::new(climate, air, marine));

        let resolver = Resolver::new(
            config.clone(),
            Arc::new(RegionCatalog::new(regions)),
            builder,
            Arc::new(SummaryCache::new(&config.cache_dir)),
            Arc::new(SnapshotStore::new(&config)),
            Arc::new(ManualOverrideLoader::new(None::<String>)),
            Arc::new(SingleFlight::new()),
        );
        (server, dir, resolver, config)
    }

    #[tokio::test]
    async fn fresh_snapshot_hit_returns_without_upstream_calls() {
        let (server, _dir, resolver, config) = harness(vec![coastal_region()]).await;
        let _ = &server;

        let baseline_years = config.baseline_years(Utc::now().year());
        let mut summary = MonthlySummary::empty();
        summary.temperature_c = Some(crate::model::round2(21.0));
        summary.climate_last_updated = Some(Utc::now());
        summary.air_quality_last_updated = Some(Utc::now());
        summary.marine_last_updated = Some(Utc::now());

        let entry = SnapshotMonthEntry {
            month: 7,
            includes_marine: false,
            baseline_years: baseline_years.clone(),
            fetched_at: Utc::now(),
            source: "open-meteo".to_string(),
            summary: summary.clone(),
        };
        resolver.snapshots.upsert("vn-da-nang", entry).await.unwrap();

        let input = ResolveInput::new("vn-da-nang", 7, false, ResolveMode::VerifiedOnly);
        let resolved = resolver.resolve_weather_summary_for_region_month(input).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::SnapshotFresh);
        assert_eq!(resolved.summary.temperature_c, summary.temperature_c);
    }

    #[tokio::test]
    async fn verified_only_with_nothing_available_fails_with_run_refresh_message() {
        let (_server, _dir, resolver, _config) = harness(vec![coastal_region()]).await;
        let input = ResolveInput::new("vn-da-nang", 7, false, ResolveMode::VerifiedOnly);
        let err = resolver.resolve_weather_summary_for_region_month(input).await.unwrap_err();
        assert!(matches!(err, CoreError::NoVerifiedData { .. }));
    }

    #[tokio::test]
    async fn refresh_if_stale_builds_then_verified_only_sees_fresh_snapshot() {
        let (_server, _dir, resolver, _config) = harness(vec![coastal_region()]).await;

        let refreshed = resolver
            .resolve_weather_summary_for_region_month(ResolveInput::new(
                "vn-da-nang",
                7,
                false,
                ResolveMode::RefreshIfStale,
            ))
            .await
            .unwrap();
        assert_eq!(refreshed.source, ResolveSource::Refreshed);
        assert!(refreshed.summary.temperature_c.is_some());

        let second = resolver
            .resolve_weather_summary_for_region_month(ResolveInput::new(
                "vn-da-nang",
                7,
                false,
                ResolveMode::VerifiedOnly,
            ))
            .await
            .unwrap();
        assert_eq!(second.source, ResolveSource::SnapshotFresh);
        assert_eq!(second.summary.temperature_c, refreshed.summary.temperature_c);
    }

    #[tokio::test]
    async fn inland_region_never_returns_marine_even_when_requested() {
        let (_server, _dir, resolver, _config) = harness(vec![inland_region()]).await;
        let resolved = resolver
            .resolve_weather_summary_for_region_month(ResolveInput::new(
                "at-innsbruck",
                7,
                true,
                ResolveMode::RefreshIfStale,
            ))
            .await
            .unwrap();
        assert_eq!(resolved.summary.wave_height_m, None);
    }

    #[tokio::test]
    async fn manual_override_used_when_no_snapshot_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("r2.json"),
            serde_json::to_vec(&serde_json::json!({
                "regionId": "r2",
                "months": [{"month": 11, "temperature_c": 18.5}]
            }))
            .unwrap(),
        )
        .unwrap();

        let (_server, _dir, mut resolver, _config) =
            harness(vec![Region { id: "r2".to_string(), latitude: 0.0, longitude: 0.0, is_coastal: false }]).await;
        resolver.manual = Arc::new(ManualOverrideLoader::new(Some(dir.path().to_path_buf())));

        let resolved = resolver
            .resolve_weather_summary_for_region_month(ResolveInput::new("r2", 11, false, ResolveMode::VerifiedOnly))
            .await
            .unwrap();
        assert_eq!(resolved.source, ResolveSource::SnapshotFresh);
        assert_eq!(resolved.summary.temperature_c.unwrap().to_string(), "18.50");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_falls_back_to_stale_snapshot_and_extends_cooldown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "60"))
            .mount(&server)
            .await;

        let mut config = WeatherCoreConfig::from_env();
        config.climate_base_urls = vec![server.uri()];
        config.air_quality_base_url = server.uri();
        config.marine_base_url = server.uri();
        config.fetch_timeout = std::time::Duration::from_millis(200);
        config.max_attempts = 1;
        config.upstream_request_spacing = std::time::Duration::from_millis(0);
        config.baseline_years_window = 1;

        let dir = tempfile::tempdir().unwrap();
        config.cache_dir = dir.path().join("cache").to_string_lossy().to_string();
        config.snapshot_dir = dir.path().join("snapshot").to_string_lossy().to_string();
        std::fs::create_dir_all(&config.cache_dir).unwrap();
        std::fs::create_dir_all(&config.snapshot_dir).unwrap();

        let scheduler = Arc::new(crate::upstream::UpstreamScheduler::new(config.upstream_request_spacing));
        let fetcher = Arc::new(crate::upstream::RetryingFetcher::new(&config, scheduler.clone()));
        let climate = Arc::new(ClimateLoader::new(&config, fetcher.clone()));
        let air = Arc::new(AirLoader::new(&config, fetcher.clone()));
        let marine = Arc::new(MarineLoader::new(&config, fetcher));
        let builder = Arc::new(SummaryBuilder::new(climate, air, marine));
        let snapshots = Arc::new(SnapshotStore::new(&config));

        let resolver = Resolver::new(
            config.clone(),
            Arc::new(RegionCatalog::new(vec![coastal_region()])),
            builder,
            Arc::new(SummaryCache::new(&config.cache_dir)),
            snapshots.clone(),
            Arc::new(ManualOverrideLoader::new(None::<String>)),
            Arc::new(SingleFlight::new()),
        );

        let baseline_years = config.baseline_years(Utc::now().year());
        let mut stale_summary = MonthlySummary::empty();
        stale_summary.temperature_c = Some(crate::model::round2(19.0));
        stale_summary.climate_last_updated = Some(Utc::now() - chrono::Duration::days(400));
        stale_summary.air_quality_last_updated = Some(Utc::now() - chrono::Duration::days(400));
        stale_summary.marine_last_updated = Some(Utc::now() - chrono::Duration::days(400));
        snapshots
            .upsert(
                "vn-da-nang",
                SnapshotMonthEntry {
                    month: 7,
                    includes_marine: false,
                    baseline_years,
                    fetched_at: Utc::now() - chrono::Duration::days(400),
                    source: "open-meteo".to_string(),
                    summary: stale_summary.clone(),
                },
            )
            .await
            .unwrap();

        let resolved = resolver
            .resolve_weather_summary_for_region_month(ResolveInput::new(
                "vn-da-nang",
                7,
                false,
                ResolveMode::RefreshIfStale,
            ))
            .await
            .unwrap();

        assert_eq!(resolved.source, ResolveSource::SnapshotStale);
        assert_eq!(resolved.summary.temperature_c, stale_summary.temperature_c);
        // Real wall-clock time has ticked forward a little since the 429
        // extended the cooldown from an earlier `Utc::now()`; allow a few
        // seconds of slack rather than asserting the exact 60s floor.
        assert!(scheduler.cooldown_until() >= Utc::now() + chrono::Duration::seconds(55));
    }

    #[tokio::test]
    async fn force_refresh_bypasses_an_already_fresh_snapshot() {
        let (_server, _dir, resolver, config) = harness(vec![coastal_region()]).await;
        let baseline_years = config.baseline_years(Utc::now().year());

        let mut stale_summary = MonthlySummary::empty();
        stale_summary.temperature_c = Some(crate::model::round2(99.0));
        stale_summary.climate_last_updated = Some(Utc::now());
        stale_summary.air_quality_last_updated = Some(Utc::now());
        stale_summary.marine_last_updated = Some(Utc::now());
        resolver
            .snapshots
            .upsert(
                "vn-da-nang",
                SnapshotMonthEntry {
                    month: 7,
                    includes_marine: false,
                    baseline_years,
                    fetched_at: Utc::now(),
                    source: "open-meteo".to_string(),
                    summary: stale_summary,
                },
            )
            .await
            .unwrap();

        let resolved = resolver
            .resolve_weather_summary_for_region_month(ResolveInput::new(
                "vn-da-nang",
                7,
                false,
                ResolveMode::ForceRefresh,
            ))
            .await
            .unwrap();
        assert_eq!(resolved.source, ResolveSource::Refreshed);
        assert_ne!(resolved.summary.temperature_c.unwrap().to_string(), "99.00");
    }
}
