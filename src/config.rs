//! Engine configuration, parsed from environment variables (§6).
//!
//! Every key is optional with a documented default, following the same
//! `env::var(...).unwrap_or_else(...)` shape throughout rather than a
//! config-file format — there is nothing here that needs layering or
//! reloading.

use std::time::Duration;

/// Configuration for a [`crate::WeatherCore`][core], parsed from the
/// environment (§6). All fields carry spec-documented defaults.
///
/// [core]: crate::WeatherCore
#[derive(Debug, Clone)]
pub struct WeatherCoreConfig {
    pub fetch_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_min_backoff: Duration,
    pub upstream_request_spacing: Duration,
    pub year_cache_max_entries: usize,
    pub baseline_years_window: u32,
    pub snapshot_climate_max_age_days: i64,
    pub snapshot_air_max_age_days: i64,
    pub snapshot_marine_max_age_days: i64,
    pub auto_update_enabled: bool,
    pub auto_update_interval: Duration,
    pub auto_update_batch_size: usize,
    pub manual_data_dir: String,
    pub cache_dir: String,
    pub snapshot_dir: String,
    pub climate_base_urls: Vec<String>,
    pub air_quality_base_url: String,
    pub marine_base_url: String,
}

impl WeatherCoreConfig {
    pub fn from_env() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(env_u64(
                "WEATHER_SUMMARY_TIMEOUT_MS",
                12_000,
            )),
            max_attempts: env_u64("WEATHER_SUMMARY_ATTEMPTS", 3) as u32,
            retry_base_delay: Duration::from_millis(env_u64(
                "WEATHER_SUMMARY_RETRY_BASE_DELAY_MS",
                900,
            )),
            rate_limit_min_backoff: Duration::from_millis(env_u64(
                "WEATHER_RATE_LIMIT_MIN_BACKOFF_MS",
                45_000,
            )),
            upstream_request_spacing: Duration::from_millis(env_u64(
                "WEATHER_UPSTREAM_REQUEST_SPACING_MS",
                350,
            )),
            year_cache_max_entries: env_u64("WEATHER_YEAR_CACHE_MAX_ENTRIES", 6) as usize,
            baseline_years_window: env_u64("WEATHER_BASELINE_YEARS", 3) as u32,
            snapshot_climate_max_age_days: env_u64("WEATHER_SNAPSHOT_CLIMATE_MAX_AGE_DAYS", 365)
                as i64,
            snapshot_air_max_age_days: env_u64("WEATHER_SNAPSHOT_AIR_MAX_AGE_DAYS", 90) as i64,
            snapshot_marine_max_age_days: env_u64("WEATHER_SNAPSHOT_MARINE_MAX_AGE_DAYS", 365)
                as i64,
            auto_update_enabled: env_bool("WEATHER_SNAPSHOT_AUTO_UPDATE_ENABLED", true),
            auto_update_interval: Duration::from_secs(
                env_u64("WEATHER_SNAPSHOT_AUTO_INTERVAL_MINUTES", 360) * 60,
            ),
            auto_update_batch_size: env_u64("WEATHER_SNAPSHOT_AUTO_BATCH_SIZE", 24) as usize,
            manual_data_dir: std::env::var("WEATHER_MANUAL_DATA_DIR")
                .unwrap_or_else(|_| "data/manual-city-month".to_string()),
            cache_dir: std::env::var("WEATHER_CACHE_DIR")
                .unwrap_or_else(|_| ".cache/weather-summary".to_string()),
            snapshot_dir: std::env::var("WEATHER_SNAPSHOT_DIR")
                .unwrap_or_else(|_| ".cache/weather-snapshot".to_string()),
            climate_base_urls: std::env::var("WEATHER_CLIMATE_BASE_URLS")
                .ok()
                .map(|s| s.split(',').map(|u| u.trim().to_string()).collect())
                .unwrap_or_else(|| {
                    vec![
                        "https://api.open-meteo.com/v1/forecast".to_string(),
                        "https://archive-api.open-meteo.com/v1/archive".to_string(),
                    ]
                }),
            air_quality_base_url: std::env::var("WEATHER_AIR_QUALITY_BASE_URL").unwrap_or_else(
                |_| "https://air-quality-api.open-meteo.com/v1/air-quality".to_string(),
            ),
            marine_base_url: std::env::var("WEATHER_MARINE_BASE_URL")
                .unwrap_or_else(|_| "https://marine-api.open-meteo.com/v1/marine".to_string()),
        }
    }

    /// The baseline year window for a given "current year" (§8 boundary
    /// behavior): `[max(2022, Y-1-k+1) .. Y-1]`, ascending.
    pub fn baseline_years(&self, current_year: i32) -> Vec<i32> {
        let end = current_year - 1;
        let start = (end - self.baseline_years_window as i32 + 1).max(2022);
        if start > end {
            return Vec::new();
        }
        (start..=end).collect()
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
