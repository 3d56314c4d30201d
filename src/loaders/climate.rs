//! Climate daily range loader (§4.3).
//!
//! Tries each configured base URL in order (historical-forecast, then
//! archive). For each base URL it walks a fixed field-name ladder: the
//! primary daily field set, then a legacy underscore-free variant, then a
//! minimal `(temperature, precipitation)` set — advancing the ladder only on
//! HTTP 400 (a [`CoreError::ShapeError`]). Any other failure skips straight
//! to the next base URL.

use super::series::{merge_aliases, normalize_series, parse_dates, ClimateDailySlice, ClimateYearSlice};
use crate::config::WeatherCoreConfig;
use crate::errors::CoreError;
use crate::region::Region;
use crate::upstream::{RetryingFetcher, YearCache};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Ordered field-name variants tried for each base URL (§4.3).
const FIELD_LADDER: &[&[&str]] = &[
    &[
        "temperature_2m_mean",
        "precipitation_sum",
        "relative_humidity_2m_mean",
        "wind_speed_10m_mean",
    ],
    &[
        "temperature_2m_mean",
        "precipitation_sum",
        "relativehumidity_2m_mean",
        "windspeed_10m_mean",
    ],
    &["temperature", "precipitation"],
];

#[derive(Debug, Default, Deserialize)]
struct ClimateDailyFields {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_mean: Option<Vec<Option<f64>>>,
    #[serde(default)]
    temperature: Option<Vec<Option<f64>>>,
    #[serde(default)]
    precipitation_sum: Option<Vec<Option<f64>>>,
    #[serde(default)]
    precipitation: Option<Vec<Option<f64>>>,
    #[serde(default)]
    relative_humidity_2m_mean: Option<Vec<Option<f64>>>,
    #[serde(default)]
    relativehumidity_2m_mean: Option<Vec<Option<f64>>>,
    #[serde(default)]
    wind_speed_10m_mean: Option<Vec<Option<f64>>>,
    #[serde(default)]
    windspeed_10m_mean: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Default, Deserialize)]
struct ClimateDailyResponse {
    #[serde(default)]
    daily: Option<ClimateDailyFields>,
}

pub struct ClimateLoader {
    fetcher: Arc<RetryingFetcher>,
    base_urls: Vec<String>,
    year_cache: YearCache<ClimateYearSlice>,
}

impl ClimateLoader {
    pub fn new(config: &WeatherCoreConfig, fetcher: Arc<RetryingFetcher>) -> Self {
        Self {
            fetcher,
            base_urls: config.climate_base_urls.clone(),
            year_cache: YearCache::new(config.year_cache_max_entries),
        }
    }

    /// Slice the requested month out of a cached (or freshly fetched) year
    /// (§4.3 "fetchMonth ... internally fetchYear").
    pub async fn fetch_month(
        &self,
        region: &Region,
        year: i32,
        month: u32,
    ) -> Result<ClimateDailySlice, CoreError> {
        if let Some(cached) = self.year_cache.get(&region.id, year).await {
            return Ok(cached.month(month));
        }
        let fetched = self.fetch_year(region, year).await?;
        self.year_cache.insert(&region.id, year, fetched.clone()).await;
        Ok(fetched.month(month))
    }

    async fn fetch_year(&self, region: &Region, year: i32) -> Result<ClimateYearSlice, CoreError> {
        let start = format!("{year}-01-01");
        let end = format!("{year}-12-31");
        let label = format!("Climate API ({year})");

        let mut last_error: Option<CoreError> = None;
        for base_url in &self.base_urls {
            for fields in FIELD_LADDER {
                let url = build_url(base_url, region, &start, &end, fields);
                match self.fetcher.fetch_json::<ClimateDailyResponse>(url, &label).await {
                    Ok(response) => return Ok(to_year_slice(response)),
                    Err(err @ CoreError::ShapeError { .. }) => {
                        debug!(base_url, ?fields, "climate field variant rejected, trying next");
                        last_error = Some(err);
                        continue;
                    }
                    Err(err) => {
                        last_error = Some(err);
                        break;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::BuildFailed(format!("{label}: no base URL succeeded"))))
    }
}

fn build_url(base_url: &str, region: &Region, start: &str, end: &str, fields: &[&str]) -> reqwest::Url {
    let mut url = reqwest::Url::parse(base_url).expect("configured base URL must be valid");
    url.query_pairs_mut()
        .append_pair("latitude", &region.latitude.to_string())
        .append_pair("longitude", &region.longitude.to_string())
        .append_pair("start_date", start)
        .append_pair("end_date", end)
        .append_pair("timezone", "UTC")
        .append_pair("daily", &fields.join(","));
    url
}

fn to_year_slice(response: ClimateDailyResponse) -> ClimateYearSlice {
    let Some(daily) = response.daily else {
        return ClimateYearSlice::default();
    };
    let dates = parse_dates(&daily.time);
    let temperature_mean = normalize_series(merge_aliases(vec![daily.temperature_2m_mean, daily.temperature]));
    let precipitation = normalize_series(merge_aliases(vec![daily.precipitation_sum, daily.precipitation]));
    let humidity_mean = normalize_series(merge_aliases(vec![
        daily.relative_humidity_2m_mean,
        daily.relativehumidity_2m_mean,
    ]));
    let wind_mean = normalize_series(merge_aliases(vec![daily.wind_speed_10m_mean, daily.windspeed_10m_mean]));

    ClimateYearSlice(ClimateDailySlice {
        dates,
        temperature_mean,
        precipitation,
        humidity_mean,
        wind_mean,
    })
}
