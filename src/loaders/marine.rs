//! Marine hourly range loader (§4.3). Single endpoint; only invoked by the
//! Summary Builder when the region is coastal and marine data was
//! requested — this loader itself is unconditional, the gating lives one
//! level up.

use super::series::{normalize_series, parse_dates, MarineHourlySlice, MarineYearSlice};
use crate::config::WeatherCoreConfig;
use crate::errors::CoreError;
use crate::region::Region;
use crate::upstream::{RetryingFetcher, YearCache};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
struct MarineHourlyFields {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    wave_height: Option<Vec<Option<f64>>>,
    #[serde(default)]
    wave_direction: Option<Vec<Option<f64>>>,
    #[serde(default)]
    wave_period: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Default, Deserialize)]
struct MarineHourlyResponse {
    #[serde(default)]
    hourly: Option<MarineHourlyFields>,
}

pub struct MarineLoader {
    fetcher: Arc<RetryingFetcher>,
    base_url: String,
    year_cache: YearCache<MarineYearSlice>,
}

impl MarineLoader {
    pub fn new(config: &WeatherCoreConfig, fetcher: Arc<RetryingFetcher>) -> Self {
        Self {
            fetcher,
            base_url: config.marine_base_url.clone(),
            year_cache: YearCache::new(config.year_cache_max_entries),
        }
    }

    pub async fn fetch_month(
        &self,
        region: &Region,
        year: i32,
        month: u32,
    ) -> Result<MarineHourlySlice, CoreError> {
        if let Some(cached) = self.year_cache.get(&region.id, year).await {
            return Ok(cached.month(month));
        }
        let fetched = self.fetch_year(region, year).await?;
        self.year_cache.insert(&region.id, year, fetched.clone()).await;
        Ok(fetched.month(month))
    }

    async fn fetch_year(&self, region: &Region, year: i32) -> Result<MarineYearSlice, CoreError> {
        let start = format!("{year}-01-01");
        let end = format!("{year}-12-31");
        let label = format!("Marine API ({year})");

        let mut url = reqwest::Url::parse(&self.base_url).expect("configured base URL must be valid");
        url.query_pairs_mut()
            .append_pair("latitude", &region.latitude.to_string())
            .append_pair("longitude", &region.longitude.to_string())
            .append_pair("start_date", &start)
            .append_pair("end_date", &end)
            .append_pair("timezone", "UTC")
            .append_pair("hourly", "wave_height,wave_direction,wave_period");

        let response: MarineHourlyResponse = self.fetcher.fetch_json(url, &label).await?;
        Ok(to_year_slice(response))
    }
}

fn to_year_slice(response: MarineHourlyResponse) -> MarineYearSlice {
    let Some(hourly) = response.hourly else {
        return MarineYearSlice::default();
    };
    MarineYearSlice {
        dates: parse_dates(&hourly.time),
        wave_height: normalize_series(hourly.wave_height),
        wave_direction: normalize_series(hourly.wave_direction),
        wave_period: normalize_series(hourly.wave_period),
    }
}
