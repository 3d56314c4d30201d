//! Air-quality hourly range loader (§4.3). Single endpoint, no field-name
//! ladder or base-URL fallback — unlike the Climate Loader, any failure
//! simply propagates (air data is optional to the Summary Builder, §4.5).

use super::series::{normalize_series, parse_dates, AirHourlySlice, AirYearSlice};
use crate::config::WeatherCoreConfig;
use crate::errors::CoreError;
use crate::region::Region;
use crate::upstream::{RetryingFetcher, YearCache};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
struct AirHourlyFields {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    pm2_5: Option<Vec<Option<f64>>>,
    #[serde(default)]
    us_aqi: Option<Vec<Option<f64>>>,
    #[serde(default)]
    uv_index: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Default, Deserialize)]
struct AirHourlyResponse {
    #[serde(default)]
    hourly: Option<AirHourlyFields>,
}

pub struct AirLoader {
    fetcher: Arc<RetryingFetcher>,
    base_url: String,
    year_cache: YearCache<AirYearSlice>,
}

impl AirLoader {
    pub fn new(config: &WeatherCoreConfig, fetcher: Arc<RetryingFetcher>) -> Self {
        Self {
            fetcher,
            base_url: config.air_quality_base_url.clone(),
            year_cache: YearCache::new(config.year_cache_max_entries),
        }
    }

    pub async fn fetch_month(
        &self,
        region: &Region,
        year: i32,
        month: u32,
    ) -> Result<AirHourlySlice, CoreError> {
        if let Some(cached) = self.year_cache.get(&region.id, year).await {
            return Ok(cached.month(month));
        }
        let fetched = self.fetch_year(region, year).await?;
        self.year_cache.insert(&region.id, year, fetched.clone()).await;
        Ok(fetched.month(month))
    }

    async fn fetch_year(&self, region: &Region, year: i32) -> Result<AirYearSlice, CoreError> {
        let start = format!("{year}-01-01");
        let end = format!("{year}-12-31");
        let label = format!("Air Quality API ({year})");

        let mut url = reqwest::Url::parse(&self.base_url).expect("configured base URL must be valid");
        url.query_pairs_mut()
            .append_pair("latitude", &region.latitude.to_string())
            .append_pair("longitude", &region.longitude.to_string())
            .append_pair("start_date", &start)
            .append_pair("end_date", &end)
            .append_pair("timezone", "UTC")
            .append_pair("hourly", "pm2_5,us_aqi,uv_index");

        let response: AirHourlyResponse = self.fetcher.fetch_json(url, &label).await?;
        Ok(to_year_slice(response))
    }
}

fn to_year_slice(response: AirHourlyResponse) -> AirYearSlice {
    let Some(hourly) = response.hourly else {
        return AirYearSlice::default();
    };
    AirYearSlice(AirHourlySlice {
        dates: parse_dates(&hourly.time),
        pm25: normalize_series(hourly.pm2_5),
        aqi: normalize_series(hourly.us_aqi),
        uv_index: normalize_series(hourly.uv_index),
    })
}
