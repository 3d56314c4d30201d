//! Orchestrates baseline years × families into one monthly summary, and
//! applies the partial-failure policy (§4.5).

use crate::aggregator::Aggregator;
use crate::errors::CoreError;
use crate::loaders::{AirLoader, ClimateLoader, MarineLoader};
use crate::loaders::series::{AirHourlySlice, ClimateDailySlice, MarineHourlySlice};
use crate::model::MonthlySummary;
use crate::region::Region;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Pause before the single-year retry when no climate data was collected
/// for any baseline year and no rate-limit was observed (§4.5).
const NO_DATA_RETRY_PAUSE: Duration = Duration::from_millis(2200);
/// Same pause, but after a rate-limit was observed during the baseline
/// loop — slightly longer to give the upstream cooldown room to matter.
const NO_DATA_RETRY_PAUSE_AFTER_RATE_LIMIT: Duration = Duration::from_millis(2600);

pub struct SummaryBuilder {
    climate: Arc<ClimateLoader>,
    air: Arc<AirLoader>,
    marine: Arc<MarineLoader>,
}

impl SummaryBuilder {
    pub fn new(climate: Arc<ClimateLoader>, air: Arc<AirLoader>, marine: Arc<MarineLoader>) -> Self {
        Self { climate, air, marine }
    }

    /// Build a `MonthlySummary` for `region`/`month` over `baseline_years`
    /// (ascending order expected). `include_marine` gates the marine fetch
    /// only — callers apply `without_marine()` separately when the caller
    /// opted out or the region is inland (§4.10).
    pub async fn build(
        &self,
        region: &Region,
        month: u32,
        baseline_years: &[i32],
        include_marine: bool,
    ) -> Result<MonthlySummary, CoreError> {
        let mut climate_slices: Vec<ClimateDailySlice> = Vec::new();
        let mut climate_errors: Vec<CoreError> = Vec::new();
        let mut air_slices: Vec<AirHourlySlice> = Vec::new();
        let mut marine_slices: Vec<MarineHourlySlice> = Vec::new();
        let mut rate_limited = false;

        for &year in baseline_years {
            match self.climate.fetch_month(region, year, month).await {
                Ok(slice) => climate_slices.push(slice),
                Err(err) => {
                    if matches!(err, CoreError::RateLimited { .. }) {
                        rate_limited = true;
                    }
                    climate_errors.push(err);
                }
            }

            if rate_limited {
                // §4.5: subsequent years are futile once a rate-limit is seen.
                break;
            }

            if let Err(err) = self.try_air(region, year, month, &mut air_slices).await {
                warn!(region = %region.id, year, month, error = %err, "air quality fetch failed, tolerating");
            }

            if include_marine {
                if let Err(err) = self.try_marine(region, year, month, &mut marine_slices).await {
                    warn!(region = %region.id, year, month, error = %err, "marine fetch failed, tolerating");
                }
            }
        }

        if climate_slices.is_empty() {
            let pause = if rate_limited {
                NO_DATA_RETRY_PAUSE_AFTER_RATE_LIMIT
            } else {
                NO_DATA_RETRY_PAUSE
            };
            tokio::time::sleep(pause).await;

            if let Some(&last_year) = baseline_years.last() {
                match self.climate.fetch_month(region, last_year, month).await {
                    Ok(slice) => climate_slices.push(slice),
                    Err(err) => climate_errors.push(err),
                }
            }
        }

        if climate_slices.is_empty() {
            let message = climate_errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("no climate data available for {} month {}", region.id, month));
            return Err(CoreError::BuildFailed(message));
        }

        let marine_arg = if include_marine { Some(marine_slices.as_slice()) } else { None };
        let mut summary = Aggregator::aggregate(&climate_slices, &air_slices, marine_arg);

        let now = Utc::now();
        summary.climate_last_updated = Some(now);
        summary.air_quality_last_updated = Some(now);
        summary.marine_last_updated = Some(now);

        Ok(summary)
    }

    async fn try_air(
        &self,
        region: &Region,
        year: i32,
        month: u32,
        out: &mut Vec<AirHourlySlice>,
    ) -> Result<(), CoreError> {
        out.push(self.air.fetch_month(region, year, month).await?);
        Ok(())
    }

    async fn try_marine(
        &self,
        region: &Region,
        year: i32,
        month: u32,
        out: &mut Vec<MarineHourlySlice>,
    ) -> Result<(), CoreError> {
        out.push(self.marine.fetch_month(region, year, month).await?);
        Ok(())
    }
}
