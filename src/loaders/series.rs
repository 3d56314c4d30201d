//! Shared daily/hourly series types produced by the range loaders (§4.3) and
//! consumed by the Aggregator (§4.4).
//!
//! Every numeric reading is normalized to `Option<f64>` at the point it
//! leaves upstream JSON: non-finite or absent values become `None` so the
//! Aggregator never has to special-case NaN (§9 "Numeric parsing").

use crate::helpers::finite_opt_or_none;
use chrono::NaiveDate;

/// One month's worth of daily climate readings, sliced out of a fetched
/// year (§4.3).
#[derive(Debug, Clone, Default)]
pub struct ClimateDailySlice {
    pub dates: Vec<NaiveDate>,
    pub temperature_mean: Vec<Option<f64>>,
    pub precipitation: Vec<Option<f64>>,
    pub humidity_mean: Vec<Option<f64>>,
    pub wind_mean: Vec<Option<f64>>,
}

/// One month's worth of hourly air-quality readings.
#[derive(Debug, Clone, Default)]
pub struct AirHourlySlice {
    pub dates: Vec<NaiveDate>,
    pub pm25: Vec<Option<f64>>,
    pub aqi: Vec<Option<f64>>,
    pub uv_index: Vec<Option<f64>>,
}

/// One month's worth of hourly marine readings.
#[derive(Debug, Clone, Default)]
pub struct MarineHourlySlice {
    pub wave_height: Vec<Option<f64>>,
    pub wave_direction: Vec<Option<f64>>,
    pub wave_period: Vec<Option<f64>>,
}

/// A full calendar year of daily climate data, cached per-region (§4.3).
#[derive(Debug, Clone, Default)]
pub struct ClimateYearSlice(pub ClimateDailySlice);

/// A full calendar year of hourly air-quality data, cached per-region.
#[derive(Debug, Clone, Default)]
pub struct AirYearSlice(pub AirHourlySlice);

/// A full calendar year of hourly marine data, cached per-region.
#[derive(Debug, Clone, Default)]
pub struct MarineYearSlice {
    pub dates: Vec<NaiveDate>,
    pub wave_height: Vec<Option<f64>>,
    pub wave_direction: Vec<Option<f64>>,
    pub wave_period: Vec<Option<f64>>,
}

/// Normalize a raw JSON numeric series: absent arrays become empty, missing
/// or non-finite entries become `None` (§4.3 "tolerate missing arrays").
pub(crate) fn normalize_series(raw: Option<Vec<Option<f64>>>) -> Vec<Option<f64>> {
    raw.unwrap_or_default()
        .into_iter()
        .map(finite_opt_or_none)
        .collect()
}

/// Pick the first populated alias series out of a priority-ordered list
/// (§4.3 "field aliases are merged").
pub(crate) fn merge_aliases(candidates: Vec<Option<Vec<Option<f64>>>>) -> Option<Vec<Option<f64>>> {
    candidates.into_iter().find(|c| c.is_some()).flatten()
}

pub(crate) fn parse_dates(raw: &[String]) -> Vec<NaiveDate> {
    raw.iter()
        .map(|s| {
            NaiveDate::parse_from_str(&s[..10.min(s.len())], "%Y-%m-%d")
                .unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
        })
        .collect()
}

impl ClimateYearSlice {
    /// Slice out the days belonging to `month` of this year.
    pub fn month(&self, month: u32) -> ClimateDailySlice {
        let mut out = ClimateDailySlice::default();
        for i in 0..self.0.dates.len() {
            if self.0.dates[i].month() == month {
                out.dates.push(self.0.dates[i]);
                out.temperature_mean.push(self.0.temperature_mean.get(i).copied().flatten());
                out.precipitation.push(self.0.precipitation.get(i).copied().flatten());
                out.humidity_mean.push(self.0.humidity_mean.get(i).copied().flatten());
                out.wind_mean.push(self.0.wind_mean.get(i).copied().flatten());
            }
        }
        out
    }
}

impl AirYearSlice {
    pub fn month(&self, month: u32) -> AirHourlySlice {
        let mut out = AirHourlySlice::default();
        for i in 0..self.0.dates.len() {
            if self.0.dates[i].month() == month {
                out.dates.push(self.0.dates[i]);
                out.pm25.push(self.0.pm25.get(i).copied().flatten());
                out.aqi.push(self.0.aqi.get(i).copied().flatten());
                out.uv_index.push(self.0.uv_index.get(i).copied().flatten());
            }
        }
        out
    }
}

impl MarineYearSlice {
    pub fn month(&self, month: u32) -> MarineHourlySlice {
        let mut out = MarineHourlySlice::default();
        for i in 0..self.dates.len() {
            if self.dates[i].month() == month {
                out.wave_height.push(self.wave_height.get(i).copied().flatten());
                out.wave_direction.push(self.wave_direction.get(i).copied().flatten());
                out.wave_period.push(self.wave_period.get(i).copied().flatten());
            }
        }
        out
    }
}

use chrono::Datelike;
