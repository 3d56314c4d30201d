//! The payload types the engine produces and persists (§3).
//!
//! `MonthlySummary` is the public result type; `SnapshotMonthEntry` /
//! `RegionSnapshotFile` are the on-disk shape of the per-region snapshot
//! store (§4.8); `CacheKey` / `CachedSummaryEntry` are the on-disk shape of
//! the content-addressed summary cache (§4.6).

use crate::helpers::{f64_to_decimal_2dp, opt_dec_to_f64, opt_f64_to_decimal_2dp};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

/// Schema version of [`CachedSummaryEntry`] on disk (§6).
pub const SUMMARY_CACHE_SCHEMA_VERSION: u32 = 2;
/// Schema version of [`RegionSnapshotFile`] on disk (§6).
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// A field-specific plausibility range (§3 invariants). Values outside the
/// range — or non-finite — make the whole summary invalid on read.
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn contains(&self, v: f64) -> bool {
        v.is_finite() && v >= self.min && v <= self.max
    }
}

const TEMPERATURE_RANGE: Range = Range { min: -80.0, max: 60.0 };
const HUMIDITY_RANGE: Range = Range { min: 0.0, max: 100.0 };
const WIND_RANGE: Range = Range { min: 0.0, max: 500.0 };
const RAINFALL_RANGE: Range = Range { min: 0.0, max: 5000.0 };
const UV_RANGE: Range = Range { min: 0.0, max: 25.0 };
const PM25_RANGE: Range = Range { min: 0.0, max: 1000.0 };
const AQI_RANGE: Range = Range { min: 0.0, max: 500.0 };
const WAVE_HEIGHT_RANGE: Range = Range { min: 0.0, max: 30.0 };
const WAVE_PERIOD_RANGE: Range = Range { min: 0.0, max: 60.0 };
const WAVE_DIRECTION_RANGE: Range = Range { min: 0.0, max: 360.0 };

fn in_range(value: Option<Decimal>, range: &Range) -> bool {
    match opt_dec_to_f64(value) {
        Some(v) => range.contains(v),
        None => true, // absent is always valid
    }
}

/// The monthly climate/air/marine summary the engine produces for a single
/// `(region, month)` pair (§3). Every numeric field is independently
/// nullable; a stored summary that fails any plausibility range is treated
/// as missing by the Summary Cache and the Snapshot Store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    pub temperature_c: Option<Decimal>,
    pub temperature_min_c: Option<Decimal>,
    pub temperature_max_c: Option<Decimal>,
    pub rainfall_mm: Option<Decimal>,
    pub humidity_pct: Option<Decimal>,
    pub wind_kph: Option<Decimal>,

    pub uv_index: Option<Decimal>,
    pub pm25: Option<Decimal>,
    pub aqi: Option<Decimal>,

    pub wave_height_m: Option<Decimal>,
    pub wave_period_s: Option<Decimal>,
    pub wave_direction_deg: Option<Decimal>,

    pub climate_last_updated: Option<DateTime<Utc>>,
    pub air_quality_last_updated: Option<DateTime<Utc>>,
    pub marine_last_updated: Option<DateTime<Utc>>,
}

impl MonthlySummary {
    /// A summary with every field null — the starting point for the
    /// Aggregator and for manual-override rows with missing fields.
    pub fn empty() -> Self {
        Self {
            temperature_c: None,
            temperature_min_c: None,
            temperature_max_c: None,
            rainfall_mm: None,
            humidity_pct: None,
            wind_kph: None,
            uv_index: None,
            pm25: None,
            aqi: None,
            wave_height_m: None,
            wave_period_s: None,
            wave_direction_deg: None,
            climate_last_updated: None,
            air_quality_last_updated: None,
            marine_last_updated: None,
        }
    }

    /// True if every populated numeric field lies within its plausibility
    /// range (§3 invariants, §7 "Cache/snapshot corruption"). A failing
    /// summary is treated as missing by the cache and snapshot readers.
    pub fn is_plausible(&self) -> bool {
        in_range(self.temperature_c, &TEMPERATURE_RANGE)
            && in_range(self.temperature_min_c, &TEMPERATURE_RANGE)
            && in_range(self.temperature_max_c, &TEMPERATURE_RANGE)
            && in_range(self.rainfall_mm, &RAINFALL_RANGE)
            && in_range(self.humidity_pct, &HUMIDITY_RANGE)
            && in_range(self.wind_kph, &WIND_RANGE)
            && in_range(self.uv_index, &UV_RANGE)
            && in_range(self.pm25, &PM25_RANGE)
            && in_range(self.aqi, &AQI_RANGE)
            && in_range(self.wave_height_m, &WAVE_HEIGHT_RANGE)
            && in_range(self.wave_period_s, &WAVE_PERIOD_RANGE)
            && in_range(self.wave_direction_deg, &WAVE_DIRECTION_RANGE)
    }

    /// True if all numeric fields are null — used by the Manual Override
    /// Loader to drop degenerate rows (§4.9).
    pub fn all_numeric_fields_null(&self) -> bool {
        self.temperature_c.is_none()
            && self.temperature_min_c.is_none()
            && self.temperature_max_c.is_none()
            && self.rainfall_mm.is_none()
            && self.humidity_pct.is_none()
            && self.wind_kph.is_none()
            && self.uv_index.is_none()
            && self.pm25.is_none()
            && self.aqi.is_none()
            && self.wave_height_m.is_none()
            && self.wave_period_s.is_none()
            && self.wave_direction_deg.is_none()
    }

    /// Null the three wave fields — `withMarinePreference` (§4.10), applied
    /// whenever the caller opted out of marine data or the region is
    /// inland.
    pub fn without_marine(mut self) -> Self {
        self.wave_height_m = None;
        self.wave_period_s = None;
        self.wave_direction_deg = None;
        self
    }

    /// Whether this summary carries any marine coverage at all (used by
    /// the Snapshot Store's `marine-missing` staleness check, §4.8).
    pub fn has_marine_coverage(&self) -> bool {
        self.wave_height_m.is_some() || self.wave_period_s.is_some() || self.wave_direction_deg.is_some()
    }
}

pub(crate) fn round2(v: f64) -> Decimal {
    f64_to_decimal_2dp(v)
}

pub(crate) fn opt_round2(v: Option<f64>) -> Option<Decimal> {
    opt_f64_to_decimal_2dp(v)
}

/// One month's worth of snapshot bookkeeping (§3 "SnapshotMonthEntry").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMonthEntry {
    pub month: u32,
    pub includes_marine: bool,
    pub baseline_years: Vec<i32>,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    pub summary: MonthlySummary,
}

/// One file per region (§3 "RegionSnapshotFile", §6 persistent layout).
/// Only [`SNAPSHOT_SCHEMA_VERSION`] is honored on read; anything else is
/// discarded as if the file did not exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSnapshotFile {
    pub version: u32,
    #[serde(rename = "regionId")]
    pub region_id: String,
    /// Keyed by month number as a string (`"1"`..`"12"`), matching the
    /// canonical on-disk shape described in §3.
    pub months: BTreeMap<String, SnapshotMonthEntry>,
}

impl RegionSnapshotFile {
    pub fn empty(region_id: &str) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION,
            region_id: region_id.to_string(),
            months: BTreeMap::new(),
        }
    }

    pub fn get_month(&self, month: u32) -> Option<&SnapshotMonthEntry> {
        self.months.get(&month.to_string())
    }

    pub fn set_month(&mut self, entry: SnapshotMonthEntry) {
        self.months.insert(entry.month.to_string(), entry);
    }
}

/// The canonical cache key input (§3 "CacheKey"). Field order and casing
/// are fixed — this struct's declared field order *is* the canonical JSON
/// key order serde_json emits, and that JSON string is exactly what gets
/// SHA1-hashed into the cache filename (§4.6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub version: u32,
    pub region_id: String,
    pub month: u32,
    pub include_marine: bool,
    pub baseline_years: Vec<i32>,
}

impl CacheKey {
    pub fn new(region_id: &str, month: u32, include_marine: bool, mut baseline_years: Vec<i32>) -> Self {
        baseline_years.sort_unstable();
        Self {
            version: SUMMARY_CACHE_SCHEMA_VERSION,
            region_id: region_id.to_string(),
            month,
            include_marine,
            baseline_years,
        }
    }

    /// The canonical JSON form that both identifies this key on disk
    /// (`keyInput`) and is hashed to produce the filename.
    pub fn canonical_json(&self) -> String {
        // A fixed-field-order struct serializes deterministically; no need
        // to reach for a canonicalizing JSON crate.
        serde_json::to_string(self).expect("CacheKey always serializes")
    }

    /// `SHA1(keyInput)` hex-encoded — the cache file's basename (§4.6).
    pub fn content_address(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.canonical_json().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The on-disk shape of a content-addressed cache file (§3
/// "CachedSummaryEntry"). On read, `key_input` must match the requested
/// key's canonical JSON exactly and `summary` must be plausible — any
/// mismatch is a miss (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSummaryEntry {
    pub key_input: String,
    pub summary: MonthlySummary,
    pub stored_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_summary() -> MonthlySummary {
        let mut s = MonthlySummary::empty();
        s.temperature_c = Some(round2(21.345));
        s.humidity_pct = Some(round2(80.0));
        s.aqi = Some(round2(42.0));
        s
    }

    #[test]
    fn plausible_summary_passes() {
        assert!(valid_summary().is_plausible());
    }

    #[test]
    fn out_of_range_temperature_is_implausible() {
        let mut s = valid_summary();
        s.temperature_c = Some(round2(200.0));
        assert!(!s.is_plausible());
    }

    #[test]
    fn out_of_range_humidity_is_implausible() {
        let mut s = valid_summary();
        s.humidity_pct = Some(round2(150.0));
        assert!(!s.is_plausible());
    }

    #[test]
    fn null_fields_are_always_plausible() {
        assert!(MonthlySummary::empty().is_plausible());
    }

    #[test]
    fn without_marine_nulls_wave_fields_only() {
        let mut s = valid_summary();
        s.wave_height_m = Some(round2(1.2));
        s.wave_period_s = Some(round2(6.0));
        s.wave_direction_deg = Some(round2(180.0));
        let cleared = s.clone().without_marine();
        assert_eq!(cleared.wave_height_m, None);
        assert_eq!(cleared.wave_period_s, None);
        assert_eq!(cleared.wave_direction_deg, None);
        assert_eq!(cleared.temperature_c, s.temperature_c);
    }

    #[test]
    fn all_numeric_fields_null_detects_degenerate_summary() {
        assert!(MonthlySummary::empty().all_numeric_fields_null());
        assert!(!valid_summary().all_numeric_fields_null());
    }

    #[test]
    fn cache_key_canonical_json_has_fixed_field_order() {
        let key = CacheKey::new("vn-da-nang", 7, true, vec![2024, 2022, 2023]);
        assert_eq!(
            key.canonical_json(),
            r#"{"version":2,"regionId":"vn-da-nang","month":7,"includeMarine":true,"baselineYears":[2022,2023,2024]}"#
        );
    }

    #[test]
    fn cache_key_sorts_baseline_years_ascending() {
        let key = CacheKey::new("r1", 1, false, vec![2023, 2021, 2022]);
        assert_eq!(key.baseline_years, vec![2021, 2022, 2023]);
    }

    #[test]
    fn content_address_is_deterministic_and_input_sensitive() {
        let a = CacheKey::new("r1", 1, false, vec![2022, 2023]);
        let b = CacheKey::new("r1", 1, false, vec![2022, 2023]);
        let c = CacheKey::new("r1", 2, false, vec![2022, 2023]);
        assert_eq!(a.content_address(), b.content_address());
        assert_ne!(a.content_address(), c.content_address());
        assert_eq!(a.content_address().len(), 40); // SHA1 hex length
    }

    #[test]
    fn snapshot_file_round_trips_month_entries() {
        let mut file = RegionSnapshotFile::empty("r1");
        let entry = SnapshotMonthEntry {
            month: 7,
            includes_marine: true,
            baseline_years: vec![2022, 2023],
            fetched_at: Utc::now(),
            source: "open-meteo".to_string(),
            summary: valid_summary(),
        };
        file.set_month(entry.clone());
        assert_eq!(file.get_month(7), Some(&entry));
        assert_eq!(file.get_month(8), None);
    }
}
