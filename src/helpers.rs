//! Shared numeric conversion and atomic file-write helpers.
//!
//! - `f64_to_decimal_2dp`: rounds to 2 decimal places, the precision the
//!   Aggregator rounds all scalar outputs to (§4.4). Non-finite inputs
//!   become `Decimal::ZERO` rather than propagating NaN.
//! - `finite_or_none`: the series-boundary rule — any non-finite reading
//!   coming out of upstream JSON becomes `None`, never NaN.
//! - `atomic_write_json`: write-temp-then-rename, shared by the summary
//!   cache and the region snapshot store so neither ever exposes a
//!   partially written file to a concurrent reader.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Convert an f64 to Decimal, rounded to 2 decimal places.
///
/// Used for every scalar field the Aggregator emits (temperature, wind,
/// rainfall, AQI, wave height, ...) — two-decimal precision is what §4.4
/// specifies for aggregator output.
pub(crate) fn f64_to_decimal_2dp(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "f64_to_decimal_2dp received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_str_exact(&format!("{:.2}", v)).unwrap_or_default()
}

pub(crate) fn opt_f64_to_decimal_2dp(v: Option<f64>) -> Option<Decimal> {
    v.map(f64_to_decimal_2dp)
}

pub(crate) fn opt_dec_to_f64(d: Option<Decimal>) -> Option<f64> {
    d.and_then(|v| v.to_f64())
}

/// Normalize a raw f64 reading from an upstream series: non-finite values
/// (NaN, ±Inf) become `None` so the Aggregator never has to special-case
/// them (§4.3, §9 "Numeric parsing").
pub(crate) fn finite_or_none(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

pub(crate) fn finite_opt_or_none(v: Option<f64>) -> Option<f64> {
    v.and_then(finite_or_none)
}

/// Serialize `value` to JSON and write it to `path` atomically: write to a
/// uniquely-suffixed sibling temp file, then `rename` over the target.
///
/// A reader can never observe a partially written file — it sees either the
/// previous complete file or the new one, because `rename` is atomic on the
/// same filesystem (§5, §9 "Atomic file writes"). The suffix combines the
/// process id with a per-process monotonic counter rather than a
/// wall-clock timestamp alone, which can collide under rapid concurrent
/// writes to the same key.
pub(crate) fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    let nonce = TMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), nonce));
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
