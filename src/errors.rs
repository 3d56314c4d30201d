use reqwest::StatusCode;

/// Error taxonomy for the weather summary resolution engine.
///
/// Variants line up with the retry/fallback policy described in the module
/// docs: validation errors never retry, `Upstream`/`RateLimited` drive the
/// Retrying Fetcher's backoff, `ShapeError` drives the Climate Loader's
/// field-alias fallback ladder, and `BuildFailed` is what the Resolver falls
/// back from when a stale snapshot or manual override is available.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    /// A retryable upstream failure (a retryable HTTP status). `label`
    /// names the family and period, e.g. `"Climate API (2024-06)"`.
    #[error("{label} failed with status {status}")]
    Upstream { label: String, status: StatusCode },

    /// A non-retryable HTTP status (4xx other than 400/408/425/429).
    #[error("{label} failed with status {status}")]
    NonRetryable { label: String, status: StatusCode },

    #[error("{label} timed out or the connection was reset: {source}")]
    Transient {
        label: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP 429. `retry_after` is the parsed cooldown floor, if any.
    #[error("{label} was rate-limited (429)")]
    RateLimited {
        label: String,
        retry_after: Option<std::time::Duration>,
    },

    /// HTTP 400 on a climate request — signals the Climate Loader to try
    /// the next field-name variant, not to retry.
    #[error("{label} rejected the request shape (400)")]
    ShapeError { label: String },

    /// Climate data could not be obtained for any baseline year.
    #[error("summary build failed: {0}")]
    BuildFailed(String),

    /// The requested region does not exist in the catalog.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// `verified_only` was requested but no fresh snapshot, stale snapshot,
    /// or manual override was available.
    #[error("no verified data for {region_id} month {month}; run a refresh")]
    NoVerifiedData { region_id: String, month: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True for statuses the Retrying Fetcher should retry (§4.2).
    pub fn is_retryable_status(status: StatusCode) -> bool {
        matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
    }
}
