//! Performs one upstream JSON request with a per-attempt timeout,
//! classifies the response, and retries transient/rate-limited failures
//! with exponential backoff + jitter honoring `Retry-After` (§4.2).

use super::scheduler::UpstreamScheduler;
use crate::config::WeatherCoreConfig;
use crate::errors::CoreError;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct RetryingFetcher {
    client: reqwest::Client,
    scheduler: Arc<UpstreamScheduler>,
    attempt_timeout: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
    rate_limit_min_backoff: Duration,
}

impl RetryingFetcher {
    pub fn new(config: &WeatherCoreConfig, scheduler: Arc<UpstreamScheduler>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .expect("failed to build upstream HTTP client");
        Self {
            client,
            scheduler,
            attempt_timeout: config.fetch_timeout,
            max_attempts: config.max_attempts.max(1),
            retry_base_delay: config.retry_base_delay,
            rate_limit_min_backoff: config.rate_limit_min_backoff,
        }
    }

    /// `label` is folded into every error message (`"Climate API (2024-06)"`).
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: reqwest::Url,
        label: &str,
    ) -> Result<T, CoreError> {
        let mut last_error: Option<CoreError> = None;

        for attempt in 1..=self.max_attempts {
            let outcome = self
                .scheduler
                .run(|| self.attempt::<T>(url.clone(), label))
                .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if let CoreError::RateLimited { retry_after, .. } = &err {
                        let floor = retry_after.unwrap_or(Duration::ZERO).max(self.rate_limit_min_backoff);
                        self.scheduler.extend_cooldown_by(floor);
                    }

                    let retryable = matches!(
                        err,
                        CoreError::Upstream { .. } | CoreError::RateLimited { .. } | CoreError::Transient { .. }
                    );
                    if !retryable || attempt == self.max_attempts {
                        return Err(err);
                    }

                    let delay = self.backoff_delay(attempt, &err);
                    debug!(attempt, label, delay_ms = delay.as_millis() as u64, "retrying upstream request");
                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::BuildFailed(format!("{label} exhausted retries"))))
    }

    fn backoff_delay(&self, attempt: u32, err: &CoreError) -> Duration {
        let base = self.retry_base_delay;
        let exponential = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let jitter_fraction: f64 = rand::thread_rng().gen_range(0.0..=1.0);
        let jitter = Duration::from_secs_f64(jitter_fraction * base.as_secs_f64());
        let computed = exponential + jitter;

        match err {
            CoreError::RateLimited { retry_after: Some(retry_after), .. } => computed.max(*retry_after),
            _ => computed,
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, url: reqwest::Url, label: &str) -> Result<T, CoreError> {
        let send = self.client.get(url).send();
        let response = tokio::time::timeout(self.attempt_timeout, send)
            .await
            .map_err(|_| CoreError::Upstream {
                label: label.to_string(),
                status: StatusCode::REQUEST_TIMEOUT,
            })?
            .map_err(|source| CoreError::Transient { label: label.to_string(), source })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(parse_retry_after);
            return Err(CoreError::RateLimited { label: label.to_string(), retry_after });
        }
        if status == StatusCode::BAD_REQUEST {
            return Err(CoreError::ShapeError { label: label.to_string() });
        }
        if CoreError::is_retryable_status(status) {
            return Err(CoreError::Upstream { label: label.to_string(), status });
        }
        if !status.is_success() {
            return Err(CoreError::NonRetryable { label: label.to_string(), status });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| CoreError::Transient { label: label.to_string(), source })
    }
}

/// Parse a `Retry-After` header: either a delta in seconds or an HTTP-date.
/// Unparseable values are treated as no additional delay — the caller still
/// falls back to `rate_limit_min_backoff`.
fn parse_retry_after(value: &str) -> Duration {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Duration::from_secs(secs);
    }

    let parsed = DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| httpdate_parse(value));

    match parsed {
        Ok(deadline) => (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        Err(_) => {
            warn!("failed to parse Retry-After header '{}', ignoring", value);
            Duration::ZERO
        }
    }
}

fn httpdate_parse(s: &str) -> Result<DateTime<Utc>, String> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ];
    for fmt in &formats {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }
    Err(format!("could not parse HTTP date: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        value: i32,
    }

    fn test_config() -> WeatherCoreConfig {
        let mut config = WeatherCoreConfig::from_env();
        config.fetch_timeout = Duration::from_secs(2);
        config.max_attempts = 3;
        config.retry_base_delay = Duration::from_millis(1);
        config.rate_limit_min_backoff = Duration::from_millis(1);
        config.upstream_request_spacing = Duration::from_millis(0);
        config
    }

    fn fetcher(config: &WeatherCoreConfig) -> RetryingFetcher {
        let scheduler = Arc::new(UpstreamScheduler::new(config.upstream_request_spacing));
        RetryingFetcher::new(config, scheduler)
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 7})))
            .mount(&server)
            .await;

        let config = test_config();
        let fetcher = fetcher(&config);
        let url = reqwest::Url::parse(&server.uri()).unwrap();
        let result: Payload = fetcher.fetch_json(url, "Test API").await.unwrap();
        assert_eq!(result, Payload { value: 7 });
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 1})))
            .mount(&server)
            .await;

        let config = test_config();
        let fetcher = fetcher(&config);
        let url = reqwest::Url::parse(&server.uri()).unwrap();
        let result: Payload = fetcher.fetch_json(url, "Test API").await.unwrap();
        assert_eq!(result, Payload { value: 1 });
    }

    #[tokio::test]
    async fn surfaces_400_immediately_as_shape_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let config = test_config();
        let fetcher = fetcher(&config);
        let url = reqwest::Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch_json::<Payload>(url, "Climate API (2024-06)").await;
        assert!(matches!(result, Err(CoreError::ShapeError { .. })));
    }

    #[tokio::test]
    async fn rate_limit_extends_cooldown_and_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 2})))
            .mount(&server)
            .await;

        let config = test_config();
        let scheduler = Arc::new(UpstreamScheduler::new(config.upstream_request_spacing));
        let fetcher = RetryingFetcher::new(&config, scheduler.clone());
        let url = reqwest::Url::parse(&server.uri()).unwrap();

        let result: Payload = fetcher.fetch_json(url, "Test API").await.unwrap();
        assert_eq!(result, Payload { value: 2 });
        assert!(scheduler.cooldown_until() > Utc::now());
    }

    #[tokio::test]
    async fn exhausts_attempts_and_surfaces_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.max_attempts = 2;
        let fetcher = fetcher(&config);
        let url = reqwest::Url::parse(&server.uri()).unwrap();
        let result = fetcher.fetch_json::<Payload>(url, "Test API").await;
        assert!(matches!(result, Err(CoreError::Upstream { .. })));
    }

    #[test]
    fn parse_retry_after_accepts_seconds() {
        assert_eq!(parse_retry_after("60"), Duration::from_secs(60));
    }

    #[test]
    fn parse_retry_after_ignores_garbage() {
        assert_eq!(parse_retry_after("not-a-date"), Duration::ZERO);
    }
}
