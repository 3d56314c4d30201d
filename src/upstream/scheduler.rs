//! Single-slot outbound request serializer with a process-wide rate-limit
//! cooldown (§4.1).
//!
//! Upstream providers throttle by IP; a single serialized queue with a
//! global cooldown is simpler and safer than per-family token buckets at
//! the QPS this engine sustains (≤ ~3 req/s).

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

struct SlotState {
    last_dispatch: Option<Instant>,
}

pub struct UpstreamScheduler {
    slot: Mutex<SlotState>,
    spacing: Duration,
    cooldown_until_millis: AtomicI64,
}

impl UpstreamScheduler {
    pub fn new(spacing: Duration) -> Self {
        Self {
            slot: Mutex::new(SlotState { last_dispatch: None }),
            spacing,
            cooldown_until_millis: AtomicI64::new(0),
        }
    }

    /// Raise the process-wide cooldown deadline monotonically — never lets
    /// a smaller deadline clobber a larger one under concurrent extends.
    pub fn extend_cooldown(&self, deadline: DateTime<Utc>) {
        let proposed = deadline.timestamp_millis();
        let mut current = self.cooldown_until_millis.load(Ordering::SeqCst);
        loop {
            if proposed <= current {
                return;
            }
            match self.cooldown_until_millis.compare_exchange_weak(
                current,
                proposed,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    info!(until = %deadline, "upstream cooldown extended");
                    return;
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Convenience over [`extend_cooldown`](Self::extend_cooldown) for a
    /// relative delay from now.
    pub fn extend_cooldown_by(&self, delta: Duration) {
        let delta = chrono::Duration::from_std(delta).unwrap_or(chrono::Duration::zero());
        self.extend_cooldown(Utc::now() + delta);
    }

    pub fn cooldown_until(&self) -> DateTime<Utc> {
        let millis = self.cooldown_until_millis.load(Ordering::SeqCst);
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn remaining_cooldown(&self) -> Duration {
        let until_millis = self.cooldown_until_millis.load(Ordering::SeqCst);
        let now_millis = Utc::now().timestamp_millis();
        let remaining = until_millis - now_millis;
        if remaining > 0 {
            Duration::from_millis(remaining as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Run `thunk` through the single slot: wait `max(spacing since last
    /// dispatch, remaining cooldown)`, then dispatch. Holding the slot for
    /// the whole wait-plus-dispatch serializes all outbound calls FIFO.
    pub async fn run<F, Fut, T>(&self, thunk: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut guard = self.slot.lock().await;

        let spacing_wait = match guard.last_dispatch {
            Some(last) => self.spacing.saturating_sub(Instant::now().saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        let wait = spacing_wait.max(self.remaining_cooldown());
        if wait > Duration::ZERO {
            debug!(wait_ms = wait.as_millis() as u64, "upstream scheduler waiting before dispatch");
            tokio::time::sleep(wait).await;
        }

        guard.last_dispatch = Some(Instant::now());
        drop(guard);

        thunk().await
    }
}
