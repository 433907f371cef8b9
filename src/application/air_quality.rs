//! Cached proxy in front of the third-party air-quality API.
//!
//! The cache is a single slot owned by [`AirQualityCache`], constructed once at
//! startup and shared through the HTTP state. A reading is fresh for the
//! configured TTL after the last successful fetch. Once stale, the next read
//! refreshes it; if the upstream is down the previous reading is served with a
//! staleness marker. Only an empty cache surfaces upstream failures.
//!
//! Concurrent misses are coalesced: refreshes run behind a mutex and re-check
//! freshness after acquiring it, so waiters reuse the winner's result instead
//! of issuing their own upstream call. A failed refresh is shared the same
//! way: callers that queued behind it serve the stale reading or its error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::domain::air_quality::{AirQualityReading, CurrentConditions};

const SOURCE: &str = "application::air_quality::AirQualityCache";

#[derive(Debug, Clone, Error)]
pub enum AirQualityError {
    #[error("air-quality upstream request failed: {0}")]
    Upstream(String),
    #[error("air-quality upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("air-quality upstream timed out after {0:?}")]
    Timeout(Duration),
    #[error("air-quality payload could not be decoded: {0}")]
    Decode(String),
}

/// Source of "current conditions" for the venue coordinate.
#[async_trait]
pub trait AirQualityProvider: Send + Sync {
    async fn current_conditions(&self) -> Result<CurrentConditions, AirQualityError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub upstream_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub local_index_code: String,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(45 * 60),
            upstream_timeout: Duration::from_secs(5),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(250),
            local_index_code: "usa_epa".to_string(),
        }
    }
}

/// How a reading was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a reading younger than the TTL.
    Hit,
    /// Fetched from the upstream during this call.
    Miss,
    /// Upstream failed; the last known reading is older than the TTL.
    Stale,
}

impl Freshness {
    pub fn as_str(self) -> &'static str {
        match self {
            Freshness::Hit => "hit",
            Freshness::Miss => "miss",
            Freshness::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedReading {
    pub reading: AirQualityReading,
    pub freshness: Freshness,
}

#[derive(Debug, Clone)]
struct CachedReading {
    reading: AirQualityReading,
    captured_at: OffsetDateTime,
}

pub struct AirQualityCache {
    provider: Arc<dyn AirQualityProvider>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    slot: RwLock<Option<CachedReading>>,
    /// Held while refreshing; remembers the last failed attempt.
    refresh: Mutex<Option<AirQualityError>>,
    /// Completed refresh attempts, used by waiters to spot a finished one.
    attempts: AtomicU64,
}

impl AirQualityCache {
    pub fn new(
        provider: Arc<dyn AirQualityProvider>,
        clock: Arc<dyn Clock>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            provider,
            clock,
            policy,
            slot: RwLock::new(None),
            refresh: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// Latest reading, refreshing from upstream when the cached one expired.
    pub async fn current(&self) -> Result<ServedReading, AirQualityError> {
        if let Some(reading) = self.fresh_reading().await {
            counter!("teebox_aqi_cache_hit_total").increment(1);
            return Ok(ServedReading {
                reading,
                freshness: Freshness::Hit,
            });
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(reading) = self.fresh_reading().await {
            counter!("teebox_aqi_cache_hit_total").increment(1);
            return Ok(ServedReading {
                reading,
                freshness: Freshness::Hit,
            });
        }
        // Or tried and failed; share its outcome instead of calling again.
        if self.attempts.load(Ordering::Acquire) != seen
            && let Some(err) = last_failure.clone()
        {
            return self.fall_back(err).await;
        }

        counter!("teebox_aqi_cache_miss_total").increment(1);
        let outcome = self.fetch_with_retry().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(conditions) => {
                *last_failure = None;
                let captured_at = self.clock.now();
                let reading = AirQualityReading::from_conditions(
                    &conditions,
                    &self.policy.local_index_code,
                    captured_at,
                );
                *self.slot.write().await = Some(CachedReading {
                    reading: reading.clone(),
                    captured_at,
                });
                Ok(ServedReading {
                    reading,
                    freshness: Freshness::Miss,
                })
            }
            Err(err) => {
                *last_failure = Some(err.clone());
                self.fall_back(err).await
            }
        }
    }

    /// Serve the previous reading as stale, or surface `err` when there is none.
    async fn fall_back(&self, err: AirQualityError) -> Result<ServedReading, AirQualityError> {
        let previous = self.slot.read().await.clone();
        let Some(entry) = previous else {
            return Err(err);
        };

        counter!("teebox_aqi_cache_stale_total").increment(1);
        warn!(
            target = "teebox::air_quality",
            source = SOURCE,
            error = %err,
            captured_at = %entry.captured_at,
            "serving stale air-quality reading"
        );
        Ok(ServedReading {
            reading: entry.reading,
            freshness: Freshness::Stale,
        })
    }

    async fn fresh_reading(&self) -> Option<AirQualityReading> {
        let guard = self.slot.read().await;
        let entry = guard.as_ref()?;
        let now = self.clock.now();
        (now < entry.captured_at + self.policy.ttl).then(|| entry.reading.clone())
    }

    async fn fetch_with_retry(&self) -> Result<CurrentConditions, AirQualityError> {
        let attempts = self.policy.retry_attempts.max(1);
        let mut backoff = self.policy.retry_backoff;
        let mut attempt = 1;

        loop {
            let result = tokio::time::timeout(
                self.policy.upstream_timeout,
                self.provider.current_conditions(),
            )
            .await
            .unwrap_or(Err(AirQualityError::Timeout(self.policy.upstream_timeout)));

            match result {
                Ok(conditions) => return Ok(conditions),
                Err(err) => {
                    counter!("teebox_aqi_upstream_error_total").increment(1);
                    if attempt >= attempts {
                        return Err(err);
                    }
                    debug!(
                        target = "teebox::air_quality",
                        attempt,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying air-quality upstream"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}
