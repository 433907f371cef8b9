use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use teebox::application::air_quality::{
    AirQualityCache, AirQualityError, AirQualityProvider, CachePolicy, Clock, Freshness,
};
use teebox::domain::air_quality::{CurrentConditions, IndexValue};
use time::OffsetDateTime;

struct FlakyProvider {
    failing: AtomicBool,
}

#[async_trait]
impl AirQualityProvider for FlakyProvider {
    async fn current_conditions(&self) -> Result<CurrentConditions, AirQualityError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AirQualityError::Status {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        Ok(CurrentConditions {
            indexes: vec![IndexValue {
                code: Some("uaqi".to_string()),
                aqi: Some(55),
                ..IndexValue::default()
            }],
            ..CurrentConditions::default()
        })
    }
}

struct FixedClock(Mutex<OffsetDateTime>);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().unwrap()
    }
}

#[tokio::test]
async fn cache_paths_emit_expected_counters() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let provider = Arc::new(FlakyProvider {
        failing: AtomicBool::new(false),
    });
    let clock = Arc::new(FixedClock(Mutex::new(OffsetDateTime::now_utc())));
    let cache = AirQualityCache::new(
        provider.clone(),
        clock.clone(),
        CachePolicy {
            ttl: Duration::from_secs(30),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(1),
            ..CachePolicy::default()
        },
    );

    assert_eq!(cache.current().await.unwrap().freshness, Freshness::Miss);
    assert_eq!(cache.current().await.unwrap().freshness, Freshness::Hit);

    *clock.0.lock().unwrap() += Duration::from_secs(31);
    provider.failing.store(true, Ordering::SeqCst);
    assert_eq!(cache.current().await.unwrap().freshness, Freshness::Stale);

    let counters: HashMap<String, u64> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(composite_key, _, _, value)| match value {
            DebugValue::Counter(count) => Some((composite_key.key().name().to_string(), count)),
            _ => None,
        })
        .collect();

    let expected = [
        ("teebox_aqi_cache_hit_total", 1),
        ("teebox_aqi_cache_miss_total", 2),
        ("teebox_aqi_cache_stale_total", 1),
        ("teebox_aqi_upstream_error_total", 2),
    ];
    for (metric, count) in expected {
        assert_eq!(
            counters.get(metric).copied(),
            Some(count),
            "unexpected value for {metric}"
        );
    }
}
