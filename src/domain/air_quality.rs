//! Air-quality readings and the shaping rules applied to upstream payloads.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Index code every upstream response carries regardless of region.
pub const UNIVERSAL_INDEX_CODE: &str = "uaqi";

/// Reading served to the site widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AirQualityReading {
    pub aqi: i64,
    pub category: String,
    pub dominant_pollutant: String,
    pub health_tip: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Upstream "current conditions" payload. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CurrentConditions {
    pub date_time: Option<String>,
    pub region_code: Option<String>,
    pub indexes: Vec<IndexValue>,
    pub health_recommendations: Option<HealthRecommendations>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexValue {
    pub code: Option<String>,
    pub display_name: Option<String>,
    pub aqi: Option<i64>,
    pub category: Option<String>,
    pub dominant_pollutant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthRecommendations {
    pub general_population: Option<String>,
}

/// Pick the index to display: the local code first, then the universal one,
/// then whatever came first.
pub fn select_index<'a>(indexes: &'a [IndexValue], local_code: &str) -> Option<&'a IndexValue> {
    let by_code = |code: &str| {
        indexes
            .iter()
            .find(|index| index.code.as_deref() == Some(code))
    };

    by_code(local_code)
        .or_else(|| by_code(UNIVERSAL_INDEX_CODE))
        .or_else(|| indexes.first())
}

impl AirQualityReading {
    /// Shape an upstream payload, defaulting absent fields to empty values.
    pub fn from_conditions(
        conditions: &CurrentConditions,
        local_code: &str,
        fetched_at: OffsetDateTime,
    ) -> Self {
        let index = select_index(&conditions.indexes, local_code);

        let updated_at = conditions
            .date_time
            .as_deref()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
            .unwrap_or(fetched_at);

        Self {
            aqi: index.and_then(|index| index.aqi).unwrap_or(0),
            category: index
                .and_then(|index| index.category.clone())
                .unwrap_or_default(),
            dominant_pollutant: index
                .and_then(|index| index.dominant_pollutant.clone())
                .unwrap_or_default(),
            health_tip: conditions
                .health_recommendations
                .as_ref()
                .and_then(|tips| tips.general_population.clone())
                .unwrap_or_default(),
            updated_at,
        }
    }
}
