//! HTTP client for the Google-style air-quality "current conditions" API.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;

use crate::application::air_quality::{AirQualityError, AirQualityProvider};
use crate::config::AirQualitySettings;
use crate::domain::air_quality::CurrentConditions;

const LOOKUP_PATH: &str = "v1/currentConditions:lookup";
const EXTRA_COMPUTATIONS: [&str; 3] = [
    "HEALTH_RECOMMENDATIONS",
    "LOCAL_AQI",
    "DOMINANT_POLLUTANT_CONCENTRATION",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    location: Location,
    extra_computations: &'a [&'a str],
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Clone, Debug)]
pub struct GoogleAirQualityClient {
    client: Client,
    base: Url,
    api_key: Option<String>,
    latitude: f64,
    longitude: f64,
    language_code: String,
}

impl GoogleAirQualityClient {
    pub fn new(settings: &AirQualitySettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .connect_timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            base: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            latitude: settings.latitude,
            longitude: settings.longitude,
            language_code: settings.language_code.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("teebox/", env!("CARGO_PKG_VERSION"))
    }

    fn lookup_url(&self, api_key: &str) -> Result<Url, AirQualityError> {
        let mut url = self
            .base
            .join(LOOKUP_PATH)
            .map_err(|err| AirQualityError::Upstream(format!("invalid lookup URL: {err}")))?;
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }

    fn request_body(&self) -> LookupRequest<'_> {
        LookupRequest {
            location: Location {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            extra_computations: &EXTRA_COMPUTATIONS,
            language_code: &self.language_code,
        }
    }
}

#[async_trait]
impl AirQualityProvider for GoogleAirQualityClient {
    async fn current_conditions(&self) -> Result<CurrentConditions, AirQualityError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AirQualityError::Upstream("API key is not configured".to_string()))?;

        let response = self
            .client
            .post(self.lookup_url(api_key)?)
            .json(&self.request_body())
            .send()
            .await
            .map_err(|err| AirQualityError::Upstream(err.without_url().to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| AirQualityError::Upstream(err.without_url().to_string()))?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).chars().take(512).collect();
            return Err(AirQualityError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| AirQualityError::Decode(err.to_string()))
    }
}
