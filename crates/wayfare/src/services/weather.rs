use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use wayfare_core::{ApiError, ApiResponse, CompositeKey, RequestKey, RequestOpts, Result};

use super::backend::{require_str, row_f64, row_str, Query, QueryExecutor, Row};
use crate::client::RequestClient;
use crate::geo::LatLng;

pub const WEATHER_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: LatLng,
    pub temperature_c: f64,
    pub condition: String,
    pub humidity: Option<f64>,
    pub wind_kph: Option<f64>,
    pub observed_at: Option<String>,
}

impl WeatherReport {
    pub fn from_row(row: &Row, location: LatLng) -> Result<Self> {
        let temperature_c = row_f64(row, "temperature")
            .ok_or_else(|| ApiError::invalid_response("row is missing `temperature`"))?;
        Ok(Self {
            location,
            temperature_c,
            condition: require_str(row, "condition")?,
            humidity: row_f64(row, "humidity"),
            wind_kph: row_f64(row, "wind_speed"),
            observed_at: row_str(row, "observed_at"),
        })
    }
}

/// Cache key for the conditions around `location`, rounded to 2 decimals
pub fn weather_key(location: &LatLng) -> String {
    CompositeKey::new()
        .with_prefix("weather")
        .part(format!("{:.2}", location.lat))
        .part(format!("{:.2}", location.lng))
        .full_key()
}

/// Current conditions, one backend read per ~1 km cell per TTL
#[derive(Clone)]
pub struct WeatherService {
    client: RequestClient,
    executor: Arc<dyn QueryExecutor>,
}

impl WeatherService {
    pub fn new(client: RequestClient, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { client, executor }
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub async fn current(&self, location: LatLng) -> Result<ApiResponse<WeatherReport>> {
        let key = weather_key(&location);
        let executor = self.executor.clone();
        let query = Query::table("weather_conditions")
            .gte("latitude", location.lat - 0.05)
            .lte("latitude", location.lat + 0.05)
            .gte("longitude", location.lng - 0.05)
            .lte("longitude", location.lng + 0.05)
            .order_by_desc("observed_at")
            .limit(1);

        self.client
            .request(
                move || {
                    let executor = executor.clone();
                    let query = query.clone();
                    async move {
                        let rows = executor.execute(query).await?;
                        match rows.first() {
                            Some(row) => WeatherReport::from_row(row, location),
                            None => Err(ApiError::invalid_response(
                                "no weather observation near location",
                            )),
                        }
                    }
                },
                RequestOpts::new().ttl(WEATHER_TTL).endpoint("weather"),
                Some(&key),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryExecutor;
    use serde_json::json;
    use wayfare_core::ErrorKind;

    #[test]
    fn test_key_rounds_location() {
        assert_eq!(weather_key(&LatLng::new(41.38741, 2.16861)), "weather-41.39-2.17");
        assert_eq!(
            weather_key(&LatLng::new(41.3874, 2.1686)),
            weather_key(&LatLng::new(41.3891, 2.1712))
        );
    }

    #[tokio::test]
    async fn test_current_conditions() {
        let executor = InMemoryExecutor::new();
        executor
            .insert(
                "weather_conditions",
                &[json!({
                    "latitude": 41.39, "longitude": 2.17,
                    "temperature": 21.5, "condition": "clear",
                    "humidity": 60, "observed_at": "2026-05-01T10:00:00Z"
                })],
            )
            .unwrap();
        let service = WeatherService::new(RequestClient::default(), Arc::new(executor.clone()));

        let report = service.current(LatLng::new(41.3874, 2.1686)).await.unwrap();
        assert_eq!(report.data.temperature_c, 21.5);
        assert_eq!(report.data.condition, "clear");
        assert_eq!(report.data.wind_kph, None);

        let again = service.current(LatLng::new(41.3874, 2.1686)).await.unwrap();
        assert!(again.cached);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_observation_is_invalid_response() {
        let service = WeatherService::new(
            RequestClient::default(),
            Arc::new(InMemoryExecutor::new()),
        );
        let err = service.current(LatLng::new(0.0, 0.0)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert_eq!(err.endpoint.as_deref(), Some("weather"));
    }
}
