/*!
 * Weather station drivers.
 *
 * Both variants hold a [`WeatherCondition`] snapshot. The dummy variant
 * never changes it except for the averaging period; the HTTP variant
 * replaces the mapped fields from a station feed on every refresh and
 * leaves the unmapped ones (cloud cover, sky readings, FWHM) at zero.
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::device::{zero_time, DeviceCategory, DeviceError, Driver, DriverInfo, Result};
use crate::sensor::Sensor;
use crate::transport;

/// Maximum number of bytes of a station feed considered
pub const WEATHER_READ_LIMIT: usize = 4096;

/// Canonical weather snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    /// Averaging window in hours
    pub average_period: f64,
    /// Cloud cover in percent
    pub cloud_cover: f64,
    /// Dew point in degrees Celsius
    pub dew_point: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Pressure
    pub pressure: f64,
    /// Rain rate
    pub rain_rate: f64,
    /// Sky brightness
    pub sky_brightness: f64,
    /// Sky quality
    pub sky_quality: f64,
    /// Sky temperature
    pub sky_temperature: f64,
    /// Star full width at half maximum
    pub star_fwhm: f64,
    /// Ambient temperature
    pub temperature: f64,
    /// Wind direction in degrees
    pub wind_direction: f64,
    /// Wind gust
    pub wind_gust: f64,
    /// Wind speed
    pub wind_speed: f64,
}

impl WeatherCondition {
    /// Value of one sensor
    pub fn value(&self, sensor: Sensor) -> f64 {
        match sensor {
            Sensor::AveragePeriod => self.average_period,
            Sensor::CloudCover => self.cloud_cover,
            Sensor::DewPoint => self.dew_point,
            Sensor::Humidity => self.humidity,
            Sensor::Pressure => self.pressure,
            Sensor::RainRate => self.rain_rate,
            Sensor::SkyBrightness => self.sky_brightness,
            Sensor::SkyQuality => self.sky_quality,
            Sensor::SkyTemperature => self.sky_temperature,
            Sensor::StarFwhm => self.star_fwhm,
            Sensor::Temperature => self.temperature,
            Sensor::WindDirection => self.wind_direction,
            Sensor::WindGust => self.wind_gust,
            Sensor::WindSpeed => self.wind_speed,
        }
    }
}

/// Fields of the station feed that map onto the snapshot
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StationReport {
    temp: f64,
    dewpt: f64,
    humidity: f64,
    windspeedms: f64,
    windgustms: f64,
    winddir: f64,
    baromin: f64,
    rainin: f64,
}

impl StationReport {
    fn apply(&self, condition: &mut WeatherCondition) {
        condition.temperature = self.temp;
        condition.dew_point = self.dewpt;
        condition.humidity = self.humidity;
        condition.pressure = self.baromin;
        condition.wind_speed = self.windspeedms;
        condition.wind_gust = self.windgustms;
        condition.wind_direction = self.winddir;
        condition.rain_rate = self.rainin;
    }
}

#[derive(Debug, Clone)]
struct StationState {
    condition: WeatherCondition,
    last_refresh: DateTime<Utc>,
}

impl Default for StationState {
    fn default() -> Self {
        Self {
            condition: WeatherCondition::default(),
            last_refresh: zero_time(),
        }
    }
}

/// A station reporting a zeroed snapshot
#[derive(Debug)]
pub struct DummyStation {
    info: DriverInfo,
    state: RwLock<StationState>,
}

/// A station polling a JSON feed
#[derive(Debug)]
pub struct HttpStation {
    info: DriverInfo,
    url: String,
    client: Client,
    state: RwLock<StationState>,
}

/// A weather station driver
#[derive(Debug)]
pub enum ObservingConditions {
    /// Zeroed snapshot
    Dummy(DummyStation),
    /// JSON feed
    Http(HttpStation),
}

impl ObservingConditions {
    /// Create a station reporting zeros
    pub fn dummy(info: DriverInfo) -> Self {
        Self::Dummy(DummyStation {
            info,
            state: RwLock::new(StationState::default()),
        })
    }

    /// Create a station polling `url` and take a first reading.
    ///
    /// A failed first reading is logged; the station starts out zeroed.
    pub async fn http(info: DriverInfo, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(DeviceError::InvalidUrl);
        }

        let station = Self::Http(HttpStation {
            info,
            url,
            client: transport::client()?,
            state: RwLock::new(StationState::default()),
        });
        if let Err(e) = station.refresh().await {
            debug!(id = %station.id(), "Initial weather read failed: {}", e);
        }
        Ok(station)
    }

    fn state(&self) -> &RwLock<StationState> {
        match self {
            Self::Dummy(dummy) => &dummy.state,
            Self::Http(http) => &http.state,
        }
    }

    /// Current snapshot
    pub async fn condition(&self) -> WeatherCondition {
        self.state().read().await.condition
    }

    /// Current value of one sensor
    pub async fn value(&self, sensor: Sensor) -> f64 {
        self.condition().await.value(sensor)
    }

    /// Averaging window in hours
    pub async fn average_period(&self) -> f64 {
        self.state().read().await.condition.average_period
    }

    /// Set the averaging window; negative periods are rejected
    pub async fn set_average_period(&self, period: f64) -> Result<()> {
        if period < 0.0 || period.is_nan() {
            return Err(DeviceError::InvalidPeriod(period));
        }
        self.state().write().await.condition.average_period = period;
        Ok(())
    }

    /// When the snapshot was last replaced from the source
    pub async fn last_refresh(&self) -> DateTime<Utc> {
        self.state().read().await.last_refresh
    }

    /// Seconds elapsed since the last successful refresh
    pub async fn time_since_last_update(&self) -> f64 {
        let elapsed = Utc::now() - self.last_refresh().await;
        elapsed.num_milliseconds() as f64 / 1000.0
    }

    /// The snapshot as JSON
    pub async fn state_json(&self) -> String {
        serde_json::to_string(&self.condition().await).unwrap_or_default()
    }
}

impl HttpStation {
    async fn refresh(&self) -> Result<()> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(DeviceError::HttpStatus(status.as_u16()));
        }

        let body = transport::read_capped(response, WEATHER_READ_LIMIT).await?;
        let report: StationReport = serde_json::from_slice(&body)?;

        let mut state = self.state.write().await;
        report.apply(&mut state.condition);
        state.last_refresh = Utc::now();
        debug!(url = %self.url, "Refreshed weather conditions");
        Ok(())
    }
}

#[async_trait]
impl Driver for ObservingConditions {
    fn info(&self) -> &DriverInfo {
        match self {
            Self::Dummy(dummy) => &dummy.info,
            Self::Http(http) => &http.info,
        }
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::ObservingConditions
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Dummy(_) => "dummy",
            Self::Http(_) => "http",
        }
    }

    async fn refresh(&self) -> Result<()> {
        match self {
            Self::Dummy(_) => Ok(()),
            Self::Http(http) => http.refresh().await,
        }
    }

    async fn state_summary(&self) -> String {
        self.state_json().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{http::StatusCode as AxumStatus, routing::get, Router};

    use crate::transport::testing;

    const FEED: &str = r#"{
        "id": 7, "indoortemp": 21.5, "temp": 12.25, "dewpt": 4.5, "windchill": 11.0,
        "indoorhumidity": 40, "humidity": 63, "windspeedms": 3.2, "windgustms": 6.8,
        "winddir": 270, "absbaromin": 1003.1, "baromin": 1013.4, "rainin": 0.2,
        "dailyrainin": 1.1, "weeklyrainin": 3.0, "monthlyrainin": 9.9,
        "solarradiation": 0.0, "UV": 0, "dateutc": "2024-05-01 21:00:00",
        "softwaretype": "EasyWeather"
    }"#;

    fn info(id: &str) -> DriverInfo {
        DriverInfo::new(id, "Station", "test station")
    }

    async fn feed_url(app: Router) -> String {
        format!("http://{}/weather", testing::serve(app).await)
    }

    #[tokio::test]
    async fn test_dummy_station_is_zeroed() {
        let station = ObservingConditions::dummy(info("dummy"));
        tokio_test::assert_ok!(station.refresh().await);
        assert_eq!(station.condition().await, WeatherCondition::default());
        assert_eq!(station.last_refresh().await, zero_time());
        assert!(station.time_since_last_update().await > 0.0);
    }

    #[tokio::test]
    async fn test_average_period_validation() {
        let station = ObservingConditions::dummy(info("dummy"));
        station.set_average_period(0.0).await.unwrap();
        station.set_average_period(1.5).await.unwrap();
        assert_eq!(station.average_period().await, 1.5);

        let err = station.set_average_period(-1.0).await.unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPeriod(_)));
        assert_eq!(station.average_period().await, 1.5);
    }

    #[tokio::test]
    async fn test_empty_url_is_rejected() {
        let err = ObservingConditions::http(info("nowhere"), "").await.unwrap_err();
        assert!(matches!(err, DeviceError::InvalidUrl));
    }

    #[test_log::test(tokio::test)]
    async fn test_http_station_maps_feed() {
        let url = feed_url(Router::new().route("/weather", get(|| async { FEED }))).await;
        let station = ObservingConditions::http(info("station"), url).await.unwrap();

        let condition = station.condition().await;
        assert_eq!(condition.temperature, 12.25);
        assert_eq!(condition.dew_point, 4.5);
        assert_eq!(condition.humidity, 63.0);
        assert_eq!(condition.pressure, 1013.4);
        assert_eq!(condition.wind_speed, 3.2);
        assert_eq!(condition.wind_gust, 6.8);
        assert_eq!(condition.wind_direction, 270.0);
        assert_eq!(condition.rain_rate, 0.2);
        assert_eq!(condition.cloud_cover, 0.0);
        assert_eq!(condition.sky_quality, 0.0);

        assert!(station.last_refresh().await > zero_time());
        assert!(station.time_since_last_update().await < 60.0);
        assert_eq!(station.value(Sensor::Temperature).await, 12.25);
    }

    #[tokio::test]
    async fn test_http_station_rejects_error_status() {
        let app = Router::new().route(
            "/weather",
            get(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "down") }),
        );
        let station = ObservingConditions::http(info("station"), feed_url(app).await)
            .await
            .unwrap();

        let err = station.refresh().await.unwrap_err();
        assert!(matches!(err, DeviceError::HttpStatus(503)));
        assert_eq!(station.last_refresh().await, zero_time());
    }

    #[tokio::test]
    async fn test_http_station_rejects_malformed_feed() {
        let app = Router::new().route("/weather", get(|| async { "temperature: warm" }));
        let station = ObservingConditions::http(info("station"), feed_url(app).await)
            .await
            .unwrap();

        let err = station.refresh().await.unwrap_err();
        assert!(matches!(err, DeviceError::Parse(_)));
        assert_eq!(station.condition().await, WeatherCondition::default());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/weather",
            get(move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::OK, FEED)
                    } else {
                        (AxumStatus::INTERNAL_SERVER_ERROR, "")
                    }
                }
            }),
        );
        let station = ObservingConditions::http(info("station"), feed_url(app).await)
            .await
            .unwrap();
        station.set_average_period(2.0).await.unwrap();
        let before = station.condition().await;
        let refreshed_at = station.last_refresh().await;

        assert!(matches!(station.refresh().await, Err(DeviceError::HttpStatus(500))));
        assert_eq!(station.condition().await, before);
        assert_eq!(station.last_refresh().await, refreshed_at);
        assert_eq!(station.average_period().await, 2.0);
    }

    #[tokio::test]
    async fn test_state_json_uses_snake_case_keys() {
        let station = ObservingConditions::dummy(info("dummy"));
        let json: serde_json::Value = serde_json::from_str(&station.state_json().await).unwrap();
        assert_eq!(json["star_fwhm"], 0.0);
        assert_eq!(json["wind_direction"], 0.0);
        assert_eq!(json.as_object().unwrap().len(), 14);
    }
}
