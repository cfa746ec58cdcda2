use async_trait::async_trait;
use serde::Deserialize;

use crate::application::{GatewayError, WeatherGateway};
use crate::domain::{Location, Observation};

const BASE_URL: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";

/// Visual Crossing adapter. The timeline endpoint reports dew point and
/// visibility, so this is the provider that supplies the thermal and
/// fog indicators: cloud base from the temperature/dew-point spread,
/// fog probability from conditions text and visibility.
pub struct VisualCrossingGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl VisualCrossingGateway {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimelineResp {
    #[serde(rename = "currentConditions")]
    current: CurrentConditions,
}

// unitGroup=metric: temp in Celsius, wind in km/h, visibility in km
#[derive(Debug, Deserialize)]
struct CurrentConditions {
    #[serde(rename = "datetimeEpoch")]
    datetime_epoch: i64,
    temp: Option<f64>,
    dew: Option<f64>,
    humidity: Option<f64>,
    windspeed: Option<f64>,
    windgust: Option<f64>,
    winddir: Option<f64>,
    precipprob: Option<f64>, // 0-100
    visibility: Option<f64>,
    conditions: Option<String>,
}

#[async_trait]
impl WeatherGateway for VisualCrossingGateway {
    async fn fetch(&self, location: &Location) -> Result<Observation, GatewayError> {
        let url = format!(
            "{}/{},{}/today",
            self.base_url,
            location.coords.lat(),
            location.coords.lon()
        );

        let resp = self
            .client
            .get(url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("unitGroup", "metric"),
                ("include", "current"),
                ("contentType", "json"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::InvalidLocation(format!(
                "{}: provider returned {}",
                location.id, status
            )));
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: TimelineResp = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        let cur = body.current;

        let wind_speed_ms = cur
            .windspeed
            .map(kmh_to_ms)
            .ok_or_else(|| GatewayError::Unavailable("no wind speed in response".into()))?;

        Ok(Observation {
            location_id: location.id.clone(),
            wind_speed_ms,
            wind_gust_ms: cur.windgust.map(kmh_to_ms),
            wind_direction_deg: normalize_direction(cur.winddir),
            precip_probability: (cur.precipprob.unwrap_or(0.0) / 100.0).clamp(0.0, 1.0),
            temperature_c: cur.temp,
            humidity_pct: cur.humidity,
            cloud_base_m: cloud_base_m(cur.temp, cur.dew),
            fog_probability: Some(fog_probability(
                cur.conditions.as_deref().unwrap_or(""),
                cur.visibility,
            )),
            observed_at: cur.datetime_epoch,
        })
    }
}

fn kmh_to_ms(kmh: f64) -> f64 {
    kmh / 3.6
}

fn normalize_direction(deg: Option<f64>) -> u16 {
    let d = deg.unwrap_or(0.0).rem_euclid(360.0);
    (d.round() as u16) % 360
}

/// Cloud base estimate in meters AGL: ~125 m per degree of
/// temperature/dew-point spread. None when either reading is missing.
fn cloud_base_m(temp: Option<f64>, dew: Option<f64>) -> Option<f64> {
    let (t, d) = (temp?, dew?);
    Some((125.0 * (t - d)).max(0.0).round())
}

/// Fog probability 0-1 from the conditions text and visibility in km.
fn fog_probability(conditions: &str, visibility_km: Option<f64>) -> f64 {
    let cond = conditions.to_lowercase();
    if ["fog", "mist", "haze", "туман"].iter().any(|w| cond.contains(w)) {
        return 1.0;
    }
    match visibility_km {
        Some(v) if v < 1.0 => 0.8,
        Some(v) if v < 2.0 => 0.5,
        _ => 0.0,
    }
}
