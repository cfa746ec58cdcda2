use async_trait::async_trait;
use serde::Deserialize;

use crate::application::{GatewayError, WeatherGateway};
use crate::domain::{Location, Observation};

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// OpenWeather adapter. Normalizes the provider response into the
/// canonical observation schema right here; provider field names never
/// leak past this boundary.
pub struct OpenWeatherGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherGateway {
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

// /forecast is the one free endpoint carrying wind, gust and pop
// together; cnt=1 gives the nearest slot as the observation snapshot
#[derive(Debug, Deserialize)]
struct ForecastResp {
    list: Vec<ForecastSlot>,
}

#[derive(Debug, Deserialize)]
struct ForecastSlot {
    dt: i64,
    main: SlotMain,
    wind: SlotWind,
    pop: Option<f64>, // 0-1 already
}

#[derive(Debug, Deserialize)]
struct SlotMain {
    temp: Option<f64>, // Celsius with units=metric
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SlotWind {
    speed: f64, // m/s with units=metric
    gust: Option<f64>,
    deg: Option<f64>,
}

#[async_trait]
impl WeatherGateway for OpenWeatherGateway {
    async fn fetch(&self, location: &Location) -> Result<Observation, GatewayError> {
        let url = format!("{}/forecast", self.base_url);

        let resp = self
            .client
            .get(url)
            .query(&[
                ("lat", location.coords.lat().to_string()),
                ("lon", location.coords.lon().to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
                ("cnt", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::NOT_FOUND {
            // the provider rejected the coordinates themselves
            return Err(GatewayError::InvalidLocation(format!(
                "{}: provider returned {}",
                location.id, status
            )));
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let body: ForecastResp = resp
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let slot = body
            .list
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Unavailable("empty forecast list".into()))?;

        Ok(Observation {
            location_id: location.id.clone(),
            wind_speed_ms: slot.wind.speed,
            wind_gust_ms: slot.wind.gust,
            wind_direction_deg: normalize_direction(slot.wind.deg),
            precip_probability: slot.pop.unwrap_or(0.0).clamp(0.0, 1.0),
            temperature_c: slot.main.temp,
            humidity_pct: slot.main.humidity,
            // not reported by this endpoint; the composite gateway
            // fills these from a provider that derives them
            cloud_base_m: None,
            fog_probability: None,
            observed_at: slot.dt,
        })
    }
}

fn normalize_direction(deg: Option<f64>) -> u16 {
    let d = deg.unwrap_or(0.0).rem_euclid(360.0);
    (d.round() as u16) % 360
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_normalized_into_0_359() {
        assert_eq!(normalize_direction(Some(359.6)), 0);
        assert_eq!(normalize_direction(Some(360.0)), 0);
        assert_eq!(normalize_direction(Some(-10.0)), 350);
        assert_eq!(normalize_direction(Some(180.0)), 180);
        assert_eq!(normalize_direction(None), 0);
    }
}
