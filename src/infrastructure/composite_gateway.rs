use async_trait::async_trait;

use crate::application::{GatewayError, WeatherGateway};
use crate::domain::{Location, Observation};

/// Merges two providers into one reading per location. The primary's
/// values win; fields it leaves empty (gusts, cloud base, fog) are
/// filled from the secondary, and either side alone still yields an
/// observation when the other is down.
pub struct CompositeWeatherGateway {
    primary: Box<dyn WeatherGateway>,
    secondary: Box<dyn WeatherGateway>,
}

impl CompositeWeatherGateway {
    pub fn new(primary: Box<dyn WeatherGateway>, secondary: Box<dyn WeatherGateway>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl WeatherGateway for CompositeWeatherGateway {
    async fn fetch(&self, location: &Location) -> Result<Observation, GatewayError> {
        let (primary, secondary) =
            tokio::join!(self.primary.fetch(location), self.secondary.fetch(location));

        match (primary, secondary) {
            (Ok(mut obs), Ok(other)) => {
                obs.fill_gaps_from(&other);
                Ok(obs)
            }
            (Ok(obs), Err(e)) => {
                tracing::warn!(location = %location.id, error = %e, "secondary provider failed");
                Ok(obs)
            }
            (Err(e), Ok(obs)) => {
                tracing::warn!(location = %location.id, error = %e, "primary provider failed");
                Ok(obs)
            }
            // a location rejected by either provider is rejected
            // outright; transient errors surface as the primary's
            (Err(p), Err(s)) => {
                if !p.is_transient() {
                    Err(p)
                } else if !s.is_transient() {
                    Err(s)
                } else {
                    Err(p)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Coordinates;
    use crate::infrastructure::fake_gateway::FakeWeatherGateway;

    fn site() -> Location {
        Location {
            id: "yutsa".into(),
            name: "Юца".into(),
            coords: Coordinates::new(43.98, 42.99).unwrap(),
        }
    }

    fn bare_obs(wind: f64) -> Observation {
        Observation {
            location_id: "yutsa".into(),
            wind_speed_ms: wind,
            wind_gust_ms: None,
            wind_direction_deg: 200,
            precip_probability: 0.1,
            temperature_c: Some(18.0),
            humidity_pct: Some(55.0),
            cloud_base_m: None,
            fog_probability: None,
            observed_at: 100,
        }
    }

    fn rich_obs(wind: f64) -> Observation {
        Observation {
            wind_gust_ms: Some(wind * 1.5),
            cloud_base_m: Some(1100.0),
            fog_probability: Some(0.0),
            ..bare_obs(wind)
        }
    }

    #[tokio::test]
    async fn secondary_fills_cloud_and_fog_gaps() {
        let primary = FakeWeatherGateway::new();
        let secondary = FakeWeatherGateway::new();
        primary.push_ok("yutsa", bare_obs(6.0));
        secondary.push_ok("yutsa", rich_obs(7.0));
        let composite =
            CompositeWeatherGateway::new(Box::new(primary), Box::new(secondary));

        let obs = composite.fetch(&site()).await.unwrap();

        // the primary's wind stands, the gaps come from the secondary
        assert_eq!(obs.wind_speed_ms, 6.0);
        assert_eq!(obs.wind_gust_ms, Some(10.5));
        assert_eq!(obs.cloud_base_m, Some(1100.0));
        assert_eq!(obs.fog_probability, Some(0.0));
    }

    #[tokio::test]
    async fn one_provider_down_still_yields_an_observation() {
        let primary = FakeWeatherGateway::new();
        let secondary = FakeWeatherGateway::new();
        primary.push_err("yutsa", GatewayError::Unavailable("503".into()));
        secondary.push_ok("yutsa", rich_obs(8.0));
        let composite =
            CompositeWeatherGateway::new(Box::new(primary), Box::new(secondary));

        let obs = composite.fetch(&site()).await.unwrap();
        assert_eq!(obs.wind_speed_ms, 8.0);
    }

    #[tokio::test]
    async fn both_down_is_a_transient_failure() {
        let primary = FakeWeatherGateway::new();
        let secondary = FakeWeatherGateway::new();
        primary.push_err("yutsa", GatewayError::Unavailable("503".into()));
        secondary.push_err("yutsa", GatewayError::Unavailable("timeout".into()));
        let composite =
            CompositeWeatherGateway::new(Box::new(primary), Box::new(secondary));

        let err = composite.fetch(&site()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn rejected_location_is_permanent_even_when_only_one_side_says_so() {
        let primary = FakeWeatherGateway::new();
        let secondary = FakeWeatherGateway::new();
        primary.push_err("yutsa", GatewayError::Unavailable("503".into()));
        secondary.push_err("yutsa", GatewayError::InvalidLocation("400".into()));
        let composite =
            CompositeWeatherGateway::new(Box::new(primary), Box::new(secondary));

        let err = composite.fetch(&site()).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
