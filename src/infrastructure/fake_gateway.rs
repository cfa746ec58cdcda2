use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::{GatewayError, WeatherGateway};
use crate::domain::{Location, Observation};

/// Scripted gateway for tests: per-location queues of results, popped
/// one per fetch attempt, so retry and isolation paths are drivable.
#[derive(Default)]
pub struct FakeWeatherGateway {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    scripted: HashMap<String, VecDeque<Result<Observation, GatewayError>>>,
    calls: HashMap<String, u32>,
}

impl FakeWeatherGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, location_id: &str, obs: Observation) {
        self.push(location_id, Ok(obs));
    }

    pub fn push_err(&self, location_id: &str, err: GatewayError) {
        self.push(location_id, Err(err));
    }

    fn push(&self, location_id: &str, result: Result<Observation, GatewayError>) {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        inner
            .scripted
            .entry(location_id.to_string())
            .or_default()
            .push_back(result);
    }

    /// Number of fetch attempts seen for a location (retries included).
    pub fn calls(&self, location_id: &str) -> u32 {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        inner.calls.get(location_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl WeatherGateway for FakeWeatherGateway {
    async fn fetch(&self, location: &Location) -> Result<Observation, GatewayError> {
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        *inner.calls.entry(location.id.clone()).or_insert(0) += 1;

        inner
            .scripted
            .get_mut(&location.id)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| {
                Err(GatewayError::Unavailable(format!(
                    "no scripted observation for {}",
                    location.id
                )))
            })
    }
}
