use serde::{Deserialize, Serialize};

/// Canonical weather snapshot for a location. Providers are normalized
/// into this schema at the adapter boundary: wind in m/s, direction in
/// degrees 0-359, probabilities 0-1, cloud base in meters AGL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub location_id: String,
    pub wind_speed_ms: f64,
    pub wind_gust_ms: Option<f64>, // not every provider/station reports gusts
    pub wind_direction_deg: u16,
    pub precip_probability: f64,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub cloud_base_m: Option<f64>,     // thermal ceiling estimate
    pub fog_probability: Option<f64>,  // 0-1
    pub observed_at: i64, // epoch seconds
}

impl Observation {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            wind_speed_ms: self.wind_speed_ms,
            wind_gust_ms: self.wind_gust_ms,
            precip_probability: self.precip_probability,
        }
    }

    /// Fill fields this snapshot is missing from another provider's
    /// reading of the same location. Present values always win; only
    /// `None` gaps are taken from `other`.
    pub fn fill_gaps_from(&mut self, other: &Observation) {
        if self.wind_gust_ms.is_none() {
            self.wind_gust_ms = other.wind_gust_ms;
        }
        if self.temperature_c.is_none() {
            self.temperature_c = other.temperature_c;
        }
        if self.humidity_pct.is_none() {
            self.humidity_pct = other.humidity_pct;
        }
        if self.cloud_base_m.is_none() {
            self.cloud_base_m = other.cloud_base_m;
        }
        if self.fog_probability.is_none() {
            self.fog_probability = other.fog_probability;
        }
    }
}

/// Comparable summary of an observation, kept in AlertState to detect
/// a significantly worse reading inside a cooldown window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub wind_speed_ms: f64,
    pub wind_gust_ms: Option<f64>,
    pub precip_probability: f64,
}

impl Fingerprint {
    /// Largest change versus `other`: relative for wind speed and gust,
    /// absolute for precipitation probability (already a 0-1 fraction).
    pub fn delta(&self, other: &Fingerprint) -> f64 {
        let mut delta = relative_delta(other.wind_speed_ms, self.wind_speed_ms);

        if let (Some(old), Some(new)) = (other.wind_gust_ms, self.wind_gust_ms) {
            delta = delta.max(relative_delta(old, new));
        }

        delta.max((self.precip_probability - other.precip_probability).abs())
    }

    pub fn differs_significantly(&self, other: &Fingerprint, threshold: f64) -> bool {
        self.delta(other) > threshold
    }
}

fn relative_delta(old: f64, new: f64) -> f64 {
    let base = old.abs().max(0.1); // avoid blowup near zero wind
    (new - old).abs() / base
}
