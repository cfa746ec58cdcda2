use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::application::usecases::TickSettings;
use crate::domain::{Condition, Coordinates, Location, Rule, SubscriberId, Watch};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub tick_interval_seconds: u64,
    pub tick_deadline_seconds: Option<u64>,
    pub max_fetch_concurrency: Option<usize>,
    pub max_retry_attempts: Option<u32>,
    pub retry_backoff_base_ms: Option<u64>,
    pub retry_backoff_cap_ms: Option<u64>,
    pub significant_change_delta: Option<f64>,
    pub notify_retry_attempts: Option<u32>,
    pub locations: Vec<LocationCfg>,
    pub watches: Vec<WatchCfg>,
}

#[derive(Debug, Deserialize)]
pub struct LocationCfg {
    pub id: String,
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct WatchCfg {
    pub id: Option<String>,
    pub subscriber: String,
    pub location: String,
    pub rules: Vec<RuleCfg>,
}

#[derive(Debug, Deserialize)]
pub struct RuleCfg {
    pub id: String,
    pub cooldown_seconds: u64,
    pub conditions: Vec<Condition>,
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let raw = expand_env(&raw);
        let cfg: Config = serde_yaml::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn to_watches(&self) -> anyhow::Result<Vec<Watch>> {
        let mut sites: HashMap<&str, Location> = HashMap::new();
        for l in &self.locations {
            let coords = Coordinates::new(l.lat, l.lon)
                .with_context(|| format!("location {}", l.id))?;
            sites.insert(
                l.id.as_str(),
                Location {
                    id: l.id.clone(),
                    name: l.name.clone().unwrap_or_else(|| l.id.clone()),
                    coords,
                },
            );
        }

        let mut out = Vec::new();
        for w in &self.watches {
            let location = sites
                .get(w.location.as_str())
                .cloned()
                .with_context(|| format!("watch references unknown location {}", w.location))?;

            let mut rules = Vec::with_capacity(w.rules.len());
            for r in &w.rules {
                // InvalidRule is rejected here, before anything is stored
                let rule = Rule::new(r.id.clone(), r.conditions.clone(), r.cooldown_seconds)?;
                rules.push(rule);
            }

            let watch_id = w
                .id
                .clone()
                .unwrap_or_else(|| format!("tg:{}:{}", w.subscriber, w.location));
            out.push(Watch {
                id: watch_id,
                subscriber: SubscriberId(w.subscriber.clone()),
                location,
                rules,
                active: true,
            });
        }
        Ok(out)
    }

    pub fn tick_settings(&self) -> TickSettings {
        let defaults = TickSettings::default();
        TickSettings {
            max_fetch_concurrency: self
                .max_fetch_concurrency
                .unwrap_or(defaults.max_fetch_concurrency),
            max_retry_attempts: self.max_retry_attempts.unwrap_or(defaults.max_retry_attempts),
            retry_backoff_base: self
                .retry_backoff_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff_base),
            retry_backoff_cap: self
                .retry_backoff_cap_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff_cap),
            significant_change_delta: self
                .significant_change_delta
                .unwrap_or(defaults.significant_change_delta),
            notify_retry_attempts: self
                .notify_retry_attempts
                .unwrap_or(defaults.notify_retry_attempts),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds.max(1))
    }

    pub fn tick_deadline(&self) -> Duration {
        Duration::from_secs(self.tick_deadline_seconds.unwrap_or(120).max(1))
    }
}

/// very small ${VAR} expansion to keep config simple
fn expand_env(s: &str) -> String {
    let mut out = s.to_string();
    for (k, v) in std::env::vars() {
        out = out.replace(&format!("${{{}}}", k), &v);
    }
    out
}
