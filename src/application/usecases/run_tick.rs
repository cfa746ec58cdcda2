use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::{self, StreamExt};

use crate::application::messages;
use crate::application::{AppResult, GatewayError, Notifier, SubscriptionStore, WeatherGateway};
use crate::domain::policy::{self, backoff_delay, NotifyDecision};
use crate::domain::{Location, Observation, Verdict, Watch};

/// Explicit per-tick state token. Tests construct these directly to
/// drive multiple deterministic ticks; the driver loop stamps them
/// with the wall clock.
#[derive(Clone, Copy, Debug)]
pub struct TickContext {
    pub seq: u64,
    pub now_epoch: i64,
}

impl TickContext {
    pub fn at(seq: u64, now_epoch: i64) -> Self {
        Self { seq, now_epoch }
    }

    pub fn now(seq: u64) -> Self {
        let now_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self { seq, now_epoch }
    }
}

#[derive(Clone, Debug)]
pub struct TickSettings {
    pub max_fetch_concurrency: usize,
    pub max_retry_attempts: u32,
    pub retry_backoff_base: Duration,
    pub retry_backoff_cap: Duration,
    pub significant_change_delta: f64,
    pub notify_retry_attempts: u32,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            max_fetch_concurrency: 4,
            max_retry_attempts: 3,
            retry_backoff_base: Duration::from_millis(500),
            retry_backoff_cap: Duration::from_secs(8),
            significant_change_delta: 0.5,
            notify_retry_attempts: 2,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub locations_fetched: usize,
    pub fetch_failures: usize,
    pub rules_evaluated: usize,
    pub alerts_sent: usize,
    pub alerts_suppressed: usize,
    pub insufficient_data: usize,
    pub deliveries_failed: usize,
    pub watches_deactivated: usize,
    pub watch_errors: usize,
}

/// One scheduler tick: fetch each distinct location once (bounded
/// concurrency, capped-backoff retries), then evaluate, gate and
/// notify per watch/rule strictly sequentially. A failure at one
/// location or for one subscriber never spills over to the rest.
pub struct RunTickUseCase<'a> {
    pub store: &'a dyn SubscriptionStore,
    pub gateway: &'a dyn WeatherGateway,
    pub notifier: &'a dyn Notifier,
    pub settings: TickSettings,
}

impl<'a> RunTickUseCase<'a> {
    pub async fn execute(&self, tick: &TickContext) -> AppResult<TickReport> {
        let watches = self.store.list_active_watches().await?;

        // one fetch per distinct location, even when shared by many watches
        let mut locations: HashMap<String, Location> = HashMap::new();
        for w in &watches {
            locations
                .entry(w.location.id.clone())
                .or_insert_with(|| w.location.clone());
        }

        tracing::debug!(
            seq = tick.seq,
            watches = watches.len(),
            locations = locations.len(),
            "tick starting"
        );

        let fetches: HashMap<String, Result<Observation, GatewayError>> =
            stream::iter(locations.into_values())
                .map(|loc| async move {
                    let res = self.fetch_with_retry(&loc).await;
                    (loc.id.clone(), res)
                })
                .buffer_unordered(self.settings.max_fetch_concurrency.max(1))
                .collect()
                .await;

        let locations_fetched = fetches.values().filter(|r| r.is_ok()).count();
        let mut report = TickReport {
            locations_fetched,
            fetch_failures: fetches.len() - locations_fetched,
            ..TickReport::default()
        };

        // mutation of alert state happens only here, single-threaded
        for watch in &watches {
            let outcome = match fetches.get(&watch.location.id) {
                Some(Ok(obs)) => self.evaluate_watch(tick, watch, Some(obs), &mut report).await,
                Some(Err(e)) if !e.is_transient() => {
                    self.handle_invalid_location(watch, e, &mut report).await
                }
                // transient failure after exhausted retries (or a
                // location missing from the fetch map)
                _ => self.evaluate_watch(tick, watch, None, &mut report).await,
            };

            if let Err(e) = outcome {
                report.watch_errors += 1;
                tracing::warn!(seq = tick.seq, watch = %watch.id, error = %e, "watch skipped");
            }
        }

        tracing::info!(
            seq = tick.seq,
            fetched = report.locations_fetched,
            fetch_failures = report.fetch_failures,
            sent = report.alerts_sent,
            suppressed = report.alerts_suppressed,
            "tick finished"
        );

        Ok(report)
    }

    async fn fetch_with_retry(&self, location: &Location) -> Result<Observation, GatewayError> {
        let mut attempt = 0u32;
        loop {
            match self.gateway.fetch(location).await {
                Ok(obs) => return Ok(obs),
                Err(e) if e.is_transient() && attempt < self.settings.max_retry_attempts => {
                    let delay = backoff_delay(
                        attempt,
                        self.settings.retry_backoff_base,
                        self.settings.retry_backoff_cap,
                    );
                    tracing::warn!(
                        location = %location.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(location = %location.id, error = %e, "fetch gave up");
                    return Err(e);
                }
            }
        }
    }

    async fn evaluate_watch(
        &self,
        tick: &TickContext,
        watch: &Watch,
        obs: Option<&Observation>,
        report: &mut TickReport,
    ) -> AppResult<()> {
        for rule in &watch.rules {
            let (verdict, fingerprint) = match obs {
                Some(o) => (rule.evaluate(o), Some(o.fingerprint())),
                None => (Verdict::InsufficientData, None),
            };
            report.rules_evaluated += 1;
            if verdict == Verdict::InsufficientData {
                report.insufficient_data += 1;
            }

            let prev = self.store.get_alert_state(&watch.id, &rule.id).await?;
            let decision = policy::decide(
                prev.as_ref(),
                verdict,
                fingerprint.as_ref(),
                tick.now_epoch,
                rule.cooldown_seconds,
                self.settings.significant_change_delta,
            );

            let mut notified = false;
            match decision {
                NotifyDecision::Send(reason) => {
                    // Alert verdicts always carry an observation
                    if let Some(o) = obs {
                        let msg = messages::render_alert(watch, rule, o, reason);
                        match self.send_with_retry(watch, &msg).await {
                            Ok(()) => {
                                notified = true;
                                report.alerts_sent += 1;
                                tracing::info!(
                                    watch = %watch.id,
                                    rule = %rule.id,
                                    reason = ?reason,
                                    "alert sent"
                                );
                            }
                            Err(e) => {
                                // dropped; clock not advanced, so a
                                // still-alerting condition retries next tick
                                report.deliveries_failed += 1;
                                tracing::error!(
                                    watch = %watch.id,
                                    rule = %rule.id,
                                    error = %e,
                                    "alert dropped after delivery retries"
                                );
                            }
                        }
                    }
                }
                NotifyDecision::Suppress(reason) => {
                    if verdict == Verdict::Alert {
                        report.alerts_suppressed += 1;
                        tracing::debug!(
                            watch = %watch.id,
                            rule = %rule.id,
                            reason = ?reason,
                            "alert suppressed"
                        );
                    }
                }
            }

            let next = policy::next_state(
                prev.as_ref(),
                verdict,
                fingerprint.as_ref(),
                tick.now_epoch,
                notified,
            );
            self.store.upsert_alert_state(&watch.id, &rule.id, &next).await?;
        }
        Ok(())
    }

    async fn handle_invalid_location(
        &self,
        watch: &Watch,
        err: &GatewayError,
        report: &mut TickReport,
    ) -> AppResult<()> {
        tracing::warn!(
            watch = %watch.id,
            location = %watch.location.id,
            error = %err,
            "provider rejected location, deactivating watch"
        );
        self.store.deactivate_watch(&watch.id).await?;
        report.watches_deactivated += 1;

        // one-time notice; the watch is inactive from the next tick on
        let notice = messages::render_invalid_location(watch);
        if let Err(e) = self.send_with_retry(watch, &notice).await {
            report.deliveries_failed += 1;
            tracing::error!(watch = %watch.id, error = %e, "deactivation notice dropped");
        }
        Ok(())
    }

    async fn send_with_retry(&self, watch: &Watch, message: &str) -> AppResult<()> {
        let mut attempt = 0u32;
        loop {
            match self.notifier.send(&watch.subscriber, message).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.settings.notify_retry_attempts => {
                    let delay = backoff_delay(
                        attempt,
                        self.settings.retry_backoff_base,
                        self.settings.retry_backoff_cap,
                    );
                    tracing::warn!(
                        subscriber = %watch.subscriber,
                        attempt,
                        error = %e,
                        "delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
