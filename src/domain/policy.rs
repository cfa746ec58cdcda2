use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Fingerprint, Verdict};

/// Per (watch, rule) notification state. Created lazily on the first
/// evaluation, updated on every evaluation after that.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub last_verdict: Verdict,
    /// None means the cooldown clock is cleared (never notified, or the
    /// condition recovered since the last notification).
    pub last_notified_at: Option<i64>,
    pub last_fingerprint: Option<Fingerprint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendReason {
    FirstAlert,
    CooldownElapsed,
    SignificantChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuppressReason {
    NotAlert,
    Cooldown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyDecision {
    Send(SendReason),
    Suppress(SuppressReason),
}

impl NotifyDecision {
    pub fn should_send(&self) -> bool {
        matches!(self, NotifyDecision::Send(_))
    }
}

/// Dedup/cooldown gate. Pure: the caller passes `now` explicitly.
pub fn decide(
    prev: Option<&AlertState>,
    verdict: Verdict,
    fingerprint: Option<&Fingerprint>,
    now: i64,
    cooldown_seconds: u64,
    significant_change_delta: f64,
) -> NotifyDecision {
    if verdict != Verdict::Alert {
        return NotifyDecision::Suppress(SuppressReason::NotAlert);
    }

    let last_notified = match prev.and_then(|s| s.last_notified_at) {
        Some(t) => t,
        // no prior state, or the clock was cleared on recovery
        None => return NotifyDecision::Send(SendReason::FirstAlert),
    };

    if now - last_notified >= cooldown_seconds as i64 {
        return NotifyDecision::Send(SendReason::CooldownElapsed);
    }

    // inside cooldown: a significantly worse reading must not be
    // silenced by a clock set for a milder one
    if let (Some(new), Some(old)) = (fingerprint, prev.and_then(|s| s.last_fingerprint.as_ref())) {
        if new.differs_significantly(old, significant_change_delta) {
            return NotifyDecision::Send(SendReason::SignificantChange);
        }
    }

    NotifyDecision::Suppress(SuppressReason::Cooldown)
}

/// State to record after this evaluation. `notified` is whether the
/// alert was actually delivered; only then does the cooldown clock
/// reset and the fingerprint update.
pub fn next_state(
    prev: Option<&AlertState>,
    verdict: Verdict,
    fingerprint: Option<&Fingerprint>,
    now: i64,
    notified: bool,
) -> AlertState {
    if notified {
        return AlertState {
            last_verdict: verdict,
            last_notified_at: Some(now),
            last_fingerprint: fingerprint.cloned(),
        };
    }

    let clock = match verdict {
        // suppressed alert: keep the running cooldown window
        Verdict::Alert => prev.and_then(|s| s.last_notified_at),
        // recovery (or data gap): clear the clock so the next Alert
        // notifies immediately
        _ => None,
    };

    AlertState {
        last_verdict: verdict,
        last_notified_at: clock,
        last_fingerprint: prev.and_then(|s| s.last_fingerprint.clone()),
    }
}

/// Capped exponential backoff: base * 2^attempt, saturating at `cap`.
/// Attempt numbering starts at 0 (the delay before the first retry).
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(wind: f64) -> Fingerprint {
        Fingerprint {
            wind_speed_ms: wind,
            wind_gust_ms: None,
            precip_probability: 0.0,
        }
    }

    fn alerted(at: i64, wind: f64) -> AlertState {
        AlertState {
            last_verdict: Verdict::Alert,
            last_notified_at: Some(at),
            last_fingerprint: Some(fp(wind)),
        }
    }

    #[test]
    fn first_alert_sends() {
        let d = decide(None, Verdict::Alert, Some(&fp(12.0)), 1000, 3600, 0.5);
        assert_eq!(d, NotifyDecision::Send(SendReason::FirstAlert));
    }

    #[test]
    fn ok_never_sends() {
        let d = decide(None, Verdict::Ok, Some(&fp(2.0)), 1000, 3600, 0.5);
        assert_eq!(d, NotifyDecision::Suppress(SuppressReason::NotAlert));
    }

    #[test]
    fn insufficient_data_never_sends() {
        let prev = alerted(0, 12.0);
        let d = decide(
            Some(&prev),
            Verdict::InsufficientData,
            None,
            100_000,
            3600,
            0.5,
        );
        assert_eq!(d, NotifyDecision::Suppress(SuppressReason::NotAlert));
    }

    #[test]
    fn alert_inside_cooldown_is_suppressed() {
        let prev = alerted(1000, 12.0);
        let d = decide(Some(&prev), Verdict::Alert, Some(&fp(13.0)), 1060, 3600, 0.5);
        assert_eq!(d, NotifyDecision::Suppress(SuppressReason::Cooldown));
    }

    #[test]
    fn alert_after_cooldown_sends_again() {
        let prev = alerted(1000, 12.0);
        let d = decide(Some(&prev), Verdict::Alert, Some(&fp(12.0)), 4600, 3600, 0.5);
        assert_eq!(d, NotifyDecision::Send(SendReason::CooldownElapsed));
    }

    #[test]
    fn significant_change_overrides_cooldown() {
        let prev = alerted(1000, 12.0);
        let d = decide(Some(&prev), Verdict::Alert, Some(&fp(20.0)), 1120, 3600, 0.5);
        assert_eq!(d, NotifyDecision::Send(SendReason::SignificantChange));
    }

    #[test]
    fn cleared_clock_sends_immediately() {
        let prev = AlertState {
            last_verdict: Verdict::Ok,
            last_notified_at: None,
            last_fingerprint: Some(fp(12.0)),
        };
        let d = decide(Some(&prev), Verdict::Alert, Some(&fp(11.0)), 1010, 3600, 0.5);
        assert_eq!(d, NotifyDecision::Send(SendReason::FirstAlert));
    }

    #[test]
    fn recovery_clears_the_clock() {
        let prev = alerted(1000, 12.0);
        let next = next_state(Some(&prev), Verdict::Ok, Some(&fp(2.0)), 1060, false);
        assert_eq!(next.last_verdict, Verdict::Ok);
        assert_eq!(next.last_notified_at, None);
    }

    #[test]
    fn suppressed_alert_keeps_the_running_window() {
        let prev = alerted(1000, 12.0);
        let next = next_state(Some(&prev), Verdict::Alert, Some(&fp(13.0)), 1060, false);
        assert_eq!(next.last_notified_at, Some(1000));
        // fingerprint stays at the last *notified* reading
        assert_eq!(next.last_fingerprint, Some(fp(12.0)));
    }

    #[test]
    fn notified_alert_resets_clock_and_fingerprint() {
        let prev = alerted(1000, 12.0);
        let next = next_state(Some(&prev), Verdict::Alert, Some(&fp(20.0)), 1120, true);
        assert_eq!(next.last_notified_at, Some(1120));
        assert_eq!(next.last_fingerprint, Some(fp(20.0)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(8);
        assert_eq!(backoff_delay(0, base, cap), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(10, base, cap), cap);
        assert_eq!(backoff_delay(u32::MAX, base, cap), cap);
    }
}
