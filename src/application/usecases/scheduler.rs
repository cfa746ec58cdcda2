use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::run_tick::{RunTickUseCase, TickContext, TickReport};

/// Counters accumulated by the driver loop, one increment per tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks_run: u64,
    pub overruns: u64,
    pub deadlines_exceeded: u64,
    pub failures: u64,
}

/// What a single driven tick came to.
#[derive(Debug)]
pub enum TickOutcome {
    Completed(TickReport),
    Failed,
    DeadlineExceeded,
}

/// Drives the tick loop at a fixed interval. Ticks are strictly
/// non-overlapping: each one is awaited to completion (or its
/// deadline) before the interval is asked for the next slot, and slots
/// missed while a tick overran are skipped, never queued.
pub struct TickDriver<'a> {
    pub run_tick: &'a RunTickUseCase<'a>,
    pub interval: Duration,
    pub deadline: Duration,
}

impl TickDriver<'_> {
    pub async fn run(&self) -> DriverStats {
        self.run_for(u64::MAX).await
    }

    /// Run at most `max_ticks` ticks. The first slot fires
    /// immediately.
    pub async fn run_for(&self, max_ticks: u64) -> DriverStats {
        let mut stats = DriverStats::default();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut seq: u64 = 0;
        while seq < max_ticks {
            interval.tick().await;
            seq += 1;

            let started = tokio::time::Instant::now();
            match self.run_once(seq).await {
                TickOutcome::Completed(_) => {}
                TickOutcome::Failed => stats.failures += 1,
                TickOutcome::DeadlineExceeded => stats.deadlines_exceeded += 1,
            }
            stats.ticks_run += 1;

            if started.elapsed() >= self.interval {
                stats.overruns += 1;
                tracing::warn!(seq, "tick overran the interval; missed slots are skipped");
            }
        }
        stats
    }

    pub async fn run_once(&self, seq: u64) -> TickOutcome {
        let tick = TickContext::now(seq);
        match tokio::time::timeout(self.deadline, self.run_tick.execute(&tick)).await {
            Ok(Ok(report)) => TickOutcome::Completed(report),
            Ok(Err(e)) => {
                tracing::error!(seq, "tick failed: {e}");
                TickOutcome::Failed
            }
            // evaluation is side-effect-free until notify, so a
            // cancelled tick simply re-evaluates next time
            Err(_) => {
                tracing::warn!(seq, "tick exceeded deadline, cancelled");
                TickOutcome::DeadlineExceeded
            }
        }
    }
}
