//! Fixed-cadence driver for refresh cycles.
//!
//! One cycle runs at a time. The first fires immediately, the rest on each
//! tick of a `tokio::time::interval`. A cycle that overruns its tick delays the
//! next one instead of queuing a burst.
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::config::ConfigError;
use crate::feed::{CycleOutcome, Ingestor};

pub struct Scheduler {
    ingestor: Ingestor,
    interval: Duration,
}

impl Scheduler {
    /// Fails with [`ConfigError::InvalidInterval`] for a zero interval.
    pub fn new(ingestor: Ingestor, interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval {
                value: format!("{interval:?}"),
                reason: "interval must be positive".to_string(),
            });
        }
        Ok(Self { ingestor, interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run cycles until `shutdown` resolves, returning how many completed.
    ///
    /// Per-cycle failures are logged and never end the loop. Shutdown takes
    /// priority over both the tick wait and an in-flight cycle; a cycle cut
    /// short is dropped at its current await point and not counted.
    pub async fn run<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.interval, "Collecting feeds");

        let mut completed = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested during refresh cycle");
                    break;
                }
                outcome = self.ingestor.run_one_cycle() => outcome,
            };

            completed += 1;
            log_outcome(&outcome);
        }

        tracing::info!(cycles = completed, "Scheduler stopped");
        completed
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    let feed_id = outcome.feed.as_ref().map(|f| f.id);
    match &outcome.error {
        Some(error) => tracing::warn!(
            feed_id = ?feed_id,
            inserted = outcome.inserted,
            error = %error,
            "Refresh cycle failed"
        ),
        None if outcome.is_idle() => tracing::debug!("No feeds registered, nothing to refresh"),
        None => tracing::info!(
            feed_id = ?feed_id,
            feed = outcome.feed.as_ref().map(|f| f.name.as_str()).unwrap_or_default(),
            entries = outcome.entries,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "Refresh cycle complete"
        ),
    }
}
