use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{CycleError, ExportBatch, Exporter, Fetcher};
use crate::error::ResultOkLogExt;
use crate::pipeline::Pipeline;

/// Lifecycle of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, not yet started.
    Idle,
    /// Periodic cycle active.
    Running,
    /// Cancellation observed; terminal.
    Stopped,
}

/// Drives the fetch → pipeline → export cycle on a fixed interval.
///
/// Cancellation is cooperative and only observed when the scheduler starts and at tick
/// boundaries. A cycle that has begun always runs to completion; an in-flight fetch is bounded
/// by the fetcher's own timeout, never interrupted by cancellation.
#[derive(Debug)]
pub struct Scheduler<F, E> {
    fetcher: F,
    exporter: E,
    pipeline: Pipeline,
    interval: Duration,
    state: SchedulerState,
}

impl<F, E> Scheduler<F, E>
where
    F: Fetcher,
    E: Exporter,
{
    pub fn new(fetcher: F, exporter: E, pipeline: Pipeline, interval: Duration) -> Self {
        Self {
            fetcher,
            exporter,
            pipeline,
            interval,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// The first cycle starts one full interval after the call; ticks missed because a cycle
    /// overran are skipped. A failed cycle is logged and the next tick is attempted as usual.
    pub async fn run(&mut self, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            log::info!("Scraper cancelled before start");
            self.state = SchedulerState::Stopped;
            return;
        }

        self.state = SchedulerState::Running;
        log::debug!("Scraper running with interval {:?}", self.interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.scrape_and_export().await.ok_log();
        }

        log::info!("Shutting down scraper");
        self.state = SchedulerState::Stopped;
    }

    /// Performs a single fetch, process and export cycle, returning the number of samples
    /// handed to the exporter.
    ///
    /// # Errors
    ///
    /// Returns a [`CycleError`] if the payload cannot be fetched or decoding cannot begin.
    pub async fn scrape_and_export(&self) -> Result<usize, CycleError> {
        let body = self.fetcher.fetch().await?;
        let fetched_at = unix_millis()?;

        let scrape = self.pipeline.run(&body, fetched_at)?;
        let accepted = scrape.samples.len();
        self.exporter.export(ExportBatch::from(scrape));
        log::debug!("Exported batch of {accepted} samples");

        Ok(accepted)
    }
}

fn unix_millis() -> Result<i64, std::time::SystemTimeError> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
