//! Periodic scraping of a cAdvisor metrics endpoint.
//!
//! # Key Components
//!
//! - [`Fetcher`] / [`HttpFetcher`]: pull the raw exposition payload from `/metrics`.
//! - [`Exporter`] / [`JsonExporter`]: receive each cycle's [`ExportBatch`]; the JSON exporter
//!   queues batches for an [`ExportWorker`] that runs in its own task.
//! - [`Scheduler`]: runs fetch → [`crate::pipeline::Pipeline`] → export on a fixed interval
//!   until cancelled.
//!
//! Failures are isolated per cycle: a failed fetch or an undecodable payload is logged and the
//! next tick proceeds as usual. The schedule itself is the retry mechanism.
mod error;
mod export;
mod fetch;
mod scheduler;

pub use error::{CycleError, ExportError, FetchError};
pub use export::{
    DEFAULT_QUEUE_CAPACITY, ExportBatch, ExportWorker, Exporter, JsonExporter, MonitoredResource,
};
pub use fetch::{FETCH_TIMEOUT, Fetcher, HttpFetcher};
pub use scheduler::{Scheduler, SchedulerState};
