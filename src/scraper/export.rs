use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::ExportError;
use crate::error::ResultOkLogExt;
use crate::exposition::MetricType;
use crate::labels::{Labels, METRIC_NAME_LABEL};
use crate::pipeline::{self, MetadataIndex, MetricMetadata, RefSample, Scrape};
use crate::registry::{Registry, SeriesRef};

/// Number of batches the export queue holds before new batches are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Receiver of accepted batches.
///
/// `export` is a handoff: it returns once the batch is queued, not once it is delivered.
pub trait Exporter {
    fn export(&self, batch: ExportBatch);
}

/// Accepted samples of one cycle together with immutable snapshots of the cycle's series and
/// metadata indexes, so an exporter can resolve references without seeing a later cycle.
#[derive(Debug, Clone)]
pub struct ExportBatch {
    samples: Vec<RefSample>,
    series: Arc<Registry>,
    metadata: Arc<MetadataIndex>,
}

impl ExportBatch {
    pub fn samples(&self) -> &[RefSample] {
        &self.samples
    }

    /// Resolves a series reference to its label set.
    pub fn labels(&self, series_ref: SeriesRef) -> Option<&Labels> {
        self.series.lookup(series_ref)
    }

    /// Looks up the metadata a series named `metric` was bound to during the cycle, which may
    /// be recorded under its family's name (`foo` for `foo_total`).
    pub fn metadata(&self, metric: &str) -> Option<&MetricMetadata> {
        pipeline::lookup_metadata(&self.metadata, metric)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Scrape> for ExportBatch {
    fn from(scrape: Scrape) -> Self {
        Self {
            samples: scrape.samples,
            series: Arc::new(scrape.series),
            metadata: Arc::new(scrape.metadata),
        }
    }
}

/// Identity of the monitored resource attached to every exported sample.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MonitoredResource {
    pub project_id: String,
    pub location: String,
    pub cluster: String,
}

/// Exporter that queues batches for an [`ExportWorker`] running in its own task.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    tx: mpsc::Sender<ExportBatch>,
}

impl JsonExporter {
    /// Creates the exporter and the worker that drains its queue.
    ///
    /// The worker stops once every `JsonExporter` clone has been dropped and the queue is empty.
    pub fn new(resource: MonitoredResource, capacity: usize) -> (Self, ExportWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ExportWorker { rx, resource })
    }
}

impl Exporter for JsonExporter {
    fn export(&self, batch: ExportBatch) {
        match self.tx.try_send(batch) {
            Ok(()) => {}
            Err(TrySendError::Full(batch)) => {
                log::warn!(
                    "export queue full, dropping batch of {} samples",
                    batch.len()
                );
            }
            Err(TrySendError::Closed(batch)) => {
                log::error!(
                    "export worker stopped, dropping batch of {} samples",
                    batch.len()
                );
            }
        }
    }
}

/// Long-lived consumer writing queued batches as JSON lines, one object per sample.
#[derive(Debug)]
pub struct ExportWorker {
    rx: mpsc::Receiver<ExportBatch>,
    resource: MonitoredResource,
}

#[derive(Debug, serde::Serialize)]
struct SampleRecord<'a> {
    #[serde(flatten)]
    resource: &'a MonitoredResource,
    series: SeriesRef,
    metric: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    metric_type: Option<MetricType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<&'a str>,
    labels: BTreeMap<&'a str, &'a str>,
    value: f64,
    timestamp: i64,
}

impl ExportWorker {
    /// Writes batches to `out` until the queue is closed.
    pub async fn run<W>(mut self, out: &mut W)
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::with_capacity(64 * 1024);
        while let Some(batch) = self.rx.recv().await {
            buf.clear();
            let Some(written) = self.encode(&batch, &mut buf).ok_log() else {
                continue;
            };
            if write_all(out, &buf).await.ok_log().is_some() {
                log::debug!("exported {} samples", written);
            }
        }
        log::debug!("export queue closed, stopping export worker");
    }

    /// Encodes every resolvable sample of `batch` into `buf`, returning how many were written.
    fn encode(&self, batch: &ExportBatch, buf: &mut Vec<u8>) -> Result<usize, ExportError> {
        let mut written = 0;
        for sample in batch.samples() {
            let Some(labels) = batch.labels(sample.series_ref) else {
                log::warn!("no label set for series {}, skipping sample", sample.series_ref);
                continue;
            };
            let metric = labels.metric_name();
            let metadata = batch.metadata(metric);
            let record = SampleRecord {
                resource: &self.resource,
                series: sample.series_ref,
                metric,
                metric_type: metadata.map(|m| m.metric_type),
                help: metadata.map(|m| m.help.as_str()).filter(|h| !h.is_empty()),
                labels: labels
                    .iter()
                    .filter(|label| label.name != METRIC_NAME_LABEL)
                    .map(|label| (label.name.as_str(), label.value.as_str()))
                    .collect(),
                value: sample.value,
                timestamp: sample.timestamp,
            };
            serde_json::to_writer(&mut *buf, &record)?;
            buf.push(b'\n');
            written += 1;
        }
        Ok(written)
    }
}

async fn write_all<W>(out: &mut W, buf: &[u8]) -> Result<(), ExportError>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(buf).await?;
    out.flush().await?;
    Ok(())
}
