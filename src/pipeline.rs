//! One scrape cycle's worth of processing: decode, register, filter.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::exposition::{Entry, MetricType, ParseError, Parser, Series};
use crate::filter::Filter;
use crate::registry::{Registry, SeriesRef};

/// Descriptive metadata of a metric family, as announced by `# HELP` / `# TYPE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricMetadata {
    pub metric: String,
    pub help: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
}

impl MetricMetadata {
    fn untyped(metric: &str) -> Self {
        Self {
            metric: metric.to_owned(),
            ..Self::default()
        }
    }

    /// Moves the accumulator to `metric`, forgetting what was known about the previous family.
    fn switch_to(&mut self, metric: &str) {
        if self.metric != metric {
            *self = Self::untyped(metric);
        }
    }
}

/// Metadata of every family seen in a cycle, keyed by metric name.
pub type MetadataIndex = HashMap<String, MetricMetadata>;

/// Suffixes a sample line may append to the name of the family it belongs to.
const SAMPLE_SUFFIXES: [&str; 5] = ["_total", "_bucket", "_sum", "_count", "_created"];

/// Finds the metadata a series named `series_name` was bound to.
///
/// Series are recorded under their family's name, so `foo_total` resolves to `foo` when no
/// entry exists under its own name.
pub fn lookup_metadata<'i>(
    index: &'i MetadataIndex,
    series_name: &str,
) -> Option<&'i MetricMetadata> {
    index.get(series_name).or_else(|| {
        SAMPLE_SUFFIXES
            .iter()
            .filter_map(|suffix| series_name.strip_suffix(suffix))
            .find_map(|family| index.get(family))
    })
}

/// An accepted observation, identified by its series reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefSample {
    pub series_ref: SeriesRef,
    pub value: f64,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

/// Result of running the pipeline over one payload.
#[derive(Debug, Default)]
pub struct Scrape {
    /// Accepted samples in payload order.
    pub samples: Vec<RefSample>,
    /// Every series decoded in the cycle, accepted or not.
    pub series: Registry,
    pub metadata: MetadataIndex,
}

/// Turns a raw exposition payload into accepted, identity-tagged samples.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    filter: Arc<Filter>,
}

impl Pipeline {
    pub fn new(filter: Arc<Filter>) -> Self {
        Self { filter }
    }

    /// Processes one payload with a fresh series registry.
    ///
    /// `fetched_at` (milliseconds since the epoch) stamps every sample that carries no explicit
    /// timestamp. A malformed line ends decoding early; whatever was decoded before it is
    /// processed normally.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidUtf8`] if decoding cannot begin at all.
    pub fn run(&self, payload: &[u8], fetched_at: i64) -> Result<Scrape, ParseError> {
        let mut parser = Parser::new(payload)?;
        let mut scrape = Scrape::default();
        let mut current = MetricMetadata::default();
        let mut decoded = 0usize;

        for entry in parser.by_ref() {
            match entry {
                Entry::Help { metric, help } => {
                    current.switch_to(metric);
                    current.help = help.into_owned();
                    record(&mut scrape.metadata, Cow::Borrowed(&current));
                }
                Entry::Type {
                    metric,
                    metric_type,
                } => {
                    current.switch_to(metric);
                    current.metric_type = metric_type;
                    record(&mut scrape.metadata, Cow::Borrowed(&current));
                }
                Entry::Unit { .. } | Entry::Comment => {}
                Entry::Histogram { metric } => {
                    log::debug!("skipping histogram sample (not implemented): metric={metric}");
                }
                Entry::Summary { metric } => {
                    log::debug!("skipping summary sample (not implemented): metric={metric}");
                }
                Entry::Series(series) => {
                    decoded += 1;
                    self.process_series(series, &current, fetched_at, &mut scrape);
                }
            }
        }

        if let Some(err) = parser.error() {
            log::warn!("exposition payload truncated after {decoded} samples: {err}");
        }
        log::debug!(
            "processed payload: decoded={}, accepted={}, series={}, families={}",
            decoded,
            scrape.samples.len(),
            scrape.series.len(),
            scrape.metadata.len()
        );

        Ok(scrape)
    }

    fn process_series(
        &self,
        series: Series,
        current: &MetricMetadata,
        fetched_at: i64,
        scrape: &mut Scrape,
    ) {
        let metric_name = series.labels.metric_name();
        let verdict = self.filter.evaluate(&series.labels, metric_name, series.value);
        record(&mut scrape.metadata, bind_metadata(metric_name, current));

        if let Err(rejection) = verdict {
            log::trace!("rejected sample: series={}, reason={}", series.labels, rejection);
        }
        let series_ref = scrape.series.resolve(series.labels);

        if verdict.is_ok() {
            scrape.samples.push(RefSample {
                series_ref,
                value: series.value,
                timestamp: series.timestamp.unwrap_or(fetched_at),
            });
        }
    }
}

/// Picks the family a sample line belongs to.
///
/// Lines named after the family announced by the preceding `# HELP` / `# TYPE` entries, or
/// after it plus one of [`SAMPLE_SUFFIXES`] (e.g. `foo_total` under `foo`), share its metadata.
/// Anything else stands on its own as untyped.
fn bind_metadata<'m>(series_name: &str, current: &'m MetricMetadata) -> Cow<'m, MetricMetadata> {
    if !current.metric.is_empty() && is_family_member(series_name, &current.metric) {
        Cow::Borrowed(current)
    } else {
        Cow::Owned(MetricMetadata::untyped(series_name))
    }
}

fn is_family_member(series_name: &str, family: &str) -> bool {
    match series_name.strip_prefix(family) {
        Some("") => true,
        Some(suffix) => SAMPLE_SUFFIXES.contains(&suffix),
        None => false,
    }
}

/// Writes `metadata` into the index unless the same record is already there.
fn record(index: &mut MetadataIndex, metadata: Cow<'_, MetricMetadata>) {
    if index.get(&metadata.metric) != Some(&*metadata) {
        let metadata = metadata.into_owned();
        index.insert(metadata.metric.clone(), metadata);
    }
}
