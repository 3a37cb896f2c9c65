use std::collections::HashMap;
use std::fmt;

use crate::labels::Labels;

/// Cycle-scoped identifier of a series, derived from the content hash of its label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct SeriesRef(u64);

impl From<u64> for SeriesRef {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Maps series references to the label sets they were derived from.
///
/// A registry lives for exactly one scrape cycle: the pipeline allocates a fresh one per
/// payload and hands it off with the batch, so nothing leaks into the next cycle.
#[derive(Debug, Default)]
pub struct Registry {
    series: HashMap<SeriesRef, Labels>,
}

impl Registry {
    /// Returns the reference for `labels`, registering the label set on first sight.
    pub fn resolve(&mut self, labels: Labels) -> SeriesRef {
        let series_ref = SeriesRef(labels.hash());
        match self.series.get(&series_ref) {
            Some(existing) if *existing != labels => {
                log::warn!(
                    "series reference collision: ref={}, kept={}, dropped={}",
                    series_ref,
                    existing,
                    labels
                );
            }
            Some(_) => {}
            None => {
                self.series.insert(series_ref, labels);
            }
        }
        series_ref
    }

    /// Returns the label set behind `series_ref`; `None` means "no such series".
    pub fn lookup(&self, series_ref: SeriesRef) -> Option<&Labels> {
        self.series.get(&series_ref)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
