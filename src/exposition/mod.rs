//! Decoder for the line-oriented Prometheus text exposition format, as served on the
//! `/metrics` endpoint of cAdvisor.
//!
//! A payload is turned into a lazy sequence of [`Entry`] values by [`Parser`]:
//!
//! ```text
//! # HELP container_cpu_usage_seconds_total Cumulative cpu time consumed in seconds.
//! # TYPE container_cpu_usage_seconds_total counter
//! container_cpu_usage_seconds_total{id="/",name="my-app"} 5.0 1678886400000
//! ```
//!
//! Decoding stops at the end of the input or at the first malformed line. Entries yielded
//! before that point stay valid; the reason for an early stop is kept on the parser.
//!
//! Histogram and summary families are recognized but not decoded: their sample lines are
//! yielded as [`Entry::Histogram`] / [`Entry::Summary`] and never as [`Entry::Series`].

mod error;
mod parser;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

pub use error::ParseError;
pub use parser::Parser;

use crate::labels::Labels;

/// Metric family type as declared by a `# TYPE` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    #[default]
    Untyped,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
            MetricType::Untyped => "untyped",
        }
    }
}

impl FromStr for MetricType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricType::Counter),
            "gauge" => Ok(MetricType::Gauge),
            "histogram" => Ok(MetricType::Histogram),
            "summary" => Ok(MetricType::Summary),
            "untyped" | "unknown" => Ok(MetricType::Untyped),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete observation decoded from a sample line.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Label set including the reserved metric-name label.
    pub labels: Labels,
    pub value: f64,
    /// Explicit timestamp in milliseconds since the epoch, if the line carried one.
    pub timestamp: Option<i64>,
}

/// One decoded line of an exposition payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry<'a> {
    Help { metric: &'a str, help: Cow<'a, str> },
    Type { metric: &'a str, metric_type: MetricType },
    Unit { metric: &'a str, unit: &'a str },
    Comment,
    /// A sample line of a histogram family, skipped undecoded.
    Histogram { metric: &'a str },
    /// A sample line of a summary family, skipped undecoded.
    Summary { metric: &'a str },
    Series(Series),
}
