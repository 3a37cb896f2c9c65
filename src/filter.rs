//! Inclusion rules deciding which decoded samples are exported.
//!
//! A sample is exported only if it passes every rule:
//!
//! 1. its `name` label does not start with `libops-` (platform-internal containers),
//! 2. its metric is not `container_tasks_state`,
//! 3. its value is strictly positive,
//! 4. its `name` label is not `cap` (the scraper's own container),
//! 5. the configured pattern matches the rendered label set.
//!
//! The rules are independent and conjunctive; their evaluation order does not change the
//! verdict.

use std::fmt;

use regex::Regex;

use crate::labels::Labels;

/// Label carrying the container name in cAdvisor output.
pub const CONTAINER_NAME_LABEL: &str = "name";
/// Containers whose name starts with this prefix are never exported.
pub const INTERNAL_CONTAINER_PREFIX: &str = "libops-";
/// Name of the scraper's own container.
pub const SELF_CONTAINER_NAME: &str = "cap";
/// Metric that is never exported.
pub const EXCLUDED_METRIC: &str = "container_tasks_state";

/// Why a sample was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InternalContainer,
    ExcludedMetric,
    NonPositiveValue,
    SelfContainer,
    PatternMismatch,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::InternalContainer => "internal container",
            Rejection::ExcludedMetric => "excluded metric",
            Rejection::NonPositiveValue => "non-positive value",
            Rejection::SelfContainer => "scraper container",
            Rejection::PatternMismatch => "pattern mismatch",
        };
        f.write_str(reason)
    }
}

/// Compiled inclusion filter, immutable once built and safe to share across tasks.
///
/// # Examples
///
/// ```
/// # use cap_scraper::filter::Filter;
/// # use cap_scraper::labels::Labels;
/// let filter = Filter::from_pattern("my-app").unwrap();
/// let labels = Labels::from_pairs([("__name__", "container_cpu_usage_seconds_total"), ("name", "my-app")]);
/// assert!(filter.accept(&labels, "container_cpu_usage_seconds_total", 5.0));
/// assert!(!filter.accept(&labels, "container_cpu_usage_seconds_total", 0.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// `None` matches every label set.
    pattern: Option<Regex>,
}

impl Filter {
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern: Some(pattern),
        }
    }

    /// Compiles `pattern` into a filter.
    ///
    /// # Errors
    ///
    /// Returns the [`regex::Error`] if the pattern does not compile.
    pub fn from_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::new)
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Returns `true` if the sample passes every inclusion rule.
    pub fn accept(&self, labels: &Labels, metric_name: &str, value: f64) -> bool {
        self.evaluate(labels, metric_name, value).is_ok()
    }

    /// Evaluates all rules, reporting the first one that rejects the sample.
    pub fn evaluate(
        &self,
        labels: &Labels,
        metric_name: &str,
        value: f64,
    ) -> Result<(), Rejection> {
        let container = labels.get(CONTAINER_NAME_LABEL);

        if container.starts_with(INTERNAL_CONTAINER_PREFIX) {
            return Err(Rejection::InternalContainer);
        }
        if metric_name == EXCLUDED_METRIC {
            return Err(Rejection::ExcludedMetric);
        }
        // NaN fails this comparison as well.
        if !(value > 0.0) {
            return Err(Rejection::NonPositiveValue);
        }
        if container == SELF_CONTAINER_NAME {
            return Err(Rejection::SelfContainer);
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&labels.to_string()) {
                return Err(Rejection::PatternMismatch);
            }
        }
        Ok(())
    }
}
