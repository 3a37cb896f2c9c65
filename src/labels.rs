//! Label sets identifying a single time series.
//!
//! A [`Labels`] value is an immutable, name-sorted list of `(name, value)` pairs that always
//! carries the reserved [`METRIC_NAME_LABEL`]. Sorting on construction makes equality, hashing
//! and the textual rendering independent of the order in which the pairs were discovered.

use std::fmt;

use xxhash_rust::xxh3::Xxh3;

/// Reserved label holding the metric name of a series.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Separator fed to the hasher between names and values so that `a="bc"` and `ab="c"` differ.
const HASH_SEPARATOR: u8 = 0xff;

/// A single `name="value"` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// An immutable, name-sorted label set.
///
/// # Examples
///
/// ```
/// # use cap_scraper::labels::Labels;
/// let a = Labels::from_pairs([("name", "my-app"), ("__name__", "up")]);
/// let b = Labels::from_pairs([("__name__", "up"), ("name", "my-app")]);
/// assert_eq!(a, b);
/// assert_eq!(a.hash(), b.hash());
/// assert_eq!(a.to_string(), r#"{__name__="up", name="my-app"}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<Label>);

impl Labels {
    /// Builds a label set from arbitrary-order pairs.
    ///
    /// When a name occurs more than once the last occurrence wins.
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let mut builder = LabelsBuilder::default();
        for (name, value) in pairs {
            builder.set(name, value);
        }
        builder.build()
    }

    /// Returns the value of the label `name`, or `""` if it is absent.
    pub fn get(&self, name: &str) -> &str {
        self.0
            .binary_search_by(|label| label.name.as_str().cmp(name))
            .map(|idx| self.0[idx].value.as_str())
            .unwrap_or("")
    }

    /// Returns the metric name (the value of [`METRIC_NAME_LABEL`]).
    pub fn metric_name(&self) -> &str {
        self.get(METRIC_NAME_LABEL)
    }

    /// Content hash over the sorted pairs.
    ///
    /// Equal label sets always produce the same hash within and across processes.
    pub fn hash(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for label in &self.0 {
            hasher.update(label.name.as_bytes());
            hasher.update(&[HASH_SEPARATOR]);
            hasher.update(label.value.as_bytes());
            hasher.update(&[HASH_SEPARATOR]);
        }
        hasher.digest()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Labels {
    /// Renders the canonical `{name1="value1", name2="value2"}` form that the inclusion
    /// pattern is matched against.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, label) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=\"", label.name)?;
            for c in label.value.chars() {
                match c {
                    '\\' => f.write_str("\\\\")?,
                    '"' => f.write_str("\\\"")?,
                    '\n' => f.write_str("\\n")?,
                    c => write!(f, "{c}")?,
                }
            }
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Incrementally collects label pairs, then sorts them into a [`Labels`].
#[derive(Debug, Default)]
pub struct LabelsBuilder {
    labels: Vec<Label>,
}

impl LabelsBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Sets `name` to `value`, replacing an earlier value for the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.labels.iter_mut().find(|label| label.name == name) {
            Some(label) => label.value = value,
            None => self.labels.push(Label { name, value }),
        }
        self
    }

    pub fn build(mut self) -> Labels {
        self.labels.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        Labels(self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_empty_for_missing_label() {
        let labels = Labels::from_pairs([("__name__", "up")]);
        assert_eq!(labels.get("name"), "");
        assert_eq!(labels.metric_name(), "up");
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = Labels::from_pairs([("a", "1"), ("b", "2"), ("__name__", "m")]);
        let b = Labels::from_pairs([("b", "2"), ("__name__", "m"), ("a", "1")]);
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_differs_on_content() {
        let a = Labels::from_pairs([("__name__", "m"), ("a", "bc")]);
        let b = Labels::from_pairs([("__name__", "m"), ("ab", "c")]);
        let c = Labels::from_pairs([("__name__", "m"), ("a", "bd")]);
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_last_duplicate_wins() {
        let labels = Labels::from_pairs([("name", "first"), ("name", "second")]);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("name"), "second");
    }

    #[test]
    fn test_display_escapes_values() {
        let labels = Labels::from_pairs([
            ("__name__", "m"),
            ("path", "C:\\dir"),
            ("quote", "say \"hi\"\n"),
        ]);
        assert_eq!(
            labels.to_string(),
            r#"{__name__="m", path="C:\\dir", quote="say \"hi\"\n"}"#
        );
    }

    #[test]
    fn test_display_empty() {
        assert_eq!(Labels::default().to_string(), "{}");
    }
}
