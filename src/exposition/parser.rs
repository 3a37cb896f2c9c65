use std::borrow::Cow;
use std::iter::{Enumerate, FusedIterator};
use std::str::Lines;

use super::{Entry, MetricType, ParseError, Series};
use crate::labels::{LabelsBuilder, METRIC_NAME_LABEL};

/// Blank characters allowed between tokens of a line.
const BLANK: [char; 2] = [' ', '\t'];

/// Suffixes under which histogram and summary families expose their sample lines.
const FAMILY_SUFFIXES: [&str; 4] = ["_bucket", "_sum", "_count", "_created"];

/// Lazy, single-pass decoder over one exposition payload.
///
/// The parser is an [`Iterator`] of [`Entry`] values. It ends at the end of the input or at the
/// first malformed line; in the latter case the reason is available from [`Parser::error`] once
/// iteration has stopped. A `# EOF` line is an ordinary comment in this format. A parser is
/// bound to a single payload and cannot be restarted.
///
/// # Examples
///
/// ```
/// # use cap_scraper::exposition::{Entry, Parser};
/// let payload = b"# TYPE up gauge\nup{job=\"cadvisor\"} 1\n";
/// let mut parser = Parser::new(payload).unwrap();
/// assert!(matches!(parser.next(), Some(Entry::Type { metric: "up", .. })));
/// match parser.next() {
///     Some(Entry::Series(series)) => assert_eq!(series.labels.get("job"), "cadvisor"),
///     other => panic!("unexpected entry: {other:?}"),
/// }
/// assert!(parser.next().is_none());
/// assert!(parser.error().is_none());
/// ```
#[derive(Debug)]
pub struct Parser<'a> {
    lines: Enumerate<Lines<'a>>,
    /// Family most recently declared by a `# TYPE` line.
    family: Option<(&'a str, MetricType)>,
    error: Option<ParseError>,
    finished: bool,
}

/// Outcome of decoding a single line.
enum Step<'a> {
    Blank,
    Entry(Entry<'a>),
}

impl<'a> Parser<'a> {
    /// Creates a parser over a raw payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidUtf8`] if the payload is not UTF-8 text, in which case
    /// nothing can be decoded at all.
    pub fn new(payload: &'a [u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(payload)?;
        Ok(Self::from_text(text))
    }

    pub fn from_text(text: &'a str) -> Self {
        Self {
            lines: text.lines().enumerate(),
            family: None,
            error: None,
            finished: false,
        }
    }

    /// Returns why decoding stopped early, or `None` if the input was exhausted normally.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    fn parse_line(&mut self, line: &'a str, lineno: usize) -> Result<Step<'a>, ParseError> {
        let line = line.trim_start_matches(BLANK);
        if line.trim_end().is_empty() {
            return Ok(Step::Blank);
        }
        if let Some(rest) = line.strip_prefix('#') {
            return self.parse_directive(rest, lineno);
        }
        self.parse_sample(line, lineno).map(Step::Entry)
    }

    fn parse_directive(&mut self, rest: &'a str, lineno: usize) -> Result<Step<'a>, ParseError> {
        let (keyword, rest) = split_token(rest.trim_start_matches(BLANK));
        match keyword {
            "HELP" => {
                let (metric, help) = split_token(rest);
                if !is_metric_name(metric) {
                    return Err(ParseError::MalformedDirective {
                        line: lineno,
                        directive: "HELP",
                    });
                }
                Ok(Step::Entry(Entry::Help {
                    metric,
                    help: unescape_help(help),
                }))
            }
            "TYPE" => {
                let (metric, rest) = split_token(rest);
                let (type_name, trailing) = split_token(rest);
                if !is_metric_name(metric) || type_name.is_empty() {
                    return Err(ParseError::MalformedDirective {
                        line: lineno,
                        directive: "TYPE",
                    });
                }
                if !trailing.trim_end().is_empty() {
                    return Err(ParseError::TrailingContent {
                        line: lineno,
                        text: trailing.to_owned(),
                    });
                }
                let metric_type =
                    type_name
                        .trim_end()
                        .parse()
                        .map_err(|()| ParseError::UnknownType {
                            line: lineno,
                            value: type_name.to_owned(),
                        })?;
                self.family = Some((metric, metric_type));
                Ok(Step::Entry(Entry::Type {
                    metric,
                    metric_type,
                }))
            }
            "UNIT" => {
                let (metric, unit) = split_token(rest);
                if !is_metric_name(metric) {
                    return Err(ParseError::MalformedDirective {
                        line: lineno,
                        directive: "UNIT",
                    });
                }
                Ok(Step::Entry(Entry::Unit {
                    metric,
                    unit: unit.trim_end(),
                }))
            }
            _ => Ok(Step::Entry(Entry::Comment)),
        }
    }

    fn parse_sample(&self, line: &'a str, lineno: usize) -> Result<Entry<'a>, ParseError> {
        let name_len = name_len(line, true);
        if name_len == 0 {
            return Err(ParseError::InvalidMetricName {
                line: lineno,
                text: line.to_owned(),
            });
        }
        let name = &line[..name_len];
        let after_name = &line[name_len..];

        let mut builder = LabelsBuilder::with_capacity(8);
        builder.set(METRIC_NAME_LABEL, name);

        let trimmed = after_name.trim_start_matches(BLANK);
        let rest = if let Some(label_input) = trimmed.strip_prefix('{') {
            parse_labels(label_input, lineno, &mut builder)?
        } else {
            after_name
        };

        if rest.trim().is_empty() {
            return Err(ParseError::MissingValue { line: lineno });
        }
        if !rest.starts_with(BLANK) {
            return Err(ParseError::InvalidMetricName {
                line: lineno,
                text: line.to_owned(),
            });
        }

        let mut tokens = rest.split_whitespace();
        let value_text = tokens
            .next()
            .ok_or(ParseError::MissingValue { line: lineno })?;
        let value = value_text
            .parse::<f64>()
            .map_err(|source| ParseError::InvalidValue {
                line: lineno,
                value: value_text.to_owned(),
                source,
            })?;
        let timestamp = tokens
            .next()
            .map(|text| {
                parse_timestamp(text).ok_or_else(|| ParseError::InvalidTimestamp {
                    line: lineno,
                    value: text.to_owned(),
                })
            })
            .transpose()?;
        if let Some(extra) = tokens.next() {
            return Err(ParseError::TrailingContent {
                line: lineno,
                text: extra.to_owned(),
            });
        }

        if let Some((family, family_type)) = self.family {
            if belongs_to_family(name, family) {
                match family_type {
                    MetricType::Histogram => return Ok(Entry::Histogram { metric: family }),
                    MetricType::Summary => return Ok(Entry::Summary { metric: family }),
                    _ => {}
                }
            }
        }

        Ok(Entry::Series(Series {
            labels: builder.build(),
            value,
            timestamp,
        }))
    }
}

impl<'a> Iterator for Parser<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        while let Some((idx, line)) = self.lines.next() {
            match self.parse_line(line, idx + 1) {
                Ok(Step::Entry(entry)) => return Some(entry),
                Ok(Step::Blank) => continue,
                Err(err) => {
                    self.error = Some(err);
                    break;
                }
            }
        }
        self.finished = true;
        None
    }
}

impl FusedIterator for Parser<'_> {}

/// Parses the body of a `{...}` label block (without the opening brace) into `builder`,
/// returning the input left after the closing brace.
fn parse_labels<'a>(
    mut rest: &'a str,
    lineno: usize,
    builder: &mut LabelsBuilder,
) -> Result<&'a str, ParseError> {
    let invalid = |reason| ParseError::InvalidLabels {
        line: lineno,
        reason,
    };
    loop {
        rest = rest.trim_start_matches(BLANK);
        if let Some(after) = rest.strip_prefix('}') {
            return Ok(after);
        }

        let len = name_len(rest, false);
        if len == 0 {
            return Err(invalid("expected label name"));
        }
        let name = &rest[..len];
        if name == METRIC_NAME_LABEL {
            return Err(invalid("reserved label `__name__` in label block"));
        }

        rest = rest[len..]
            .trim_start_matches(BLANK)
            .strip_prefix('=')
            .ok_or_else(|| invalid("expected `=` after label name"))?
            .trim_start_matches(BLANK)
            .strip_prefix('"')
            .ok_or_else(|| invalid("expected quoted label value"))?;
        let (value, after) =
            read_quoted(rest).ok_or_else(|| invalid("unterminated label value"))?;
        builder.set(name, value);

        rest = after.trim_start_matches(BLANK);
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if let Some(after) = rest.strip_prefix('}') {
            return Ok(after);
        } else {
            return Err(invalid("expected `,` or `}` after label value"));
        }
    }
}

/// Reads an escaped label value up to its closing quote.
fn read_quoted(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Some((value, &input[idx + 1..])),
            '\\' => match chars.next()? {
                (_, 'n') => value.push('\n'),
                (_, '\\') => value.push('\\'),
                (_, '"') => value.push('"'),
                (_, other) => {
                    value.push('\\');
                    value.push(other);
                }
            },
            c => value.push(c),
        }
    }
    None
}

fn unescape_help(text: &str) -> Cow<'_, str> {
    let text = text.trim_end();
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

/// Splits off the first blank-delimited token, returning it and the remainder with leading
/// blanks removed.
fn split_token(input: &str) -> (&str, &str) {
    match input.find(BLANK) {
        Some(idx) => (&input[..idx], input[idx..].trim_start_matches(BLANK)),
        None => (input.trim_end(), ""),
    }
}

/// Length of the longest prefix of `input` that forms a valid metric (or label) name.
fn name_len(input: &str, allow_colon: bool) -> usize {
    input
        .bytes()
        .enumerate()
        .take_while(|&(idx, b)| {
            b.is_ascii_alphabetic()
                || b == b'_'
                || (allow_colon && b == b':')
                || (idx > 0 && b.is_ascii_digit())
        })
        .count()
}

/// Millisecond timestamps may be written in float notation (`1.5e12`); the fraction is dropped.
fn parse_timestamp(text: &str) -> Option<i64> {
    let ts = text.parse::<f64>().ok().filter(|ts| ts.is_finite())?;
    Some(ts as i64)
}

fn is_metric_name(input: &str) -> bool {
    !input.is_empty() && name_len(input, true) == input.len()
}

fn belongs_to_family(name: &str, family: &str) -> bool {
    match name.strip_prefix(family) {
        Some("") => true,
        Some(suffix) => FAMILY_SUFFIXES.contains(&suffix),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(payload: &str) -> (Vec<Entry<'_>>, Option<String>) {
        let mut parser = Parser::from_text(payload);
        let entries: Vec<_> = parser.by_ref().collect();
        (entries, parser.error().map(ToString::to_string))
    }

    fn series<'e>(entry: &'e Entry<'_>) -> &'e Series {
        match entry {
            Entry::Series(series) => series,
            other => panic!("Expected series entry, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_help_type_and_series() {
        let payload = "\
# HELP container_cpu_usage_seconds_total Cumulative cpu time consumed in seconds.
# TYPE container_cpu_usage_seconds_total counter
container_cpu_usage_seconds_total{id=\"/\",name=\"cap\",namespace=\"default\"} 100.0 1678886400000
";
        let (entries, error) = collect(payload);
        assert!(error.is_none());
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            Entry::Help {
                metric: "container_cpu_usage_seconds_total",
                help: Cow::Borrowed("Cumulative cpu time consumed in seconds."),
            }
        );
        assert_eq!(
            entries[1],
            Entry::Type {
                metric: "container_cpu_usage_seconds_total",
                metric_type: MetricType::Counter,
            }
        );
        let sample = series(&entries[2]);
        assert_eq!(
            sample.labels.metric_name(),
            "container_cpu_usage_seconds_total"
        );
        assert_eq!(sample.labels.get("name"), "cap");
        assert_eq!(sample.labels.get("id"), "/");
        assert_eq!(sample.labels.len(), 4);
        assert_eq!(sample.value, 100.0);
        assert_eq!(sample.timestamp, Some(1_678_886_400_000));
    }

    #[test]
    fn test_parse_series_without_labels_or_timestamp() {
        let (entries, error) = collect("machine_cpu_cores 8\n");
        assert!(error.is_none());
        let sample = series(&entries[0]);
        assert_eq!(sample.labels.len(), 1);
        assert_eq!(sample.value, 8.0);
        assert_eq!(sample.timestamp, None);
    }

    #[test]
    fn test_parse_special_values() {
        let (entries, error) = collect("a +Inf\nb -Inf\nc NaN\nd 1e3\n");
        assert!(error.is_none());
        assert_eq!(series(&entries[0]).value, f64::INFINITY);
        assert_eq!(series(&entries[1]).value, f64::NEG_INFINITY);
        assert!(series(&entries[2]).value.is_nan());
        assert_eq!(series(&entries[3]).value, 1000.0);
    }

    #[test]
    fn test_parse_label_escapes_and_trailing_comma() {
        let payload = "m{path=\"C:\\\\tmp\",msg=\"say \\\"hi\\\"\\n\", } 1\n";
        let (entries, error) = collect(payload);
        assert!(error.is_none(), "{error:?}");
        let sample = series(&entries[0]);
        assert_eq!(sample.labels.get("path"), "C:\\tmp");
        assert_eq!(sample.labels.get("msg"), "say \"hi\"\n");
    }

    #[test]
    fn test_parse_empty_label_block() {
        let (entries, error) = collect("m{} 2\n");
        assert!(error.is_none());
        assert_eq!(series(&entries[0]).labels.len(), 1);
    }

    #[test]
    fn test_comments_units_and_blank_lines() {
        let payload = "\n# just a comment\n\n# UNIT m_seconds seconds\n   \nm_seconds 1\n";
        let (entries, error) = collect(payload);
        assert!(error.is_none());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], Entry::Comment);
        assert_eq!(
            entries[1],
            Entry::Unit {
                metric: "m_seconds",
                unit: "seconds"
            }
        );
        assert_eq!(series(&entries[2]).value, 1.0);
    }

    #[test]
    fn test_help_escapes() {
        let (entries, _) = collect("# HELP m line one\\nline two \\\\ end\n");
        assert_eq!(
            entries[0],
            Entry::Help {
                metric: "m",
                help: Cow::Owned("line one\nline two \\ end".to_owned()),
            }
        );
    }

    #[test]
    fn test_histogram_and_summary_lines_are_skipped() {
        let payload = "\
# TYPE req_duration_seconds histogram
req_duration_seconds_bucket{le=\"0.1\"} 3
req_duration_seconds_sum 1.5
req_duration_seconds_count 3
# TYPE rpc_seconds summary
rpc_seconds{quantile=\"0.5\"} 0.2
rpc_seconds_count 7
# TYPE up gauge
up 1
";
        let (entries, error) = collect(payload);
        assert!(error.is_none());
        let histograms = entries
            .iter()
            .filter(|e| matches!(e, Entry::Histogram { metric: "req_duration_seconds" }))
            .count();
        let summaries = entries
            .iter()
            .filter(|e| matches!(e, Entry::Summary { metric: "rpc_seconds" }))
            .count();
        let samples: Vec<_> = entries
            .iter()
            .filter_map(|e| match e {
                Entry::Series(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(histograms, 3);
        assert_eq!(summaries, 2);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels.metric_name(), "up");
    }

    #[test]
    fn test_unrelated_name_after_histogram_type_is_a_series() {
        let payload = "# TYPE lat histogram\nlatency_total 4\n";
        let (entries, _) = collect(payload);
        assert_eq!(series(&entries[1]).labels.metric_name(), "latency_total");
    }

    #[test]
    fn test_malformed_line_truncates_sequence() {
        let payload = "\
a{name=\"x\"} 1
b{name=\"y\"} 2
c{name=\"z\" 3
d 4
";
        let mut parser = Parser::from_text(payload);
        let entries: Vec<_> = parser.by_ref().collect();
        assert_eq!(entries.len(), 2);
        match parser.error() {
            Some(ParseError::InvalidLabels { line, .. }) => assert_eq!(*line, 3),
            other => panic!("Expected InvalidLabels error, got {other:?}"),
        }
        assert!(parser.next().is_none());
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let mut parser = Parser::from_text("m 12abc\n");
        assert!(parser.next().is_none());
        match parser.error() {
            Some(ParseError::InvalidValue { value, line, .. }) => {
                assert_eq!(value, "12abc");
                assert_eq!(*line, 1);
            }
            other => panic!("Expected InvalidValue error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_timestamp_and_trailing_content() {
        for ts in ["abc", "NaN", "+Inf"] {
            let payload = format!("m 1 {ts}\n");
            let mut parser = Parser::from_text(&payload);
            assert!(parser.next().is_none());
            match parser.error() {
                Some(ParseError::InvalidTimestamp { value, line: 1 }) => assert_eq!(value, ts),
                other => panic!("Expected InvalidTimestamp error, got {other:?}"),
            }
        }

        let mut parser = Parser::from_text("m 1 2 3\n");
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.error(),
            Some(ParseError::TrailingContent { .. })
        ));
    }

    #[test]
    fn test_missing_value_and_bad_name() {
        let mut parser = Parser::from_text("m{a=\"b\"}\n");
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.error(),
            Some(ParseError::MissingValue { line: 1 })
        ));

        let mut parser = Parser::from_text("foo-bar 1\n");
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.error(),
            Some(ParseError::InvalidMetricName { .. })
        ));

        let mut parser = Parser::from_text("9lives 1\n");
        assert!(parser.next().is_none());
        assert_eq!(parser.error().and_then(ParseError::line), Some(1));
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let mut parser = Parser::from_text("# TYPE m weird\nm 1\n");
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.error(),
            Some(ParseError::UnknownType { line: 1, .. })
        ));
    }

    #[test]
    fn test_float_timestamps_are_truncated() {
        let (entries, error) = collect("a 1 1.5e12\nb 2 1678886400000.9\n");
        assert!(error.is_none());
        assert_eq!(series(&entries[0]).timestamp, Some(1_500_000_000_000));
        assert_eq!(series(&entries[1]).timestamp, Some(1_678_886_400_000));
    }

    #[test]
    fn test_eof_line_is_a_comment() {
        let (entries, error) = collect("a 1\n# EOF\nb 2\n");
        assert!(error.is_none());
        assert_eq!(entries.len(), 3);
        assert!(matches!(entries[1], Entry::Comment));
        assert_eq!(series(&entries[2]).labels.metric_name(), "b");
    }

    #[test]
    fn test_invalid_utf8_fails_initialization() {
        let err = Parser::new(&[b'a', b' ', 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidUtf8(_)));
        assert_eq!(err.line(), None);
    }

    #[test]
    fn test_crlf_line_endings() {
        let (entries, error) = collect("# TYPE m gauge\r\nm{a=\"b\"} 3 10\r\n");
        assert!(error.is_none());
        assert_eq!(series(&entries[1]).timestamp, Some(10));
    }
}
