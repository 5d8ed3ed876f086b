//! Exposition text scanner
//!
//! Single forward pass over the payload. The only state carried between
//! lines is the current metric group (name, type) and whether that group is
//! being skipped; all three are replaced only when a new `# TYPE` line is seen.

use super::{Conversion, Converter, ConverterOptions};
use crate::error::{CollectorError, Result};
use crate::models::{MetricKind, MetricRecord, Tag};
use regex::Regex;
use std::iter::Enumerate;
use std::str::Lines;
use std::sync::OnceLock;
use tracing::warn;

const TYPE_MARKER: &str = "# TYPE";
const NOT_A_NUMBER: &str = "NaN";

fn type_line() -> &'static Regex {
    static TYPE_LINE: OnceLock<Regex> = OnceLock::new();
    TYPE_LINE.get_or_init(|| {
        Regex::new(r"^# TYPE\s+(?P<name>[a-zA-Z_:][a-zA-Z0-9_:]*)\s+(?P<type>[a-z]+)")
            .expect("type line pattern")
    })
}

fn sample_line() -> &'static Regex {
    static SAMPLE_LINE: OnceLock<Regex> = OnceLock::new();
    SAMPLE_LINE.get_or_init(|| {
        Regex::new(
            r"^(?P<name>[a-zA-Z_:][a-zA-Z0-9_:]*)(?:\{(?P<tags>[^}]*)\})?\s+(?P<value>\S+)",
        )
        .expect("sample line pattern")
    })
}

/// Declared type of a metric group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupType {
    Counter,
    Gauge,
    Summary,
    Histogram,
    /// Any other declared type, or no `# TYPE` line seen yet
    #[default]
    Unknown,
}

impl GroupType {
    pub fn parse(declared: &str) -> Self {
        match declared {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            "summary" => Self::Summary,
            "histogram" => Self::Histogram,
            _ => Self::Unknown,
        }
    }

    /// Record kind for an eligible sample, `None` if the sample is dropped
    ///
    /// Summaries and histograms only contribute their `_sum` and `_count`
    /// series, and those are always reported as counters.
    pub fn kind_for(&self, sample_name: &str) -> Option<MetricKind> {
        match self {
            Self::Counter => Some(MetricKind::Counter),
            Self::Gauge => Some(MetricKind::Gauge),
            Self::Summary | Self::Histogram
                if sample_name.ends_with("_sum") || sample_name.ends_with("_count") =>
            {
                Some(MetricKind::Counter)
            }
            _ => None,
        }
    }
}

/// Scanner state, reset only by a `# TYPE` line
#[derive(Debug, Default)]
struct GroupState {
    name: String,
    group_type: GroupType,
    skip: bool,
}

impl GroupState {
    fn enter(&mut self, name: &str, declared_type: &str) {
        self.name.clear();
        self.name.push_str(name);
        self.group_type = GroupType::parse(declared_type);
        self.skip = false;
    }
}

/// Converter for the text exposition format
#[derive(Debug, Clone, Default)]
pub struct ExpositionParser {
    options: ConverterOptions,
}

impl ExpositionParser {
    pub fn new(options: ConverterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Lazily scan `text`, appending `tags` to every record
    pub fn samples<'a>(&'a self, text: &'a str, tags: &'a [Tag]) -> Samples<'a> {
        Samples {
            options: &self.options,
            lines: text.lines().enumerate(),
            extra_tags: tags,
            state: GroupState::default(),
            done: false,
        }
    }
}

impl Converter for ExpositionParser {
    fn convert<'a>(&'a self, text: &'a str, tags: &'a [Tag]) -> Conversion<'a> {
        Box::new(self.samples(text, tags))
    }
}

/// Lazy record sequence over one payload
///
/// Yields records in line order. A malformed tag block ends the sequence
/// with a single `Err`; records already yielded stay valid.
pub struct Samples<'a> {
    options: &'a ConverterOptions,
    lines: Enumerate<Lines<'a>>,
    extra_tags: &'a [Tag],
    state: GroupState,
    done: bool,
}

impl<'a> Samples<'a> {
    fn scan_line(&mut self, line_no: usize, line: &str) -> Result<Option<MetricRecord>> {
        let line = line.trim_end();
        if line.is_empty() {
            return Ok(None);
        }

        if line.starts_with(TYPE_MARKER) {
            if let Some(caps) = type_line().captures(line) {
                self.state.enter(&caps["name"], &caps["type"]);
            }
            return Ok(None);
        }

        if line.starts_with('#') {
            return Ok(None);
        }

        if self.state.skip
            || (!self.state.name.is_empty()
                && self.options.ignore_metric_names.matches(&self.state.name))
        {
            self.state.skip = true;
            return Ok(None);
        }

        let Some(caps) = sample_line().captures(line) else {
            return Ok(None);
        };

        let raw_value = &caps["value"];
        if raw_value == NOT_A_NUMBER {
            return Ok(None);
        }
        let value = match raw_value.parse::<f64>() {
            Ok(value) if !value.is_nan() => value,
            _ => return Ok(None),
        };

        let sample_name = &caps["name"];
        let Some(kind) = self.state.group_type.kind_for(sample_name) else {
            return Ok(None);
        };

        if matches!(self.state.group_type, GroupType::Counter | GroupType::Gauge)
            && sample_name != self.state.name
        {
            warn!(
                metric_type = ?self.state.group_type,
                sample = %sample_name,
                group = %self.state.name,
                "Metric sample has a different name from its group"
            );
        }

        let mut tags = parse_tags(self.options, caps.name("tags").map(|m| m.as_str()), line_no)?;
        tags.extend_from_slice(self.extra_tags);

        Ok(Some(MetricRecord::new(sample_name, value, tags, kind)))
    }
}

impl<'a> Iterator for Samples<'a> {
    type Item = Result<MetricRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while let Some((index, line)) = self.lines.next() {
            match self.scan_line(index + 1, line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        self.done = true;
        None
    }
}

impl std::iter::FusedIterator for Samples<'_> {}

/// Parse a `key="value",...` block, filtering and rewriting as configured
fn parse_tags(options: &ConverterOptions, block: Option<&str>, line: usize) -> Result<Vec<Tag>> {
    let Some(block) = block else {
        return Ok(Vec::new());
    };

    let mut tags = Vec::new();
    for pair in block.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, raw_value)) = pair.split_once('=') else {
            return Err(CollectorError::Conversion {
                line,
                reason: format!("malformed tag `{pair}`"),
            });
        };

        let key = key.trim();
        if options.ignore_tag_names.matches(key) {
            continue;
        }

        let value = options.tag_value_replacements.apply(unquote(raw_value.trim()));
        if value.is_empty() {
            continue;
        }

        tags.push(Tag::new(key, value));
    }

    Ok(tags)
}

fn unquote(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{IgnoreRule, TagReplacementRule};

    #[test]
    fn test_group_type_parse() {
        assert_eq!(GroupType::parse("counter"), GroupType::Counter);
        assert_eq!(GroupType::parse("histogram"), GroupType::Histogram);
        assert_eq!(GroupType::parse("untyped"), GroupType::Unknown);
    }

    #[test]
    fn test_kind_for_aggregations_only() {
        assert_eq!(
            GroupType::Summary.kind_for("rpc_duration_seconds_sum"),
            Some(MetricKind::Counter)
        );
        assert_eq!(
            GroupType::Histogram.kind_for("rpc_duration_seconds_count"),
            Some(MetricKind::Counter)
        );
        assert_eq!(GroupType::Histogram.kind_for("rpc_duration_seconds_bucket"), None);
        assert_eq!(GroupType::Unknown.kind_for("anything_sum"), None);
        assert_eq!(GroupType::Gauge.kind_for("other"), Some(MetricKind::Gauge));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"value\""), "value");
        assert_eq!(unquote("value"), "value");
        assert_eq!(unquote("\"\""), "");
    }

    #[test]
    fn test_parse_tags_filters_before_replacement() {
        let options = ConverterOptions::new()
            .with_ignore_tag_names(IgnoreRule::new(["id"], None))
            .with_tag_value_replacements(TagReplacementRule::new([("^/$", "")]));

        let tags = parse_tags(&options, Some(r#"id="/",path="/",name="root""#), 1).unwrap();

        assert_eq!(tags, vec![Tag::new("name", "root")]);
    }

    #[test]
    fn test_parse_tags_rejects_pair_without_value() {
        let options = ConverterOptions::default();
        let err = parse_tags(&options, Some(r#"key="value",broken"#), 7).unwrap_err();

        assert!(matches!(err, CollectorError::Conversion { line: 7, .. }));
    }

    #[test]
    fn test_parse_tags_trailing_comma() {
        let options = ConverterOptions::default();
        let tags = parse_tags(&options, Some(r#"key="value","#), 1).unwrap();
        assert_eq!(tags, vec![Tag::new("key", "value")]);
    }
}
