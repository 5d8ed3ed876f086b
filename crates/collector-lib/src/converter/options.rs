//! Filtering and rewriting rules applied during conversion

use crate::error::{CollectorError, Result};
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

/// Names to drop, by exact match or by a search pattern
#[derive(Debug, Clone, Default)]
pub struct IgnoreRule {
    names: HashSet<String>,
    pattern: Option<Regex>,
}

impl IgnoreRule {
    /// Build a rule, disabling the pattern half if it does not compile
    pub fn new<I, S>(names: I, pattern: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        let pattern = match compile_optional(pattern) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(error = %e, "Ignoring invalid filter pattern, filtering by pattern disabled");
                None
            }
        };
        Self { names, pattern }
    }

    /// Build a rule, failing on a pattern that does not compile
    pub fn try_new<I, S>(names: I, pattern: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            names: names.into_iter().map(Into::into).collect(),
            pattern: compile_optional(pattern)?,
        })
    }

    /// True if the name is in the set or the pattern is found anywhere in it
    pub fn matches(&self, name: &str) -> bool {
        self.names.contains(name)
            || self
                .pattern
                .as_ref()
                .map(|p| p.is_match(name))
                .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.pattern.is_none()
    }
}

fn compile_optional(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern.filter(|p| !p.is_empty()) {
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|e| CollectorError::config(p, e)),
        None => Ok(None),
    }
}

/// Ordered list of global substitutions applied to tag values
#[derive(Debug, Clone, Default)]
pub struct TagReplacementRule {
    replacements: Vec<(Regex, String)>,
}

impl TagReplacementRule {
    /// Compile the (pattern, replacement) pairs, keeping declared order
    ///
    /// Pairs whose pattern is empty or does not compile are skipped with a warning.
    pub fn new<I, P, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let mut replacements = Vec::new();
        for (pattern, replacement) in pairs {
            let pattern = pattern.as_ref();
            if pattern.is_empty() {
                continue;
            }
            match Regex::new(pattern) {
                Ok(regex) => replacements.push((regex, replacement.into())),
                Err(e) => {
                    warn!(
                        pattern = %pattern,
                        error = %CollectorError::config(pattern, e),
                        "Skipping invalid tag replacement"
                    );
                }
            }
        }
        Self { replacements }
    }

    /// Apply every substitution in turn
    pub fn apply(&self, value: &str) -> String {
        self.replacements
            .iter()
            .fold(value.to_string(), |acc, (pattern, replacement)| {
                pattern.replace_all(&acc, replacement.as_str()).into_owned()
            })
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }
}

/// Options for the exposition converter
#[derive(Debug, Clone, Default)]
pub struct ConverterOptions {
    pub ignore_metric_names: IgnoreRule,
    pub ignore_tag_names: IgnoreRule,
    pub tag_value_replacements: TagReplacementRule,
}

impl ConverterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_metric_names(mut self, rule: IgnoreRule) -> Self {
        self.ignore_metric_names = rule;
        self
    }

    pub fn with_ignore_tag_names(mut self, rule: IgnoreRule) -> Self {
        self.ignore_tag_names = rule;
        self
    }

    pub fn with_tag_value_replacements(mut self, rule: TagReplacementRule) -> Self {
        self.tag_value_replacements = rule;
        self
    }
}
