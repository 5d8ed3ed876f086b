//! Conversion of scraped payloads into metric records
//!
//! The exposition converter turns text in the `# TYPE` / `name{tags} value`
//! format into [`MetricRecord`]s, applying the configured name filters and
//! tag rewrites on the way.

mod exposition;
mod options;


pub use exposition::{ExpositionParser, GroupType, Samples};
pub use options::{ConverterOptions, IgnoreRule, TagReplacementRule};

use crate::error::Result;
use crate::models::{MetricRecord, Tag};

/// Lazy, single-use record sequence produced by a [`Converter`]
pub type Conversion<'a> = Box<dyn Iterator<Item = Result<MetricRecord>> + Send + 'a>;

/// Trait for payload converters
pub trait Converter: Send + Sync {
    /// Convert `text`, appending `tags` after each record's own tags
    fn convert<'a>(&'a self, text: &'a str, tags: &'a [Tag]) -> Conversion<'a>;

    /// Convert eagerly, stopping at the first failure
    fn convert_all(&self, text: &str, tags: &[Tag]) -> Result<Vec<MetricRecord>> {
        self.convert(text, tags).collect()
    }
}
