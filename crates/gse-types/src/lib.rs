//! Shared, serde-typed records that mirror the GSE Teacher Toolkit exports.
//!
//! The goal is to expose the exact fields found in the vocabulary, grammar and
//! learning-objective dumps while making it cheap to build higher-level
//! tooling. Required fields are plain values; everything the exports omit now
//! and then is an `Option` or defaults to empty, so a record either validates
//! at the load boundary or is rejected as a whole.
//!
//! Use [`VocabItem`] for full vocabulary records, [`SimpleItem`] for the
//! projection carried through downstream datasets, and the parsers
//! [`GseScore::parse`] / [`CefrLabel::parse`] to interpret level fields.
//!
//! ```rust
//! use gse_types::{CefrLabel, GseScore};
//!
//! let score = GseScore::parse("27*").unwrap();
//! assert_eq!(score.value, 27);
//! assert!(score.estimated);
//!
//! let label = CefrLabel::parse("A2+ (36-42)").unwrap();
//! assert_eq!(label.band, "A2+");
//! assert_eq!((label.lower, label.upper), (36, 42));
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

mod descriptor;

pub use descriptor::{
    AdditionalInformation, Book, Descriptor, GrammarDescriptor, LearningObjective, Occupation,
    RelatedDescriptor, Sdf, Syllabus, Tag, TagType, User,
};

/// Pronunciation clips for British and American English.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFiles {
    #[serde(default)]
    pub bre: Option<String>,
    #[serde(default)]
    pub ame: Option<String>,
}

/// One node of a topic path; `level` counts from `"1"` (broadest).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicLevel {
    #[serde(default)]
    pub id: Option<String>,
    pub level: String,
    pub description: String,
}

/// Alternate spelling of an expression.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    #[serde(default)]
    pub audio_files: Option<AudioFiles>,
    #[serde(default)]
    pub variant: Option<String>,
}

/// Spellings used in another region, e.g. `AmE` variants of a `BrE` entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionVariant {
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub variants: Vec<RegionVariant>,
}

/// Complete vocabulary record as exported by the toolkit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabItem {
    pub item_id: String,
    pub expression: String,
    #[serde(default)]
    pub audio_files: Option<AudioFiles>,
    #[serde(default)]
    pub variants: Option<Vec<Variant>>,
    #[serde(default)]
    pub thesaurus: String,
    pub definition: String,
    #[serde(deserialize_with = "text_or_number")]
    pub example: String,
    #[serde(default)]
    pub audience: String,
    #[serde(deserialize_with = "text_or_number")]
    pub cefr: String,
    #[serde(deserialize_with = "text_or_number")]
    pub gse: String,
    pub grammatical_categories: Vec<String>,
    #[serde(default)]
    pub collos: Vec<String>,
    #[serde(default)]
    pub topics: Vec<Vec<TopicLevel>>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default, rename = "expression_bre")]
    pub expression_bre: Option<String>,
}

impl VocabItem {
    /// Headword first, then every variant spelling (plain and regional).
    ///
    /// Variants without text are skipped; duplicates are not removed.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> + '_ {
        let plain = self.variants.iter().flatten();
        let regional = self
            .region
            .iter()
            .flat_map(|r| r.variants.iter())
            .flat_map(|group| group.variants.iter());
        std::iter::once(self.expression.as_str()).chain(
            plain
                .chain(regional)
                .filter_map(|v| v.variant.as_deref())
                .filter(|v| !v.is_empty()),
        )
    }

    /// Topic descriptions for each path, broadest first.
    pub fn topic_paths(&self) -> Vec<Vec<&str>> {
        self.topics
            .iter()
            .map(|path| {
                let mut levels: Vec<&TopicLevel> = path.iter().collect();
                levels.sort_by_key(|l| l.level.parse::<u32>().unwrap_or(u32::MAX));
                levels.into_iter().map(|l| l.description.as_str()).collect()
            })
            .collect()
    }

    pub fn gse_score(&self) -> Option<GseScore> {
        GseScore::parse(&self.gse)
    }

    pub fn to_simple_item(&self) -> SimpleItem {
        SimpleItem {
            expression: self.expression.clone(),
            definition: self.definition.clone(),
            example: self.example.clone(),
            cefr: self.cefr.clone(),
            gse: self.gse.clone(),
            grammatical_categories: self.grammatical_categories.clone(),
            item_id: self.item_id.clone(),
        }
    }
}

/// The seven fields every downstream dataset row carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleItem {
    pub expression: String,
    pub definition: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub example: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub cefr: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub gse: String,
    pub grammatical_categories: Vec<String>,
    pub item_id: String,
}

/// Exports disagree on whether `gse` is a number or a string, and leave
/// missing text as `null`. Both read as text; `null` reads as `""`.
fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => text,
        Some(Raw::Int(n)) => n.to_string(),
        Some(Raw::Float(x)) => x.to_string(),
        None => String::new(),
    })
}

/// Numeric GSE placement; `estimated` is set when the export marked it with `*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GseScore {
    pub value: i32,
    pub estimated: bool,
}

impl GseScore {
    /// Parse `"27"`, `"27*"` and similar. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let core = raw.trim_matches('*');
        let value = core.trim().parse::<i32>().ok()?;
        Some(Self {
            value,
            estimated: core.len() != raw.len(),
        })
    }
}

/// A CEFR label together with the GSE range it covers, e.g. `B1+ (51-58)*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CefrLabel {
    pub band: String,
    pub lower: u32,
    pub upper: u32,
    pub estimated: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CefrError {
    #[error("cefr label has no `(lower-upper)` range: {0:?}")]
    MissingRange(String),
    #[error("cefr label has a non-numeric range: {0:?}")]
    InvalidRange(String),
}

impl CefrLabel {
    pub fn parse(raw: &str) -> Result<Self, CefrError> {
        let trimmed = raw.trim();
        let open = trimmed
            .find('(')
            .ok_or_else(|| CefrError::MissingRange(raw.to_string()))?;
        let close = trimmed[open..]
            .find(')')
            .map(|i| open + i)
            .ok_or_else(|| CefrError::MissingRange(raw.to_string()))?;
        let (lower, upper) = trimmed[open + 1..close]
            .split_once('-')
            .ok_or_else(|| CefrError::InvalidRange(raw.to_string()))?;
        let lower = lower
            .trim()
            .parse()
            .map_err(|_| CefrError::InvalidRange(raw.to_string()))?;
        let upper = upper
            .trim()
            .parse()
            .map_err(|_| CefrError::InvalidRange(raw.to_string()))?;

        Ok(Self {
            band: trimmed[..open].trim().to_string(),
            lower,
            upper,
            estimated: trimmed[close + 1..].contains('*'),
        })
    }
}
