//! CEFR band qualification over GSE scores.
//!
//! Given a target band and the candidate records found for a word, keep the
//! ones whose GSE score falls inside the band, then the ones just outside it
//! (within a tolerance), and drop the rest. The crate is decoupled from any
//! particular record type; anything implementing [`Leveled`] can be ranked.
//!
//! # How it works
//! 1. Resolve the band label through the [`LevelTable`]. Unknown labels are a
//!    configuration error.
//! 2. Parse each candidate's score; unscoreable candidates are skipped.
//! 3. Split the rest into in-band and near-band, preserving input order.
//!
//! # Example
//! ```rust
//! use gse_level::{Leveled, Qualifier, QualifierConfig};
//!
//! struct Word(&'static str);
//! impl Leveled for Word {
//!     fn gse(&self) -> &str {
//!         self.0
//!     }
//! }
//!
//! let words = [Word("27"), Word("32"), Word("45*")];
//! let qualifier = Qualifier::new(QualifierConfig::default());
//! let ranked = qualifier.qualify(&words, "A2").unwrap().into_ranked();
//! let scores: Vec<&str> = ranked.iter().map(|w| w.0).collect();
//! assert_eq!(scores, vec!["32", "27", "45*"]);
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use gse_types::{GseScore, SimpleItem, VocabItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Distance outside a band that still counts as "near".
pub const DEFAULT_TOLERANCE: u32 = 10;

/// Anything carrying a raw GSE score string.
pub trait Leveled {
    fn gse(&self) -> &str;
}

impl Leveled for VocabItem {
    fn gse(&self) -> &str {
        &self.gse
    }
}

impl Leveled for SimpleItem {
    fn gse(&self) -> &str {
        &self.gse
    }
}

impl<T: Leveled + ?Sized> Leveled for &T {
    fn gse(&self) -> &str {
        (**self).gse()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelError {
    #[error("unknown level band: {0:?}")]
    UnknownBand(String),
    #[error("band {label:?} has lower bound {lower} above upper bound {upper}")]
    InvalidRange { label: String, lower: i32, upper: i32 },
    #[error("band {0:?} is defined more than once")]
    DuplicateBand(String),
}

/// Inclusive GSE interval.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LevelRange {
    pub lower: i32,
    pub upper: i32,
}

impl LevelRange {
    pub fn contains(&self, score: i32) -> bool {
        (self.lower..=self.upper).contains(&score)
    }

    /// Distance from `score` to the nearer bound.
    pub fn distance(&self, score: i32) -> u32 {
        let to_lower = (i64::from(score) - i64::from(self.lower)).unsigned_abs();
        let to_upper = (i64::from(score) - i64::from(self.upper)).unsigned_abs();
        u32::try_from(to_lower.min(to_upper)).unwrap_or(u32::MAX)
    }
}

/// One row of the band table as written in configuration files.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub label: String,
    pub lower: i32,
    pub upper: i32,
}

/// Band label to GSE interval. A band may cover several official sub-bands
/// (the default `A2` spans both `A2` and `A2+`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Band>", into = "Vec<Band>")]
pub struct LevelTable {
    bands: Vec<(String, LevelRange)>,
}

impl LevelTable {
    pub fn from_bands(bands: impl IntoIterator<Item = Band>) -> Result<Self, LevelError> {
        let mut table: Vec<(String, LevelRange)> = Vec::new();
        for band in bands {
            if band.lower > band.upper {
                return Err(LevelError::InvalidRange {
                    label: band.label,
                    lower: band.lower,
                    upper: band.upper,
                });
            }
            if table.iter().any(|(label, _)| *label == band.label) {
                return Err(LevelError::DuplicateBand(band.label));
            }
            table.push((
                band.label,
                LevelRange {
                    lower: band.lower,
                    upper: band.upper,
                },
            ));
        }
        Ok(Self { bands: table })
    }

    pub fn range(&self, label: &str) -> Result<LevelRange, LevelError> {
        self.bands
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, range)| *range)
            .ok_or_else(|| LevelError::UnknownBand(label.to_string()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.bands.iter().map(|(label, _)| label.as_str())
    }
}

impl Default for LevelTable {
    /// `<A1` and `A1` share one band, as do `A2`/`A2+` and `B2`/`B2+`.
    fn default() -> Self {
        let rows = [
            ("A1", 0, 29),
            ("A2", 30, 42),
            ("B1", 43, 50),
            ("B1+", 51, 58),
            ("B2", 59, 75),
        ];
        Self {
            bands: rows
                .into_iter()
                .map(|(label, lower, upper)| (label.to_string(), LevelRange { lower, upper }))
                .collect(),
        }
    }
}

impl TryFrom<Vec<Band>> for LevelTable {
    type Error = LevelError;

    fn try_from(bands: Vec<Band>) -> Result<Self, Self::Error> {
        Self::from_bands(bands)
    }
}

impl From<LevelTable> for Vec<Band> {
    fn from(table: LevelTable) -> Self {
        table
            .bands
            .into_iter()
            .map(|(label, range)| Band {
                label,
                lower: range.lower,
                upper: range.upper,
            })
            .collect()
    }
}

/// Band table plus near-band tolerance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QualifierConfig {
    #[serde(default)]
    pub bands: LevelTable,
    #[serde(default = "default_tolerance")]
    pub tolerance: u32,
}

fn default_tolerance() -> u32 {
    DEFAULT_TOLERANCE
}

impl Default for QualifierConfig {
    fn default() -> Self {
        Self {
            bands: LevelTable::default(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl QualifierConfig {
    /// Read a JSON config such as `{"tolerance": 5, "bands": [{"label": "A1", "lower": 0, "upper": 29}]}`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read level config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse level config {}", path.display()))
    }
}

/// Candidates split by how well they match a band.
#[derive(Debug)]
pub struct Qualified<'c, T> {
    pub in_band: Vec<&'c T>,
    pub near: Vec<&'c T>,
}

impl<'c, T> Qualified<'c, T> {
    /// In-band matches first, then near-band matches.
    pub fn into_ranked(self) -> Vec<&'c T> {
        let mut ranked = self.in_band;
        ranked.extend(self.near);
        ranked
    }

    pub fn is_empty(&self) -> bool {
        self.in_band.is_empty() && self.near.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Qualifier {
    config: QualifierConfig,
}

impl Qualifier {
    pub fn new(config: QualifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualifierConfig {
        &self.config
    }

    /// Partition `candidates` against `band`.
    ///
    /// Fails only when `band` is not in the table. A score of `0` counts as
    /// unscoreable, like a score that does not parse.
    pub fn qualify<'c, T, I>(&self, candidates: I, band: &str) -> Result<Qualified<'c, T>, LevelError>
    where
        T: Leveled + 'c,
        I: IntoIterator<Item = &'c T>,
    {
        let range = self.config.bands.range(band)?;
        let mut in_band = Vec::new();
        let mut near = Vec::new();

        for candidate in candidates {
            let score = match GseScore::parse(candidate.gse()) {
                Some(score) if score.value != 0 => score.value,
                _ => {
                    debug!("skipping candidate with unscoreable gse {:?}", candidate.gse());
                    continue;
                }
            };
            if range.contains(score) {
                in_band.push(candidate);
            } else if range.distance(score) <= self.config.tolerance {
                near.push(candidate);
            }
        }

        Ok(Qualified { in_band, near })
    }
}
