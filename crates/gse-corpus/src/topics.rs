//! Join topic word-importance tables with the vocabulary.
//!
//! Each table row names a level, a scenario topic and a word. The word is
//! looked up in the [`VocabIndex`], the candidates are qualified against the
//! row's level, and one [`KnowledgeRow`] is emitted per surviving record (or
//! the bare row when nothing qualifies, so the word is never lost).

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use gse_db::{JsonlWriter, VocabIndex};
use gse_level::Qualifier;
use gse_types::SimpleItem;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// One line of a word-importance table: `LEVEL-topic<TAB>word<TAB>importance`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicWord {
    pub level: String,
    pub topic: String,
    pub word: String,
    pub importance: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum TopicLineError {
    #[error("line {line}: expected 3 tab-separated fields, found {found}")]
    FieldCount { line: usize, found: usize },
    #[error("line {line}: {field:?} is not `LEVEL-topic`")]
    MissingLevel { line: usize, field: String },
    #[error("line {line}: importance {raw:?} is not a number")]
    Importance { line: usize, raw: String },
}

/// Parsed table rows plus the lines that were skipped.
#[derive(Debug, Default)]
pub struct TopicTable {
    pub rows: Vec<TopicWord>,
    pub rejected: Vec<TopicLineError>,
}

impl TopicTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read topic table {}", path.display()))?;
        let table = parse_topic_words(&text);
        for err in &table.rejected {
            warn!("{}: {err}", path.display());
        }
        info!(
            "loaded {} topic words from {} ({} rejected)",
            table.rows.len(),
            path.display(),
            table.rejected.len()
        );
        Ok(table)
    }
}

pub fn parse_topic_words(text: &str) -> TopicTable {
    let mut table = TopicTable::default();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(idx + 1, line) {
            Ok(row) => table.rows.push(row),
            Err(err) => table.rejected.push(err),
        }
    }
    table
}

fn parse_line(line: usize, text: &str) -> Result<TopicWord, TopicLineError> {
    let fields: Vec<&str> = text.split('\t').collect();
    let &[level_topic, word, importance] = fields.as_slice() else {
        return Err(TopicLineError::FieldCount {
            line,
            found: fields.len(),
        });
    };
    let (level, topic) =
        level_topic
            .split_once('-')
            .ok_or_else(|| TopicLineError::MissingLevel {
                line,
                field: level_topic.to_string(),
            })?;
    let importance = importance
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TopicLineError::Importance {
            line,
            raw: importance.to_string(),
        })?;
    Ok(TopicWord {
        level: level.to_string(),
        topic: topic.to_string(),
        word: word.to_string(),
        importance,
    })
}

/// A table row, optionally joined with one vocabulary sense.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRow {
    pub level: String,
    pub topic: String,
    pub word: String,
    pub importance: f64,
    #[serde(flatten)]
    pub item: Option<SimpleItem>,
}

impl KnowledgeRow {
    fn bare(row: &TopicWord) -> Self {
        Self {
            level: row.level.clone(),
            topic: row.topic.clone(),
            word: row.word.clone(),
            importance: row.importance,
            item: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AttachStats {
    pub rows: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub written: usize,
}

/// Emit knowledge rows grouped by `(level, topic)`, table order within a group.
///
/// Fails on the first row whose level is not a configured band.
pub fn attach_knowledge<W: Write>(
    rows: &[TopicWord],
    index: &VocabIndex<'_>,
    qualifier: &Qualifier,
    out: &mut JsonlWriter<W>,
) -> Result<AttachStats> {
    let mut ordered: Vec<&TopicWord> = rows.iter().collect();
    ordered.sort_by(|a, b| (&a.level, &a.topic).cmp(&(&b.level, &b.topic)));

    let mut stats = AttachStats {
        rows: rows.len(),
        ..AttachStats::default()
    };
    for row in ordered {
        let candidates = index.lookup(&row.word).unwrap_or_default();
        let ranked = qualifier
            .qualify(candidates, &row.level)
            .with_context(|| format!("qualify {:?} for topic {:?}", row.word, row.topic))?
            .into_ranked();

        if ranked.is_empty() {
            stats.unmatched += 1;
            out.write(&KnowledgeRow::bare(row))?;
            stats.written += 1;
            continue;
        }

        stats.matched += 1;
        for item in ranked {
            out.write(&KnowledgeRow {
                item: Some(item.to_simple_item()),
                ..KnowledgeRow::bare(row)
            })?;
            stats.written += 1;
        }
    }

    info!(
        "attached vocabulary to {}/{} topic words ({} rows written)",
        stats.matched, stats.rows, stats.written
    );
    Ok(stats)
}
