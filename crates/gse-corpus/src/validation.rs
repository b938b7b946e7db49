//! Reformat distillation output into `{query, document, label}` validation pairs.

use std::io::Write;

use anyhow::Result;
use gse_db::JsonlWriter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The sense a distillation row was judged against.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistilDocument {
    pub expression: String,
    pub definition: String,
    #[serde(default)]
    pub cefr: Option<String>,
    #[serde(default)]
    pub grammatical_categories: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DistilRecord {
    pub query: String,
    pub document: DistilDocument,
    pub label: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRow {
    pub query: String,
    pub document: String,
    pub label: u8,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ValidationStats {
    pub total: usize,
    pub written: usize,
    /// The sentence does not contain the expression verbatim.
    pub skipped_absent: usize,
    pub rejected_label: usize,
}

impl ValidationRow {
    /// `None` when the expression does not occur (case-sensitively) in the query.
    pub fn from_distil(record: &DistilRecord) -> Option<Self> {
        let expression = &record.document.expression;
        if !record.query.contains(expression.as_str()) {
            return None;
        }
        Some(Self {
            query: format!(
                "In this sentence: {}, what is the meaning of the word: {expression}?",
                record.query
            ),
            document: format!(
                "The word {expression} definition is: {}.",
                record.document.definition
            ),
            label: record.label,
        })
    }
}

pub fn generate_validation_data<W: Write>(
    records: &[DistilRecord],
    out: &mut JsonlWriter<W>,
) -> Result<ValidationStats> {
    let mut stats = ValidationStats {
        total: records.len(),
        ..ValidationStats::default()
    };

    for (idx, record) in records.iter().enumerate() {
        if record.label > 1 {
            warn!("record {}: label {} is not 0 or 1", idx + 1, record.label);
            stats.rejected_label += 1;
            continue;
        }
        match ValidationRow::from_distil(record) {
            Some(row) => {
                out.write(&row)?;
                stats.written += 1;
            }
            None => stats.skipped_absent += 1,
        }
    }

    info!(
        "validation rows: {} of {} written ({} without the word, {} bad labels)",
        stats.written, stats.total, stats.skipped_absent, stats.rejected_label
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distil(query: &str, expression: &str, label: u8) -> DistilRecord {
        serde_json::from_value(serde_json::json!({
            "query": query,
            "document": {
                "expression": expression,
                "definition": "used to refer to something that has already been mentioned",
                "cefr": "<A1 (10-21)"
            },
            "label": label,
        }))
        .unwrap()
    }

    #[test]
    fn formats_query_and_document() {
        let row = ValidationRow::from_distil(&distil(
            "It was bustling with people buying fresh produce.",
            "It",
            1,
        ))
        .unwrap();
        assert_eq!(
            row.query,
            "In this sentence: It was bustling with people buying fresh produce., what is the meaning of the word: It?"
        );
        assert_eq!(
            row.document,
            "The word It definition is: used to refer to something that has already been mentioned."
        );
        assert_eq!(row.label, 1);
    }

    #[test]
    fn drops_rows_without_the_word() {
        assert!(ValidationRow::from_distil(&distil("It was busy.", "it", 0)).is_none());
    }

    #[test]
    fn counts_kept_skipped_and_rejected_rows() {
        let records = vec![
            distil("The bank was closed.", "bank", 1),
            distil("The river was wide.", "bank", 0),
            distil("The bank was open.", "bank", 2),
            distil("Bank on it.", "Bank", 0),
        ];
        let mut writer = JsonlWriter::new(Vec::new());
        let stats = generate_validation_data(&records, &mut writer).unwrap();
        assert_eq!(
            stats,
            ValidationStats {
                total: 4,
                written: 2,
                skipped_absent: 1,
                rejected_label: 1,
            }
        );
        let bytes = writer.finish().unwrap();
        let rows = gse_db::parse_jsonl::<ValidationRow>(&bytes).records;
        assert_eq!(rows[1].label, 0);
    }
}
