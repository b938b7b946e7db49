//! Contrastive training rows: one query, one positive sense, one confusable
//! negative sense.

use std::io::Write;

use anyhow::Result;
use gse_db::JsonlWriter;
use gse_types::SimpleItem;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const TRAINING_PROMPT: &str = "Given an english sentence and a word explanation, determine if the word explanation is correct or not.";
pub const TRAINING_TYPE: &str = "symmetric_class";

const PROGRESS_EVERY: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub query: String,
    pub pos: Vec<String>,
    pub neg: Vec<String>,
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TrainingStats {
    pub total: usize,
    pub written: usize,
    pub skipped_no_example: usize,
    pub skipped_no_negative: usize,
}

/// `"The word {expression} is a {categories} and its definition is: {definition}."`
pub fn describe_sense(item: &SimpleItem) -> String {
    format!(
        "The word {} is a {} and its definition is: {}.",
        item.expression,
        item.grammatical_categories.join(", "),
        item.definition
    )
}

/// First other record with the same expression but different categories.
pub fn find_confusable<'a>(item: &SimpleItem, data: &'a [SimpleItem]) -> Option<&'a SimpleItem> {
    data.iter().find(|other| {
        other.item_id != item.item_id
            && other.expression == item.expression
            && other.grammatical_categories != item.grammatical_categories
    })
}

/// Stream one [`TrainingRow`] per record that has an example and a confusable sense.
pub fn generate_training_data<W: Write>(
    data: &[SimpleItem],
    out: &mut JsonlWriter<W>,
) -> Result<TrainingStats> {
    let mut stats = TrainingStats {
        total: data.len(),
        ..TrainingStats::default()
    };
    info!("generating training rows from {} records", stats.total);

    for (processed, item) in data.iter().enumerate() {
        if processed > 0 && processed % PROGRESS_EVERY == 0 {
            info!(
                "processed {processed}/{} records, {} rows written",
                stats.total, stats.written
            );
        }
        if item.example.is_empty() {
            stats.skipped_no_example += 1;
            continue;
        }
        let Some(negative) = find_confusable(item, data) else {
            stats.skipped_no_negative += 1;
            continue;
        };

        out.write(&TrainingRow {
            query: format!(
                "In the sentence: {} What is the meaning of the word: {}?",
                item.example, item.expression
            ),
            pos: vec![describe_sense(item)],
            neg: vec![describe_sense(negative)],
            prompt: TRAINING_PROMPT.to_string(),
            kind: TRAINING_TYPE.to_string(),
        })?;
        stats.written += 1;
    }

    info!(
        "training rows: {} written, {} without example, {} without negative",
        stats.written, stats.skipped_no_example, stats.skipped_no_negative
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sense(id: &str, expression: &str, category: &str, example: &str) -> SimpleItem {
        SimpleItem {
            expression: expression.into(),
            definition: format!("{expression} as a {category}"),
            example: example.into(),
            cefr: "A2 (30-35)".into(),
            gse: "32".into(),
            grammatical_categories: vec![category.into()],
            item_id: id.into(),
        }
    }

    fn generate(data: &[SimpleItem]) -> (TrainingStats, Vec<TrainingRow>) {
        let mut writer = JsonlWriter::new(Vec::new());
        let stats = generate_training_data(data, &mut writer).unwrap();
        let bytes = writer.finish().unwrap();
        (stats, gse_db::parse_jsonl(&bytes).records)
    }

    #[test]
    fn pairs_each_sense_with_a_confusable_one() {
        let data = vec![
            sense("1", "bank", "noun", "I went to the bank."),
            sense("2", "bank", "verb", "You can bank on me."),
        ];
        let (stats, rows) = generate(&data);
        assert_eq!(stats.written, 2);
        assert_eq!(
            rows[0],
            TrainingRow {
                query: "In the sentence: I went to the bank. What is the meaning of the word: bank?"
                    .into(),
                pos: vec!["The word bank is a noun and its definition is: bank as a noun.".into()],
                neg: vec!["The word bank is a verb and its definition is: bank as a verb.".into()],
                prompt: TRAINING_PROMPT.into(),
                kind: "symmetric_class".into(),
            }
        );
        assert_eq!(rows[1].neg, vec![describe_sense(&data[0])]);
    }

    #[test]
    fn skips_records_without_example_or_negative() {
        let data = vec![
            sense("1", "bank", "noun", ""),
            sense("2", "bank", "verb", "You can bank on me."),
            sense("3", "river", "noun", "A wide river."),
            sense("4", "river", "noun", "Another river."),
        ];
        let (stats, rows) = generate(&data);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            stats,
            TrainingStats {
                total: 4,
                written: 1,
                skipped_no_example: 1,
                skipped_no_negative: 2,
            }
        );
    }

    #[test]
    fn confusable_search_is_case_sensitive_and_skips_self() {
        let data = vec![
            sense("1", "Bank", "noun", "x"),
            sense("2", "bank", "verb", "y"),
        ];
        assert!(find_confusable(&data[0], &data).is_none());
        assert!(find_confusable(&data[1], &data[1..]).is_none());
    }

    #[test]
    fn row_serializes_type_field() {
        let (_, rows) = generate(&[sense("1", "a", "noun", "x"), sense("2", "a", "verb", "y")]);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["type"], "symmetric_class");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn loosely_typed_records_still_pair_up() {
        let input = concat!(
            r#"{"itemId":"1","expression":"bank","definition":"a place for money","example":"I went to the bank.","cefr":"A2 (30-35)","gse":32,"grammaticalCategories":["noun"]}"#,
            "\n",
            r#"{"itemId":"2","expression":"bank","definition":"to keep money","example":"Bank it.","cefr":"B1 (43-50)","gse":"45*","grammaticalCategories":["verb"]}"#,
            "\n",
            r#"{"itemId":"3","expression":"bank","definition":"to tilt","example":null,"cefr":"B2 (59-66)","gse":"60","grammaticalCategories":["verb"]}"#,
            "\n",
        );
        let batch = gse_db::parse_jsonl::<SimpleItem>(input.as_bytes());
        assert!(batch.rejected.is_empty());
        assert_eq!(batch.records[0].gse, "32");

        let (stats, rows) = generate(&batch.records);
        assert_eq!(
            stats,
            TrainingStats {
                total: 3,
                written: 2,
                skipped_no_example: 1,
                skipped_no_negative: 0,
            }
        );
        assert_eq!(rows[1].neg, vec![describe_sense(&batch.records[0])]);
    }

    #[test]
    fn multiple_categories_are_joined() {
        let mut item = sense("1", "light", "noun", "x");
        item.grammatical_categories.push("adjective".into());
        assert_eq!(
            describe_sense(&item),
            "The word light is a noun, adjective and its definition is: light as a noun."
        );
    }
}
