//! Pick one sense per `(level, topic, word)` from the joined knowledge rows.
//!
//! Words with a single candidate sense are resolved locally. Everything else
//! goes to a [`SenseChooser`], typically a language model, under a bounded
//! number of concurrent requests. Rate-limited calls back off and retry; a
//! chooser that keeps failing simply leaves the word unresolved.

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use gse_db::JsonlWriter;
use gse_types::CefrLabel;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::topics::KnowledgeRow;

const PROGRESS_EVERY: usize = 100;

/// A numbered candidate sense offered to the chooser.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Definition {
    pub id: usize,
    pub definition: String,
    pub grammatical_category: String,
    pub score: f64,
    pub example: String,
    pub gse: String,
    pub cefr: String,
    pub knowledge_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SenseGroup {
    pub level: String,
    pub topic: String,
    pub word: String,
    pub definitions: Vec<Definition>,
}

/// Group usable knowledge rows by `(level, topic, word)`, sorted by key.
///
/// Rows with negative importance or no joined sense are left out, as are
/// senses missing a definition, example, score, category or id, and senses
/// whose band label does not parse as a [`CefrLabel`].
pub fn group_candidates(rows: &[KnowledgeRow]) -> Vec<SenseGroup> {
    let mut groups: BTreeMap<(&str, &str, &str), Vec<Definition>> = BTreeMap::new();
    for row in rows {
        if row.importance < 0.0 {
            continue;
        }
        let Some(item) = &row.item else { continue };
        let complete = [&item.definition, &item.example, &item.gse, &item.item_id]
            .iter()
            .all(|field| !field.is_empty())
            && !item.grammatical_categories.is_empty();
        if !complete {
            continue;
        }
        if let Err(err) = CefrLabel::parse(&item.cefr) {
            debug!("skipping {:?} sense {}: {err}", row.word, item.item_id);
            continue;
        }

        let definitions = groups
            .entry((row.level.as_str(), row.topic.as_str(), row.word.as_str()))
            .or_default();
        definitions.push(Definition {
            id: definitions.len() + 1,
            definition: item.definition.clone(),
            grammatical_category: item.grammatical_categories.join(","),
            score: row.importance,
            example: item.example.clone(),
            gse: item.gse.clone(),
            cefr: item.cefr.clone(),
            knowledge_id: item.item_id.clone(),
        });
    }

    groups
        .into_iter()
        .map(|((level, topic, word), definitions)| SenseGroup {
            level: level.to_string(),
            topic: topic.to_string(),
            word: word.to_string(),
            definitions,
        })
        .collect()
}

/// Question put to the chooser; it must answer with a definition id or `0`.
pub fn build_prompt(word: &str, topic: &str, definitions: &[Definition]) -> String {
    let mut prompt = format!("Here's candidate meanings for the word '{word}':");
    for d in definitions {
        prompt.push_str(&format!(
            "\n<definition {id}>\n {text}\n ({category})\n</definition {id}>\n",
            id = d.id,
            text = d.definition,
            category = d.grammatical_category,
        ));
    }
    prompt.push_str(&format!(
        "\nNow, please select the most appropriate meaning in the scenario '{topic}' for the word '{word}' from the following knowledge.\n"
    ));
    prompt.push_str("If none of them are appropriate, return 0.");
    prompt
}

#[derive(Debug, Error)]
pub enum ChooserError {
    #[error("rate limited")]
    RateLimited,
    #[error("sense chooser failed: {0}")]
    Failed(String),
}

/// Answers a prompt from [`build_prompt`] with a 1-based definition id, or `0`
/// when no candidate fits.
pub trait SenseChooser: Send + Sync + 'static {
    fn choose(&self, prompt: &str) -> impl Future<Output = Result<usize, ChooserError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after a rate-limited attempt. Other failures retry immediately.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_secs(10),
        }
    }
}

/// Resolve one group to a single definition, or `None`.
pub async fn select_meaning<C: SenseChooser>(
    chooser: &C,
    group: &SenseGroup,
    policy: &RetryPolicy,
) -> Option<Definition> {
    match group.definitions.as_slice() {
        [] => return None,
        [only] => return Some(only.clone()),
        _ => {}
    }

    let prompt = build_prompt(&group.word, &group.topic, &group.definitions);
    for attempt in 1..=policy.max_attempts {
        match chooser.choose(&prompt).await {
            Ok(0) => {
                debug!("no fitting sense for {:?} in {:?}", group.word, group.topic);
                return None;
            }
            Ok(id) => match group.definitions.get(id - 1) {
                Some(definition) => return Some(definition.clone()),
                None => warn!(
                    "attempt {attempt}: chooser picked {id} of {} senses for {:?}",
                    group.definitions.len(),
                    group.word
                ),
            },
            Err(ChooserError::RateLimited) => {
                debug!("attempt {attempt}: rate limited on {:?}", group.word);
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => warn!("attempt {attempt}: {err} for {:?}", group.word),
        }
    }
    warn!(
        "giving up on {:?} after {} attempts",
        group.word, policy.max_attempts
    );
    None
}

/// Output row of the selection step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectedMeaning {
    pub level: String,
    pub topic: String,
    pub word: String,
    pub definition: String,
    #[serde(rename = "grammaticalCategory")]
    pub grammatical_category: String,
    pub score: f64,
    pub example: String,
    pub gse: String,
    pub cefr: String,
    pub knowledge_id: String,
}

impl SelectedMeaning {
    fn new(group: &SenseGroup, definition: Definition) -> Self {
        Self {
            level: group.level.clone(),
            topic: group.topic.clone(),
            word: group.word.clone(),
            definition: definition.definition,
            grammatical_category: definition.grammatical_category,
            score: definition.score,
            example: definition.example,
            gse: definition.gse,
            cefr: definition.cefr,
            knowledge_id: definition.knowledge_id,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SelectStats {
    pub groups: usize,
    pub selected: usize,
    pub unresolved: usize,
}

/// Resolve every group with at most `concurrency` chooser calls in flight,
/// writing each selection as soon as its task finishes.
pub async fn select_meanings<C, W>(
    groups: Vec<SenseGroup>,
    chooser: Arc<C>,
    concurrency: usize,
    policy: RetryPolicy,
    out: &mut JsonlWriter<W>,
) -> Result<SelectStats>
where
    C: SenseChooser,
    W: Write,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut stats = SelectStats {
        groups: groups.len(),
        ..SelectStats::default()
    };

    let mut tasks = JoinSet::new();
    for group in groups {
        let chooser = Arc::clone(&chooser);
        let semaphore = Arc::clone(&semaphore);
        let policy = policy.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            let definition = select_meaning(chooser.as_ref(), &group, &policy).await?;
            Some(SelectedMeaning::new(&group, definition))
        });
    }

    let mut done = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Some(meaning) => {
                out.write(&meaning)?;
                stats.selected += 1;
            }
            None => stats.unresolved += 1,
        }
        done += 1;
        if done % PROGRESS_EVERY == 0 {
            info!("resolved {done}/{} words", stats.groups);
        }
    }

    info!(
        "selected {} meanings ({} unresolved)",
        stats.selected, stats.unresolved
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gse_types::SimpleItem;

    struct Scripted {
        replies: Mutex<VecDeque<Result<usize, ChooserError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<usize, ChooserError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SenseChooser for Scripted {
        async fn choose(&self, _prompt: &str) -> Result<usize, ChooserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ChooserError::Failed("script exhausted".into())))
        }
    }

    /// Always picks the first sense; records peak concurrency.
    #[derive(Default)]
    struct Slow {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SenseChooser for Slow {
        async fn choose(&self, _prompt: &str) -> Result<usize, ChooserError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    fn row(level: &str, topic: &str, word: &str, id: &str, importance: f64) -> KnowledgeRow {
        KnowledgeRow {
            level: level.into(),
            topic: topic.into(),
            word: word.into(),
            importance,
            item: Some(SimpleItem {
                expression: word.into(),
                definition: format!("meaning {id}"),
                example: format!("example {id}"),
                cefr: "A2 (30-35)".into(),
                gse: "32".into(),
                grammatical_categories: vec!["noun".into(), "verb".into()],
                item_id: id.into(),
            }),
        }
    }

    fn group(ids: &[&str]) -> SenseGroup {
        let rows: Vec<KnowledgeRow> = ids
            .iter()
            .map(|id| row("A2", "Money", "bank", id, 1.0))
            .collect();
        group_candidates(&rows).remove(0)
    }

    #[test]
    fn groups_filter_and_number_candidates() {
        let mut incomplete = row("A2", "Money", "bank", "x", 1.0);
        incomplete.item.as_mut().unwrap().example.clear();
        let rows = vec![
            row("B1", "Travel", "plane", "p1", 0.3),
            row("A2", "Money", "bank", "b1", 0.9),
            row("A2", "Money", "bank", "b2", 0.9),
            row("A2", "Money", "coin", "c1", -1.0),
            incomplete,
            KnowledgeRow {
                item: None,
                ..row("A2", "Money", "cash", "z", 1.0)
            },
        ];
        let groups = group_candidates(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].word, "bank");
        let ids: Vec<usize> = groups[0].definitions.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(groups[0].definitions[1].knowledge_id, "b2");
        assert_eq!(groups[0].definitions[0].grammatical_category, "noun,verb");
        assert_eq!(groups[1].word, "plane");
    }

    #[test]
    fn senses_without_category_or_band_range_are_dropped() {
        let mut uncategorized = row("A2", "Money", "bank", "b2", 1.0);
        uncategorized.item.as_mut().unwrap().grammatical_categories.clear();
        let mut unbanded = row("A2", "Money", "bank", "b3", 1.0);
        unbanded.item.as_mut().unwrap().cefr = "A2".into();
        let rows = vec![row("A2", "Money", "bank", "b1", 1.0), uncategorized, unbanded];

        let groups = group_candidates(&rows);
        assert_eq!(groups.len(), 1);
        let ids: Vec<&str> = groups[0]
            .definitions
            .iter()
            .map(|d| d.knowledge_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b1"]);
    }

    #[test]
    fn prompt_lists_every_definition() {
        let g = group(&["a", "b"]);
        let prompt = build_prompt(&g.word, &g.topic, &g.definitions);
        assert!(prompt.starts_with("Here's candidate meanings for the word 'bank':\n<definition 1>\n meaning a\n (noun,verb)\n</definition 1>\n"));
        assert!(prompt.contains("<definition 2>\n meaning b\n"));
        assert!(prompt.contains("in the scenario 'Money' for the word 'bank'"));
        assert!(prompt.ends_with("If none of them are appropriate, return 0."));
    }

    #[tokio::test]
    async fn single_candidate_skips_the_chooser() {
        let chooser = Scripted::new(vec![]);
        let picked = select_meaning(&chooser, &group(&["a"]), &quick()).await;
        assert_eq!(picked.unwrap().knowledge_id, "a");
        assert_eq!(chooser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_means_no_fitting_sense() {
        let chooser = Scripted::new(vec![Ok(0)]);
        assert!(select_meaning(&chooser, &group(&["a", "b"]), &quick()).await.is_none());
    }

    #[tokio::test]
    async fn retries_rate_limits_and_bad_ids() {
        let chooser = Scripted::new(vec![Err(ChooserError::RateLimited), Ok(7), Ok(2)]);
        let picked = select_meaning(&chooser, &group(&["a", "b"]), &quick()).await;
        assert_eq!(picked.unwrap().knowledge_id, "b");
        assert_eq!(chooser.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let chooser = Scripted::new(vec![
            Err(ChooserError::Failed("boom".into())),
            Err(ChooserError::RateLimited),
            Err(ChooserError::Failed("boom".into())),
            Ok(1),
        ]);
        assert!(select_meaning(&chooser, &group(&["a", "b"]), &quick()).await.is_none());
        assert_eq!(chooser.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fan_out_respects_concurrency_and_writes_results() {
        let groups: Vec<SenseGroup> = (0..12)
            .map(|n| {
                let rows = vec![
                    row("A2", "Money", &format!("w{n}"), "a", 1.0),
                    row("A2", "Money", &format!("w{n}"), "b", 1.0),
                ];
                group_candidates(&rows).remove(0)
            })
            .collect();
        let chooser = Arc::new(Slow::default());
        let mut writer = JsonlWriter::new(Vec::new());
        let stats = select_meanings(groups, Arc::clone(&chooser), 3, quick(), &mut writer)
            .await
            .unwrap();

        assert_eq!(
            stats,
            SelectStats {
                groups: 12,
                selected: 12,
                unresolved: 0
            }
        );
        assert!(chooser.peak.load(Ordering::SeqCst) <= 3);

        let bytes = writer.finish().unwrap();
        let rows = gse_db::parse_jsonl::<serde_json::Value>(&bytes).records;
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0]["grammaticalCategory"], "noun,verb");
        assert_eq!(rows[0]["knowledge_id"], "a");
    }

    #[tokio::test]
    async fn unresolved_groups_are_counted_not_written() {
        let chooser = Arc::new(Scripted::new(vec![Ok(0)]));
        let mut writer = JsonlWriter::new(Vec::new());
        let stats = select_meanings(vec![group(&["a", "b"])], chooser, 0, quick(), &mut writer)
            .await
            .unwrap();
        assert_eq!(stats.unresolved, 1);
        assert_eq!(writer.written(), 0);
    }
}
