use std::collections::HashMap;

use gse_types::VocabItem;
use tracing::info;

/// Case-insensitive map from surface form to the records spelled that way.
///
/// Built once from the canonical record list and read-only afterwards; the
/// index only borrows records, so it is cheap to share across threads.
#[derive(Debug, Clone, Default)]
pub struct VocabIndex<'a> {
    entries: HashMap<String, Vec<&'a VocabItem>>,
}

impl<'a> VocabIndex<'a> {
    /// Index every headword and variant spelling of `records`.
    ///
    /// One key may map to many records (homographs are kept, not resolved), and
    /// a record reachable twice under the same key is listed once.
    pub fn build(records: &'a [VocabItem]) -> Self {
        let mut entries: HashMap<String, Vec<&'a VocabItem>> = HashMap::new();
        for record in records {
            for form in record.surface_forms() {
                let bucket = entries.entry(normalize_surface(form)).or_default();
                // Keys of one record are inserted back to back, so a repeat can
                // only ever be the last element.
                if !bucket.last().is_some_and(|last| std::ptr::eq(*last, record)) {
                    bucket.push(record);
                }
            }
        }
        info!(
            "indexed {} records under {} surface forms",
            records.len(),
            entries.len()
        );
        Self { entries }
    }

    /// Records spelled `surface` (any case), in load order, or `None`.
    pub fn lookup(&self, surface: &str) -> Option<&[&'a VocabItem]> {
        self.entries
            .get(&normalize_surface(surface))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, surface: &str) -> bool {
        self.entries.contains_key(&normalize_surface(surface))
    }

    /// Number of distinct surface forms.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}

fn normalize_surface(text: &str) -> String {
    text.to_lowercase()
}
