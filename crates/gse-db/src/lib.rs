//! Load GSE vocabulary exports and index them by surface form.
//!
//! This crate ingests line-delimited JSON, validates every line against the
//! typed records from `gse-types`, and keeps going when a line is bad: each
//! rejected line becomes one [`RecordError`] carrying its line number. Callers
//! choose between memory-mapped files or owned buffers at runtime via
//! [`LoadMode`].
//!
//! # Features
//! - Typed loading: [`VocabDb`] owns the canonical record list, [`read_jsonl`]
//!   handles any other deserializable row type.
//! - Case-insensitive lookup: [`VocabIndex`] maps every headword and variant
//!   spelling to the records that carry it, in load order.
//! - Dump conversion: [`convert_dump`] unwraps the toolkit's `{"data": [...]}`
//!   envelopes into one record per line.
//!
//! # Example
//! ```no_run
//! use gse_db::{LoadMode, VocabDb};
//!
//! # fn main() -> anyhow::Result<()> {
//! let db = VocabDb::load_with_mode("data/vocabulary_data.jsonl", LoadMode::Mmap)?;
//! let index = db.index();
//! for item in index.lookup("Color").unwrap_or_default() {
//!     println!("{} ({}): {}", item.expression, item.gse, item.definition);
//! }
//! # Ok(()) }
//! ```

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use gse_types::{GrammarDescriptor, LearningObjective, VocabItem};
use memmap2::Mmap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};

mod index;

pub use index::VocabIndex;

/// Strategy for loading input files.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadMode {
    /// Memory-map the file (fast, zero-copy).
    Mmap,
    /// Read the file into an owned buffer (portable fallback).
    Owned,
}

impl LoadMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mmap" => Some(LoadMode::Mmap),
            "owned" => Some(LoadMode::Owned),
            _ => None,
        }
    }
}

enum Buffer {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Buffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buffer::Mmap(m) => m.as_ref(),
            Buffer::Owned(v) => v.as_slice(),
        }
    }
}

/// A single input line that could not become a record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("line {line}: malformed record: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
    #[error("line {line}: `{field}` must not be empty")]
    EmptyField { line: usize, field: &'static str },
}

impl RecordError {
    pub fn line(&self) -> usize {
        match self {
            RecordError::Malformed { line, .. } | RecordError::EmptyField { line, .. } => *line,
        }
    }
}

/// Records parsed from a JSONL file plus the lines that were dropped.
#[derive(Debug)]
pub struct JsonlBatch<T> {
    pub records: Vec<T>,
    pub rejected: Vec<RecordError>,
}

/// Parse every non-blank line of `path` as a `T`.
pub fn read_jsonl<T: DeserializeOwned>(
    path: impl AsRef<Path>,
    mode: LoadMode,
) -> Result<JsonlBatch<T>> {
    let path = path.as_ref();
    let buffer = load_file(path, mode)?;
    let batch = parse_jsonl(buffer.as_slice());
    if !batch.rejected.is_empty() {
        warn!(
            "{}: dropped {} malformed lines",
            path.display(),
            batch.rejected.len()
        );
    }
    Ok(batch)
}

/// Parse JSONL from memory; blank lines are ignored.
pub fn parse_jsonl<T: DeserializeOwned>(bytes: &[u8]) -> JsonlBatch<T> {
    let mut records = Vec::new();
    let mut rejected = Vec::new();
    for (line, raw) in jsonl_lines(bytes) {
        match serde_json::from_slice(raw) {
            Ok(record) => records.push(record),
            Err(source) => rejected.push(RecordError::Malformed { line, source }),
        }
    }
    JsonlBatch { records, rejected }
}

/// In-memory vocabulary: the canonical owner of every loaded record.
pub struct VocabDb {
    items: Vec<VocabItem>,
    rejected: Vec<RecordError>,
}

impl VocabDb {
    /// Load a vocabulary JSONL file, memory-mapping it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_mode(path, LoadMode::Mmap)
    }

    /// Load choosing between mmap and owned buffers at runtime.
    ///
    /// Malformed or invalid lines are logged and kept in [`VocabDb::rejected`];
    /// only I/O failures abort the load.
    pub fn load_with_mode(path: impl AsRef<Path>, mode: LoadMode) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("missing vocabulary file: {}", path.display());
        }
        let buffer = load_file(path, mode)?;

        let mut items = Vec::new();
        let mut rejected = Vec::new();
        for (line, raw) in jsonl_lines(buffer.as_slice()) {
            let checked = serde_json::from_slice::<VocabItem>(raw)
                .map_err(|source| RecordError::Malformed { line, source })
                .and_then(|item| validate(line, &item).map(|()| item));
            match checked {
                Ok(item) => items.push(item),
                Err(err) => {
                    warn!("{}: {err}", path.display());
                    rejected.push(err);
                }
            }
        }

        info!(
            "loaded {} vocabulary records from {} ({} rejected)",
            items.len(),
            path.display(),
            rejected.len()
        );
        Ok(Self { items, rejected })
    }

    /// Build from records already in memory; positions stand in for line numbers.
    pub fn from_items(records: impl IntoIterator<Item = VocabItem>) -> Self {
        let mut items = Vec::new();
        let mut rejected = Vec::new();
        for (idx, item) in records.into_iter().enumerate() {
            match validate(idx + 1, &item) {
                Ok(()) => items.push(item),
                Err(err) => rejected.push(err),
            }
        }
        Self { items, rejected }
    }

    pub fn items(&self) -> &[VocabItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn rejected(&self) -> &[RecordError] {
        &self.rejected
    }

    /// Build a surface-form index borrowing from this database.
    pub fn index(&self) -> VocabIndex<'_> {
        VocabIndex::build(&self.items)
    }
}

/// Line-oriented JSON writer used for every dataset this workspace emits.
pub struct JsonlWriter<W: Write> {
    out: W,
    written: usize,
}

impl JsonlWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Counts reported by [`convert_dump`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DumpStats {
    pub envelopes: usize,
    pub records: usize,
    pub rejected: usize,
}

#[derive(serde::Deserialize)]
struct Envelope {
    data: Vec<serde_json::Value>,
}

/// A record kind that [`convert_dump`] can re-emit.
pub trait DumpRecord: DeserializeOwned + Serialize {
    /// Reject a record that parsed but must not reach the output.
    fn check(&self, _line: usize) -> Result<(), RecordError> {
        Ok(())
    }
}

impl DumpRecord for VocabItem {
    fn check(&self, line: usize) -> Result<(), RecordError> {
        validate(line, self)
    }
}

impl DumpRecord for LearningObjective {}

impl DumpRecord for GrammarDescriptor {}

/// Unwrap `{"data": [...]}` dump lines into one validated `T` per output line.
///
/// Vocabulary elements go through the same checks as [`VocabDb`], so every
/// written line loads back without rejects.
pub fn convert_dump<T: DumpRecord>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    mode: LoadMode,
) -> Result<DumpStats> {
    let input = input.as_ref();
    let buffer = load_file(input, mode)?;
    let mut writer = JsonlWriter::create(output.as_ref())?;
    let mut stats = DumpStats::default();

    for (line, raw) in jsonl_lines(buffer.as_slice()) {
        let envelope: Envelope = match serde_json::from_slice(raw) {
            Ok(env) => env,
            Err(err) => {
                warn!("{}:{line} unreadable dump envelope: {err}", input.display());
                stats.rejected += 1;
                continue;
            }
        };
        stats.envelopes += 1;
        for (pos, value) in envelope.data.into_iter().enumerate() {
            let checked = serde_json::from_value::<T>(value)
                .map_err(|source| RecordError::Malformed { line, source })
                .and_then(|record| record.check(line).map(|()| record));
            match checked {
                Ok(record) => {
                    writer.write(&record)?;
                    stats.records += 1;
                }
                Err(err) => {
                    warn!("{} element {pos}: {err}", input.display());
                    stats.rejected += 1;
                }
            }
        }
    }

    writer.finish()?;
    info!(
        "converted {} records from {} ({} rejected)",
        stats.records,
        input.display(),
        stats.rejected
    );
    Ok(stats)
}

fn validate(line: usize, item: &VocabItem) -> Result<(), RecordError> {
    if item.item_id.trim().is_empty() {
        return Err(RecordError::EmptyField {
            line,
            field: "itemId",
        });
    }
    if item.expression.trim().is_empty() {
        return Err(RecordError::EmptyField {
            line,
            field: "expression",
        });
    }
    let region_variants = item
        .region
        .iter()
        .flat_map(|r| r.variants.iter())
        .flat_map(|group| group.variants.iter());
    let empty_variant = item
        .variants
        .iter()
        .flatten()
        .chain(region_variants)
        .filter_map(|v| v.variant.as_deref())
        .any(|v| v.trim().is_empty());
    if empty_variant {
        return Err(RecordError::EmptyField {
            line,
            field: "variant",
        });
    }
    Ok(())
}

fn load_file(path: &Path, mode: LoadMode) -> Result<Buffer> {
    match mode {
        LoadMode::Mmap => {
            let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            unsafe { Mmap::map(&file) }
                .map(Buffer::Mmap)
                .with_context(|| format!("mmap {}", path.display()))
        }
        LoadMode::Owned => {
            let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            Ok(Buffer::Owned(buf))
        }
    }
}

/// Non-blank lines with 1-based line numbers.
fn jsonl_lines(bytes: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    bytes
        .split(|b| *b == b'\n')
        .enumerate()
        .map(|(idx, raw)| (idx + 1, strip_cr(raw)))
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
}

fn strip_cr(line: &[u8]) -> &[u8] {
    if line.ends_with(b"\r") {
        &line[..line.len() - 1]
    } else {
        line
    }
}
