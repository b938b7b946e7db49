use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gse_db::{JsonlWriter, LoadMode, VocabDb, convert_dump, read_jsonl};
use gse_level::{Qualifier, QualifierConfig};
use gse_types::{CefrLabel, GrammarDescriptor, LearningObjective, SimpleItem, VocabItem};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use gse_corpus::{
    DistilRecord, Evaluation, ScoredPair, TopicTable, attach_knowledge, generate_training_data,
    generate_validation_data,
};

const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Parser)]
#[command(name = "gse-corpus")]
#[command(about = "Build GSE vocabulary training and validation corpora")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// How input files are read: `mmap` or `owned`.
    #[arg(long, global = true, env = "GSE_LOAD_MODE", default_value = "mmap", value_parser = parse_load_mode)]
    load_mode: LoadMode,

    /// JSON file with the level band table and tolerance.
    #[arg(long, global = true, env = "GSE_LEVEL_CONFIG")]
    level_config: Option<PathBuf>,

    /// Override the near-band tolerance.
    #[arg(long, global = true, env = "GSE_TOLERANCE")]
    tolerance: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Unwrap raw `{"data": [...]}` dumps into one record per line.
    Format {
        #[arg(long, value_enum)]
        kind: DumpKind,
        input: PathBuf,
        output: PathBuf,
    },
    /// Join a word-importance table with level-matched vocabulary senses.
    Attach {
        #[arg(long)]
        topics: PathBuf,
        #[arg(long)]
        vocab: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print every sense indexed under the given words.
    Lookup {
        #[arg(long)]
        vocab: PathBuf,
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Generate contrastive training rows from vocabulary records.
    Training {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Reformat distillation output into validation pairs.
    Validation {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Report accuracy, precision and recall for scored validation pairs.
    Evaluate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DumpKind {
    Vocabulary,
    Objectives,
    Grammar,
}

#[derive(Debug, Clone)]
struct Config {
    load_mode: LoadMode,
    qualifier: QualifierConfig,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!("load mode: {:?}", config.load_mode);

    match cli.command {
        Commands::Format {
            kind,
            input,
            output,
        } => {
            let stats = match kind {
                DumpKind::Vocabulary => {
                    convert_dump::<VocabItem>(&input, &output, config.load_mode)?
                }
                DumpKind::Objectives => {
                    convert_dump::<LearningObjective>(&input, &output, config.load_mode)?
                }
                DumpKind::Grammar => {
                    convert_dump::<GrammarDescriptor>(&input, &output, config.load_mode)?
                }
            };
            println!(
                "Saved {} {:?} records to {} ({} rejected)",
                stats.records,
                kind,
                output.display(),
                stats.rejected
            );
        }
        Commands::Attach {
            topics,
            vocab,
            output,
        } => {
            let table = TopicTable::load(&topics)?;

            let start = Instant::now();
            let db = VocabDb::load_with_mode(&vocab, config.load_mode)?;
            let index = db.index();
            info!("index built in {} ms", start.elapsed().as_millis());

            let qualifier = Qualifier::new(config.qualifier);
            let mut writer = JsonlWriter::create(&output)?;
            let stats = attach_knowledge(&table.rows, &index, &qualifier, &mut writer)?;
            writer.finish()?;
            println!(
                "Wrote {} rows for {} topic words to {}",
                stats.written,
                stats.rows,
                output.display()
            );
        }
        Commands::Lookup { vocab, words } => {
            let db = VocabDb::load_with_mode(&vocab, config.load_mode)?;
            let index = db.index();
            for word in &words {
                let Some(items) = index.lookup(word) else {
                    println!("{word}: not found");
                    continue;
                };
                println!("{word}: {} senses", items.len());
                for item in items {
                    println!("  {}", describe_sense(item));
                }
            }
        }
        Commands::Training { input, output } => {
            let batch = read_jsonl::<SimpleItem>(&input, config.load_mode)?;
            let mut writer = JsonlWriter::create(&output)?;
            let stats = generate_training_data(&batch.records, &mut writer)?;
            writer.finish()?;
            println!("Source records: {}", stats.total);
            println!("Rows written  : {}", stats.written);
            println!("No example    : {}", stats.skipped_no_example);
            println!("No negative   : {}", stats.skipped_no_negative);
        }
        Commands::Validation { input, output } => {
            let batch = read_jsonl::<DistilRecord>(&input, config.load_mode)?;
            let mut writer = JsonlWriter::create(&output)?;
            let stats = generate_validation_data(&batch.records, &mut writer)?;
            writer.finish()?;
            println!("Source records: {}", stats.total);
            println!("Rows written  : {}", stats.written);
        }
        Commands::Evaluate { input, threshold } => {
            let batch = read_jsonl::<ScoredPair>(&input, config.load_mode)
                .with_context(|| format!("loading scored pairs from {}", input.display()))?;
            let eval = Evaluation::from_pairs(batch.records, threshold);
            println!("Accuracy: {}", eval.accuracy());
            println!("False Positive: {}", eval.false_positive);
            println!("False Negative: {}", eval.false_negative);
            println!("Precision: {}", eval.precision());
            println!("Recall: {}", eval.recall());
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut qualifier = match &cli.level_config {
        Some(path) => QualifierConfig::load(path)?,
        None => QualifierConfig::default(),
    };
    if let Some(tolerance) = cli.tolerance {
        qualifier.tolerance = tolerance;
    }
    Ok(Config {
        load_mode: cli.load_mode,
        qualifier,
    })
}

fn describe_sense(item: &VocabItem) -> String {
    let score = match item.gse_score() {
        Some(score) if score.estimated => format!("{}*", score.value),
        Some(score) => score.value.to_string(),
        None => "-".to_string(),
    };
    let band = match CefrLabel::parse(&item.cefr) {
        Ok(label) => format!("{} {}-{}", label.band, label.lower, label.upper),
        Err(_) => item.cefr.clone(),
    };
    let mut line = format!(
        "[{}] {} ({}) gse {score}, {band}: {}",
        item.item_id,
        item.expression,
        item.grammatical_categories.join(", "),
        item.definition
    );
    for path in item.topic_paths() {
        line.push_str(&format!("\n    topic: {}", path.join(" > ")));
    }
    line
}

fn parse_load_mode(raw: &str) -> Result<LoadMode, String> {
    LoadMode::parse(raw).ok_or_else(|| format!("unknown load mode {raw:?} (expected mmap or owned)"))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}
