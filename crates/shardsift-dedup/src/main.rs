//! shardsift-dedup CLI - sentence-window deduplication of JSONL shards.

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use shardsift_core::{Compression, ReaderConfig, Shard};
use shardsift_dedup::{
    DedupJob, DropPolicy, DuplicateFilterConfig, FilterReport, FinderStats, SignatureConfig,
    SignatureStats,
};
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Sentence-level deduplication for sharded web-text corpora.
///
/// Runs as three stages: `signatures` (per shard), `find-dups` (once, after
/// every shard's signatures exist) and `filter` (per shard). `run` executes
/// all three locally.
#[derive(Parser, Debug)]
#[command(name = "shardsift-dedup")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stage 1: write sorted sentence-window signatures per shard
    Signatures(SignaturesArgs),
    /// Stage 2: merge all signature files and write duplicate files
    FindDups(FindDupsArgs),
    /// Stage 3: remove duplicate sentences and write the output
    Filter(FilterArgs),
    /// Run all three stages locally
    Run(RunArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

/// Options shared by every stage.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Folder for signature and duplicate files.
    #[arg(short = 'W', long, value_name = "DIR")]
    work_dir: PathBuf,

    /// Output results as JSON.
    #[arg(long)]
    json: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Show progress spinner.
    #[arg(long)]
    progress: bool,
}

/// Shard selection for the per-shard stages.
#[derive(Args, Debug)]
struct ShardArgs {
    /// Process only this shard.
    #[arg(long, requires = "shard_count")]
    shard_index: Option<usize>,

    /// Total number of shards when using --shard-index.
    #[arg(long)]
    shard_count: Option<usize>,

    /// Run all shards locally, splitting input files into this many tasks.
    #[arg(short, long, default_value = "1")]
    tasks: usize,

    /// Worker threads for local execution (0 = all cores).
    #[arg(short, long, default_value = "0")]
    workers: usize,
}

/// Input reading options.
#[derive(Args, Debug)]
struct ReaderArgs {
    /// Input folder of .jsonl / .jsonl.zst files.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Field containing the document text.
    #[arg(short = 'f', long, default_value = "text")]
    text_key: String,

    /// Field containing the document id.
    #[arg(long, default_value = "id")]
    id_key: String,

    /// Maximum documents read per shard.
    #[arg(long)]
    limit: Option<usize>,

    /// Fail on undecodable input lines instead of skipping them.
    #[arg(long)]
    strict: bool,

    /// Sentences per hashed window.
    #[arg(short = 'n', long, default_value = "3")]
    n_sentences: usize,
}

/// Stage 3 options.
#[derive(Args, Debug)]
struct OutputArgs {
    /// Output folder for deduplicated documents.
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Drop documents with fewer words than this after dedup.
    #[arg(long, default_value = "50")]
    min_doc_words: usize,

    /// Sentences removed per flagged window.
    #[arg(long, value_enum, default_value = "full-window")]
    drop_policy: DropPolicyArg,

    /// Folder receiving documents dropped for being too short.
    #[arg(long)]
    exclusion_dir: Option<PathBuf>,

    /// Output compression.
    #[arg(long, value_enum, default_value = "none")]
    compression: CompressionArg,
}

#[derive(Parser, Debug)]
struct SignaturesArgs {
    #[command(flatten)]
    reader: ReaderArgs,
    #[command(flatten)]
    shards: ShardArgs,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct FindDupsArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct FilterArgs {
    #[command(flatten)]
    reader: ReaderArgs,
    #[command(flatten)]
    output: OutputArgs,
    #[command(flatten)]
    shards: ShardArgs,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    reader: ReaderArgs,
    #[command(flatten)]
    output: OutputArgs,
    /// Number of shards.
    #[arg(short, long, default_value = "1")]
    tasks: usize,
    /// Worker threads (0 = all cores).
    #[arg(short, long, default_value = "0")]
    workers: usize,
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum DropPolicyArg {
    /// Remove every sentence of a flagged window
    FullWindow,
    /// Remove only the first sentence of a flagged window
    WindowStart,
}

impl From<DropPolicyArg> for DropPolicy {
    fn from(arg: DropPolicyArg) -> Self {
        match arg {
            DropPolicyArg::FullWindow => DropPolicy::FullWindow,
            DropPolicyArg::WindowStart => DropPolicy::WindowStart,
        }
    }
}

/// Output compression.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum CompressionArg {
    /// Plain JSON Lines
    None,
    /// Zstandard-compressed JSON Lines
    Zstd,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Compression::None,
            CompressionArg::Zstd => Compression::Zstd,
        }
    }
}

/// JSON output for the signature stage.
#[derive(Serialize)]
struct SignaturesOutput {
    input: String,
    signatures_dir: String,
    shards: Vec<SignatureStats>,
    documents: u64,
    signatures: u64,
    elapsed_secs: f64,
}

/// JSON output for the merge stage.
#[derive(Serialize)]
struct FindDupsOutput {
    signatures_dir: String,
    duplicates_dir: String,
    #[serde(flatten)]
    stats: FinderStats,
    duplicate_ratio: f64,
}

/// JSON output for the filter stage.
#[derive(Serialize)]
struct FilterOutput {
    input: String,
    output: String,
    #[serde(flatten)]
    report: FilterReport,
}

/// JSON output for a complete run.
#[derive(Serialize)]
struct RunOutput {
    input: String,
    output: String,
    tasks: usize,
    documents: u64,
    signatures: u64,
    duplicates: u64,
    documents_written: usize,
    filter: FilterReport,
    elapsed_secs: f64,
}

/// Create a spinner for indeterminate progress.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn spinner_for(common: &CommonArgs, msg: &str) -> Option<ProgressBar> {
    (common.progress && !common.json).then(|| create_spinner(msg))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// `Some(shard)` for single-shard mode, `None` for a local run over all shards.
fn select_shard(args: &ShardArgs) -> Result<Option<Shard>, String> {
    if args.tasks == 0 {
        return Err("tasks must be > 0".to_string());
    }
    match (args.shard_index, args.shard_count) {
        (Some(index), Some(count)) => Shard::new(index, count).map(Some).map_err(|e| e.to_string()),
        _ => Ok(None),
    }
}

fn build_job(
    reader: &ReaderArgs,
    output: Option<&OutputArgs>,
    common: &CommonArgs,
    tasks: usize,
    workers: usize,
) -> DedupJob {
    let reader_config = ReaderConfig {
        text_key: reader.text_key.clone(),
        id_key: reader.id_key.clone(),
        limit: reader.limit,
        strict: reader.strict,
    };
    let out_dir = output.map_or_else(PathBuf::new, |o| o.output.clone());
    let mut job = DedupJob::new(&reader.input, out_dir, &common.work_dir)
        .with_reader_config(reader_config)
        .with_signature_config(SignatureConfig::default().with_n_sentences(reader.n_sentences))
        .with_tasks(tasks)
        .with_workers(workers);
    if let Some(output) = output {
        job = job
            .with_filter_config(
                DuplicateFilterConfig::default()
                    .with_min_doc_words(output.min_doc_words)
                    .with_drop_policy(output.drop_policy.into()),
            )
            .with_compression(output.compression.into());
        if let Some(dir) = &output.exclusion_dir {
            job = job.with_exclusion_dir(dir);
        }
    }
    job
}

fn run_signatures(args: SignaturesArgs) -> CliResult {
    init_logging(args.common.verbose);
    let shard = select_shard(&args.shards)?;
    let tasks = shard.map_or(args.shards.tasks, |s| s.count);
    let job = build_job(&args.reader, None, &args.common, tasks, args.shards.workers);

    let start = Instant::now();
    let pb = spinner_for(&args.common, "Hashing sentence windows...");
    let stats = match shard {
        Some(shard) => vec![job.signatures_shard(shard)?],
        None => job.run_signatures()?,
    };
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let documents: u64 = stats.iter().map(|s| s.documents).sum();
    let signatures: u64 = stats.iter().map(|s| s.signatures).sum();

    if args.common.json {
        let result = SignaturesOutput {
            input: args.reader.input.display().to_string(),
            signatures_dir: job.signatures_dir().display().to_string(),
            shards: stats,
            documents,
            signatures,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("Signature Results:");
        for s in &stats {
            eprintln!(
                "  Shard {:>5}: {} documents, {} signatures ({:.0} docs/s)",
                s.shard,
                s.documents,
                s.signatures,
                s.throughput()
            );
        }
        eprintln!("  Documents:  {documents}");
        eprintln!("  Signatures: {signatures}");
        eprintln!("  Output:     {}", job.signatures_dir().display());
        eprintln!();
        eprintln!("Total time: {:.3}s", start.elapsed().as_secs_f64());
    }
    Ok(())
}

fn run_find_dups(args: FindDupsArgs) -> CliResult {
    init_logging(args.common.verbose);
    let job = DedupJob::new(PathBuf::new(), PathBuf::new(), &args.common.work_dir);

    let pb = spinner_for(&args.common, "Merging signature files...");
    let stats = job.run_find_duplicates()?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if args.common.json {
        let duplicate_ratio = stats.duplicate_ratio();
        let result = FindDupsOutput {
            signatures_dir: job.signatures_dir().display().to_string(),
            duplicates_dir: job.duplicates_dir().display().to_string(),
            stats,
            duplicate_ratio,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("Duplicate Search Results:");
        eprintln!("  Shards:      {}", stats.shards);
        eprintln!("  Signatures:  {}", stats.signatures_read);
        eprintln!(
            "  Duplicates:  {} ({:.2}%)",
            stats.duplicates,
            stats.duplicate_ratio() * 100.0
        );
        if stats.truncated_files > 0 {
            eprintln!("  Truncated files: {}", stats.truncated_files);
        }
        eprintln!("  Output:      {}", job.duplicates_dir().display());
        eprintln!();
        eprintln!("Total time: {:.3}s", stats.elapsed_secs);
    }
    Ok(())
}

fn print_filter_report(report: &FilterReport) {
    for stage in &report.stages {
        if stage.stage != "sentence_dedup_filter" {
            continue;
        }
        eprintln!("  Total:      {}", stage.total);
        eprintln!(
            "  Dropped:    {} ({:.2}%)",
            stage.dropped,
            stage.drop_ratio() * 100.0
        );
    }
    eprintln!("  Documents written: {}", report.documents_written);
}

fn run_filter(args: FilterArgs) -> CliResult {
    init_logging(args.common.verbose);
    let shard = select_shard(&args.shards)?;
    let tasks = shard.map_or(args.shards.tasks, |s| s.count);
    let job = build_job(
        &args.reader,
        Some(&args.output),
        &args.common,
        tasks,
        args.shards.workers,
    );

    let pb = spinner_for(&args.common, "Removing duplicate sentences...");
    let report = match shard {
        Some(shard) => job.filter_shard(shard)?,
        None => job.run_filter()?,
    };
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if args.common.json {
        let result = FilterOutput {
            input: args.reader.input.display().to_string(),
            output: args.output.output.display().to_string(),
            report,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("Filter Results:");
        print_filter_report(&report);
        eprintln!("  Output: {}", args.output.output.display());
        eprintln!();
        eprintln!("Total time: {:.3}s", report.elapsed_secs);
    }
    Ok(())
}

fn run_all(args: RunArgs) -> CliResult {
    init_logging(args.common.verbose);
    if args.tasks == 0 {
        return Err("tasks must be > 0".into());
    }
    let job = build_job(
        &args.reader,
        Some(&args.output),
        &args.common,
        args.tasks,
        args.workers,
    );

    let pb = spinner_for(&args.common, "Deduplicating sentences...");
    let report = job.run()?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let documents: u64 = report.signatures.iter().map(|s| s.documents).sum();
    let signatures: u64 = report.signatures.iter().map(|s| s.signatures).sum();

    if args.common.json {
        let result = RunOutput {
            input: args.reader.input.display().to_string(),
            output: args.output.output.display().to_string(),
            tasks: args.tasks,
            documents,
            signatures,
            duplicates: report.finder.duplicates,
            documents_written: report.filter.documents_written,
            filter: report.filter,
            elapsed_secs: report.elapsed_secs,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!("Dedup Results:");
        eprintln!("  Documents:  {documents}");
        eprintln!("  Signatures: {signatures}");
        eprintln!(
            "  Duplicates: {} ({:.2}%)",
            report.finder.duplicates,
            report.finder.duplicate_ratio() * 100.0
        );
        print_filter_report(&report.filter);
        eprintln!("  Output: {}", args.output.output.display());
        eprintln!();
        eprintln!("Total time: {:.3}s", report.elapsed_secs);
    }
    Ok(())
}

fn run_completions(args: CompletionsArgs) {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "shardsift-dedup", &mut io::stdout());
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Signatures(args) => run_signatures(args),
        Commands::FindDups(args) => run_find_dups(args),
        Commands::Filter(args) => run_filter(args),
        Commands::Run(args) => run_all(args),
        Commands::Completions(args) => {
            run_completions(args);
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
