//! shardsift-filter CLI - heuristic quality filtering of JSONL shards.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use shardsift_core::{
    Compression, JsonlReader, JsonlWriter, LocalExecutor, Pipeline, ReaderConfig, Shard,
    StageStats,
};
use shardsift_filters::{FilterPipelineConfig, Language};
use std::io;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// JSON output for a filtering run.
#[derive(Serialize)]
struct JsonOutput {
    input: String,
    output: String,
    shards: Vec<usize>,
    shard_count: usize,
    documents_written: usize,
    stages: Vec<StageStats>,
    elapsed_secs: f64,
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

/// Heuristic quality filtering for web-text corpora.
///
/// Reads a folder of JSONL shards, applies the Gopher repetition, Gopher
/// quality and FineWeb filters, and writes the surviving documents.
#[derive(Parser, Debug)]
#[command(name = "shardsift-filter")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input folder of .jsonl / .jsonl.zst files.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Output folder for surviving documents.
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// JSON filter configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Language for stop words (overrides the config file).
    #[arg(short, long)]
    language: Option<Language>,

    /// Folder receiving rejected documents, one subfolder per filter.
    #[arg(long)]
    exclusion_dir: Option<PathBuf>,

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

    /// Output compression, also used for excluded documents [default: none]
    #[arg(long, value_enum)]
    compression: Option<CompressionArg>,

    /// Disable the Gopher repetition filter.
    #[arg(long)]
    no_repetition: bool,

    /// Disable the Gopher quality filter.
    #[arg(long)]
    no_quality: bool,

    /// Disable the FineWeb filter.
    #[arg(long)]
    no_fineweb: bool,

    /// Log document length statistics.
    #[arg(long)]
    doc_length_stats: bool,

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

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
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

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_config(args: &Cli) -> Result<FilterPipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => FilterPipelineConfig::from_json_file(path)?,
        None => FilterPipelineConfig::default(),
    };
    if let Some(language) = args.language {
        config.language = language;
    }
    if let Some(dir) = &args.exclusion_dir {
        config.exclusion_dir = Some(dir.clone());
    }
    if args.no_repetition {
        config.gopher_repetition = None;
    }
    if args.no_quality {
        config.gopher_quality = None;
    }
    if args.no_fineweb {
        config.fineweb = None;
    }
    if args.doc_length_stats {
        config.doc_length_stats = true;
    }
    if let Some(compression) = args.compression {
        config.exclusion_compression = compression.into();
    }
    Ok(config)
}

fn print_stage_stats(stats: &[StageStats]) {
    for stage in stats {
        eprintln!("  {}:", stage.stage);
        eprintln!("    Total:      {}", stage.total);
        eprintln!("    Forwarded:  {}", stage.forwarded);
        eprintln!(
            "    Dropped:    {} ({:.2}%)",
            stage.dropped,
            stage.drop_ratio() * 100.0
        );
        for (reason, count) in &stage.dropped_by_reason {
            eprintln!("      {reason}: {count}");
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    // Handle completions subcommand
    if let Some(Commands::Completions { shell }) = args.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "shardsift-filter", &mut io::stdout());
        return Ok(());
    }

    let Some(input) = args.input.clone() else {
        eprintln!("Error: input folder required");
        std::process::exit(1);
    };
    let Some(output) = args.output.clone() else {
        eprintln!("Error: output folder required (use -o/--output)");
        std::process::exit(1);
    };
    if args.tasks == 0 {
        eprintln!("Error: tasks must be > 0");
        std::process::exit(1);
    }

    let single_shard = match (args.shard_index, args.shard_count) {
        (Some(index), Some(count)) => match Shard::new(index, count) {
            Ok(shard) => Some(shard),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        _ => None,
    };

    init_logging(args.verbose);
    let config = build_config(&args)?;

    if args.verbose && !args.json {
        eprintln!("Configuration:");
        eprintln!("  Input: {}", input.display());
        eprintln!("  Output: {}", output.display());
        eprintln!("  Language: {}", config.language);
        eprintln!("  Gopher repetition: {}", config.gopher_repetition.is_some());
        eprintln!("  Gopher quality: {}", config.gopher_quality.is_some());
        eprintln!("  FineWeb: {}", config.fineweb.is_some());
        if let Some(ref dir) = config.exclusion_dir {
            eprintln!("  Exclusions: {}", dir.display());
        }
        eprintln!();
    }

    let reader_config = ReaderConfig {
        text_key: args.text_key.clone(),
        id_key: args.id_key.clone(),
        limit: args.limit,
        strict: args.strict,
    };

    let mut pipeline = Pipeline::new()
        .with_stage(JsonlReader::new(&input).with_config(reader_config));
    for stage in config.build_stages()? {
        pipeline = pipeline.with_boxed_stage(stage);
    }
    let output_compression = args.compression.map_or(Compression::None, Compression::from);
    let pipeline =
        pipeline.with_stage(JsonlWriter::new(&output).with_compression(output_compression));

    let start = Instant::now();
    let pb = if args.progress && !args.json {
        Some(create_spinner("Filtering documents..."))
    } else {
        None
    };

    let shard_count = single_shard.map_or(args.tasks, |s| s.count);
    let shards: Vec<usize> = match single_shard {
        Some(shard) => {
            pipeline.run(shard)?;
            vec![shard.index]
        }
        None => LocalExecutor::new(args.tasks)
            .with_workers(args.workers)
            .run(|shard| pipeline.run(shard).map(|_| shard.index))?,
    };

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let stats = pipeline.stats();
    let documents_written = stats
        .iter()
        .find(|s| s.stage == "jsonl_writer")
        .map_or(0, |s| s.forwarded);
    let filter_stats: Vec<StageStats> = stats
        .into_iter()
        .filter(|s| s.stage != "jsonl_writer")
        .collect();

    if args.json {
        let result = JsonOutput {
            input: input.display().to_string(),
            output: output.display().to_string(),
            shards,
            shard_count,
            documents_written,
            stages: filter_stats,
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        eprintln!();
        eprintln!("Filtering Results:");
        print_stage_stats(&filter_stats);
        eprintln!();
        eprintln!("  Documents written: {documents_written}");
        eprintln!("  Output: {}", output.display());
        eprintln!();
        eprintln!("Total time: {:.3}s", start.elapsed().as_secs_f64());
    }

    Ok(())
}
