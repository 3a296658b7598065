use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::info;

use dsranges::config::Config;
use dsranges::consensus::FilteredStructure;
use dsranges::io;
use dsranges::pipeline::{self, FilterInputs, PartitionInputs};

#[derive(Parser, Debug)]
#[command(author, version, about = "Clustering, scoring and replication filtering of dsRNA structures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Group peaks and structures into partitions
    Partition(PartitionArgs),

    /// Select signal-supported fragments per sample and keep the replicated ones
    Filter(FilterArgs),
}

#[derive(Args, Debug)]
struct PartitionArgs {
    /// JSON configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Structure collection, overrides the configured one
    #[arg(long)]
    structures: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long)]
    max_distance: Option<i64>,

    /// Worker threads (0 = all cores)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// JSON configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long)]
    min_replication: Option<usize>,

    /// Worker threads (0 = all cores)
    #[arg(short, long, default_value_t = 0)]
    threads: usize,
}

fn init_threads(threads: usize) -> anyhow::Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to build thread pool")
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn run_partition(args: PartitionArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(path) = args.structures {
        config.structures = path;
    }
    if let Some(distance) = args.max_distance {
        config.clustering.max_distance = distance;
    }
    config.validate()?;
    init_threads(args.threads)?;

    let inputs = PartitionInputs::load(&config)?;
    let (partitions, report) = pipeline::partition(&inputs, &config.clustering);

    io::write_json(&args.output.join("partitions.json"), &partitions)?;
    io::write_bed(
        &args.output.join("partitions.bed"),
        partitions.iter().map(|x| x.to_bed12()),
    )?;
    info!(
        "Wrote {} partitions to {} ({} units failed)",
        partitions.len(),
        args.output.display(),
        report.failed
    );
    Ok(())
}

fn run_filter(args: FilterArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(min_replication) = args.min_replication {
        config.consensus.min_replication = min_replication;
    }
    config.validate()?;
    init_threads(args.threads)?;

    let inputs = FilterInputs::load(&config)?;
    let (filtered, report) = pipeline::filter(&inputs, &config);

    io::write_json(&args.output.join("filtered.json"), &filtered)?;
    io::write_bed(
        &args.output.join("filtered.bed"),
        filtered.iter().map(FilteredStructure::to_bed12),
    )?;
    info!(
        "Wrote {} structures to {} ({} units failed)",
        filtered.len(),
        args.output.display(),
        report.failed
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Partition(args) => run_partition(args),
        Commands::Filter(args) => run_filter(args),
    }
}
