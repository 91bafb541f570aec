use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use partition_harvest::catalog::Catalog;
use partition_harvest::config::{ConfigLoader, ResolvedConfig};
use partition_harvest::error::HarvestError;
use partition_harvest::fetcher::Fetcher;
use partition_harvest::inventory::{self, PollOptions};
use partition_harvest::organizer::ArchiveOrganizer;
use partition_harvest::output::{JsonOutput, OutputMode, TextOutput};
use partition_harvest::pipeline::{Pipeline, PipelineOptions};
use partition_harvest::progress::{LogProgress, ProgressSink};
use partition_harvest::queue::WorkQueue;
use partition_harvest::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Resumable downloader and organizer for partitioned tar datasets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Path to a JSON config file (default: ./harvest.json)")]
    config: Option<String>,

    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write a queue file for a catalog subset")]
    Plan(PlanArgs),
    #[command(about = "Download every queued archive, optionally organizing each one")]
    Fetch(FetchArgs),
    #[command(about = "Extract downloaded archives into category/partition folders")]
    Organize(OrganizeArgs),
    #[command(about = "Mirror an externally populated directory into a manifest file")]
    Watch(WatchArgs),
}

#[derive(Args)]
struct PlanArgs {
    #[arg(long, short)]
    subset: String,

    #[arg(long, short)]
    output: Utf8PathBuf,

    #[arg(long, help = "Write archive names instead of URLs")]
    names_only: bool,
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long, short, conflicts_with = "subset")]
    queue: Option<Utf8PathBuf>,

    #[arg(long, short)]
    subset: Option<String>,

    #[arg(long)]
    dest: Option<Utf8PathBuf>,

    #[arg(long)]
    organize: bool,

    #[arg(long)]
    target: Option<Utf8PathBuf>,

    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    chunk_size: Option<usize>,
}

#[derive(Args)]
struct OrganizeArgs {
    #[arg(long)]
    source: Option<Utf8PathBuf>,

    #[arg(long)]
    target: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct WatchArgs {
    #[arg(long)]
    dir: Utf8PathBuf,

    #[arg(long)]
    expected: usize,

    #[arg(long)]
    manifest: Utf8PathBuf,

    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Serialize)]
struct PlanResult {
    subset: String,
    queue_file: String,
    entries: usize,
}

#[derive(Serialize)]
struct WatchResult {
    dir: String,
    manifest: String,
    files: usize,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::MalformedQueue { .. }
        | HarvestError::UnknownSubset { .. }
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::DirectoryNotFound(_) => 2,
        err if err.is_transport() => 3,
        _ => 1,
    }
}

fn install_interrupt_flag() -> miette::Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping after the current item");
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| miette::miette!("failed to install interrupt handler: {err}"))?;
    Ok(interrupted)
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan(args) => run_plan(args, &config, output_mode),
        Commands::Fetch(args) => run_fetch(args, &config, output_mode),
        Commands::Organize(args) => run_organize(args, &config, output_mode),
        Commands::Watch(args) => run_watch(args, &config, output_mode),
    }
}

fn run_plan(args: PlanArgs, config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let partitions = config.catalog.list_partitions(&args.subset)?;
    let entries = partitions
        .iter()
        .map(|partition| {
            if args.names_only {
                partition.archive_name()
            } else {
                config.catalog.location(partition)
            }
        })
        .collect::<Vec<_>>();
    WorkQueue::write_file(args.output.as_std_path(), &entries)?;

    let result = PlanResult {
        subset: args.subset,
        queue_file: args.output.to_string(),
        entries: entries.len(),
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_json(&result).into_diagnostic()?,
        OutputMode::Text => println!(
            "{} entries for subset {} written to {}",
            result.entries, result.subset, result.queue_file
        ),
    }
    Ok(())
}

fn run_fetch(args: FetchArgs, config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let mut queue = match (args.queue.or_else(|| config.queue_file.clone()), args.subset) {
        (_, Some(subset)) => WorkQueue::from_items(config.catalog.work_items(&subset)?),
        (Some(path), None) => {
            WorkQueue::load(path.as_std_path(), Some(config.catalog.base_url()))?
        }
        (None, None) => {
            return Err(miette::Report::msg(
                "nothing to fetch: pass --queue FILE or --subset NAME",
            ));
        }
    };

    let transport = HttpTransport::new(&config.transport)?;
    let fetcher =
        Fetcher::new(transport).with_chunk_size(args.chunk_size.unwrap_or(config.chunk_size));
    let options = PipelineOptions {
        dest_dir: args
            .dest
            .unwrap_or_else(|| config.download_dir.clone())
            .into_std_path_buf(),
        target_root: args
            .target
            .unwrap_or_else(|| config.target_dir.clone())
            .into_std_path_buf(),
        organize: args.organize || config.organize,
        workers: args.workers.unwrap_or(config.workers).max(1),
    };
    let pipeline = Pipeline::new(fetcher, options).with_cancel(install_interrupt_flag()?);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &LogProgress,
    };
    let summary = pipeline.run(&mut queue, sink)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_run(&summary).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_run(&summary),
    }
    Ok(())
}

fn run_organize(
    args: OrganizeArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let source = args.source.unwrap_or_else(|| config.download_dir.clone());
    let target = args.target.unwrap_or_else(|| config.target_dir.clone());
    let report = ArchiveOrganizer.organize_dir(source.as_std_path(), target.as_std_path())?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_organize(&report).into_diagnostic()?,
        OutputMode::Text => TextOutput::print_organize(&report),
    }
    Ok(())
}

fn run_watch(args: WatchArgs, config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or(config.poll_interval);
    let mut options = PollOptions::every(interval).with_cancel(install_interrupt_flag()?);
    if let Some(timeout) = args
        .timeout_secs
        .map(Duration::from_secs)
        .or(config.poll_timeout)
    {
        options = options.with_timeout(timeout);
    }

    let names = inventory::watch(
        args.dir.as_std_path(),
        args.manifest.as_std_path(),
        args.expected,
        &options,
    )?;

    let result = WatchResult {
        dir: args.dir.to_string(),
        manifest: args.manifest.to_string(),
        files: names.len(),
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_json(&result).into_diagnostic()?,
        OutputMode::Text => println!(
            "{} files present in {}; manifest at {}",
            result.files, result.dir, result.manifest
        ),
    }
    Ok(())
}
