use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::warn;

use budget_jpeg::{
    batch::{self, BatchRunner},
    commit,
    config::{self, RunConfig},
    report::{self, format_size},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

/// Shrinks a folder of JPEG images to fit a total size budget while keeping text legible.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Input folder
    #[arg(long, short, default_value = config::DEFAULT_INPUT_DIR)]
    input: PathBuf,
    /// Output folder (default: rewrite the input folder in place)
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Target total folder size in MB
    #[arg(long, short, default_value_t = config::DEFAULT_TARGET_MEGABYTES)]
    target_size: f64,
    /// Maximum image width in pixels, aspect ratio is kept
    #[arg(long, short = 'w', default_value_t = config::DEFAULT_MAX_WIDTH)]
    max_width: u32,
    /// Initial JPEG quality guess (1-100)
    #[arg(long, short, default_value_t = config::DEFAULT_INITIAL_QUALITY,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,
    /// Copy originals to a sibling `<input>_backup` folder first
    #[arg(long, short, conflicts_with = "no_backup")]
    backup: bool,
    /// Overwrite originals without a backup (default)
    #[arg(long)]
    no_backup: bool,
    /// Number of images processed concurrently
    #[arg(long, short, default_value_t = 1)]
    jobs: usize,
    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn to_config(&self) -> RunConfig {
        RunConfig {
            input_dir: self.input.clone(),
            output_dir: self.output.clone(),
            target_megabytes: self.target_size,
            max_width: self.max_width,
            initial_quality: self.quality,
            backup: self.backup && !self.no_backup,
            jobs: self.jobs,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.to_config();
    let prepared = batch::prepare(&config).context("pre-flight check failed")?;
    let plan = &prepared.plan;
    let human = args.format == OutputFormat::Human;

    if let Some(out) = &config.output_dir {
        std::fs::create_dir_all(out)
            .with_context(|| format!("cannot create output folder '{}'", out.display()))?;
    }

    if human {
        let current = batch::total_size(&prepared.images);
        println!("Found {} images to optimize", prepared.images.len());
        println!("Input folder: {}", config.input_dir.display());
        println!("Output folder: {}", config.destination_dir().display());
        println!();
        println!("Current folder size: {}", format_size(current));
        println!("Target folder size: {}", format_size(plan.aggregate_target_bytes()));
        println!("Target per image: {}", format_size(plan.per_image_target_bytes()));
        println!("Max width: {}px", config.max_width);
        println!("Initial quality: {}", config.initial_quality);
        println!();
    }

    if let Some(backup_dir) = config.backup_dir() {
        let stats = commit::backup_originals(&prepared.images, &backup_dir)
            .with_context(|| format!("backup to '{}' failed", backup_dir.display()))?;
        if human {
            println!(
                "Backup in {}: {} copied, {} already present\n",
                backup_dir.display(),
                stats.copied,
                stats.skipped
            );
        }
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            if !cancel.swap(true, Ordering::SeqCst) {
                eprintln!("\nInterrupted: finishing images already in progress...");
            }
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let total = prepared.images.len();
    let runner = BatchRunner::new(plan.clone(), config.destination_dir())
        .with_jobs(config.jobs)
        .with_cancel_flag(cancel);
    let report = runner.run(&prepared.images, |index, result| {
        if human {
            println!("{}", report::render_line(index, total, result));
        }
    })?;

    match args.format {
        OutputFormat::Human => print!("{}", report.render_summary(config.max_width, config.initial_quality)),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    if !report.summary.target_met {
        warn!(
            optimized = report.summary.total_optimized_bytes,
            target_bytes = plan.aggregate_target_bytes(),
            "aggregate target not met"
        );
    }
    Ok(())
}
