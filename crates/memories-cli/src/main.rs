use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memories_core::fetch::{RetryPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};
use memories_core::ProcessOptions;

#[derive(Parser)]
#[command(
    name = "memories-dl",
    version,
    about = "Download exported memories and stamp capture time and GPS into each file"
)]
struct Cli {
    /// Memories history manifest (JSON with a "Saved Media" list)
    #[arg(short, long, default_value = "memories_history.json")]
    manifest: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "downloaded_media")]
    output: PathBuf,

    /// IANA timezone the captures are localized to
    #[arg(long, default_value = memories_core::timestamp::DEFAULT_TIMEZONE)]
    timezone: String,

    /// Download attempts per record
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Exponential backoff base in seconds
    #[arg(long, default_value_t = DEFAULT_BACKOFF_BASE)]
    backoff_base: f64,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = memories_core::fetch::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// exiftool program
    #[arg(long, default_value = "exiftool")]
    exiftool: PathBuf,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

/// Log sink that clears the progress bar while a line is written to stderr.
struct BarWriter(ProgressBar);

impl Write for BarWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Progress callback that advances `pb` by record.
fn record_progress(pb: ProgressBar) -> impl Fn(&str, u64, u64, &str) + Send + Sync + 'static {
    move |_stage, current, total, message| {
        pb.set_length(total);
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap(),
    );

    let default_filter = if cli.verbose { "debug" } else { "info" };
    let log_bar = pb.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(move || BarWriter(log_bar.clone())))
        .init();

    let t_total = std::time::Instant::now();

    let options = ProcessOptions {
        manifest: cli.manifest,
        output: cli.output,
        timezone: cli.timezone,
        retry: RetryPolicy {
            max_retries: cli.retries,
            backoff_base: cli.backoff_base,
        },
        timeout_secs: cli.timeout,
        exiftool: cli.exiftool,
        ..ProcessOptions::default()
    };

    let summary = memories_core::process(&options, &record_progress(pb.clone()))?;
    pb.finish_and_clear();

    info!("Processing complete");
    eprintln!("Processed: {}", summary.processed);
    eprintln!("Tagged: {} ({} verified)", summary.tagged, summary.verified);
    eprintln!("Skipped (already exists): {}", summary.skipped);
    eprintln!("Errors: {}", summary.errors);
    eprintln!("Total: {}", summary.total);
    eprintln!("Done in {:.2}s", t_total.elapsed().as_secs_f64());

    Ok(())
}
