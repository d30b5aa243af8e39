use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use photogeo_core::{CancellationToken, GeotagControl, GeotagOptions, Status};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "photogeo",
    version,
    about = "Geotag photos without GPS data from the photo taken closest in time"
)]
struct Cli {
    /// Directories to scan (default: current directory)
    paths: Vec<PathBuf>,

    /// Maximum time difference in minutes to the nearest GPS-tagged photo
    #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(i64).range(0..=5_256_000))]
    max_gap: Option<i64>,

    /// Photo file extension to consider (repeatable, default: jpg, jpeg, nef)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Path of the exiftool executable
    #[arg(long, value_name = "PATH")]
    exiftool: Option<PathBuf>,

    /// Do not keep exiftool's *_original backup files
    #[arg(long)]
    overwrite_original: bool,

    /// Show matches without modifying any file
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON report of every decision to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Load options from a JSON file; flags given on the command line take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of worker threads (default: one per CPU)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors, no progress bar
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn options(&self) -> anyhow::Result<GeotagOptions> {
        let mut options = match &self.config {
            Some(path) => GeotagOptions::load(path)
                .map_err(|e| anyhow::anyhow!("cannot load config {}: {e}", path.display()))?,
            None => GeotagOptions::default(),
        };

        if !self.paths.is_empty() {
            options.paths = self.paths.clone();
        }
        if let Some(gap) = self.max_gap {
            options.max_gap_minutes = gap;
        }
        if !self.extensions.is_empty() {
            options.extensions = self
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_string())
                .collect();
        }
        if let Some(ref exiftool) = self.exiftool {
            options.exiftool = exiftool.clone();
        }
        options.overwrite_original |= self.overwrite_original;
        options.dry_run |= self.dry_run;
        if self.report.is_some() {
            options.report = self.report.clone();
        }
        Ok(options)
    }

    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            _ => "trace",
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level());
    let t_total = std::time::Instant::now();

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global()?;
    }

    let options = cli.options()?;
    tracing::debug!(?options, "resolved options");

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling, finishing writes already in progress...");
        handler_token.cancel();
    })?;
    let control = GeotagControl::new().with_cancel_token(token);

    let bar = if cli.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(ProgressStyle::with_template("{prefix:>7} [{bar:30}] {pos}/{len} {msg}")?.progress_chars("=> "));
    let cb_bar = bar.clone();

    let report = photogeo_core::process_with_control(&options, &control, &move |stage, current, total, message| {
        cb_bar.set_prefix(stage.to_string());
        cb_bar.set_length(total);
        cb_bar.set_position((current + 1).min(total));
        cb_bar.set_message(message.to_string());
    })?;
    bar.finish_and_clear();

    for entry in report.failures() {
        if let Status::WriteFailed { ref error } = entry.status {
            eprintln!("failed: {}: {}", entry.photo.display(), error);
        }
    }

    let s = &report.summary;
    let verb = if options.dry_run { "would be geotagged" } else { "geotagged" };
    eprintln!(
        "Done! {} photos scanned ({} with gps, {} without, {} unreadable): {} {}, {} too far apart, {} without candidates, {} failed, {} cancelled ({:.2}s)",
        s.scanned,
        s.tagged,
        s.untagged,
        s.unreadable,
        s.written + s.dry_run,
        verb,
        s.rejected,
        s.no_candidates,
        s.failed,
        s.cancelled,
        t_total.elapsed().as_secs_f64()
    );

    if s.failed > 0 || report.was_cancelled() {
        std::process::exit(1);
    }
    Ok(())
}
