//! Flaremon CLI
//!
//! Solar radio flare detection on total-power scan files.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use flaremon::{
    config::{Config, OpenFlarePolicy},
    core::DualPipeline,
    report::{export_json, write_flare_list, TriggerView},
    source::{observing_day, FileTail, Sample, ScanFile, ScanLine, TailEvent},
    stats::{create_shared_log_with_persistence, SharedIngestLog},
    VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// File under the data path holding the cumulative ingest counters.
const STATS_FILE: &str = "ingest_stats.json";

#[derive(Parser)]
#[command(name = "flaremon")]
#[command(version = VERSION)]
#[command(about = "Solar radio flare detection on total-power scan data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect flares in complete scan files
    Scan {
        /// Scan files to analyse, processed in name order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory receiving the flare lists
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Also export the fast-trigger flares as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        #[command(flatten)]
        tunables: Tunables,
    },

    /// Follow a growing scan file and keep the flare lists current
    Watch {
        /// Scan file being written by the observing system
        file: PathBuf,

        /// Directory receiving the flare lists
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Poll interval in seconds
        #[arg(long)]
        poll_interval: Option<u64>,

        #[command(flatten)]
        tunables: Tunables,
    },

    /// Show configuration
    Config,
}

/// Detector overrides shared by the processing commands.
#[derive(Args, Debug, Clone, Default)]
struct Tunables {
    /// Vote threshold in background standard deviations
    #[arg(long)]
    nsigma: Option<f64>,

    /// Samples required for full confidence
    #[arg(long)]
    nflare: Option<usize>,

    /// Background window of the fast-trigger instance
    #[arg(long)]
    nbgnd: Option<usize>,

    /// Background window of the stable-trigger instance
    #[arg(long)]
    nbgnd2: Option<usize>,

    /// Leave flares that are still in progress out of the lists
    #[arg(long)]
    defer_open: bool,
}

impl Tunables {
    fn apply(&self, config: &mut Config) {
        if let Some(nsigma) = self.nsigma {
            config.nsigma = nsigma;
        }
        if let Some(nflare) = self.nflare {
            config.nflare = nflare;
        }
        if let Some(nbgnd) = self.nbgnd {
            config.nbgnd = nbgnd;
        }
        if let Some(nbgnd2) = self.nbgnd2 {
            config.nbgnd2 = nbgnd2;
        }
        if self.defer_open {
            config.open_flare_policy = OpenFlarePolicy::Defer;
        }
    }
}

fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            files,
            output,
            json,
            tunables,
        } => cmd_scan(files, output, json, &tunables),
        Commands::Watch {
            file,
            output,
            poll_interval,
            tunables,
        } => cmd_watch(file, output, poll_interval, &tunables),
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    }
}

/// Load the configuration file and apply command line overrides.
fn load_config(tunables: &Tunables) -> Result<Config> {
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("could not load configuration, using defaults: {e}");
        Config::default()
    });
    tunables.apply(&mut config);
    config.validate().context("invalid detector tunables")?;
    Ok(config)
}

/// Both detector instances plus the bookkeeping of the current observing day.
struct DailyMonitor {
    pipeline: DualPipeline,
    day: Option<NaiveDate>,
    output_dir: PathBuf,
    policy: OpenFlarePolicy,
    log: SharedIngestLog,
}

impl DailyMonitor {
    fn new(config: &Config, output_dir: PathBuf, log: SharedIngestLog) -> Self {
        Self {
            pipeline: DualPipeline::new(config.fast_detector(), config.slow_detector()),
            day: None,
            output_dir,
            policy: config.open_flare_policy,
            log,
        }
    }

    /// Feed a batch of lines, starting over when a new observing day begins.
    fn feed(&mut self, lines: &[ScanLine]) -> Result<()> {
        let batch_day = lines
            .iter()
            .find_map(|line| Sample::parse_line(&line.text).ok())
            .map(|sample| observing_day(sample.time));

        if let (Some(current), Some(next)) = (self.day, batch_day) {
            if next != current {
                self.write_reports()?;
                tracing::info!(%current, %next, "new observing day, resetting detectors");
                self.pipeline.reset();
            }
        }
        if batch_day.is_some() {
            self.day = batch_day;
        }

        let summary = self.pipeline.feed(lines).context("flare detection failed")?;
        self.log.record_feed(&summary);
        tracing::debug!(?summary, "batch processed");
        Ok(())
    }

    /// Rewrite both flare lists of the current observing day.
    fn write_reports(&self) -> Result<()> {
        let Some(day) = self.day else {
            return Ok(());
        };

        let views = [
            (TriggerView::Fast, &self.pipeline.fast),
            (TriggerView::Stable, &self.pipeline.slow),
        ];
        for (view, detector) in views {
            write_flare_list(
                &self.output_dir,
                day,
                view,
                &detector.record().flares,
                self.policy,
            )
            .with_context(|| format!("writing {view:?} flare list for {day}"))?;
            self.log.record_report_written();
        }
        Ok(())
    }
}

fn cmd_scan(
    mut files: Vec<PathBuf>,
    output: Option<PathBuf>,
    json: Option<PathBuf>,
    tunables: &Tunables,
) -> Result<()> {
    let config = load_config(tunables)?;
    let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
    let log = create_shared_log_with_persistence(config.data_path.join(STATS_FILE));
    let mut monitor = DailyMonitor::new(&config, output_dir, log.clone());

    files.sort();
    for path in &files {
        let scan = match ScanFile::read(path) {
            Ok(scan) => scan,
            Err(e) => {
                tracing::warn!("skipping unreadable scan: {e}");
                continue;
            }
        };
        if !scan.is_solar() {
            tracing::warn!(
                path = %path.display(),
                project = scan.project.as_deref().unwrap_or("<none>"),
                "skipping non-solar scan"
            );
            log.record_scan_skipped();
            continue;
        }
        tracing::info!(path = %path.display(), lines = scan.lines.len(), "processing scan");
        monitor.feed(&scan.lines)?;
    }

    monitor.write_reports()?;

    let flares = &monitor.pipeline.fast.record().flares;
    println!(
        "Detected {} flare(s) (fast trigger), {} (stable trigger)",
        flares.len(),
        monitor.pipeline.slow.record().flares.len()
    );
    for flare in flares {
        println!("  {}  severities {:?}", flare.flare_id(), flare.severities());
    }

    if let Some(path) = json {
        export_json(&path, flares).with_context(|| format!("exporting {}", path.display()))?;
        println!("Exported flares to {path:?}");
    }

    if let Err(e) = log.save() {
        tracing::warn!("could not save ingest stats: {e}");
    }
    println!();
    println!("{}", log.summary());
    Ok(())
}

fn cmd_watch(
    file: PathBuf,
    output: Option<PathBuf>,
    poll_interval: Option<u64>,
    tunables: &Tunables,
) -> Result<()> {
    let mut config = load_config(tunables)?;
    if let Some(secs) = poll_interval {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(dir) = output {
        config.output_dir = dir;
    }
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("could not create directories: {e}");
    }

    println!("Flaremon v{VERSION}");
    println!("  Following: {}", file.display());
    println!("  Poll interval: {}s", config.poll_interval.as_secs());
    println!("  Flare lists: {}", config.output_dir.display());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let log = create_shared_log_with_persistence(config.data_path.join(STATS_FILE));
    let mut monitor = DailyMonitor::new(&config, config.output_dir.clone(), log.clone());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("installing Ctrl+C handler")?;

    let mut tail = FileTail::new(file.clone(), config.poll_interval);
    tail.start().context("starting file tail")?;
    let receiver = tail.receiver().clone();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(TailEvent::Lines(lines)) => {
                monitor.feed(&lines)?;
                if let Err(e) = monitor.write_reports() {
                    tracing::error!("{e:#}");
                }
                if let Some(flare) = monitor.pipeline.fast.record().open_flare() {
                    tracing::info!(
                        flare = %flare.flare_id(),
                        severities = ?flare.severities(),
                        "flare in progress"
                    );
                }
            }
            Ok(TailEvent::NonSolar(project)) => {
                tracing::warn!(
                    path = %file.display(),
                    project = project.as_deref().unwrap_or("<none>"),
                    "scan is not a solar observation, nothing to follow"
                );
                log.record_scan_skipped();
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if !tail.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("file tail disconnected unexpectedly");
                break;
            }
        }
    }

    println!();
    println!("Stopping...");
    tail.stop();

    if let Err(e) = log.save() {
        tracing::warn!("could not save ingest stats: {e}");
    }
    println!();
    println!("{}", log.summary());
    Ok(())
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
    println!();
    println!("Fast trigger:   {:?}", config.fast_detector());
    println!("Stable trigger: {:?}", config.slow_detector());
}
