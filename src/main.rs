use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use gridload::config::{self, Config};
use gridload::decode::FileSource;
use gridload::model::DirectoryModel;
use gridload::pipeline::{DecodePool, Host, LoadPipeline};
use gridload::session::{GridSession, Report, run_until_idle};
use gridload::watch::DirWatcher;

/// How long one settle may take before the CLI gives up.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);
const WATCH_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(
    name = "gridload",
    version = env!("GRIDLOAD_LONG_VERSION"),
    about = "Load the visible tiles of an image grid the way a scrolling view would"
)]
struct Cli {
    /// Directory of images (defaults to the current directory)
    dir: Option<PathBuf>,

    /// Number of grid columns
    #[arg(long)]
    columns: Option<usize>,

    /// Viewport width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Scroll offsets to visit in order, e.g. `--scroll 0,400,1200`
    #[arg(long, value_delimiter = ',', default_value = "0")]
    scroll: Vec<u32>,

    /// Keep running and reload when the directory changes
    #[arg(long)]
    watch: bool,

    /// Log output file path (logs go to stderr otherwise)
    #[arg(long)]
    log: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        match std::fs::File::create(log_path) {
            Ok(file) => env_logger::Builder::from_default_env()
                .target(env_logger::Target::Pipe(Box::new(file)))
                .init(),
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        }
    } else {
        env_logger::init();
    }

    // Load config file and merge CLI overrides
    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(cli.columns, cli.width, cli.height);
    let config = cfg.resolve();

    if let Err(e) = run(&cli, config) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli, config: Config) -> Result<()> {
    let dir = cli.dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let model = DirectoryModel::scan(&dir)?;
    let columns = config.pipeline.columns;
    let mut session = GridSession::new(model, config.viewport);

    let pool = DecodePool::new(config.decode_threads).context("failed to start decode pool")?;
    let mut pipeline = LoadPipeline::new(config.pipeline, Arc::new(FileSource), Arc::new(pool));

    println!(
        "{}: {} images, {} columns, viewport {}x{}",
        dir.display(),
        session.model().len(),
        columns,
        config.viewport.width,
        config.viewport.height
    );

    pipeline.viewport_changed(Instant::now(), session.viewport());
    for &offset in &cli.scroll {
        let applied = session.scroll_to(offset, columns);
        pipeline.scrolled(Instant::now());
        let started = Instant::now();
        run_until_idle(&mut pipeline, &mut session, SETTLE_TIMEOUT)?;
        info!(
            "scroll {applied}: settled in {:.1}ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
        print_report(&session.report(&mut pipeline));
    }

    let stats = pipeline.stats();
    println!(
        "stats: generations={} decoded={} reused={} applied={} stale={} repaints={}",
        stats.generations,
        stats.dispatched,
        stats.reused,
        stats.applied,
        stats.stale_dropped,
        stats.repaints
    );

    if cli.watch {
        watch_loop(&dir, &mut session, &mut pipeline)?;
    }
    Ok(())
}

/// Reload and reset on every directory change until interrupted.
fn watch_loop(
    dir: &std::path::Path,
    session: &mut GridSession,
    pipeline: &mut LoadPipeline,
) -> Result<()> {
    let watcher =
        DirWatcher::new(dir).with_context(|| format!("failed to watch {}", dir.display()))?;
    info!("watch: watching {}", dir.display());
    loop {
        std::thread::sleep(WATCH_INTERVAL);
        if !watcher.has_changed() || !session.model_mut().refresh()? {
            continue;
        }
        println!("{} changed: {} images", dir.display(), session.model().len());
        let columns = pipeline.columns();
        let scroll_y = session.viewport().scroll_y;
        session.scroll_to(scroll_y, columns);
        pipeline.reset(Instant::now(), session.viewport());
        run_until_idle(pipeline, session, SETTLE_TIMEOUT)?;
        print_report(&session.report(pipeline));
    }
}

fn print_report(report: &Report) {
    println!(
        "scroll {}: tiles [{}, {}) loaded={} failed={} pending={}",
        report.scroll_y,
        report.range.first,
        report.range.end,
        report.loaded,
        report.failed,
        report.not_loaded
    );
    for rect in &report.repaints {
        println!(
            "  repaint {}x{} at ({}, {})",
            rect.width, rect.height, rect.x, rect.y
        );
    }
}
