use anyhow::Context;
use clap::Parser;
use logspam::config::{ScanConfig, Settings};
use logspam::report::{self, JsonReport};
use logspam::{latest_message, ScanMessage, ScanScheduler};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "logspam", version, about = "Find the noisiest lines in a log file")]
struct Cli {
    /// Log file to scan
    file: PathBuf,

    /// Case-sensitive words to search for. Words on either side of ` OR ` are matched separately.
    #[arg(long = "filter", short = 'f')]
    filter: Option<String>,

    /// Similarity threshold in [0, 1]; lower values merge more lines together
    #[arg(long = "granularity", short = 'g')]
    granularity: Option<f64>,

    /// Keep reading the file and print a new table whenever it changes
    #[arg(long = "follow", default_value_t = false)]
    follow: bool,

    /// Minimum milliseconds between live rescans
    #[arg(long = "interval-ms")]
    interval_ms: Option<u64>,

    /// Write the final table as CSV to this path
    #[arg(long = "csv")]
    csv: Option<PathBuf>,

    /// Output format: text | json
    #[arg(long = "format", default_value = "text")]
    format: String,

    /// Print only the N most frequent lines
    #[arg(long = "top")]
    top: Option<usize>,

    /// TOML file with startup defaults
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logspam=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    };
    let filter = cli.filter.clone().unwrap_or_else(|| settings.filter.clone());
    let granularity = cli.granularity.unwrap_or(settings.granularity);
    let interval = cli.interval_ms.map(Duration::from_millis).unwrap_or_else(|| settings.live_interval());

    let config = ScanConfig::new(cli.file.clone(), filter, granularity)?;
    let (scheduler, rx) = ScanScheduler::new(config);
    let mut scheduler = scheduler.with_live_interval(interval);

    if cli.follow || settings.follow {
        run_follow(&mut scheduler, &rx)?;
    } else {
        scheduler.start_scan();
        scheduler.wait();
        for msg in rx.try_iter() {
            if let ScanMessage::FileNotFound { .. } = msg {
                anyhow::bail!(msg.text());
            }
        }
        print_results(&scheduler, &cli)?;
    }

    if let Some(path) = &cli.csv {
        write_csv(&scheduler, path)?;
    }
    Ok(())
}

fn print_results(scheduler: &ScanScheduler, cli: &Cli) -> anyhow::Result<()> {
    let mut rows = scheduler.results();
    if let Some(top) = cli.top {
        rows.truncate(top);
    }
    if cli.format == "json" {
        let config = scheduler.config();
        let out = JsonReport::new(
            config.file_path.display().to_string(),
            config.filter.clone(),
            config.granularity(),
            scheduler.current_match_count(),
            rows,
        );
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", report::render_snapshot(&rows));
        eprintln!("{} matches", scheduler.current_match_count());
    }
    Ok(())
}

fn run_follow(scheduler: &mut ScanScheduler, rx: &std::sync::mpsc::Receiver<ScanMessage>) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        let _ = ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        });
    }
    // the writer may be mid-line; leave a partial last line for the next scan
    scheduler.hold_unterminated_lines(true);
    let show_progress = atty::is(atty::Stream::Stderr);
    let mut last_text = String::new();
    let mut parsing = false;

    while running.load(Ordering::SeqCst) {
        scheduler.tick();
        if let Some(msg) = latest_message(rx) {
            parsing = msg.is_parsing();
            let text = msg.text();
            if text != last_text {
                match msg {
                    ScanMessage::Snapshot(_) => {
                        if show_progress {
                            eprint!("\r\x1b[K");
                        }
                        print!("{text}");
                        println!("-- {} matches", scheduler.current_match_count());
                        std::io::stdout().flush()?;
                    }
                    _ => eprintln!("{text}"),
                }
                last_text = text;
            }
        }
        if parsing && show_progress {
            eprint!("\r{:>3}%", (scheduler.current_progress() * 100.0).round() as u32);
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    scheduler.stop_active_scan();
    Ok(())
}

fn write_csv(scheduler: &ScanScheduler, path: &Path) -> anyhow::Result<()> {
    tracing::info!(path = %path.display(), "saving CSV");
    std::fs::write(path, scheduler.export_csv()).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
