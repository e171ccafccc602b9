//! Feeds recorded detector output through the channel pipeline and prints
//! one JSON report per frame.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nmtrack::{AppConfig, Counters, Error, Frame, LogSink, Pipeline, Reporter, Telemetry};

#[derive(Parser)]
#[command(name = "replay", about = "Replay detections through the near-miss tracker")]
struct Cli {
    /// Application config (JSON)
    #[arg(long)]
    config: PathBuf,
    /// Detections, one JSON frame per line
    #[arg(long)]
    frames: PathBuf,
    /// Telemetry push period in milliseconds
    #[arg(long, default_value_t = 1000)]
    report_ms: u64,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nmtrack=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    let counters = Arc::new(Counters::new());
    let telemetry = Arc::new(Telemetry::new(config.cameras.len()));
    let reporter = Reporter::spawn(
        telemetry.clone(),
        LogSink,
        Duration::from_millis(cli.report_ms.max(1)),
    );

    let mut pipeline = Pipeline::spawn(&config, counters.clone(), Some(telemetry));

    let reports = pipeline.reports().clone();
    let printer = std::thread::spawn(move || -> Result<(), Error> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for report in reports.iter() {
            serde_json::to_writer(&mut out, &report)?;
            out.write_all(b"\n")?;
        }

        Ok(())
    });

    let reader = BufReader::new(File::open(&cli.frames)?);
    let mut submitted = 0u64;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let frame: Frame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(line = lineno + 1, %err, "skipping malformed frame");
                continue;
            }
        };

        match pipeline.submit(frame) {
            Ok(()) => submitted += 1,
            Err(Error::Config(msg)) => warn!(line = lineno + 1, "{}", msg),
            Err(err) => return Err(err),
        }
    }

    pipeline.close();
    pipeline.join()?;

    match printer.join() {
        Ok(result) => result?,
        Err(_) => warn!("report printer panicked"),
    }

    reporter.stop();

    let totals = counters.snapshot();
    info!(
        frames = submitted,
        people = totals.classes.people,
        vehicles = totals.classes.vehicles,
        bicycles = totals.classes.bicycles,
        collisions = totals.collisions,
        "replay finished"
    );

    Ok(())
}
