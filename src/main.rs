use std::fs::File;
use std::io;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, WriteLogger};

use pagestrip::cache::SharedCache;
use pagestrip::config::Settings;
use pagestrip::error::Fault;
use pagestrip::worker::Dispatcher;

#[derive(Parser, Debug)]
#[command(name = "pagestrip", version, about = "Document viewer render worker")]
struct Cli {
    /// Unix socket to the control side.
    #[arg(long, conflicts_with = "stdio")]
    socket: Option<PathBuf>,

    /// Speak the protocol over stdin/stdout instead of a socket.
    #[arg(long)]
    stdio: bool,

    /// Settings file (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log file path override.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };

    let log_path = cli
        .log_file
        .or_else(|| settings.log_file.clone())
        .unwrap_or_else(|| PathBuf::from("pagestrip.log"));
    WriteLogger::init(
        settings.level_filter(),
        Config::default(),
        File::create(&log_path)
            .with_context(|| format!("cannot create log file {}", log_path.display()))?,
    )?;

    info!(
        "starting render worker (slot pool size {})",
        settings.pool_size()
    );

    let cache = SharedCache::new();
    let result = if cli.stdio {
        run(io::stdin().lock(), io::stdout().lock(), cache)
    } else {
        let path = cli
            .socket
            .context("either --socket or --stdio is required")?;
        let stream = UnixStream::connect(&path)
            .with_context(|| format!("cannot connect to {}", path.display()))?;
        let writer = stream.try_clone().context("cannot clone socket")?;
        run(stream, writer, cache)
    };

    // There is no error channel back to the control side; a fault ends the
    // process and the control side resynchronizes from its death.
    if let Err(fault) = result {
        error!("fatal: {fault}");
        return Err(fault.into());
    }

    info!("shutting down");
    Ok(())
}

#[cfg(feature = "pdf")]
fn run<R: io::Read, W: io::Write>(
    reader: R,
    writer: W,
    cache: SharedCache,
) -> std::result::Result<(), Fault> {
    Dispatcher::<_, _, pagestrip::source::MupdfSource>::new(reader, writer, cache).run()
}

#[cfg(not(feature = "pdf"))]
fn run<R: io::Read, W: io::Write>(
    _reader: R,
    _writer: W,
    _cache: SharedCache,
) -> std::result::Result<(), Fault> {
    Err(Fault::document("built without a document engine"))
}
