//! CLI entry point for HEVC Sweep
//!
//! Parses command line arguments, starts the daemon and maps the outcome to
//! an exit code.

use clap::Parser;
use hevc_sweep::{CancelToken, Config, Daemon, DaemonError};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

/// HEVC Sweep - re-encode HEVC video in a media catalog to H.264
#[derive(Parser, Debug)]
#[command(name = "hevc-sweep")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml); missing file means defaults
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Catalog export to scan, overriding the configured path
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Run a single scan pass and exit
    #[arg(long, default_value = "false")]
    once: bool,

    /// Skip startup checks (ffmpeg, catalog). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

fn init_daemon(args: &Args) -> Result<Daemon, DaemonError> {
    if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
        let config: Config = Daemon::load_config(&args.config, args.catalog.clone())?;
        Ok(Daemon::new_without_checks(config))
    } else {
        Daemon::new(&args.config, args.catalog.clone())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG overrides the default info level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    info!("HEVC Sweep starting");
    info!("Config file: {}", args.config.display());

    let daemon = match init_daemon(&args) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!("Failed to initialize daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Catalog: {}", daemon.config.catalog.path.display());
    info!(
        "Encoding {} -> {} (crf {})",
        daemon.config.scan.source_codec, daemon.config.ffmpeg.video_codec, daemon.config.ffmpeg.crf
    );

    let single_pass = args.once || daemon.config.scan.interval_secs == 0;

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current item");
            on_signal.cancel();
        }
    });

    match daemon.run_with_server(&cancel, args.once).await {
        Ok(summary) => {
            if summary.failed_passes > 0 {
                warn!("{} scan pass(es) could not read the catalog", summary.failed_passes);
            }
            info!(
                "Done: {} pass(es), {} replaced, {} failed, {} skipped{}",
                summary.passes,
                summary.replaced,
                summary.failed,
                summary.skipped,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            if single_pass && summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            ExitCode::FAILURE
        }
    }
}
