//! # livestacks - Main Entry Point
//!
//! Samples call stacks with a per-CPU perf event and prints the hottest
//! stacks of every window until the report budget runs out or Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::io;
use std::sync::Arc;

use livestacks::aggregation::StackAggregator;
use livestacks::cli::Args;
use livestacks::domain::{ConfigError, SessionError};
use livestacks::preflight::run_preflight_checks;
use livestacks::reporting::ReportingLoop;
use livestacks::session::{EbpfSession, StopSignal};
use livestacks::symbolization::ProcResolver;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            report_error(&e);
            exit_code_for(&e)
        }
    });
}

fn report_error(err: &anyhow::Error) {
    if let Some(usage) = err.downcast_ref::<clap::Error>() {
        let _ = usage.print();
    } else if err.downcast_ref::<ConfigError>().is_some()
        || err.downcast_ref::<SessionError>().is_some()
    {
        eprintln!("Error creating session: {err:#}");
    } else {
        eprintln!("error: {err:#}");
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<clap::Error>().is_some() {
        return EXIT_USAGE;
    }
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            // --help / --version
            e.print()?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let report_config = args.report_config()?;
    let session_config = args.session_config()?;

    run_preflight_checks(&session_config.pids)?;

    if !args.quiet {
        eprintln!("livestacks v{}", env!("CARGO_PKG_VERSION"));
        eprintln!(
            "event: {} at {} Hz, every {}s, top {}",
            session_config.event,
            session_config.frequency_hz,
            report_config.interval.as_secs(),
            report_config.top_stacks
        );
    }

    let stop = StopSignal::new();
    let aggregator = Arc::new(StackAggregator::new());

    let mut session = EbpfSession::new(session_config, stop.clone());
    session.start(aggregator.clone()).context("Failed to start trace session")?;

    let reporter = Arc::new(ReportingLoop::new(
        Arc::clone(&aggregator),
        ProcResolver::new(),
        report_config,
        stop.clone(),
        io::stdout(),
    )?);
    let report_handle = Arc::clone(&reporter).spawn().context("Failed to spawn reporting thread")?;
    let mut report_done = tokio::task::spawn_blocking(move || report_handle.join());

    // Ends when the budget runs out, output breaks, or Ctrl+C
    let loop_result = tokio::select! {
        result = &mut report_done => Some(result),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Ctrl+C pressed, stopping...");
            None
        }
    };

    stop.stop();
    let loop_stats = match loop_result {
        Some(result) => result,
        None => report_done.await,
    }
    .context("Reporting task failed")?
    .map_err(|_| anyhow::anyhow!("Reporting thread panicked"))?;

    let capture_stats = tokio::task::spawn_blocking(move || session.join())
        .await
        .context("Capture task failed")?;

    info!(
        "{} reports ({} skipped), {} samples ({} user / {} kernel stack failures, {} empty)",
        loop_stats.reported,
        loop_stats.skipped,
        capture_stats.samples,
        capture_stats.user_stack_failures,
        capture_stats.kernel_stack_failures,
        capture_stats.empty_samples
    );

    Ok(())
}
