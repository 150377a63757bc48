//! # bpfrun - Main Entry Point
//!
//! Reads a program package, runs pre-flight checks, loads and attaches it,
//! then prints exported records until Ctrl+C, the `--duration` limit, or an
//! export error.
//!
//! The export loop blocks, so it runs on a blocking task; the async side only
//! waits for a reason to stop and then calls `stop_and_clean` through a
//! [`StopHandle`](bpfrun::StopHandle).

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::time::{Duration, Instant};

use bpfrun::cli::{read_package, Args};
use bpfrun::preflight::run_preflight_checks;
use bpfrun::{AyaBackend, ExportSink, ProgramInstance};

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
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied")
        || msg.contains("operation not permitted")
        || msg.contains("requires root")
    {
        EXIT_NOPERM
    } else if msg.starts_with("invalid package") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let package = read_package(&args.package)?;
    let options = args.apply_to(package.options());
    let package = package.with_options(options);

    if !args.skip_preflight {
        run_preflight_checks(&package)?;
    }

    if !quiet {
        println!("bpfrun v{}", env!("CARGO_PKG_VERSION"));
        println!("package: {}", package.name());
        println!("programs: {}", package.programs().len());
        match package.export_map() {
            Some(map) => println!("export: {} ({:?})", map.name, map.kind),
            None => println!("export: none"),
        }
    }

    let instance = ProgramInstance::from_package(package, AyaBackend);
    instance.run().context("Failed to start package")?;
    let stop = instance.stop_handle();

    let json = args.json;
    let mut task = tokio::task::spawn_blocking(move || {
        let sink = if json { ExportSink::json(|line| println!("{line}")) } else { ExportSink::stdout() };
        instance.wait_and_export(sink)
    });

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let deadline = async move {
        match duration_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let (exit_reason, finished) = tokio::select! {
        result = &mut task => ("export finished", Some(result)),
        _ = &mut ctrl_c => ("interrupted", None),
        () = &mut deadline => ("duration limit reached", None),
    };

    let result = match finished {
        Some(result) => result,
        None => {
            info!("Stopping: {exit_reason}");
            let stopper = stop.clone();
            tokio::task::spawn_blocking(move || stopper.stop_and_clean())
                .await
                .context("stop task panicked")?;
            task.await
        }
    };
    let summary = result.context("export task panicked")??;

    if !quiet {
        eprintln!(
            "\n{}: {:.1}s, {} records ({} undecodable, {} lost)",
            exit_reason,
            started.elapsed().as_secs_f64(),
            summary.delivered,
            summary.decode_failures,
            summary.lost,
        );
    }

    Ok(())
}
