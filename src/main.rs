//! # Benchmark Control Server - Main Entry Point
//!
//! Bootstraps the benchmark server process:
//!
//! 1. **Initialize logging**: structured logging with tracing, console or
//!    file output
//! 2. **Parse arguments**: mode selection and deployment configuration
//! 3. **Build the registry**: register the built-in benchmark set, failing
//!    fast on duplicate names
//! 4. **Dispatch**: serve the selected control protocol, or run the workload
//!    once in pass-through mode
//!
//! ## Exit Codes
//!
//! - `0`: clean quit, end-of-input, `Kill`, or a completed pass-through run
//! - `1`: fatal startup or listener errors (propagated through `anyhow`)
//! - `2`: I/O failure on the line protocol's input stream

use std::sync::Arc;

use anyhow::{Context, Result};
use bench_server::engine::alloc::CountingAllocator;
use bench_server::{
    cli::{self, Args, ControlMode},
    line, logging, rpc, workload, ControlState, Coordinator, MeasuredEngine, Options, Registry,
};
use clap::Parser;
use tracing::{error, info};

/// Count every allocation in the process so run reports can attribute
/// allocation deltas to the measured interval.
#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so file-logged lines are not dropped at exit.
    let _log_guard = logging::init(args.log_file.as_deref())?;

    info!("bench-server {}", bench_server::VERSION);

    let registry = Registry::build(workload::builtin_benchmarks())
        .context("building benchmark registry")?;
    let coordinator = Coordinator::new(Arc::new(MeasuredEngine), args.pin_core);
    let mut state = ControlState::new(
        registry,
        coordinator,
        Options {
            benchmem: args.benchmem,
        },
    );

    if !args.serve {
        return workload::pass_through(&mut state, args.iterations).await;
    }

    info!("serving benchmark control over the {}", args.control);
    match args.control {
        ControlMode::Line => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            match line::run_session(&mut state, stdin, tokio::io::stdout(), tokio::io::stderr())
                .await
            {
                Ok(end) => {
                    info!("line session ended: {:?}", end);
                    Ok(())
                }
                Err(e) => {
                    // Transport-fatal: distinguished from a clean quit.
                    error!("line session I/O failure: {}", e);
                    std::process::exit(2);
                }
            }
        }
        ControlMode::Rpc => {
            let addr = cli::parse_listen_addr(&args.addr)?;
            let listener = rpc::bind(addr)?;
            // Returns only on a fatal listener error.
            rpc::serve(&mut state, listener).await
        }
    }
}
