//! # Benchmark Control Server Library
//!
//! A remote-control server for driving named, in-process performance
//! benchmarks. An external driver (dashboard, regression detector, CI
//! bisection script) lists, configures, and executes benchmarks over one of
//! two control protocols and reads back precise timing, throughput, and
//! allocation measurements for every run.
//!
//! ## Control Protocols
//!
//! Both front ends expose the same operation set over very different wire
//! shapes:
//!
//! - **Line protocol**: newline-delimited text commands (`help`, `list`,
//!   `run`, `set`, `quit`) on stdin, with results on stdout and everything
//!   else on stderr
//! - **RPC protocol**: framed JSON request/response records (`List`, `Set`,
//!   `Run`, `Kill`) over TCP, one call per connection
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `registry`: the immutable named-benchmark set, built once at startup
//! - `coordinator`: single-flight run execution, parallelism-gauge
//!   management and leak detection, and the engine seam
//! - `options`: process-wide report options replaced wholesale by `set`
//! - `server`: the shared control state both front ends translate into
//! - `line` / `rpc`: the two front ends
//! - `results`: the run result record and report-line formatting
//! - `engine`: the supplied measured-execution primitive and its `Bencher`
//! - `workload`: built-in benchmark bodies and pass-through execution
//!
//! Execution is strictly serialized: a front end suspends on the active run
//! before reading the next command or accepting the next connection, because
//! overlapping runs would corrupt timing measurements and the process-wide
//! parallelism degree cannot hold two values at once.

/// Command-line interface parsing
pub mod cli;

/// Single-flight benchmark run execution
///
/// Owns the parallelism gauge and the engine seam. Each run sets the gauge,
/// executes the body on a dedicated blocking thread, and audits the gauge
/// afterwards for leaks.
pub mod coordinator;

/// Measured benchmark execution
///
/// The engine the coordinator drives: per-run `Bencher` handle, timer
/// control, allocation counting through an optional counting global
/// allocator, and panic-to-failure conversion.
pub mod engine;

/// Line-oriented control front end
pub mod line;

/// Logging setup and the colorized console formatter
pub mod logging;

/// Process-wide run-report options
pub mod options;

/// The named benchmark registry
pub mod registry;

/// Run results and report formatting
pub mod results;

/// RPC control front end over TCP, plus a driver-side client
pub mod rpc;

/// Shared control state behind both front ends
pub mod server;

/// Built-in benchmark bodies and pass-through mode
pub mod workload;

// Re-export key types for convenient library usage.

pub use coordinator::{Coordinator, Engine, Measurement, ParallelismGauge, RunReport};
pub use engine::{Bencher, MeasuredEngine};
pub use options::Options;
pub use registry::{BenchmarkEntry, Registry};
pub use results::RunResult;
pub use server::{ControlError, ControlState, RunRequest};

/// The current version of the benchmark server
///
/// Populated from Cargo.toml and logged at startup for reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    /// Default RPC listen address
    ///
    /// Loopback only: the control protocol executes arbitrary registered
    /// benchmarks and is not meant to be reachable off-host by default.
    pub const LISTEN_ADDR: &str = "127.0.0.1:52525";

    /// Default iterations per benchmark in pass-through mode
    ///
    /// Enough to produce a stable ns/op figure for the built-in workload
    /// while keeping an un-flagged invocation fast.
    pub const ITERATIONS: u64 = 1000;
}
