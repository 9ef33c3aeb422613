//! Command-line interface for the benchmark server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

/// Benchmark Server - remote-controlled execution of in-process benchmarks
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Start the control server instead of running the workload once
    #[clap(long, default_value_t = false)]
    pub serve: bool,

    /// Control protocol to serve
    #[clap(long, value_enum, default_value_t = ControlMode::Rpc)]
    pub control: ControlMode,

    /// Listen address for the RPC control protocol
    #[clap(long, default_value = crate::defaults::LISTEN_ADDR)]
    pub addr: String,

    /// Report memory statistics for every run from the start
    #[clap(long, default_value_t = false)]
    pub benchmem: bool,

    /// Iterations per benchmark in pass-through mode
    #[clap(short = 'i', long, default_value_t = crate::defaults::ITERATIONS)]
    pub iterations: u64,

    /// Pin the run thread to a fixed core to reduce scheduling noise
    #[clap(long)]
    pub pin_core: Option<usize>,

    /// Write logs to this file instead of the console
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

/// Available control protocols.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ControlMode {
    /// Newline-delimited text commands on stdin/stdout
    #[clap(name = "line")]
    Line,

    /// Framed JSON request/response over TCP
    #[clap(name = "rpc")]
    Rpc,
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMode::Line => write!(f, "line protocol"),
            ControlMode::Rpc => write!(f, "RPC protocol"),
        }
    }
}

/// Parse the `--addr` flag into a socket address. Port 0 is allowed; the
/// server prints the resolved address once bound.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address {:?}, expected host:port", addr))
}
