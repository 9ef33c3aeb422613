//! Shared control state behind both front ends.
//!
//! [`ControlState`] owns the registry, the coordinator, and the options
//! store, and exposes the one operation set both the line protocol and the
//! RPC protocol translate into. The front ends hold it by `&mut` and await
//! every run before touching it again, so no locking is needed anywhere in
//! the control path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::{Coordinator, RunError};
use crate::options::Options;
use crate::registry::Registry;
use crate::results::{display_name, RunResult};

/// One requested benchmark run, as decoded from either protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub name: String,
    /// Degree of concurrent execution units to grant the run.
    pub parallelism: usize,
    pub iterations: u64,
}

/// Everything a front end needs to report a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `name` unadorned at parallelism 1, `name-<parallelism>` otherwise.
    pub display_name: String,
    pub result: RunResult,
    /// Degree the body left the gauge at, when it differs from the request.
    pub leak: Option<usize>,
}

/// Conditions a front end reports to its caller without touching the server.
///
/// `Failed` is the distinguished run-failure class; the other variants are
/// user errors. Neither ever terminates the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("{name} not found")]
    NotFound { name: String },

    #[error("parallelism must be positive")]
    InvalidParallelism,

    #[error("iteration count must be positive")]
    InvalidIterations,

    /// The engine reported the run as failed.
    #[error("{display_name} failed")]
    Failed { display_name: String },
}

/// The benchmark server's control state.
pub struct ControlState {
    registry: Registry,
    coordinator: Coordinator,
    options: Options,
}

impl ControlState {
    pub fn new(registry: Registry, coordinator: Coordinator, options: Options) -> Self {
        Self {
            registry,
            coordinator,
            options,
        }
    }

    /// Registered benchmark names, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Replace the options wholesale. There is no partial merge.
    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Validate and execute one run.
    ///
    /// The engine is never invoked for an invalid or unknown request; the
    /// lookup error for a `foo-3` style request names the stripped base, not
    /// the raw token, since the suffix was consumed as the parallelism.
    pub async fn run(&mut self, request: &RunRequest) -> Result<RunOutcome, ControlError> {
        if request.parallelism == 0 {
            return Err(ControlError::InvalidParallelism);
        }
        if request.iterations == 0 {
            return Err(ControlError::InvalidIterations);
        }

        let entry = self
            .registry
            .lookup(&request.name)
            .ok_or_else(|| ControlError::NotFound {
                name: request.name.clone(),
            })?
            .clone();

        match self
            .coordinator
            .run(&entry, request.iterations, request.parallelism)
            .await
        {
            Ok(report) => Ok(RunOutcome {
                display_name: display_name(&request.name, request.parallelism),
                result: report.result,
                leak: report.leak,
            }),
            Err(RunError::Failed { display_name }) => Err(ControlError::Failed { display_name }),
        }
    }
}
