//! Benchmark execution coordinator.
//!
//! The coordinator owns the process-wide parallelism gauge and the engine
//! seam. For each request it sets the gauge, hands the benchmark body to the
//! engine on a dedicated blocking thread, joins that thread, and re-reads the
//! gauge to detect a parallelism leak. Runs are strictly serialized by the
//! front ends; `run` takes `&mut self` so that discipline is visible in the
//! signature rather than enforced with a lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::registry::{BenchFn, BenchmarkEntry};
use crate::results::{display_name, RunResult};

/// The process-wide parallelism degree, modeled as an explicit shared counter
/// instead of an ambient global.
///
/// The coordinator sets it before every run; the [`Bencher`](crate::engine::Bencher)
/// handed to the body exposes it so benchmark bodies can read or change it.
/// The gauge deliberately keeps whatever value a body left behind: the
/// coordinator detects leaks, it does not repair them.
#[derive(Clone, Debug)]
pub struct ParallelismGauge(Arc<AtomicUsize>);

impl ParallelismGauge {
    pub fn new(degree: usize) -> Self {
        Self(Arc::new(AtomicUsize::new(degree)))
    }

    pub fn set(&self, degree: usize) {
        self.0.store(degree, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ParallelismGauge {
    /// Starts at the machine's logical CPU count, the degree a process has
    /// before anyone asks for something else.
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

/// Everything the engine reports back from one measured run.
#[derive(Clone, Debug)]
pub struct Measurement {
    /// Iterations actually executed; always equals the requested count.
    pub iterations: u64,
    /// Wall time accumulated while the run timer was live.
    pub elapsed: Duration,
    /// Per-iteration byte count declared by the body, 0 if none.
    pub bytes_per_iter: u64,
    /// Allocations made while the run timer was live.
    pub alloc_count: u64,
    pub alloc_bytes: u64,
    /// The body asked for allocation figures in its report.
    pub report_allocs: bool,
    /// The body failed or panicked.
    pub failed: bool,
}

/// The measured-execution primitive the coordinator drives.
///
/// The production implementation is [`MeasuredEngine`](crate::engine::MeasuredEngine);
/// tests substitute scripted fakes.
pub trait Engine: Send + Sync + 'static {
    /// Execute `body` for exactly `iterations` iterations and report what the
    /// timer and allocation counters saw. Must not unwind: body panics are
    /// converted into `Measurement::failed`.
    fn execute(&self, body: BenchFn, iterations: u64, gauge: ParallelismGauge) -> Measurement;
}

/// Outcome of a successful run: the result plus an optional leak finding.
///
/// `leak` carries the degree the body left the gauge at when it differs from
/// the requested degree. The result is never suppressed by a leak.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub result: RunResult,
    pub leak: Option<usize>,
}

/// A run that produced no usable result.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    /// The engine reported the run as failed. No measurement fields beyond
    /// the flag are meaningful.
    #[error("{display_name} failed")]
    Failed { display_name: String },
}

/// Drives one isolated benchmark run at a time.
pub struct Coordinator {
    engine: Arc<dyn Engine>,
    gauge: ParallelismGauge,
    pin_core: Option<usize>,
}

impl Coordinator {
    pub fn new(engine: Arc<dyn Engine>, pin_core: Option<usize>) -> Self {
        Self {
            engine,
            gauge: ParallelismGauge::default(),
            pin_core,
        }
    }

    /// The gauge this coordinator sets and audits around every run.
    pub fn gauge(&self) -> &ParallelismGauge {
        &self.gauge
    }

    /// Run `entry` for `iterations` iterations at the given parallelism
    /// degree.
    ///
    /// The body executes on a dedicated blocking thread; awaiting the join
    /// handle suspends the calling front end for the duration of the run,
    /// which is the single-flight discipline expressed in the runtime's own
    /// terms. The returned result's `iterations` always echoes the request.
    pub async fn run(
        &mut self,
        entry: &BenchmarkEntry,
        iterations: u64,
        parallelism: usize,
    ) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let name = display_name(&entry.name, parallelism);
        debug!(
            "run {}: {} for {} iterations at parallelism {}",
            run_id, name, iterations, parallelism
        );

        self.gauge.set(parallelism);

        let engine = Arc::clone(&self.engine);
        let gauge = self.gauge.clone();
        let body = entry.body;
        let pin_core = self.pin_core;

        let handle = task::spawn_blocking(move || {
            if let Some(id) = pin_core {
                if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
                    warn!("could not pin run thread to core {}", id);
                }
            }
            // Comparable heap state for every run: return freed pages to the
            // OS before the engine starts its timer.
            settle_heap();
            engine.execute(body, iterations, gauge)
        });

        // A join error means the engine thread itself tore down, which the
        // engine contract forbids; surface it as a failed run rather than
        // taking the server with it.
        let measurement = match handle.await {
            Ok(m) => m,
            Err(e) => {
                warn!("run {}: engine thread died: {}", run_id, e);
                return Err(RunError::Failed { display_name: name });
            }
        };

        if measurement.failed {
            warn!("run {}: {} failed", run_id, name);
            return Err(RunError::Failed { display_name: name });
        }

        let after = self.gauge.get();
        let leak = (after != parallelism).then_some(after);
        if let Some(degree) = leak {
            warn!("run {}: {} left parallelism set to {}", run_id, name, degree);
        }

        debug!(
            "run {}: {} finished in {:?}",
            run_id, name, measurement.elapsed
        );

        Ok(RunReport {
            result: RunResult {
                iterations,
                elapsed: measurement.elapsed,
                bytes_processed: measurement.bytes_per_iter,
                alloc_count: measurement.alloc_count,
                alloc_bytes: measurement.alloc_bytes,
                report_allocs: measurement.report_allocs,
                failed: false,
            },
            leak,
        })
    }
}

/// Settle the allocator so each run starts from a comparable heap state.
/// There is no collector to cycle; releasing freed pages is the closest
/// equivalent, and only glibc exposes a call for it.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn settle_heap() {
    unsafe {
        libc::malloc_trim(0);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn settle_heap() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Bencher;

    fn noop(_b: &mut Bencher) {}

    /// Returns a fixed measurement without touching the gauge.
    struct ScriptedEngine(Measurement);

    impl Engine for ScriptedEngine {
        fn execute(&self, _body: BenchFn, _iterations: u64, _gauge: ParallelismGauge) -> Measurement {
            self.0.clone()
        }
    }

    /// Leaves the gauge at a different degree than requested.
    struct LeakyEngine;

    impl Engine for LeakyEngine {
        fn execute(&self, _body: BenchFn, iterations: u64, gauge: ParallelismGauge) -> Measurement {
            gauge.set(7);
            Measurement {
                iterations,
                elapsed: Duration::from_millis(1),
                bytes_per_iter: 0,
                alloc_count: 0,
                alloc_bytes: 0,
                report_allocs: false,
                failed: false,
            }
        }
    }

    fn ok_measurement() -> Measurement {
        Measurement {
            iterations: 10,
            elapsed: Duration::from_micros(500),
            bytes_per_iter: 64,
            alloc_count: 20,
            alloc_bytes: 640,
            report_allocs: true,
            failed: false,
        }
    }

    #[tokio::test]
    async fn test_run_echoes_requested_iterations() {
        let mut coordinator = Coordinator::new(Arc::new(ScriptedEngine(ok_measurement())), None);
        let entry = BenchmarkEntry::new("alpha", noop);

        let report = coordinator.run(&entry, 10, 1).await.unwrap();
        assert_eq!(report.result.iterations, 10);
        assert_eq!(report.result.bytes_processed, 64);
        assert!(report.result.report_allocs);
        assert!(!report.result.failed);
        assert_eq!(report.leak, None);
    }

    #[tokio::test]
    async fn test_run_sets_gauge_to_requested_degree() {
        let mut coordinator = Coordinator::new(Arc::new(ScriptedEngine(ok_measurement())), None);
        let entry = BenchmarkEntry::new("alpha", noop);

        coordinator.run(&entry, 10, 3).await.unwrap();
        assert_eq!(coordinator.gauge().get(), 3);
    }

    #[tokio::test]
    async fn test_failed_run_is_a_distinguished_error() {
        let mut failed = ok_measurement();
        failed.failed = true;
        let mut coordinator = Coordinator::new(Arc::new(ScriptedEngine(failed)), None);
        let entry = BenchmarkEntry::new("alpha", noop);

        let err = coordinator.run(&entry, 10, 4).await.unwrap_err();
        assert_eq!(
            err,
            RunError::Failed {
                display_name: "alpha-4".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_leak_is_reported_alongside_the_result() {
        let mut coordinator = Coordinator::new(Arc::new(LeakyEngine), None);
        let entry = BenchmarkEntry::new("alpha", noop);

        let report = coordinator.run(&entry, 10, 2).await.unwrap();
        assert_eq!(report.leak, Some(7));
        assert_eq!(report.result.iterations, 10);
    }

    #[test]
    fn test_gauge_round_trip() {
        let gauge = ParallelismGauge::new(4);
        assert_eq!(gauge.get(), 4);
        gauge.set(1);
        assert_eq!(gauge.get(), 1);

        let shared = gauge.clone();
        shared.set(9);
        assert_eq!(gauge.get(), 9);
    }
}
