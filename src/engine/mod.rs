//! Measured benchmark execution.
//!
//! This module supplies the [`Engine`](crate::coordinator::Engine)
//! implementation the coordinator treats as a black box: it runs a benchmark
//! body for a fixed iteration count with a live timer and allocation
//! counters, and converts body panics into a failed measurement instead of
//! letting them unwind into the server.
//!
//! Benchmark bodies receive a [`Bencher`] for iteration control, in the shape
//! test-harness benchmarks expect: run the work `n()` times (or through
//! [`Bencher::iter`]), optionally excluding setup with
//! [`Bencher::reset_timer`], declaring throughput with [`Bencher::set_bytes`],
//! or requesting allocation figures with [`Bencher::report_allocs`].

pub mod alloc;

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::coordinator::{Engine, Measurement, ParallelismGauge};
use crate::registry::BenchFn;

/// Per-run handle passed to every benchmark body.
pub struct Bencher {
    n: u64,
    gauge: ParallelismGauge,
    timer_on: bool,
    timer_start: Instant,
    elapsed: Duration,
    allocs_at_start: alloc::AllocSnapshot,
    net_allocs: alloc::AllocSnapshot,
    bytes_per_iter: u64,
    report_allocs: bool,
    failed: bool,
}

impl Bencher {
    fn new(n: u64, gauge: ParallelismGauge) -> Self {
        Self {
            n,
            gauge,
            timer_on: false,
            timer_start: Instant::now(),
            elapsed: Duration::ZERO,
            allocs_at_start: alloc::AllocSnapshot::default(),
            net_allocs: alloc::AllocSnapshot::default(),
            bytes_per_iter: 0,
            report_allocs: false,
            failed: false,
        }
    }

    /// Number of iterations the body must perform.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Run `f` once per requested iteration, keeping the result live so the
    /// optimizer cannot delete the work.
    #[inline]
    pub fn iter<T, F>(&mut self, mut f: F)
    where
        F: FnMut() -> T,
    {
        for _ in 0..self.n {
            std::hint::black_box(f());
        }
    }

    /// Start the run timer if it is stopped. The engine starts it before the
    /// body runs; bodies only need this after an explicit [`stop_timer`].
    ///
    /// [`stop_timer`]: Bencher::stop_timer
    pub fn start_timer(&mut self) {
        if !self.timer_on {
            self.allocs_at_start = alloc::snapshot();
            self.timer_start = Instant::now();
            self.timer_on = true;
        }
    }

    /// Stop the run timer, folding the live interval into the totals.
    pub fn stop_timer(&mut self) {
        if self.timer_on {
            self.elapsed += self.timer_start.elapsed();
            self.net_allocs = self
                .net_allocs
                .add(alloc::snapshot().since(self.allocs_at_start));
            self.timer_on = false;
        }
    }

    /// Discard accumulated time and allocation figures. Bodies call this
    /// after expensive setup they do not want measured.
    pub fn reset_timer(&mut self) {
        if self.timer_on {
            self.allocs_at_start = alloc::snapshot();
            self.timer_start = Instant::now();
        }
        self.elapsed = Duration::ZERO;
        self.net_allocs = alloc::AllocSnapshot::default();
    }

    /// Declare the number of bytes a single iteration processes, enabling
    /// throughput in the run's report.
    pub fn set_bytes(&mut self, n: u64) {
        self.bytes_per_iter = n;
    }

    /// Request allocation figures in this run's report.
    pub fn report_allocs(&mut self) {
        self.report_allocs = true;
    }

    /// Mark the run as failed without panicking.
    pub fn fail(&mut self) {
        self.failed = true;
    }

    /// Current process-wide parallelism degree.
    pub fn parallelism(&self) -> usize {
        self.gauge.get()
    }

    /// Change the process-wide parallelism degree. A body that does this is
    /// expected to restore the old degree before returning; the coordinator
    /// flags the run as leaky if it does not.
    pub fn set_parallelism(&self, degree: usize) {
        self.gauge.set(degree);
    }
}

/// The production engine: wall-clock timer plus counting-allocator deltas.
///
/// Allocation figures are real only when [`alloc::CountingAllocator`] is
/// installed as the global allocator; otherwise they read zero and reports
/// simply show no allocations.
pub struct MeasuredEngine;

impl Engine for MeasuredEngine {
    fn execute(&self, body: BenchFn, iterations: u64, gauge: ParallelismGauge) -> Measurement {
        let mut b = Bencher::new(iterations, gauge);

        b.start_timer();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut b)));
        b.stop_timer();

        if let Err(payload) = outcome {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            warn!("benchmark body panicked: {}", message);
            b.failed = true;
        }

        Measurement {
            iterations,
            elapsed: b.elapsed,
            bytes_per_iter: b.bytes_per_iter,
            alloc_count: b.net_allocs.count,
            alloc_bytes: b.net_allocs.bytes,
            report_allocs: b.report_allocs,
            failed: b.failed,
        }
    }
}
