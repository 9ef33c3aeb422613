//! Run results and report formatting.
//!
//! A [`RunResult`] is produced fresh for every run and returned by value; the
//! same serde record serves the line protocol (as a formatted report line)
//! and the RPC protocol (as a JSON payload), so the two transports can never
//! drift apart on what a run measured.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What one benchmark run measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Iterations executed; always equals the requested count.
    pub iterations: u64,
    /// Wall time spent while the run timer was live.
    pub elapsed: Duration,
    /// Per-iteration byte count declared by the body; 0 means the body
    /// declared none and throughput is omitted from reports.
    pub bytes_processed: u64,
    /// Allocations attributable to the run.
    pub alloc_count: u64,
    pub alloc_bytes: u64,
    /// The body itself asked for allocation figures.
    pub report_allocs: bool,
    pub failed: bool,
}

impl RunResult {
    /// Integer nanoseconds per iteration.
    pub fn ns_per_op(&self) -> u64 {
        if self.iterations == 0 {
            return 0;
        }
        (self.elapsed.as_nanos() / u128::from(self.iterations)) as u64
    }

    /// Throughput in MB/s (1 MB = 1e6 bytes), present only when the body
    /// declared a byte count and the run took measurable time.
    pub fn mb_per_sec(&self) -> Option<f64> {
        if self.bytes_processed == 0 || self.elapsed.is_zero() {
            return None;
        }
        let total_bytes = (self.bytes_processed * self.iterations) as f64;
        Some(total_bytes / 1e6 / self.elapsed.as_secs_f64())
    }

    pub fn allocs_per_op(&self) -> u64 {
        if self.iterations == 0 {
            return 0;
        }
        self.alloc_count / self.iterations
    }

    pub fn bytes_per_op(&self) -> u64 {
        if self.iterations == 0 {
            return 0;
        }
        self.alloc_bytes / self.iterations
    }

    /// Format the tab-separated report line for a successful run.
    ///
    /// Memory statistics appear when the server's `benchmem` option is set or
    /// the run itself requested them.
    pub fn report_line(&self, display_name: &str, benchmem: bool) -> String {
        let mut line = format!(
            "{}\t{}\t{} ns/op",
            display_name,
            self.iterations,
            self.ns_per_op()
        );
        if let Some(throughput) = self.mb_per_sec() {
            line.push_str(&format!("\t{:.2} MB/s", throughput));
        }
        if benchmem || self.report_allocs {
            line.push_str(&format!(
                "\t{} allocs/op\t{} B/op",
                self.allocs_per_op(),
                self.bytes_per_op()
            ));
        }
        line
    }
}

/// A run's display name: the bare benchmark name at parallelism 1, otherwise
/// the name with a `-<parallelism>` suffix.
///
/// The suffix is purely presentational; it is parsed out of line-protocol
/// *request* strings, never out of a stored result.
pub fn display_name(name: &str, parallelism: usize) -> String {
    if parallelism == 1 {
        name.to_string()
    } else {
        format!("{}-{}", name, parallelism)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> RunResult {
        RunResult {
            iterations: 1000,
            elapsed: Duration::from_micros(1520),
            bytes_processed: 0,
            alloc_count: 2000,
            alloc_bytes: 64000,
            report_allocs: false,
            failed: false,
        }
    }

    #[test]
    fn test_display_name_suffix_rule() {
        assert_eq!(display_name("foo", 1), "foo");
        assert_eq!(display_name("foo", 4), "foo-4");
    }

    #[test]
    fn test_report_line_minimal() {
        assert_eq!(result().report_line("foo", false), "foo\t1000\t1520 ns/op");
    }

    #[test]
    fn test_report_line_with_throughput() {
        let mut r = result();
        r.bytes_processed = 20;
        assert_eq!(
            r.report_line("foo", false),
            "foo\t1000\t1520 ns/op\t13.16 MB/s"
        );
    }

    #[test]
    fn test_report_line_benchmem_forces_memory_stats() {
        assert_eq!(
            result().report_line("foo-4", true),
            "foo-4\t1000\t1520 ns/op\t2 allocs/op\t64 B/op"
        );
    }

    #[test]
    fn test_report_line_body_requested_memory_stats() {
        let mut r = result();
        r.report_allocs = true;
        assert!(r.report_line("foo", false).ends_with("2 allocs/op\t64 B/op"));
    }

    #[test]
    fn test_zero_iterations_do_not_divide() {
        let r = RunResult {
            iterations: 0,
            elapsed: Duration::ZERO,
            bytes_processed: 0,
            alloc_count: 0,
            alloc_bytes: 0,
            report_allocs: false,
            failed: false,
        };
        assert_eq!(r.ns_per_op(), 0);
        assert_eq!(r.mb_per_sec(), None);
    }

    #[test]
    fn test_serde_round_trip_preserves_every_field() {
        let mut r = result();
        r.bytes_processed = 20;
        r.report_allocs = true;
        let encoded = serde_json::to_string(&r).unwrap();
        let decoded: RunResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, r);
    }
}
