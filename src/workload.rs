//! Built-in benchmark workload.
//!
//! A handful of small, real benchmark bodies registered by the binary so the
//! server is usable out of the box, plus the pass-through mode that runs all
//! of them once when the process is started without `--serve`.

use std::collections::HashMap;

use anyhow::Result;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::Bencher;
use crate::registry::BenchmarkEntry;
use crate::server::{ControlError, ControlState, RunRequest};

/// Payload size used by the byte-oriented bodies.
const PAYLOAD_LEN: usize = 4096;

/// The benchmark set the binary registers at startup.
pub fn builtin_benchmarks() -> Vec<BenchmarkEntry> {
    vec![
        BenchmarkEntry::new("sum_bytes", sum_bytes),
        BenchmarkEntry::new("hash_churn", hash_churn),
        BenchmarkEntry::new("json_roundtrip", json_roundtrip),
    ]
}

/// Sum a random payload. Declares throughput, allocates nothing per
/// iteration.
fn sum_bytes(b: &mut Bencher) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let payload: Vec<u8> = (0..PAYLOAD_LEN).map(|_| rng.gen()).collect();

    b.set_bytes(PAYLOAD_LEN as u64);
    b.reset_timer();
    b.iter(|| payload.iter().map(|&x| u64::from(x)).sum::<u64>());
}

/// Build and drop a small map every iteration. Requests allocation figures,
/// since churn is the point.
fn hash_churn(b: &mut Bencher) {
    b.report_allocs();
    b.iter(|| {
        let mut map = HashMap::new();
        for i in 0..64u64 {
            map.insert(i, i.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        }
        map
    });
}

#[derive(Serialize, Deserialize)]
struct Record {
    id: u64,
    name: String,
    values: Vec<f64>,
}

/// Encode and decode a small record through serde_json.
fn json_roundtrip(b: &mut Bencher) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let record = Record {
        id: rng.gen(),
        name: "json_roundtrip".to_string(),
        values: (0..16).map(|_| rng.gen()).collect(),
    };
    let encoded_len = serde_json::to_vec(&record).map(|v| v.len()).unwrap_or(0);

    b.set_bytes(encoded_len as u64);
    b.reset_timer();
    b.iter(|| {
        let encoded = serde_json::to_vec(&record).unwrap();
        let decoded: Record = serde_json::from_slice(&encoded).unwrap();
        decoded
    });
}

/// Pass-through mode: run every registered benchmark once at the given
/// iteration count and print the usual report lines to stdout.
pub async fn pass_through(state: &mut ControlState, iterations: u64) -> Result<()> {
    let mut names = state.list();
    names.sort();
    info!(
        "pass-through: running {} benchmarks for {} iterations each",
        names.len(),
        iterations
    );

    for name in names {
        let request = RunRequest {
            name,
            parallelism: 1,
            iterations,
        };
        match state.run(&request).await {
            Ok(outcome) => {
                let benchmem = state.options().benchmem;
                println!("{}", outcome.result.report_line(&outcome.display_name, benchmem));
            }
            Err(ControlError::Failed { display_name }) => {
                eprintln!("--- FAIL: {}", display_name);
            }
            // Requests are built from the registry itself; any other error
            // is a bug worth stopping on.
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
