//! Run-report options.
//!
//! A single [`Options`] value lives in the control state and is replaced
//! wholesale by the `set` / `Set` operations; every later run's formatting
//! step reads it. Runs are strictly serialized, so the value needs no lock.

use serde::{Deserialize, Serialize};

/// Options controlling how run results are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Report memory statistics for every run, even when the benchmark body
    /// did not request them.
    pub benchmem: bool,
}
