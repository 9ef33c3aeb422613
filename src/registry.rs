//! Named benchmark registry.
//!
//! The host process hands its full benchmark set to [`Registry::build`] at
//! startup; after that the set is immutable for the life of the process.
//! Duplicate names are refused at construction so a misconfigured host fails
//! before it starts serving, not on the first unlucky lookup.

use std::collections::HashMap;

use thiserror::Error;

use crate::engine::Bencher;

/// Signature of an executable benchmark body.
///
/// Bodies receive a [`Bencher`] for iteration control and measurement
/// accounting. A plain function pointer keeps entries `Send + Sync` and
/// trivially copyable onto the run thread.
pub type BenchFn = fn(&mut Bencher);

/// A single named benchmark as supplied by the host process.
#[derive(Debug, Clone)]
pub struct BenchmarkEntry {
    /// Unique key used by every lookup and listing operation.
    pub name: String,
    /// The engine-executable body.
    pub body: BenchFn,
}

impl BenchmarkEntry {
    pub fn new(name: impl Into<String>, body: BenchFn) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

/// Errors raised while building a [`Registry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two entries share a name. Duplicate names are a configuration error
    /// in the host, fatal before serving begins.
    #[error("found two benchmarks named {0}")]
    DuplicateName(String),
}

/// The immutable set of benchmarks the server exposes.
#[derive(Debug, Clone)]
pub struct Registry {
    benchmarks: HashMap<String, BenchmarkEntry>,
}

impl Registry {
    /// Build a registry from the host-supplied entries.
    ///
    /// Fails on the first duplicate name; no partial registry is produced.
    pub fn build(entries: impl IntoIterator<Item = BenchmarkEntry>) -> Result<Self, RegistryError> {
        let mut benchmarks = HashMap::new();
        for entry in entries {
            if benchmarks.contains_key(&entry.name) {
                return Err(RegistryError::DuplicateName(entry.name));
            }
            benchmarks.insert(entry.name.clone(), entry);
        }
        Ok(Self { benchmarks })
    }

    /// Exact-match lookup; no prefix or fuzzy matching.
    pub fn lookup(&self, name: &str) -> Option<&BenchmarkEntry> {
        self.benchmarks.get(name)
    }

    /// Registered names in storage order. Order is not part of the protocol;
    /// callers sort when they need stable output.
    pub fn names(&self) -> Vec<String> {
        self.benchmarks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }
}
