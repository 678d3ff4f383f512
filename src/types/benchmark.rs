//! Per-benchmark results.

use std::time::Duration;

/// The results of a single benchmark function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benchmark {
    /// The benchmark name, including the `Benchmark` prefix but without
    /// the `-N` GOMAXPROCS suffix.
    pub name: String,
    /// Time per operation, from the ns/op figure.
    pub duration: Duration,
    /// B/op when the runner reported it; `None` means not reported.
    pub bytes: Option<u64>,
    /// allocs/op when the runner reported it; `None` means not reported.
    pub allocs: Option<u64>,
}
