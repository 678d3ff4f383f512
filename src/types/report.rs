//! The normalized report both parser front ends produce.

use std::time::Duration;

use super::benchmark::Benchmark;
use super::test::{Test, TestResult};

/// The test results of a single package run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Package {
    /// The package name; synthesized from a caller-supplied default when
    /// the input never frames one.
    pub name: String,
    /// Total package run time, when reported.
    pub duration: Duration,
    /// Tests in this package, keyed uniquely by name.
    pub tests: Vec<Test>,
    /// Benchmarks in this package.
    pub benchmarks: Vec<Benchmark>,
    /// Statement coverage percentage (e.g. `"87.5"`), when observed.
    pub coverage_pct: Option<String>,
}

/// A collection of package results: the sole artifact handed to a
/// downstream formatter. Built in one forward pass by a single parser
/// invocation and not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Report {
    /// Packages in this report, keyed uniquely by name.
    pub packages: Vec<Package>,
}

impl Report {
    /// The number of failed tests across all packages.
    pub fn failures(&self) -> usize {
        self.packages
            .iter()
            .flat_map(|pkg| &pkg.tests)
            .filter(|test| test.result == Some(TestResult::Fail))
            .count()
    }
}
