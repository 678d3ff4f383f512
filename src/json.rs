//! Event-mode parsing.
//!
//! Consumes the newline-delimited record stream of `go test -json`, one
//! JSON object per line, and accumulates per-(package, test) state until
//! the stream is exhausted. A record that does not decode is a fatal
//! parse error carrying its line number; callers needing resilience must
//! pre-filter their input. Package-level records (empty `Test` field) are
//! discarded, so event-mode reports never populate benchmarks, coverage,
//! or package durations — those stay text-mode-only for now.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::event::{Action, TestEvent};
use crate::types::report::{Package, Report};
use crate::types::test::{Test, TestResult};
use crate::Error;

/// Parse an event stream, reading records synchronously to end of input.
///
/// `package_name` keys tests whose records carry no package name; a
/// non-empty package field in the stream always takes precedence.
#[cfg(feature = "sync")]
pub fn parse_sync<R: std::io::BufRead>(reader: R, package_name: &str) -> Result<Report, Error> {
    let mut tests = Accumulator::new(package_name);
    for (index, line) in reader.lines().enumerate() {
        tests.line(index + 1, &line?)?;
    }
    Ok(tests.finish())
}

/// Asynchronous version of [`parse_sync`].
#[cfg(feature = "async")]
pub async fn parse<R: tokio::io::AsyncBufRead + Unpin>(
    reader: R,
    package_name: &str,
) -> Result<Report, Error> {
    use tokio::io::AsyncBufReadExt as _;

    let mut tests = Accumulator::new(package_name);
    let mut lines = reader.lines();
    let mut number = 0;
    while let Some(line) = lines.next_line().await? {
        number += 1;
        tests.line(number, &line)?;
    }
    Ok(tests.finish())
}

/// Accumulates records keyed by (package, test) and materializes the
/// report once the stream ends. The two-level map is ordered so that
/// finalization emits packages and tests in name order — nothing
/// observable depends on insertion order.
#[derive(Debug)]
struct Accumulator<'a> {
    default_package: &'a str,
    packages: BTreeMap<String, BTreeMap<String, Test>>,
}

impl<'a> Accumulator<'a> {
    fn new(default_package: &'a str) -> Self {
        Self {
            default_package,
            packages: BTreeMap::new(),
        }
    }

    fn line(&mut self, number: usize, line: &str) -> Result<(), Error> {
        let event =
            serde_json::from_str(line).map_err(|err| Error::MalformedRecord(number, err))?;
        self.record(event);
        Ok(())
    }

    /// Fold one record into the per-test state. The test record is created
    /// on first sighting of the (package, test) pair under any action, so
    /// a lone `run` event materializes a test with no result.
    fn record(&mut self, event: TestEvent) {
        if event.test.is_empty() {
            // Not associated with a test.
            return;
        }
        let package = if event.package.is_empty() {
            self.default_package
        } else {
            event.package.as_str()
        };
        let test = self
            .packages
            .entry(package.to_string())
            .or_default()
            .entry(event.test.clone())
            .or_insert_with(|| Test::new(&event.test));

        match event.action {
            Action::Output => test.output.push(event.output),
            Action::Pass => terminal(test, TestResult::Pass, event.elapsed),
            Action::Fail => terminal(test, TestResult::Fail, event.elapsed),
            Action::Skip => terminal(test, TestResult::Skip, event.elapsed),
            _ => {}
        }
    }

    fn finish(self) -> Report {
        let packages = self
            .packages
            .into_iter()
            .map(|(name, tests)| Package {
                name,
                tests: tests.into_values().collect(),
                ..Package::default()
            })
            .collect();
        Report { packages }
    }
}

/// A later terminal action overwrites an earlier one, so duplicate
/// terminal records resolve to the last write.
fn terminal(test: &mut Test, result: TestResult, elapsed: f64) {
    // Negative or non-finite elapsed values collapse to zero.
    test.duration = Duration::try_from_secs_f64(elapsed).unwrap_or_default();
    test.result = Some(result);
}

#[cfg(all(test, feature = "sync"))]
mod tests {
    use std::time::Duration;

    use crate::types::test::TestResult;
    use crate::Error;

    fn parse(stream: &str) -> crate::types::report::Report {
        super::parse_sync(stream.as_bytes(), "").unwrap()
    }

    #[test]
    fn test_single_passing_test() {
        let report = parse(concat!(
            r#"{"Time":"2024-03-01T12:00:00Z","Action":"run","Package":"example.com/demo","Test":"TestFoo"}"#,
            "\n",
            r#"{"Action":"output","Package":"example.com/demo","Test":"TestFoo","Output":"=== RUN   TestFoo\n"}"#,
            "\n",
            r#"{"Action":"pass","Package":"example.com/demo","Test":"TestFoo","Elapsed":0.25}"#,
            "\n",
        ));
        assert_eq!(1, report.packages.len());
        let pkg = &report.packages[0];
        assert_eq!("example.com/demo", pkg.name);
        assert!(pkg.benchmarks.is_empty());
        assert_eq!(None, pkg.coverage_pct);
        let test = &pkg.tests[0];
        assert_eq!("TestFoo", test.name);
        assert_eq!(Some(TestResult::Pass), test.result);
        assert_eq!(Duration::from_millis(250), test.duration);
        assert_eq!(vec!["=== RUN   TestFoo\n".to_string()], test.output);
    }

    #[test]
    fn test_last_terminal_action_wins() {
        let report = parse(concat!(
            r#"{"Action":"pass","Package":"p","Test":"TestFlaky","Elapsed":0.5}"#,
            "\n",
            r#"{"Action":"fail","Package":"p","Test":"TestFlaky","Elapsed":1.5}"#,
            "\n",
        ));
        let test = &report.packages[0].tests[0];
        assert_eq!(Some(TestResult::Fail), test.result);
        assert_eq!(Duration::from_millis(1500), test.duration);
        assert_eq!(1, report.failures());
    }

    #[test]
    fn test_interleaved_output_does_not_cross_contaminate() {
        let report = parse(concat!(
            r#"{"Action":"output","Package":"p","Test":"TestA","Output":"a1\n"}"#,
            "\n",
            r#"{"Action":"output","Package":"p","Test":"TestB","Output":"b1\n"}"#,
            "\n",
            r#"{"Action":"output","Package":"p","Test":"TestA","Output":"a2\n"}"#,
            "\n",
        ));
        let tests = &report.packages[0].tests;
        assert_eq!(vec!["a1\n".to_string(), "a2\n".to_string()], tests[0].output);
        assert_eq!(vec!["b1\n".to_string()], tests[1].output);
    }

    #[test]
    fn test_package_level_records_discarded() {
        let report = parse(concat!(
            r#"{"Action":"start","Package":"p"}"#,
            "\n",
            r#"{"Action":"output","Package":"p","Output":"ok  \tp\t0.01s\n"}"#,
            "\n",
            r#"{"Action":"pass","Package":"p","Elapsed":0.01}"#,
            "\n",
        ));
        assert!(report.packages.is_empty());
    }

    #[test]
    fn test_default_package_name() {
        let report = super::parse_sync(
            concat!(
                r#"{"Action":"pass","Test":"TestBare","Elapsed":0.1}"#,
                "\n",
                r#"{"Action":"skip","Package":"named/pkg","Test":"TestNamed"}"#,
                "\n",
            )
            .as_bytes(),
            "compiled.test",
        )
        .unwrap();
        assert_eq!(2, report.packages.len());
        assert_eq!("compiled.test", report.packages[0].name);
        assert_eq!("named/pkg", report.packages[1].name);
    }

    #[test]
    fn test_run_without_terminal_leaves_result_unset() {
        let report = parse(concat!(
            r#"{"Action":"run","Package":"p","Test":"TestHung"}"#,
            "\n",
        ));
        let test = &report.packages[0].tests[0];
        assert_eq!(None, test.result);
        assert_eq!(Duration::ZERO, test.duration);
        assert!(test.output.is_empty());
        assert_eq!(0, report.failures());
    }

    #[test]
    fn test_unknown_action_ignored() {
        let report = parse(concat!(
            r#"{"Action":"shuffle","Package":"p","Test":"TestA"}"#,
            "\n",
            r#"{"Action":"pass","Package":"p","Test":"TestA","Elapsed":0.0}"#,
            "\n",
        ));
        assert_eq!(
            Some(TestResult::Pass),
            report.packages[0].tests[0].result
        );
    }

    #[test]
    fn test_packages_and_tests_sorted_by_name() {
        let report = parse(concat!(
            r#"{"Action":"pass","Package":"zeta","Test":"TestZ"}"#,
            "\n",
            r#"{"Action":"pass","Package":"alpha","Test":"TestB"}"#,
            "\n",
            r#"{"Action":"pass","Package":"alpha","Test":"TestA"}"#,
            "\n",
        ));
        let names: Vec<&str> = report.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(vec!["alpha", "zeta"], names);
        let tests: Vec<&str> = report.packages[0]
            .tests
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(vec!["TestA", "TestB"], tests);
    }

    #[test]
    fn test_malformed_record_is_fatal_with_line_number() {
        let err = super::parse_sync(
            concat!(
                r#"{"Action":"pass","Package":"p","Test":"TestA"}"#,
                "\n",
                "not json\n",
            )
            .as_bytes(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(2, _)));
    }

    #[test]
    fn test_empty_stream() {
        let report = parse("");
        assert!(report.packages.is_empty());
        assert_eq!(0, report.failures());
    }
}
