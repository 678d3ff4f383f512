//! Text-mode parsing.
//!
//! Consumes the free-form line stream of a verbose runner invocation and
//! recovers the package/test/benchmark structure from line shapes alone.
//! Every line is classified by the recognizers in [`lines`]; the
//! classification drives a small state machine carrying the current
//! package frame and a stack of open tests keyed by indent depth, which
//! is what attributes output lines to the right (sub)test when several
//! nesting levels are open at once.

use std::collections::BTreeMap;
use std::mem;
use std::time::Duration;

use crate::types::benchmark::Benchmark;
use crate::types::report::{Package, Report};
use crate::types::test::{Test, TestResult};
use crate::Error;

use lines::Line;

/// Parse verbose text output, reading lines synchronously to end of input.
///
/// `package_name` names the trailing package frame when the input carries
/// no package result line, e.g. output from a compiled test binary run
/// directly.
#[cfg(feature = "sync")]
pub fn parse_sync<R: std::io::BufRead>(reader: R, package_name: &str) -> Result<Report, Error> {
    let mut parser = TextParser::new(package_name);
    for line in reader.lines() {
        parser.line(&line?);
    }
    Ok(parser.finish())
}

/// Asynchronous version of [`parse_sync`].
#[cfg(feature = "async")]
pub async fn parse<R: tokio::io::AsyncBufRead + Unpin>(
    reader: R,
    package_name: &str,
) -> Result<Report, Error> {
    use tokio::io::AsyncBufReadExt as _;

    let mut parser = TextParser::new(package_name);
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        parser.line(&line);
    }
    Ok(parser.finish())
}

/// State carried across lines: the report built so far, the current
/// package frame, and the attribution stack of open tests.
#[derive(Debug)]
struct TextParser<'a> {
    default_package: &'a str,
    report: Report,
    tests: Vec<Test>,
    benchmarks: Vec<Benchmark>,
    coverage: Option<String>,
    /// Open tests as (indent depth, index into `tests`), innermost last.
    /// A status line at depth `d` pops everything at depth >= `d` before
    /// pushing itself, so resolution is strictly positional.
    open: Vec<(usize, usize)>,
    /// Captured build output per package, fed by the `# pkg` framing.
    captures: BTreeMap<String, Vec<String>>,
    /// The package whose build output is currently being captured.
    capturing: Option<String>,
}

impl<'a> TextParser<'a> {
    fn new(default_package: &'a str) -> Self {
        Self {
            default_package,
            report: Report::default(),
            tests: Vec::new(),
            benchmarks: Vec::new(),
            coverage: None,
            open: Vec::new(),
            captures: BTreeMap::new(),
            capturing: None,
        }
    }

    fn line(&mut self, raw: &str) {
        match lines::recognize(raw) {
            Line::Benchmark {
                name,
                ns_per_op,
                bytes,
                allocs,
            } => self.benchmarks.push(Benchmark {
                name: name.to_string(),
                duration: per_op(ns_per_op),
                bytes,
                allocs,
            }),
            Line::PackageResult {
                name,
                seconds,
                build_failure,
                coverage,
            } => {
                if let Some(pct) = coverage {
                    self.coverage = Some(pct.to_string());
                }
                if let Some(marker) = build_failure {
                    // The build never produced per-test framing; surface
                    // the captured compiler output as one failing test.
                    let mut test = Test::new(marker);
                    test.result = Some(TestResult::Fail);
                    test.output = self.captures.remove(name).unwrap_or_default();
                    self.tests.push(test);
                }
                let duration = seconds.map(from_secs).unwrap_or_default();
                self.flush(name.to_string(), duration);
            }
            Line::Status {
                indent,
                result,
                name,
                seconds,
            } => {
                let depth = indent_depth(indent);
                while self.open.last().is_some_and(|(d, _)| *d >= depth) {
                    self.open.pop();
                }
                let mut test = Test::new(name);
                test.result = Some(result);
                test.duration = from_secs(seconds);
                test.subtest_indent = indent.to_string();
                self.tests.push(test);
                self.open.push((depth, self.tests.len() - 1));
            }
            Line::Coverage { pct } => self.coverage = Some(pct.to_string()),
            Line::Output { depth, text } => {
                if self.capturing.is_some() {
                    self.capture_line(raw);
                } else if let Some(index) = self.attribution(depth) {
                    self.tests[index].output.push(text.to_string());
                }
            }
            Line::BuildFraming { package } => {
                self.capturing = (!package.is_empty()).then(|| package.to_string());
            }
            Line::Summary => {
                if self.capturing.is_some() {
                    self.capture_line(raw);
                } else {
                    // Close attribution so later chatter is not misfiled.
                    self.open.clear();
                }
            }
            Line::Ambient => {
                if self.capturing.is_some() {
                    self.capture_line(raw);
                } else if let Some(&(_, index)) = self.open.last() {
                    self.tests[index].output.push(raw.to_string());
                }
            }
        }
    }

    /// Append a raw line to the capture buffer of the package under build
    /// framing.
    fn capture_line(&mut self, raw: &str) {
        if let Some(package) = &self.capturing {
            self.captures
                .entry(package.clone())
                .or_default()
                .push(raw.to_string());
        }
    }

    /// The test output at `depth` should attach to: the most recently
    /// pushed open test at exactly that depth, else the innermost one.
    fn attribution(&self, depth: usize) -> Option<usize> {
        self.open
            .iter()
            .rev()
            .find(|(d, _)| *d == depth)
            .or(self.open.last())
            .map(|&(_, index)| index)
    }

    /// Close the current package frame and reset all per-frame state.
    fn flush(&mut self, name: String, duration: Duration) {
        self.report.packages.push(Package {
            name,
            duration,
            tests: mem::take(&mut self.tests),
            benchmarks: mem::take(&mut self.benchmarks),
            coverage_pct: self.coverage.take(),
        });
        self.open.clear();
        self.capturing = None;
    }

    /// End of input: a frame that accumulated results but never saw a
    /// package result line is flushed under the caller-supplied package
    /// name, timed as the sum of its tests.
    fn finish(mut self) -> Report {
        if !self.tests.is_empty() || !self.benchmarks.is_empty() || self.coverage.is_some() {
            let duration = self.tests.iter().map(|test| test.duration).sum();
            self.flush(self.default_package.to_string(), duration);
        }
        self.report
    }
}

fn from_secs(seconds: f64) -> Duration {
    // Negative or non-finite figures collapse to zero.
    Duration::try_from_secs_f64(seconds).unwrap_or_default()
}

/// The ns/op figure as a per-operation duration.
fn per_op(nanos: f64) -> Duration {
    Duration::try_from_secs_f64(nanos / 1e9).unwrap_or_default()
}

/// Nesting depth of a status-line indent: one level per tab or 4-space
/// run.
fn indent_depth(indent: &str) -> usize {
    let spaces = indent.bytes().filter(|b| *b == b' ').count();
    let tabs = indent.len() - spaces;
    tabs + spaces / 4
}

mod lines {
    //! Line-shape recognizers for the verbose text stream.
    //!
    //! Each recognizer is a pure function over one input line and the set
    //! never changes at runtime; all running state lives in the caller.
    //! [`recognize`] dispatches them in precedence order and classifies
    //! every line into a [`Line`], falling back to [`Line::Ambient`].

    use winnow::ascii::{digit1, space1};
    use winnow::combinator::{alt, eof, opt, preceded, repeat, rest, terminated};
    use winnow::token::{take_till, take_until, take_while};
    use winnow::{PResult, Parser};

    use crate::types::test::TestResult;

    /// One recognized line shape.
    #[derive(Debug, Clone, PartialEq)]
    pub(super) enum Line<'s> {
        /// `--- PASS: name (1.23s)`, possibly indented: a terminal result
        /// for the named test. The indent scopes it to a nesting depth.
        Status {
            indent: &'s str,
            result: TestResult,
            name: &'s str,
            seconds: f64,
        },
        /// `coverage: 87.5% of statements`
        Coverage { pct: &'s str },
        /// `ok pkg 1.23s`, `FAIL pkg (cached)`, `FAIL pkg [build failed]`,
        /// with an optional inline coverage clause: closes the package
        /// frame.
        PackageResult {
            name: &'s str,
            seconds: Option<f64>,
            build_failure: Option<&'s str>,
            coverage: Option<&'s str>,
        },
        /// `BenchmarkAdd-8  2000000  150 ns/op  32 B/op  2 allocs/op`
        Benchmark {
            name: &'s str,
            ns_per_op: f64,
            bytes: Option<u64>,
            allocs: Option<u64>,
        },
        /// Indented runner output belonging to the test open at `depth`.
        Output { depth: usize, text: &'s str },
        /// A bare `PASS`/`FAIL`/`SKIP` end-of-run marker.
        Summary,
        /// `# pkg [pkg.test]`: build output capture starts for `pkg`.
        BuildFraming { package: &'s str },
        /// Anything else.
        Ambient,
    }

    /// Classify one line. Precedence mirrors the runner's own output
    /// conventions; shapes that are prefixes of one another (`FAIL` the
    /// summary vs `FAIL pkg ...` the package result) resolve to the more
    /// specific form first.
    pub(super) fn recognize(line: &str) -> Line<'_> {
        let mut input = line;
        alt((
            benchmark,
            package_result,
            status,
            coverage,
            output,
            build_framing,
            summary,
        ))
        .parse_next(&mut input)
        .unwrap_or(Line::Ambient)
    }

    fn result_word(input: &mut &str) -> PResult<TestResult> {
        alt((
            "PASS".value(TestResult::Pass),
            "FAIL".value(TestResult::Fail),
            "SKIP".value(TestResult::Skip),
        ))
        .parse_next(input)
    }

    /// A non-negative number, `12` or `12.34`.
    fn decimal(input: &mut &str) -> PResult<f64> {
        (digit1, opt(('.', digit1)))
            .take()
            .parse_to()
            .parse_next(input)
    }

    /// The decimal percentage figure, without the `%`.
    fn percent<'s>(input: &mut &'s str) -> PResult<&'s str> {
        terminated((digit1, '.', digit1).take(), '%').parse_next(input)
    }

    /// `coverage: NN.N% of statements`, optionally scoped by `in ...`.
    fn coverage_clause<'s>(input: &mut &'s str) -> PResult<&'s str> {
        (
            "coverage:",
            space1,
            percent,
            space1,
            "of",
            space1,
            "statements",
            opt((" in ", take_while(1.., |_: char| true))),
        )
            .map(|(_, _, pct, _, _, _, _, _)| pct)
            .parse_next(input)
    }

    fn status<'s>(input: &mut &'s str) -> PResult<Line<'s>> {
        (
            take_while(0.., (' ', '\t')),
            "--- ",
            result_word,
            ": ",
            take_until(1.., " ("),
            " (",
            decimal,
            alt((" seconds", "s")),
            ')',
        )
            .map(
                |(indent, _, result, _, name, _, seconds, _, _)| Line::Status {
                    indent,
                    result,
                    name,
                    seconds,
                },
            )
            .parse_next(input)
    }

    fn coverage<'s>(input: &mut &'s str) -> PResult<Line<'s>> {
        terminated(coverage_clause, eof)
            .map(|pct| Line::Coverage { pct })
            .parse_next(input)
    }

    /// `[build failed]`, `[setup failed]`, and the like. The brackets are
    /// kept: the marker doubles as the name of the synthesized test.
    fn build_failure<'s>(input: &mut &'s str) -> PResult<&'s str> {
        (
            '[',
            take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
            " failed]",
        )
            .take()
            .parse_next(input)
    }

    fn package_result<'s>(input: &mut &'s str) -> PResult<Line<'s>> {
        (
            alt(("ok", "FAIL")),
            space1,
            take_till(1.., (' ', '\t')),
            space1,
            alt((
                terminated(decimal, 's').map(|seconds| (Some(seconds), None)),
                "(cached)".value((None, None)),
                build_failure.map(|marker| (None, Some(marker))),
            )),
            opt(preceded(space1, coverage_clause)),
            eof,
        )
            .map(
                |(_, _, name, _, (seconds, build_failure), coverage, _)| Line::PackageResult {
                    name,
                    seconds,
                    build_failure,
                    coverage,
                },
            )
            .parse_next(input)
    }

    fn benchmark<'s>(input: &mut &'s str) -> PResult<Line<'s>> {
        (
            ("Benchmark", take_till(1.., (' ', '\t', '-'))).take(),
            // either the `-N` GOMAXPROCS suffix or plain whitespace
            alt((('-', digit1, space1).take(), space1)),
            digit1, // iteration count, validated but not retained
            space1,
            decimal,
            (space1, "ns/op"),
            opt(preceded(
                space1,
                terminated(digit1.parse_to::<u64>(), (space1, "B/op")),
            )),
            opt(preceded(
                space1,
                terminated(digit1.parse_to::<u64>(), (space1, "allocs/op")),
            )),
        )
            .map(
                |(name, _, _, _, ns_per_op, _, bytes, allocs)| Line::Benchmark {
                    name,
                    ns_per_op,
                    bytes,
                    allocs,
                },
            )
            .parse_next(input)
    }

    fn output<'s>(input: &mut &'s str) -> PResult<Line<'s>> {
        (repeat(0.., "    "), '\t', rest)
            .map(|(indents, _, text): (Vec<&str>, _, _)| Line::Output {
                depth: indents.len(),
                text,
            })
            .parse_next(input)
    }

    fn summary<'s>(input: &mut &'s str) -> PResult<Line<'s>> {
        terminated(alt(("PASS", "FAIL", "SKIP")), eof)
            .value(Line::Summary)
            .parse_next(input)
    }

    /// `# pkg [pkg.test]` names the package and its test binary; the bare
    /// `# pkg` form names only the package.
    fn build_framing<'s>(input: &mut &'s str) -> PResult<Line<'s>> {
        preceded("# ", rest)
            .map(|framed| Line::BuildFraming {
                package: framed_package(framed),
            })
            .parse_next(input)
    }

    fn framed_package(framed: &str) -> &str {
        if let Some((name, tail)) = framed.rsplit_once(" [") {
            if let Some(binary) = tail.strip_suffix(']') {
                if !name.is_empty()
                    && !name.contains(['[', ']'])
                    && !binary.is_empty()
                    && !binary.contains(']')
                {
                    return name;
                }
            }
        }
        framed
    }

}
