use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use volley_project::Framework;

use crate::outcome::TestOutcome;

/// The capability of reading one test framework's textual summary.
///
/// One implementation per recognized framework, plus the caller-side
/// fallback in [`parse_outcome`]: when no extractor matches, the outcome is
/// zeroed and flagged instead of failing the run.
pub trait SummaryExtractor: Sync {
    /// The framework whose summary convention this extractor reads.
    fn framework(&self) -> Framework;

    /// Extracts counts from `text`, or `None` when the convention is absent.
    fn extract(&self, text: &str) -> Option<TestOutcome>;
}

/// Fixed priority order for unhinted extraction.
static EXTRACTORS: &[&dyn SummaryExtractor] = &[
    &CargoExtractor,
    &PytestExtractor,
    &JestExtractor,
    &MochaExtractor,
    &GoExtractor,
];

/// Maps a framework hint and captured output to a normalized outcome.
///
/// Pure and total: the hinted extractor is tried first, then the remaining
/// extractors in priority order, and finally the fallback. Never panics,
/// never errors.
#[must_use]
pub fn parse_outcome(hint: Framework, text: &str) -> TestOutcome {
    let hint = normalize_hint(hint);

    let hinted = EXTRACTORS
        .iter()
        .find(|extractor| extractor.framework() == hint);

    let mut outcome = hinted
        .and_then(|extractor| extractor.extract(text))
        .or_else(|| {
            EXTRACTORS
                .iter()
                .filter(|extractor| extractor.framework() != hint)
                .find_map(|extractor| extractor.extract(text))
        })
        .unwrap_or_else(|| {
            tracing::debug!(
                hint = hint.name(),
                "No summary extractor matched; flagging output as unparsed"
            );
            TestOutcome::unparsed()
        });

    if outcome.coverage.is_none() {
        outcome.coverage = extract_coverage(text);
    }

    outcome
}

/// Vitest prints the same `Tests ...` block as jest; they share an extractor.
const fn normalize_hint(hint: Framework) -> Framework {
    match hint {
        Framework::Vitest => Framework::Jest,
        other => other,
    }
}

struct CargoExtractor;

static CARGO_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"test result: (?:ok|FAILED)\. (\d+) passed; (\d+) failed; (\d+) (?:ignored|skipped)(?:[^\n]*finished in ([0-9.]+)s)?",
    )
    .unwrap()
});

impl SummaryExtractor for CargoExtractor {
    fn framework(&self) -> Framework {
        Framework::CargoTest
    }

    /// `test result: ok. 5 passed; 0 failed; 1 ignored; ...; finished in 0.05s`
    ///
    /// One summary line per test binary; counts are summed across all of
    /// them.
    fn extract(&self, text: &str) -> Option<TestOutcome> {
        let mut outcome = TestOutcome::default();
        let mut total_seconds = 0.0;
        let mut matched = false;

        for captures in CARGO_SUMMARY.captures_iter(text) {
            matched = true;
            outcome.passed += parse_count(captures.get(1)?.as_str());
            outcome.failed += parse_count(captures.get(2)?.as_str());
            outcome.skipped += parse_count(captures.get(3)?.as_str());
            if let Some(seconds) = captures.get(4) {
                total_seconds += seconds.as_str().parse::<f64>().unwrap_or(0.0);
            }
        }

        if !matched {
            return None;
        }

        if total_seconds > 0.0 {
            outcome.duration = Some(Duration::from_secs_f64(total_seconds));
        }

        Some(outcome)
    }
}

struct PytestExtractor;

static PYTEST_SUMMARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^=+ (.+?) in ([0-9.]+)s =+\s*$").unwrap());

static PYTEST_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) (passed|failed|skipped|errors?|xfailed|xpassed)").unwrap());

impl SummaryExtractor for PytestExtractor {
    fn framework(&self) -> Framework {
        Framework::Pytest
    }

    /// `===== 2 failed, 3 passed, 1 skipped in 1.23s =====`
    ///
    /// Collection and setup errors count as failures; `xfailed` is an
    /// expected skip. `no tests ran in 0.01s` parses to all-zero counts.
    fn extract(&self, text: &str) -> Option<TestOutcome> {
        let captures = PYTEST_SUMMARY_LINE.captures(text)?;
        let counts = captures.get(1)?.as_str();
        let seconds = captures.get(2)?.as_str();

        let mut outcome = TestOutcome::default();
        for count in PYTEST_COUNT.captures_iter(counts) {
            let n = parse_count(&count[1]);
            match &count[2] {
                "passed" | "xpassed" => outcome.passed += n,
                "failed" | "error" | "errors" => outcome.failed += n,
                "skipped" | "xfailed" => outcome.skipped += n,
                _ => {}
            }
        }

        outcome.duration = parse_seconds(seconds);

        Some(outcome)
    }
}

struct JestExtractor;

static JEST_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) (passed|failed|skipped|pending|todo)").unwrap());

static JEST_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Time:|Duration)\s*([0-9.]+)\s*(ms|s)").unwrap());

impl SummaryExtractor for JestExtractor {
    fn framework(&self) -> Framework {
        Framework::Jest
    }

    /// jest: `Tests:       1 failed, 5 passed, 6 total`
    /// vitest: `Tests  5 passed | 1 failed (6)`
    ///
    /// The `Test Files` / `Test Suites` lines above it are per-file counts
    /// and are deliberately not read.
    fn extract(&self, text: &str) -> Option<TestOutcome> {
        let line = text.lines().map(str::trim).find(|line| {
            line.strip_prefix("Tests")
                .is_some_and(|rest| rest.starts_with(':') || rest.starts_with(' '))
        })?;

        let mut outcome = TestOutcome::default();
        let mut matched = false;
        for count in JEST_COUNT.captures_iter(line) {
            matched = true;
            let n = parse_count(&count[1]);
            match &count[2] {
                "passed" => outcome.passed += n,
                "failed" => outcome.failed += n,
                "skipped" | "pending" | "todo" => outcome.skipped += n,
                _ => {}
            }
        }

        if !matched {
            return None;
        }

        if let Some(time) = JEST_TIME.captures(text) {
            outcome.duration = parse_unit_duration(&time[1], &time[2]);
        }

        Some(outcome)
    }
}

struct MochaExtractor;

static MOCHA_PASSING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+) passing(?:\s*\(([0-9]+)(ms|s|m)\))?").unwrap());

static MOCHA_FAILING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+) failing").unwrap());

static MOCHA_PENDING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+) pending").unwrap());

impl SummaryExtractor for MochaExtractor {
    fn framework(&self) -> Framework {
        Framework::Mocha
    }

    /// `  5 passing (40ms)` / `  1 failing` / `  2 pending`
    fn extract(&self, text: &str) -> Option<TestOutcome> {
        let passing = MOCHA_PASSING.captures(text)?;

        let mut outcome = TestOutcome {
            passed: parse_count(&passing[1]),
            ..TestOutcome::default()
        };

        if let (Some(value), Some(unit)) = (passing.get(2), passing.get(3)) {
            outcome.duration = parse_unit_duration(value.as_str(), unit.as_str());
        }

        if let Some(failing) = MOCHA_FAILING.captures(text) {
            outcome.failed = parse_count(&failing[1]);
        }

        if let Some(pending) = MOCHA_PENDING.captures(text) {
            outcome.skipped = parse_count(&pending[1]);
        }

        Some(outcome)
    }
}

struct GoExtractor;

static GO_PACKAGE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^ok\s+\S+\s+([0-9.]+)s").unwrap());

impl SummaryExtractor for GoExtractor {
    fn framework(&self) -> Framework {
        Framework::GoTest
    }

    /// Counts `--- PASS:` / `--- FAIL:` / `--- SKIP:` lines from `go test -v`
    /// output. Non-verbose output carries no per-test counts, so it is left
    /// to the fallback.
    fn extract(&self, text: &str) -> Option<TestOutcome> {
        let mut outcome = TestOutcome::default();

        for line in text.lines() {
            let line = line.trim_start();
            if line.starts_with("--- PASS:") {
                outcome.passed += 1;
            } else if line.starts_with("--- FAIL:") {
                outcome.failed += 1;
            } else if line.starts_with("--- SKIP:") {
                outcome.skipped += 1;
            }
        }

        if outcome.total() == 0 {
            return None;
        }

        let total_seconds: f64 = GO_PACKAGE_TIME
            .captures_iter(text)
            .filter_map(|captures| captures[1].parse::<f64>().ok())
            .sum();
        if total_seconds > 0.0 {
            outcome.duration = Some(Duration::from_secs_f64(total_seconds));
        }

        Some(outcome)
    }
}

/// Total-coverage percentage, tried across the common reporters.
static COVERAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // istanbul / jest text summary
        r"All files\s*\|\s*([0-9.]+)",
        // coverage.py
        r"(?m)^TOTAL\s+\d+\s+\d+\s+([0-9.]+)%",
        // go test -cover
        r"coverage: ([0-9.]+)% of statements",
        // cargo tarpaulin
        r"([0-9.]+)% coverage",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

fn extract_coverage(text: &str) -> Option<f64> {
    COVERAGE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|captures| captures[1].parse::<f64>().ok())
            .filter(|percent| (0.0..=100.0).contains(percent))
    })
}

fn parse_count(text: &str) -> usize {
    text.parse().unwrap_or(0)
}

fn parse_seconds(text: &str) -> Option<Duration> {
    let seconds: f64 = text.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

fn parse_unit_duration(value: &str, unit: &str) -> Option<Duration> {
    let value: f64 = value.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let seconds = match unit {
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        _ => value,
    };
    Some(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("40", "ms", 0.04)]
    #[case("2", "s", 2.0)]
    #[case("1", "m", 60.0)]
    fn unit_durations_normalize_to_seconds(
        #[case] value: &str,
        #[case] unit: &str,
        #[case] seconds: f64,
    ) {
        assert_eq!(
            parse_unit_duration(value, unit),
            Some(Duration::from_secs_f64(seconds))
        );
    }

    #[test]
    fn cargo_summary_is_parsed() {
        let output = "\
running 6 tests
test parser::tests::roundtrip ... ok
test result: ok. 5 passed; 0 failed; 1 ignored; 0 measured; 0 filtered out; finished in 0.05s
";
        let outcome = parse_outcome(Framework::CargoTest, output);
        assert_eq!(outcome.passed, 5);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.skipped, 1);
        assert!(!outcome.parse_failed);
        assert_eq!(outcome.duration, Some(Duration::from_secs_f64(0.05)));
    }

    #[test]
    fn cargo_sums_across_test_binaries() {
        let output = "\
test result: ok. 3 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.01s
test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.02s
";
        let outcome = parse_outcome(Framework::CargoTest, output);
        assert_eq!(outcome.passed, 5);
        assert_eq!(outcome.failed, 1);
    }

    #[test]
    fn pytest_summary_is_parsed() {
        let output = "\
========================= 5 passed, 2 skipped in 1.23s =========================
";
        let outcome = parse_outcome(Framework::Pytest, output);
        assert_eq!(outcome.passed, 5);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.duration, Some(Duration::from_secs_f64(1.23)));
    }

    #[test]
    fn pytest_errors_count_as_failures() {
        let output = "==== 1 failed, 3 passed, 2 errors in 0.50s ====\n";
        let outcome = parse_outcome(Framework::Pytest, output);
        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.passed, 3);
    }

    #[test]
    fn pytest_no_tests_ran_is_a_clean_zero() {
        let output = "============== no tests ran in 0.01s ==============\n";
        let outcome = parse_outcome(Framework::Pytest, output);
        assert_eq!(outcome.total(), 0);
        assert!(!outcome.parse_failed);
    }

    #[test]
    fn jest_summary_is_parsed() {
        let output = "\
Test Suites: 1 failed, 3 passed, 4 total
Tests:       2 failed, 1 skipped, 17 passed, 20 total
Time:        2.5 s
";
        let outcome = parse_outcome(Framework::Jest, output);
        assert_eq!(outcome.passed, 17);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.duration, Some(Duration::from_secs_f64(2.5)));
    }

    #[test]
    fn vitest_summary_shares_the_jest_extractor() {
        let output = "\
 Test Files  2 passed (2)
      Tests  8 passed | 1 failed (9)
   Duration  1.2s
";
        let outcome = parse_outcome(Framework::Vitest, output);
        assert_eq!(outcome.passed, 8);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.duration, Some(Duration::from_secs_f64(1.2)));
    }

    #[test]
    fn mocha_summary_is_parsed() {
        let output = "\

  5 passing (40ms)
  1 failing
  2 pending

";
        let outcome = parse_outcome(Framework::Mocha, output);
        assert_eq!(outcome.passed, 5);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.duration, Some(Duration::from_secs_f64(0.04)));
    }

    #[test]
    fn go_verbose_output_is_counted() {
        let output = "\
=== RUN   TestParse
--- PASS: TestParse (0.00s)
=== RUN   TestEncode
--- FAIL: TestEncode (0.01s)
=== RUN   TestSlow
--- SKIP: TestSlow (0.00s)
FAIL
ok  \texample.com/pkg\t0.015s
";
        let outcome = parse_outcome(Framework::GoTest, output);
        assert_eq!(outcome.passed, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn hint_mismatch_falls_back_to_other_extractors() {
        // A jest project whose configured command actually runs pytest.
        let output = "===== 4 passed in 0.30s =====\n";
        let outcome = parse_outcome(Framework::Jest, output);
        assert_eq!(outcome.passed, 4);
        assert!(!outcome.parse_failed);
    }

    #[test]
    fn unrecognized_output_is_flagged_not_fatal() {
        let outcome = parse_outcome(Framework::CargoTest, "Segmentation fault (core dumped)\n");
        assert_eq!(outcome.total(), 0);
        assert!(outcome.parse_failed);
    }

    #[test]
    fn empty_output_is_flagged() {
        assert!(parse_outcome(Framework::Unknown, "").parse_failed);
    }

    #[test]
    fn istanbul_coverage_is_extracted() {
        let output = "\
Tests:       5 passed, 5 total
----------|---------|----------|---------|---------|
File      | % Stmts | % Branch | % Funcs | % Lines |
All files |    85.3 |     70.1 |    90.0 |    85.3 |
";
        let outcome = parse_outcome(Framework::Jest, output);
        assert_eq!(outcome.coverage, Some(85.3));
    }

    #[test]
    fn go_coverage_is_extracted() {
        let output = "\
--- PASS: TestParse (0.00s)
PASS
coverage: 72.5% of statements
ok  \texample.com/pkg\t0.01s
";
        let outcome = parse_outcome(Framework::GoTest, output);
        assert_eq!(outcome.coverage, Some(72.5));
    }

    #[test]
    fn coverage_outside_percent_range_is_ignored() {
        let output = "Tests: 1 passed, 1 total\nAll files | 1085.3 |\n";
        let outcome = parse_outcome(Framework::Jest, output);
        assert_eq!(outcome.coverage, None);
    }
}
