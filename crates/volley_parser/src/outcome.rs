use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Normalized counts for one target's test run.
///
/// Produced by [`parse_outcome`](crate::parse_outcome) from captured process
/// output; immutable once produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,

    /// Total coverage percentage, when the output reports one.
    pub coverage: Option<f64>,

    /// The duration the test framework reported for itself. Wall-clock time
    /// is tracked separately by the execution engine.
    pub duration: Option<Duration>,

    /// Set when no known summary format matched the output. All counts are
    /// zero in that case.
    pub parse_failed: bool,
}

impl TestOutcome {
    /// An outcome for output no extractor could read.
    #[must_use]
    pub fn unparsed() -> Self {
        Self {
            parse_failed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_sums_all_counts() {
        let outcome = TestOutcome {
            passed: 5,
            failed: 2,
            skipped: 1,
            ..TestOutcome::default()
        };
        assert_eq!(outcome.total(), 8);
        assert!(!outcome.is_success());
    }

    #[test]
    fn unparsed_outcome_is_zeroed_and_flagged() {
        let outcome = TestOutcome::unparsed();
        assert_eq!(outcome.total(), 0);
        assert!(outcome.parse_failed);
        assert!(outcome.is_success());
    }
}
