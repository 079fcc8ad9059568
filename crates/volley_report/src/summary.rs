use std::time::Duration;

use serde::{Serialize, Serializer};
use volley_parser::{TestOutcome, parse_outcome};
use volley_project::ProjectTarget;

use crate::result::{ExecutionStatus, RawExecutionResult};

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// One target's normalized result within a run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    name: String,
    status: ExecutionStatus,
    outcome: TestOutcome,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    issue: Option<u64>,
}

impl TargetReport {
    /// Normalizes one raw execution result against its originating target.
    #[must_use]
    pub fn from_raw(target: &ProjectTarget, result: &RawExecutionResult) -> Self {
        let outcome = match &result.status {
            ExecutionStatus::Exited { code } => {
                let mut outcome = parse_outcome(target.framework(), &result.combined_output());
                // The process said "failed"; a parse that found nothing must
                // not hide that.
                if *code != Some(0) && outcome.failed == 0 {
                    outcome.failed = 1;
                }
                outcome
            }
            // Nothing ran to completion; the status carries the information
            // and there is no summary to read.
            ExecutionStatus::Timeout
            | ExecutionStatus::LaunchFailed { .. }
            | ExecutionStatus::Cancelled => TestOutcome::default(),
        };

        Self {
            name: target.name().to_string(),
            status: result.status.clone(),
            outcome,
            duration: result.duration,
            issue: target.issue(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn status(&self) -> &ExecutionStatus {
        &self.status
    }

    #[must_use]
    pub const fn outcome(&self) -> &TestOutcome {
        &self.outcome
    }

    /// Wall-clock time the target's process ran.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub const fn issue(&self) -> Option<u64> {
        self.issue
    }

    /// A target counts against the aggregate when its tests failed or its
    /// process never produced a normal exit.
    #[must_use]
    pub const fn is_failing(&self) -> bool {
        self.outcome.failed > 0 || self.status.is_abnormal()
    }
}

/// Merged counts across all targets in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTotals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl OutcomeTotals {
    pub fn merge(&mut self, outcome: &TestOutcome) {
        self.passed += outcome.passed;
        self.failed += outcome.failed;
        self.skipped += outcome.skipped;
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Aggregate report across all targets in one invocation, in discovery
/// order.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    reports: Vec<TargetReport>,
    totals: OutcomeTotals,
    passed: bool,
    cancelled: bool,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    duration: Duration,
    peak_in_flight: usize,
}

impl RunSummary {
    /// Folds raw execution results into the final summary.
    ///
    /// Results may arrive in any completion order; they are canonicalized to
    /// discovery order via their `target_index` tag. Every target submitted
    /// to the engine must be represented exactly once.
    #[must_use]
    pub fn from_results(
        targets: &[ProjectTarget],
        mut results: Vec<RawExecutionResult>,
        duration: Duration,
        peak_in_flight: usize,
    ) -> Self {
        results.sort_by_key(|result| result.target_index);
        debug_assert_eq!(results.len(), targets.len());
        debug_assert!(
            results
                .iter()
                .enumerate()
                .all(|(position, result)| result.target_index == position),
            "one result per submitted target"
        );

        let reports: Vec<TargetReport> = results
            .into_iter()
            .zip(targets)
            .map(|(result, target)| TargetReport::from_raw(target, &result))
            .collect();

        let mut totals = OutcomeTotals::default();
        for report in &reports {
            totals.merge(&report.outcome);
        }

        let passed = reports.iter().all(|report| !report.is_failing());
        let cancelled = reports
            .iter()
            .any(|report| matches!(report.status(), ExecutionStatus::Cancelled));

        Self {
            reports,
            totals,
            passed,
            cancelled,
            duration,
            peak_in_flight,
        }
    }

    #[must_use]
    pub fn reports(&self) -> &[TargetReport] {
        &self.reports
    }

    #[must_use]
    pub const fn totals(&self) -> OutcomeTotals {
        self.totals
    }

    /// Aggregate pass: every target has zero failures and a normal exit.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Whether the run was cut short by the cancellation signal.
    #[must_use]
    pub const fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Records a cancellation that left no per-target trace (a run aborted
    /// before any target was admitted).
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Highest number of processes observed in flight at once.
    #[must_use]
    pub const fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    /// Names of the targets responsible for an aggregate failure; never
    /// hidden from the report.
    #[must_use]
    pub fn failing_targets(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|report| report.is_failing())
            .map(|report| report.name.as_str())
            .collect()
    }
}
