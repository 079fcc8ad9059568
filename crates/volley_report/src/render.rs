use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use colored::Colorize;

use crate::result::ExecutionStatus;
use crate::summary::{RunSummary, TargetReport};

#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs() < 2 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_millis() / 1000)
    }
}

impl RunSummary {
    /// The human-readable summary block.
    #[must_use]
    pub const fn display(&self) -> DisplayRunSummary<'_> {
        DisplayRunSummary { summary: self }
    }

    /// The markdown comment body for an issue tracker. Returned as data;
    /// posting it is the caller's job.
    #[must_use]
    pub fn to_issue_comment(&self) -> String {
        let totals = self.totals();
        let mut comment = String::from("## Test Results\n\n");

        let status = if self.passed() {
            "✅ PASSING"
        } else {
            "❌ FAILING"
        };
        let _ = writeln!(comment, "**Status:** {status}");
        let _ = writeln!(comment, "**Duration:** {}ms", self.duration().as_millis());
        let _ = writeln!(comment);
        let _ = writeln!(comment, "- Total: {}", totals.total());
        let _ = writeln!(comment, "- Passed: ✅ {}", totals.passed);
        let _ = writeln!(comment, "- Failed: ❌ {}", totals.failed);
        let _ = writeln!(comment, "- Skipped: ⏭️ {}", totals.skipped);

        let failing = self.failing_targets();
        if !failing.is_empty() {
            let _ = writeln!(comment);
            let _ = writeln!(comment, "**Failing projects:**");
            for report in self.reports().iter().filter(|report| report.is_failing()) {
                let detail = match report.status() {
                    ExecutionStatus::Exited { .. } => {
                        format!("{} failed", report.outcome().failed)
                    }
                    status => status.label().to_string(),
                };
                let _ = writeln!(comment, "- `{}` — {detail}", report.name());
            }
        }

        let covered: Vec<&TargetReport> = self
            .reports()
            .iter()
            .filter(|report| report.outcome().coverage.is_some())
            .collect();
        if !covered.is_empty() {
            let _ = writeln!(comment);
            let _ = writeln!(comment, "**Coverage:**");
            for report in covered {
                let coverage = report.outcome().coverage.unwrap_or_default();
                let _ = writeln!(comment, "- `{}`: {coverage}%", report.name());
            }
        }

        comment
    }
}

pub struct DisplayRunSummary<'a> {
    summary: &'a RunSummary,
}

impl fmt::Display for DisplayRunSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in self.summary.reports() {
            write_target_line(f, report)?;
        }

        let failing = self.summary.failing_targets();
        if !failing.is_empty() {
            writeln!(f)?;
            writeln!(f, "failing targets:")?;
            for name in failing {
                writeln!(f, "  {name}")?;
            }
        }

        writeln!(f)?;

        let totals = self.summary.totals();
        write!(f, "test result: ")?;
        if self.summary.passed() {
            write!(f, "{}", "ok".green())?;
        } else {
            write!(f, "{}", "FAILED".red())?;
        }
        writeln!(
            f,
            ". {} passed; {} failed; {} skipped; {} targets; finished in {}",
            totals.passed,
            totals.failed,
            totals.skipped,
            self.summary.reports().len(),
            format_duration(self.summary.duration()),
        )
    }
}

fn write_target_line(f: &mut fmt::Formatter<'_>, report: &TargetReport) -> fmt::Result {
    let label = report.status().label();
    let label = match report.status() {
        ExecutionStatus::Exited { code: Some(0) } => label.green(),
        ExecutionStatus::Cancelled => label.yellow(),
        _ => label.red(),
    };

    write!(f, "{}: {label}", report.name())?;

    match report.status() {
        ExecutionStatus::Exited { .. } | ExecutionStatus::Timeout => {
            let outcome = report.outcome();
            write!(
                f,
                ". {} passed; {} failed; {} skipped",
                outcome.passed, outcome.failed, outcome.skipped
            )?;
            if outcome.parse_failed {
                write!(f, "; output not recognized")?;
            }
            if let Some(coverage) = outcome.coverage {
                write!(f, "; {coverage}% coverage")?;
            }
            write!(f, "; finished in {}", format_duration(report.duration()))?;
        }
        ExecutionStatus::LaunchFailed { reason } => {
            write!(f, ": {reason}")?;
        }
        ExecutionStatus::Cancelled => {}
    }

    writeln!(f)
}
