use std::time::Duration;

use serde::Serialize;

/// How one target's test process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExecutionStatus {
    /// The process ran to completion on its own. `code` is `None` when the
    /// process was terminated by a signal.
    Exited { code: Option<i32> },

    /// The per-target timeout elapsed and the process was killed.
    Timeout,

    /// The process never started (command not found, permission denied).
    LaunchFailed { reason: String },

    /// The run was cancelled before this target completed.
    Cancelled,
}

impl ExecutionStatus {
    /// Abnormal statuses fail the aggregate regardless of parsed counts.
    #[must_use]
    pub const fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Exited { .. })
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Exited { code: Some(0) } => "ok",
            Self::Exited { .. } => "failed",
            Self::Timeout => "timed out",
            Self::LaunchFailed { .. } => "launch failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Captured output and exit information for one target's process.
///
/// Owned by the execution engine until the run summary takes it over.
/// `target_index` is the target's position in discovery order; completion
/// order carries no meaning downstream.
#[derive(Debug)]
pub struct RawExecutionResult {
    pub target_index: usize,
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl RawExecutionResult {
    /// A result for a target that never ran (cancelled before admission, or
    /// its command could not be spawned).
    #[must_use]
    pub const fn unstarted(target_index: usize, status: ExecutionStatus) -> Self {
        Self {
            target_index,
            status,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    /// Both streams joined for parsing; jest and friends put the summary on
    /// stderr.
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}
