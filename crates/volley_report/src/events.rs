use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::summary::{RunSummary, TargetReport};

/// A structured record handed to an external event log after each run and,
/// when fine-grained logging is on, after each per-target completion.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub project: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub const TARGET_COMPLETED: &'static str = "TEST_RUN";
    pub const RUN_COMPLETED: &'static str = "TEST_RUN_COMPLETED";

    #[must_use]
    pub fn target_completed(report: &TargetReport) -> Self {
        Self {
            project: report.name().to_string(),
            kind: Self::TARGET_COMPLETED,
            payload: json!({
                "status": report.status(),
                "results": report.outcome(),
                "duration": report.duration().as_millis() as u64,
            }),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn run_completed(workspace: &str, summary: &RunSummary) -> Self {
        Self {
            project: workspace.to_string(),
            kind: Self::RUN_COMPLETED,
            payload: json!({
                "passed": summary.passed(),
                "totals": summary.totals(),
                "failing": summary.failing_targets(),
                "targets": summary.reports().len(),
                "duration": summary.duration().as_millis() as u64,
            }),
            timestamp: Utc::now(),
        }
    }
}

/// Accepts event records for delivery. Implementations own transport,
/// authentication, and retries; the core only supplies records.
pub trait EventSink {
    fn record(&self, event: &EventRecord);
}

/// The local stand-in for a hosted event log: records go to the tracing
/// output.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &EventRecord) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(target: "volley::events", "{json}"),
            Err(error) => tracing::warn!("Failed to serialize event record: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use camino::Utf8PathBuf;
    use volley_project::{Framework, ProjectTarget, TestCommand};

    use crate::result::{ExecutionStatus, RawExecutionResult};

    use super::*;

    fn summary() -> RunSummary {
        let targets = [ProjectTarget::new(
            "api",
            Utf8PathBuf::from("/ws/api"),
            TestCommand::new("pytest", Vec::new()),
            Framework::Pytest,
        )];
        let results = vec![RawExecutionResult {
            target_index: 0,
            status: ExecutionStatus::Exited { code: Some(0) },
            stdout: "==== 3 passed in 0.2s ====\n".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(250),
        }];
        RunSummary::from_results(&targets, results, Duration::from_millis(300), 1)
    }

    #[test]
    fn target_event_carries_counts_and_duration() {
        let summary = summary();
        let event = EventRecord::target_completed(&summary.reports()[0]);

        assert_eq!(event.project, "api");
        assert_eq!(event.kind, "TEST_RUN");
        assert_eq!(event.payload["results"]["passed"], 3);
        assert_eq!(event.payload["duration"], 250);
    }

    #[test]
    fn run_event_summarizes_the_whole_invocation() {
        let event = EventRecord::run_completed("agent-workspace", &summary());

        assert_eq!(event.project, "agent-workspace");
        assert_eq!(event.kind, "TEST_RUN_COMPLETED");
        assert_eq!(event.payload["passed"], true);
        assert_eq!(event.payload["targets"], 1);
    }

    #[test]
    fn events_serialize_with_the_wire_field_names() {
        let event = EventRecord::run_completed("ws", &summary());
        let json = serde_json::to_value(&event).unwrap();

        assert!(json.get("type").is_some());
        assert!(json.get("timestamp").is_some());
        assert!(json.get("kind").is_none());
    }
}
