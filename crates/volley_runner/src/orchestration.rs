use std::time::Instant;

use crossbeam_channel::Receiver;
use volley_project::{ProjectTarget, RunSettings};
use volley_report::{ProgressReporter, RunSummary};

use crate::engine::ExecutionEngine;

/// Runs the full pipeline over the given targets: execute with bounded
/// parallelism, normalize each captured output, and fold everything into a
/// summary canonicalized to discovery order.
pub fn run_suite(
    targets: &[ProjectTarget],
    settings: &RunSettings,
    shutdown: Option<Receiver<()>>,
    reporter: &dyn ProgressReporter,
) -> RunSummary {
    let start_time = Instant::now();

    tracing::info!(
        target_count = targets.len(),
        parallelism = settings.parallelism,
        "Starting test run"
    );

    let mut engine = ExecutionEngine::new(targets, settings);
    if let Some(receiver) = shutdown {
        engine = engine.with_shutdown(receiver);
    }

    let output = engine.run(reporter);

    if output.cancelled {
        tracing::warn!("Run cancelled; reporting partial results");
    }

    let mut summary = RunSummary::from_results(
        targets,
        output.results,
        start_time.elapsed(),
        output.peak_in_flight,
    );
    if output.cancelled {
        summary.mark_cancelled();
    }
    summary
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use camino::Utf8PathBuf;
    use volley_project::{Framework, Options, TestCommand};
    use volley_report::{DummyReporter, ExecutionStatus};

    use super::*;

    fn shell_target(root: &Utf8PathBuf, name: &str, script: &str) -> ProjectTarget {
        ProjectTarget::new(
            name,
            root.clone(),
            TestCommand::new("sh", vec!["-c".to_string(), script.to_string()]),
            Framework::Pytest,
        )
    }

    #[test]
    fn suite_summary_is_in_discovery_order_with_aggregate_verdict() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

        let targets = vec![
            // Completes second but reports first.
            shell_target(
                &root,
                "alpha",
                "sleep 0.2; echo '==== 2 passed in 0.1s ===='",
            ),
            shell_target(&root, "beta", "echo '==== 1 failed, 1 passed in 0.1s ===='; exit 1"),
        ];

        let mut settings = Options::default().to_settings();
        settings.parallelism = 2;
        settings.timeout = Duration::from_secs(30);

        let summary = run_suite(&targets, &settings, None, &DummyReporter);

        let names: Vec<_> = summary
            .reports()
            .iter()
            .map(|report| report.name())
            .collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert!(!summary.passed());
        assert_eq!(summary.failing_targets(), ["beta"]);
        assert_eq!(summary.totals().passed, 3);
        assert_eq!(summary.totals().failed, 1);
        assert!(summary.peak_in_flight() <= 2);
        assert!(matches!(
            summary.reports()[0].status(),
            ExecutionStatus::Exited { code: Some(0) }
        ));
    }
}
