use std::collections::VecDeque;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, bounded};
use volley_project::{ProjectTarget, RunSettings};
use volley_report::{
    ExecutionStatus, ProgressReporter, RawExecutionResult, TargetReport, format_duration,
};

const SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on waiting for a reaped child's output to drain. A grandchild
/// that inherited the pipe can hold it open past the child's exit; its output
/// is forfeit.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One in-flight test process.
#[derive(Debug)]
struct Worker {
    target_index: usize,
    child: Child,
    start_time: Instant,
    stdout_rx: Receiver<String>,
    stderr_rx: Receiver<String>,
}

impl Worker {
    fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finalizes the worker into a result. The child must already be reaped;
    /// the reader threads then hit end-of-file and the receives return
    /// promptly.
    fn into_result(self, status: ExecutionStatus) -> RawExecutionResult {
        RawExecutionResult {
            target_index: self.target_index,
            status,
            stdout: self
                .stdout_rx
                .recv_timeout(OUTPUT_DRAIN_TIMEOUT)
                .unwrap_or_default(),
            stderr: self
                .stderr_rx
                .recv_timeout(OUTPUT_DRAIN_TIMEOUT)
                .unwrap_or_default(),
            duration: self.start_time.elapsed(),
        }
    }
}

/// Runs every target's test command with bounded parallelism.
///
/// A single coordinating thread admits targets into a sliding window of at
/// most `parallelism` child processes, polls them with `try_wait`, enforces
/// the per-target timeout, and observes the cancellation channel before each
/// admission and on each sweep. The per-worker reader threads are plumbing:
/// they own nothing but their pipe.
pub struct ExecutionEngine<'a> {
    targets: &'a [ProjectTarget],
    parallelism: usize,
    timeout: Duration,
    retry: u32,
    shutdown: Option<Receiver<()>>,
}

/// Everything the engine learned from one run.
#[derive(Debug)]
pub struct EngineOutput {
    /// Exactly one result per submitted target, in arbitrary completion
    /// order; each is tagged with its `target_index`.
    pub results: Vec<RawExecutionResult>,
    /// Highest number of processes observed in flight at once.
    pub peak_in_flight: usize,
    pub cancelled: bool,
}

impl<'a> ExecutionEngine<'a> {
    #[must_use]
    pub fn new(targets: &'a [ProjectTarget], settings: &RunSettings) -> Self {
        Self {
            targets,
            parallelism: settings.parallelism.max(1),
            timeout: settings.timeout,
            retry: settings.retry,
            shutdown: None,
        }
    }

    /// Installs the cancellation channel. Without one the run can only end
    /// by completing.
    #[must_use]
    pub fn with_shutdown(mut self, receiver: Receiver<()>) -> Self {
        self.shutdown = Some(receiver);
        self
    }

    pub fn run(&self, reporter: &dyn ProgressReporter) -> EngineOutput {
        let mut pending: VecDeque<usize> = (0..self.targets.len()).collect();
        let mut attempts = vec![0u32; self.targets.len()];
        let mut in_flight: Vec<Worker> = Vec::new();
        let mut slots: Vec<Option<RawExecutionResult>> =
            (0..self.targets.len()).map(|_| None).collect();
        let mut peak_in_flight = 0;
        let mut cancelled = false;

        'run: loop {
            // Admission: top up the window, re-checking cancellation before
            // each launch.
            while in_flight.len() < self.parallelism {
                if self.shutdown_requested() {
                    cancelled = true;
                    break 'run;
                }

                let Some(index) = pending.pop_front() else {
                    break;
                };

                let target = &self.targets[index];
                reporter.target_started(target.name());

                match spawn_worker(index, target) {
                    Ok(worker) => {
                        tracing::debug!(
                            project = target.name(),
                            command = %target.command(),
                            "Spawned test process"
                        );
                        in_flight.push(worker);
                    }
                    Err(reason) => {
                        tracing::error!("Failed to launch `{}`: {reason}", target.name());
                        let result = RawExecutionResult::unstarted(
                            index,
                            ExecutionStatus::LaunchFailed { reason },
                        );
                        finish(reporter, target, &mut slots, result);
                    }
                }
            }

            peak_in_flight = peak_in_flight.max(in_flight.len());

            if in_flight.is_empty() && pending.is_empty() {
                break;
            }

            if self.shutdown_requested() {
                cancelled = true;
                break;
            }

            self.sweep(
                &mut in_flight,
                &mut pending,
                &mut attempts,
                &mut slots,
                reporter,
            );

            thread::sleep(SWEEP_INTERVAL);
        }

        if cancelled {
            tracing::info!(
                "Cancellation requested — stopping {} in-flight workers",
                in_flight.len()
            );
            for mut worker in in_flight.drain(..) {
                kill_and_reap(&mut worker.child);
                let index = worker.target_index;
                let result = worker.into_result(ExecutionStatus::Cancelled);
                finish(reporter, &self.targets[index], &mut slots, result);
            }
        }

        // Anything without a result by now was never admitted.
        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    RawExecutionResult::unstarted(index, ExecutionStatus::Cancelled)
                })
            })
            .collect();

        EngineOutput {
            results,
            peak_in_flight,
            cancelled,
        }
    }

    /// One pass over the in-flight set: reap exits, kill overdue processes,
    /// re-admit failed targets that still have retries left.
    fn sweep(
        &self,
        in_flight: &mut Vec<Worker>,
        pending: &mut VecDeque<usize>,
        attempts: &mut [u32],
        slots: &mut [Option<RawExecutionResult>],
        reporter: &dyn ProgressReporter,
    ) {
        let mut i = 0;
        while i < in_flight.len() {
            match in_flight[i].child.try_wait() {
                Ok(Some(status)) => {
                    let worker = in_flight.swap_remove(i);
                    let index = worker.target_index;
                    let code = status.code();

                    if code != Some(0) && attempts[index] < self.retry {
                        attempts[index] += 1;
                        tracing::warn!(
                            "Target `{}` failed (exit {code:?}); retry {} of {}",
                            self.targets[index].name(),
                            attempts[index],
                            self.retry,
                        );
                        // Drain the readers so their threads end; only the
                        // final attempt's output is reported.
                        drop(worker.into_result(ExecutionStatus::Exited { code }));
                        pending.push_back(index);
                    } else {
                        let result = worker.into_result(ExecutionStatus::Exited { code });
                        finish(reporter, &self.targets[index], slots, result);
                    }
                }
                Ok(None) => {
                    if in_flight[i].duration() >= self.timeout {
                        let mut worker = in_flight.swap_remove(i);
                        let index = worker.target_index;
                        tracing::error!(
                            "Target `{}` exceeded its {} timeout; killing",
                            self.targets[index].name(),
                            format_duration(self.timeout),
                        );
                        kill_and_reap(&mut worker.child);
                        let result = worker.into_result(ExecutionStatus::Timeout);
                        finish(reporter, &self.targets[index], slots, result);
                    } else {
                        i += 1;
                    }
                }
                Err(error) => {
                    let mut worker = in_flight.swap_remove(i);
                    let index = worker.target_index;
                    tracing::error!(
                        "Error waiting on `{}`: {error}",
                        self.targets[index].name()
                    );
                    kill_and_reap(&mut worker.child);
                    let result = worker.into_result(ExecutionStatus::LaunchFailed {
                        reason: error.to_string(),
                    });
                    finish(reporter, &self.targets[index], slots, result);
                }
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|receiver| receiver.try_recv().is_ok())
    }
}

fn finish(
    reporter: &dyn ProgressReporter,
    target: &ProjectTarget,
    slots: &mut [Option<RawExecutionResult>],
    result: RawExecutionResult,
) {
    match &result.status {
        ExecutionStatus::Exited { code: Some(0) } => {
            tracing::info!(
                "Target `{}` completed in {}",
                target.name(),
                format_duration(result.duration)
            );
        }
        status => {
            tracing::info!("Target `{}` {}", target.name(), status.label());
        }
    }

    let report = TargetReport::from_raw(target, &result);
    reporter.target_completed(&report);

    let index = result.target_index;
    slots[index] = Some(result);
}

fn spawn_worker(target_index: usize, target: &ProjectTarget) -> Result<Worker, String> {
    let command = target.command();

    let mut cmd = Command::new(command.program());
    cmd.args(command.args())
        .current_dir(target.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|error| launch_failure_reason(command.program(), &error))?;

    let stdout_rx = capture_stream(child.stdout.take());
    let stderr_rx = capture_stream(child.stderr.take());

    Ok(Worker {
        target_index,
        child,
        start_time: Instant::now(),
        stdout_rx,
        stderr_rx,
    })
}

fn launch_failure_reason(program: &str, error: &std::io::Error) -> String {
    if error.kind() == std::io::ErrorKind::NotFound && which::which(program).is_err() {
        format!("`{program}` is not on PATH")
    } else {
        error.to_string()
    }
}

/// Drains a child's pipe on a dedicated thread. Killing the child closes the
/// pipe and unblocks the reader, so the coordinating thread never waits on a
/// full pipe buffer.
fn capture_stream<R: Read + Send + 'static>(stream: Option<R>) -> Receiver<String> {
    let (sender, receiver) = bounded(1);

    match stream {
        Some(mut stream) => {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                let _ = stream.read_to_end(&mut buffer);
                let _ = sender.send(String::from_utf8_lossy(&buffer).into_owned());
            });
        }
        None => {
            let _ = sender.send(String::new());
        }
    }

    receiver
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
