use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::{ExitCode, Termination};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use colored::Colorize;
use crossbeam_channel::Receiver;
use itertools::Itertools;
use notify::Watcher as _;

use volley_project::{ConfigurationFile, Options, RunSettings, discover_targets};
use volley_report::{
    EventRecord, EventSink, IssueClient, ProgressReporter, RunSummary, TargetReport,
    TracingEventSink,
};
use volley_runner::{run_suite, shutdown_receiver};

use crate::args::{Args, Command, OutputFormat, RunCommand};
use crate::logging::setup_tracing;

mod args;
mod logging;
mod version;

#[must_use]
pub fn volley_main() -> ExitStatus {
    run().unwrap_or_else(|error| {
        use std::io::Write;

        let mut stderr = std::io::stderr().lock();

        writeln!(stderr, "{}", "Volley failed".red().bold()).ok();
        for cause in error.chain() {
            if let Some(ioerr) = cause.downcast_ref::<io::Error>() {
                if ioerr.kind() == io::ErrorKind::BrokenPipe {
                    return ExitStatus::Success;
                }
            }

            writeln!(stderr, "  {} {cause}", "Cause:".bold()).ok();
        }

        ExitStatus::Error
    })
}

fn run() -> Result<ExitStatus> {
    let args = wild::args_os();

    let args = argfile::expand_args_from(args, argfile::parse_fromfile, argfile::PREFIX)
        .context("Failed to read CLI arguments from file")?;

    let args = Args::parse_from(args);

    match args.command {
        Command::Run(run_args) => run_tests(&run_args),
        Command::Version => version().map(|()| ExitStatus::Success),
    }
}

pub(crate) fn version() -> Result<()> {
    let mut stdout = BufWriter::new(io::stdout().lock());
    writeln!(stdout, "volley {}", crate::version::version())?;
    Ok(())
}

pub(crate) fn run_tests(args: &RunCommand) -> Result<ExitStatus> {
    let verbosity = args.verbosity.level();
    setup_tracing(verbosity);

    let cwd = {
        let cwd = std::env::current_dir().context("Failed to get the current working directory")?;
        Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
            anyhow!(
                "The current working directory `{}` contains non-Unicode characters. Volley only supports Unicode paths.",
                path.display()
            )
        })?
    };

    let root = match &args.root {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => cwd.join(path),
        None => cwd,
    };

    let options = ConfigurationFile::discover(&root)?
        .map(ConfigurationFile::into_options)
        .unwrap_or_else(Options::default);

    if args.all {
        tracing::debug!("`--all` given; running every discovered project");
    }

    let context = Arc::new(RunContext {
        workspace_name: root.file_name().unwrap_or("workspace").to_string(),
        settings: args.resolve_settings(&options),
        root,
        projects: args.projects.clone(),
        output_format: args.output_format,
        issue: args.issue,
    });

    if args.watch {
        MainLoop::new(context).watch()
    } else {
        let summary = context.execute(shutdown_receiver())?;
        context.report(&summary)?;

        Ok(if summary.passed() {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        })
    }
}

/// Everything one run needs, shareable with the watch-mode worker thread.
struct RunContext {
    root: Utf8PathBuf,
    workspace_name: String,
    settings: RunSettings,
    projects: Vec<String>,
    output_format: OutputFormat,
    issue: Option<u64>,
}

impl RunContext {
    fn execute(&self, shutdown: Receiver<()>) -> Result<RunSummary> {
        let mut targets = discover_targets(&self.root, &self.settings)?;

        if !self.projects.is_empty() {
            for name in &self.projects {
                if !targets.iter().any(|target| target.name() == *name) {
                    bail!(
                        "No project named `{name}` under `{root}`. Discovered projects: {known}",
                        root = self.root,
                        known = targets.iter().map(|target| target.name()).join(", "),
                    );
                }
            }
            targets.retain(|target| self.projects.iter().any(|name| name == target.name()));
        }

        if targets.is_empty() {
            tracing::warn!("No test targets discovered under `{}`", self.root);
        }

        let sink = TracingEventSink;
        let reporter = EventProgress { sink: &sink };

        Ok(run_suite(
            &targets,
            &self.settings,
            Some(shutdown),
            &reporter,
        ))
    }

    fn report(&self, summary: &RunSummary) -> Result<()> {
        {
            let mut stdout = BufWriter::new(io::stdout().lock());
            match self.output_format {
                OutputFormat::Human => write!(stdout, "{}", summary.display())?,
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut stdout, summary)?;
                    writeln!(stdout)?;
                }
            }
            stdout.flush()?;
        }

        TracingEventSink.record(&EventRecord::run_completed(&self.workspace_name, summary));

        if let Some(issue) = self.issue {
            PrintingIssueClient.post_comment(issue, &summary.to_issue_comment())?;
        }

        Ok(())
    }
}

/// Streams fine-grained completion events to the event sink as targets
/// finish.
struct EventProgress<'a> {
    sink: &'a dyn EventSink,
}

impl ProgressReporter for EventProgress<'_> {
    fn target_started(&self, name: &str) {
        tracing::info!("Running `{name}`");
    }

    fn target_completed(&self, report: &TargetReport) {
        self.sink.record(&EventRecord::target_completed(report));
    }
}

/// Renders the issue comment to stdout. Posting it to a tracker belongs to
/// an external client; volley only supplies the body.
struct PrintingIssueClient;

impl IssueClient for PrintingIssueClient {
    fn post_comment(&self, issue: u64, body: &str) -> Result<()> {
        let mut stdout = BufWriter::new(io::stdout().lock());
        writeln!(stdout, "\nComment for issue #{issue}:\n")?;
        write!(stdout, "{body}")?;
        Ok(())
    }
}

#[derive(Copy, Clone)]
pub enum ExitStatus {
    /// The run completed and every project passed.
    Success = 0,

    /// The run completed but some projects failed.
    Failure = 1,

    /// The run itself failed.
    Error = 2,
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

impl ExitStatus {
    #[must_use]
    pub const fn to_i32(self) -> i32 {
        self as i32
    }
}

struct MainLoop {
    sender: crossbeam_channel::Sender<MainLoopMessage>,
    receiver: crossbeam_channel::Receiver<MainLoopMessage>,
    watcher: Option<notify::RecommendedWatcher>,
    context: Arc<RunContext>,
}

impl MainLoop {
    fn new(context: Arc<RunContext>) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(10);

        Self {
            sender,
            receiver,
            watcher: None,
            context,
        }
    }

    fn watch(mut self) -> Result<ExitStatus> {
        let startup_time = Instant::now();
        let sender = self.sender.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                // Ignore events in the first 500ms after startup
                if startup_time.elapsed() > Duration::from_millis(500) {
                    let is_source_change = event.paths.iter().any(|path| !is_generated_path(path));

                    if is_source_change {
                        match event.kind {
                            notify::EventKind::Modify(notify::event::ModifyKind::Data(_))
                            | notify::EventKind::Create(_)
                            | notify::EventKind::Remove(_) => {
                                sender.send(MainLoopMessage::ApplyChanges).unwrap();
                            }
                            _ => {}
                        }
                    }
                }
            }
        })?;

        watcher.watch(
            self.context.root.as_std_path(),
            notify::RecursiveMode::Recursive,
        )?;

        self.watcher = Some(watcher);
        self.sender.send(MainLoopMessage::RunWorkspace).unwrap();
        self.run_loop()
    }

    fn run_loop(self) -> Result<ExitStatus> {
        let mut revision = 0u64;
        let mut debounce_id = 0u64;

        while let Ok(message) = self.receiver.recv() {
            match message {
                MainLoopMessage::RunWorkspace => {
                    let context = Arc::clone(&self.context);
                    let sender = self.sender.clone();
                    let current_revision = revision;

                    std::thread::spawn(move || {
                        let outcome = context
                            .execute(shutdown_receiver())
                            .and_then(|summary| {
                                context.report(&summary)?;
                                Ok(summary)
                            });

                        let message = match outcome {
                            Ok(summary) => MainLoopMessage::RunCompleted {
                                passed: summary.passed(),
                                cancelled: summary.was_cancelled(),
                                revision: current_revision,
                            },
                            Err(error) => {
                                tracing::error!("Run failed: {error:#}");
                                MainLoopMessage::RunCompleted {
                                    passed: false,
                                    cancelled: false,
                                    revision: current_revision,
                                }
                            }
                        };

                        sender.send(message).unwrap();
                    });
                }

                MainLoopMessage::RunCompleted {
                    passed,
                    cancelled,
                    revision: completed_revision,
                } => {
                    if completed_revision == revision {
                        if cancelled {
                            return Ok(ExitStatus::Success);
                        }

                        let mut stdout = BufWriter::new(io::stdout().lock());
                        if passed {
                            writeln!(
                                stdout,
                                "{}",
                                "All projects passing. Watching for changes...".green().bold()
                            )?;
                        } else {
                            writeln!(
                                stdout,
                                "{}",
                                "Failures detected. Watching for changes...".red().bold()
                            )?;
                        }
                    }
                }

                MainLoopMessage::ApplyChanges => {
                    debounce_id += 1;
                    let current_debounce_id = debounce_id;
                    let sender = self.sender.clone();

                    std::thread::spawn(move || {
                        std::thread::sleep(Duration::from_millis(200));
                        sender
                            .send(MainLoopMessage::DebouncedRun {
                                debounce_id: current_debounce_id,
                            })
                            .unwrap();
                    });
                }

                MainLoopMessage::DebouncedRun {
                    debounce_id: msg_debounce_id,
                } => {
                    if msg_debounce_id == debounce_id {
                        revision += 1;
                        self.sender.send(MainLoopMessage::RunWorkspace).unwrap();
                    }
                }
            }
        }

        Ok(ExitStatus::Success)
    }
}

/// Build output and VCS internals churn on every run; changes there must not
/// re-trigger one.
fn is_generated_path(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(
            component.as_os_str().to_str(),
            Some("node_modules" | "target" | ".git" | "__pycache__" | ".venv" | "venv")
        )
    })
}

#[derive(Debug)]
enum MainLoopMessage {
    RunWorkspace,
    RunCompleted {
        passed: bool,
        cancelled: bool,
        revision: u64,
    },
    ApplyChanges,
    DebouncedRun {
        debounce_id: u64,
    },
}
