use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use volley_project::{Options, RunSettings};

use crate::logging::Verbosity;

#[derive(Debug, Parser)]
#[command(author, name = "volley", about = "A cross-project test orchestrator.")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Run tests across the workspace's projects.
    Run(RunCommand),

    /// Display volley's version
    Version,
}

#[derive(Debug, Parser)]
pub struct RunCommand {
    /// The workspace root to discover projects under [default: the current directory]
    #[clap(value_name = "PATH")]
    pub(crate) root: Option<Utf8PathBuf>,

    #[clap(flatten)]
    pub(crate) verbosity: Verbosity,

    /// Only run the named projects.
    #[clap(long = "project", value_name = "NAME")]
    pub(crate) projects: Vec<String>,

    /// Run every discovered project. This is the default when no `--project`
    /// filter is given.
    #[clap(long, conflicts_with = "projects")]
    pub(crate) all: bool,

    /// Maximum number of test processes running at once.
    #[clap(long, value_name = "N")]
    pub(crate) parallel: Option<usize>,

    /// Per-project timeout in seconds.
    #[clap(long, value_name = "SECONDS")]
    pub(crate) timeout: Option<u64>,

    /// Re-run a failing project up to N times before reporting it.
    #[clap(long, value_name = "N")]
    pub(crate) retry: Option<u32>,

    /// Render the report as an issue comment addressed to this issue.
    #[clap(long, value_name = "NUMBER")]
    pub(crate) issue: Option<u64>,

    /// Keep watching the workspace and re-run on file changes.
    #[clap(long)]
    pub(crate) watch: bool,

    /// Output format for the run summary.
    #[clap(long, value_enum, value_name = "FORMAT", default_value = "human")]
    pub(crate) output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl RunCommand {
    /// CLI flags override `volley.toml` options.
    pub(crate) fn resolve_settings(&self, options: &Options) -> RunSettings {
        let mut settings = options.to_settings();

        if let Some(parallel) = self.parallel {
            settings.parallelism = parallel.max(1);
        }
        if let Some(timeout) = self.timeout {
            settings.timeout = Duration::from_secs(timeout);
        }
        if let Some(retry) = self.retry {
            settings.retry = retry;
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).unwrap()
    }

    #[test]
    fn run_defaults() {
        let args = parse(&["volley", "run"]);
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert!(run.root.is_none());
        assert!(run.projects.is_empty());
        assert!(!run.watch);
        assert_eq!(run.output_format, OutputFormat::Human);
    }

    #[test]
    fn project_filter_repeats() {
        let args = parse(&["volley", "run", "--project", "web", "--project", "api"]);
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };
        assert_eq!(run.projects, ["web", "api"]);
    }

    #[test]
    fn all_conflicts_with_project_filter() {
        assert!(Args::try_parse_from(["volley", "run", "--all", "--project", "web"]).is_err());
    }

    #[test]
    fn flags_override_file_options() {
        let args = parse(&[
            "volley", "run", "--parallel", "3", "--timeout", "10", "--retry", "1",
        ]);
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };

        let options = Options::from_toml_str("parallelism = 8\ntimeout-seconds = 600").unwrap();
        let settings = run.resolve_settings(&options);
        assert_eq!(settings.parallelism, 3);
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.retry, 1);
    }

    #[test]
    fn file_options_apply_without_flags() {
        let args = parse(&["volley", "run"]);
        let Command::Run(run) = args.command else {
            panic!("expected run command");
        };

        let options = Options::from_toml_str("parallelism = 8").unwrap();
        assert_eq!(run.resolve_settings(&options).parallelism, 8);
    }
}
