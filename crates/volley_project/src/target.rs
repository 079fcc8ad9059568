use std::fmt;

use camino::Utf8PathBuf;

use crate::framework::Framework;

/// The command invoked to run one target's tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    program: String,
    args: Vec<String>,
}

impl TestCommand {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a command from an argv-style list, as configured in `volley.toml`.
    ///
    /// Returns `None` for an empty list; an empty command is treated as
    /// "use the framework default".
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for TestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// One testable unit discovered under the workspace root.
///
/// Immutable once discovery completes; the runner, parser, and reporter all
/// refer back to the same target by index.
#[derive(Debug, Clone)]
pub struct ProjectTarget {
    name: String,
    path: Utf8PathBuf,
    command: TestCommand,
    framework: Framework,
    issue: Option<u64>,
}

impl ProjectTarget {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        path: Utf8PathBuf,
        command: TestCommand,
        framework: Framework,
    ) -> Self {
        Self {
            name: name.into(),
            path,
            command,
            framework,
            issue: None,
        }
    }

    #[must_use]
    pub fn with_issue(mut self, issue: Option<u64>) -> Self {
        self.issue = issue;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    #[must_use]
    pub fn command(&self) -> &TestCommand {
        &self.command
    }

    #[must_use]
    pub const fn framework(&self) -> Framework {
        self.framework
    }

    /// The issue this target's results should be reported to, if any.
    #[must_use]
    pub const fn issue(&self) -> Option<u64> {
        self.issue
    }
}
