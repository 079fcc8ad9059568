use std::collections::HashMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

pub const VOLLEY_CONFIG_FILE_NAME: &str = "volley.toml";

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Raw options as read from `volley.toml`.
///
/// Everything is optional; [`Options::to_settings`] fills in the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Options {
    /// Maximum number of test processes running at once.
    pub parallelism: Option<usize>,

    /// Per-target timeout in seconds.
    pub timeout_seconds: Option<u64>,

    /// How often a target whose tests fail is re-run before its result is
    /// reported.
    pub retry: Option<u32>,

    /// When `false`, discovery walks ignored files too.
    pub respect_ignore_files: Option<bool>,

    /// Per-project overrides, keyed by target name.
    #[serde(default)]
    pub project: HashMap<String, ProjectOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProjectOptions {
    /// Argv-style test command, e.g. `["pnpm", "test"]`.
    pub command: Option<Vec<String>>,

    /// Issue number this project's results are addressed to.
    pub issue: Option<u64>,
}

impl Options {
    pub fn from_toml_str(content: &str) -> Result<Self, VolleyTomlError> {
        toml::from_str(content).map_err(VolleyTomlError)
    }

    /// Resolves raw options into concrete run settings.
    #[must_use]
    pub fn to_settings(&self) -> RunSettings {
        let parallelism = self
            .parallelism
            .unwrap_or_else(|| {
                std::thread::available_parallelism().map_or(1, std::num::NonZero::get)
            })
            .max(1);

        RunSettings {
            parallelism,
            timeout: Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
            retry: self.retry.unwrap_or(0),
            respect_ignore_files: self.respect_ignore_files.unwrap_or(true),
            projects: self.project.clone(),
        }
    }
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub parallelism: usize,
    pub timeout: Duration,
    pub retry: u32,
    pub respect_ignore_files: bool,
    pub projects: HashMap<String, ProjectOptions>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Options::default().to_settings()
    }
}

impl RunSettings {
    #[must_use]
    pub fn project_options(&self, name: &str) -> Option<&ProjectOptions> {
        self.projects.get(name)
    }
}

/// A `volley.toml` configuration file with the options it contains.
#[derive(Debug)]
pub struct ConfigurationFile {
    path: Utf8PathBuf,
    options: Options,
}

impl ConfigurationFile {
    pub fn from_path(path: Utf8PathBuf) -> Result<Self, ConfigurationFileError> {
        let volley_toml_str = std::fs::read_to_string(&path).map_err(|source| {
            ConfigurationFileError::FileReadError {
                source,
                path: path.clone(),
            }
        })?;

        match Options::from_toml_str(&volley_toml_str) {
            Ok(options) => Ok(Self { path, options }),
            Err(error) => Err(ConfigurationFileError::InvalidVolleyToml {
                source: Box::new(error),
                path,
            }),
        }
    }

    /// Loads `volley.toml` from `root` if one exists there.
    pub fn discover(root: &Utf8Path) -> Result<Option<Self>, ConfigurationFileError> {
        let path = root.join(VOLLEY_CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }

        tracing::debug!("Using configuration file at `{path}`");
        Self::from_path(path).map(Some)
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    #[must_use]
    pub fn into_options(self) -> Options {
        self.options
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct VolleyTomlError(toml::de::Error);

#[derive(Debug, Error)]
pub enum ConfigurationFileError {
    #[error("{path} is not a valid `volley.toml`: {source}")]
    InvalidVolleyToml {
        source: Box<VolleyTomlError>,
        path: Utf8PathBuf,
    },
    #[error("Failed to read `{path}`: {source}")]
    FileReadError {
        #[source]
        source: std::io::Error,
        path: Utf8PathBuf,
    },
}
