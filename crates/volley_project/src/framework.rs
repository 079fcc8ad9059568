use camino::Utf8Path;

use crate::target::TestCommand;

/// Test frameworks volley knows how to invoke and whose output it can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framework {
    CargoTest,
    Pytest,
    Jest,
    Vitest,
    Mocha,
    GoTest,
    /// Manifest found but the framework could not be identified. The target
    /// still runs if a command is configured; its output goes through the
    /// fallback parser.
    Unknown,
}

impl Framework {
    /// Detects the framework from manifest files in `dir`.
    ///
    /// Returns `None` if `dir` contains no recognized manifest at all, in
    /// which case it is not a project.
    #[must_use]
    pub fn detect(dir: &Utf8Path) -> Option<Self> {
        if dir.join("Cargo.toml").is_file() {
            return Some(Self::CargoTest);
        }

        if dir.join("go.mod").is_file() {
            return Some(Self::GoTest);
        }

        if dir.join("package.json").is_file() {
            return Some(Self::detect_js(dir));
        }

        if dir.join("pytest.ini").is_file() || dir.join("conftest.py").is_file() {
            return Some(Self::Pytest);
        }

        if dir.join("pyproject.toml").is_file() {
            let uses_pytest = std::fs::read_to_string(dir.join("pyproject.toml"))
                .is_ok_and(|content| content.contains("[tool.pytest"));
            return Some(if uses_pytest {
                Self::Pytest
            } else {
                Self::Unknown
            });
        }

        None
    }

    /// Picks the JavaScript test runner from `package.json` contents.
    ///
    /// A plain substring check is enough here: a dependency entry and a test
    /// script both mention the runner by name.
    fn detect_js(dir: &Utf8Path) -> Self {
        let Ok(content) = std::fs::read_to_string(dir.join("package.json")) else {
            return Self::Unknown;
        };

        if content.contains("vitest") {
            Self::Vitest
        } else if content.contains("jest") {
            Self::Jest
        } else if content.contains("mocha") {
            Self::Mocha
        } else {
            Self::Unknown
        }
    }

    /// The command used to run this framework's tests when no command is
    /// configured for the target.
    #[must_use]
    pub fn default_command(self) -> TestCommand {
        match self {
            Self::CargoTest => TestCommand::new(
                "cargo",
                vec!["test".to_string(), "--no-fail-fast".to_string()],
            ),
            Self::Pytest => TestCommand::new("pytest", vec!["--tb=short".to_string()]),
            Self::Jest => TestCommand::new(
                "npx",
                vec!["jest".to_string(), "--passWithNoTests".to_string()],
            ),
            Self::Vitest => TestCommand::new("npx", vec!["vitest".to_string(), "run".to_string()]),
            Self::Mocha => TestCommand::new("npx", vec!["mocha".to_string()]),
            // -v so the output carries per-test lines the parser can count
            Self::GoTest => TestCommand::new(
                "go",
                vec!["test".to_string(), "-v".to_string(), "./...".to_string()],
            ),
            Self::Unknown => TestCommand::new("npm", vec!["test".to_string()]),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CargoTest => "cargo test",
            Self::Pytest => "pytest",
            Self::Jest => "jest",
            Self::Vitest => "vitest",
            Self::Mocha => "mocha",
            Self::GoTest => "go test",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn dir_with_files(files: &[(&str, &str)]) -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for (name, content) in files {
            std::fs::write(path.join(name), content).unwrap();
        }
        (temp, path)
    }

    #[test]
    fn detects_cargo_from_manifest() {
        let (_temp, dir) = dir_with_files(&[("Cargo.toml", "[package]\nname = \"x\"")]);
        assert_eq!(Framework::detect(&dir), Some(Framework::CargoTest));
    }

    #[test]
    fn detects_vitest_before_jest() {
        let (_temp, dir) = dir_with_files(&[(
            "package.json",
            r#"{"devDependencies": {"vitest": "^1.0", "jest": "^29"}}"#,
        )]);
        assert_eq!(Framework::detect(&dir), Some(Framework::Vitest));
    }

    #[test]
    fn detects_pytest_from_pyproject_tool_section() {
        let (_temp, dir) = dir_with_files(&[("pyproject.toml", "[tool.pytest.ini_options]\n")]);
        assert_eq!(Framework::detect(&dir), Some(Framework::Pytest));
    }

    #[test]
    fn pyproject_without_pytest_is_unknown() {
        let (_temp, dir) = dir_with_files(&[("pyproject.toml", "[project]\nname = \"x\"\n")]);
        assert_eq!(Framework::detect(&dir), Some(Framework::Unknown));
    }

    #[test]
    fn empty_directory_is_not_a_project() {
        let (_temp, dir) = dir_with_files(&[]);
        assert_eq!(Framework::detect(&dir), None);
    }
}
