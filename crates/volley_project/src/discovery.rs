use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use thiserror::Error;

use crate::framework::Framework;
use crate::metadata::RunSettings;
use crate::target::{ProjectTarget, TestCommand};

/// Directories that never contain a project of their own.
const EXCLUDED_DIRS: &[&str] = &["node_modules", "target", ".git", ".venv", "venv", "__pycache__"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Workspace root `{path}` does not exist or is not a directory")]
    RootNotFound { path: Utf8PathBuf },

    #[error("Failed to read workspace root `{path}`: {source}")]
    Unreadable {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Enumerates runnable test targets under `root`.
///
/// A directory becomes a target when [`Framework::detect`] recognizes a
/// manifest in it. Directories nested inside an already-claimed project are
/// not claimed again, except directly under the workspace root: a monorepo
/// root manifest (pnpm workspace, cargo workspace) does not swallow its
/// members. The root itself only becomes a target when nothing else is
/// found.
///
/// The returned order is the run's canonical order: sorted by path, root
/// first.
pub fn discover_targets(
    root: &Utf8Path,
    settings: &RunSettings,
) -> Result<Vec<ProjectTarget>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    // Probe readability up front so the walker below only has to deal with
    // noise in subtrees.
    std::fs::read_dir(root).map_err(|source| DiscoveryError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut project_dirs = collect_project_dirs(root, settings);
    project_dirs.sort();

    // Drop directories nested under a claimed non-root project.
    let mut claimed: Vec<Utf8PathBuf> = Vec::new();
    for dir in project_dirs {
        if claimed
            .iter()
            .any(|parent| parent != root && dir.starts_with(parent))
        {
            tracing::debug!("Skipping `{dir}`: nested inside an already-claimed project");
            continue;
        }
        claimed.push(dir);
    }

    // A root manifest alongside member projects is workspace plumbing, not a
    // target of its own.
    if claimed.len() > 1 {
        claimed.retain(|dir| dir != root);
    }

    let targets = claimed
        .into_iter()
        .map(|dir| build_target(root, dir, settings))
        .collect::<Vec<_>>();

    tracing::debug!(target_count = targets.len(), "Discovered test targets");

    Ok(targets)
}

fn collect_project_dirs(root: &Utf8Path, settings: &RunSettings) -> Vec<Utf8PathBuf> {
    let walker = WalkBuilder::new(root)
        .standard_filters(settings.respect_ignore_files)
        .filter_entry(|entry| {
            let Some(name) = entry.file_name().to_str() else {
                return false;
            };
            !(entry.file_type().is_some_and(|ft| ft.is_dir()) && EXCLUDED_DIRS.contains(&name))
        })
        .build();

    let mut project_dirs = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                tracing::warn!("Skipping unreadable entry during discovery: {source}");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
            continue;
        }

        let Ok(dir) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
            tracing::warn!(
                "Skipping `{}`: non-Unicode path",
                entry.path().display()
            );
            continue;
        };

        if Framework::detect(&dir).is_some() {
            project_dirs.push(dir);
        }
    }

    project_dirs
}

fn build_target(root: &Utf8Path, dir: Utf8PathBuf, settings: &RunSettings) -> ProjectTarget {
    let name = target_name(root, &dir);
    let framework = Framework::detect(&dir).unwrap_or(Framework::Unknown);

    let options = settings.project_options(&name);

    let command = options
        .and_then(|options| options.command.as_deref())
        .and_then(TestCommand::from_argv)
        .unwrap_or_else(|| framework.default_command());

    let issue = options.and_then(|options| options.issue);

    tracing::debug!(
        project = %name,
        framework = framework.name(),
        %command,
        "Resolved test target"
    );

    ProjectTarget::new(name, dir, command, framework).with_issue(issue)
}

/// A target is named by its path relative to the workspace root; the root
/// itself is named after its directory.
fn target_name(root: &Utf8Path, dir: &Utf8Path) -> String {
    match dir.strip_prefix(root) {
        Ok(relative) if !relative.as_str().is_empty() => relative.as_str().to_string(),
        _ => root
            .file_name()
            .unwrap_or("workspace")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace_with_files(files: &[(&str, &str)]) -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for (path, content) in files {
            let path = root.join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
        }
        (temp, root)
    }

    #[test]
    fn missing_root_is_a_discovery_error() {
        let result = discover_targets(Utf8Path::new("/does/not/exist"), &RunSettings::default());
        assert!(matches!(result, Err(DiscoveryError::RootNotFound { .. })));
    }

    #[test]
    fn empty_workspace_yields_no_targets() {
        let (_temp, root) = workspace_with_files(&[]);
        let targets = discover_targets(&root, &RunSettings::default()).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn discovers_sibling_projects_in_path_order() {
        let (_temp, root) = workspace_with_files(&[
            ("beta/Cargo.toml", "[package]\nname = \"beta\""),
            ("alpha/go.mod", "module alpha"),
        ]);

        let targets = discover_targets(&root, &RunSettings::default()).unwrap();
        let names: Vec<_> = targets.iter().map(ProjectTarget::name).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(targets[0].framework(), Framework::GoTest);
        assert_eq!(targets[1].framework(), Framework::CargoTest);
    }

    #[test]
    fn nested_projects_are_claimed_once() {
        let (_temp, root) = workspace_with_files(&[
            ("app/package.json", r#"{"devDependencies": {"jest": "^29"}}"#),
            (
                "app/packages/inner/package.json",
                r#"{"devDependencies": {"jest": "^29"}}"#,
            ),
        ]);

        let targets = discover_targets(&root, &RunSettings::default()).unwrap();
        let names: Vec<_> = targets.iter().map(ProjectTarget::name).collect();
        assert_eq!(names, ["app"]);
    }

    #[test]
    fn root_manifest_does_not_swallow_members() {
        let (_temp, root) = workspace_with_files(&[
            ("package.json", r#"{"workspaces": ["apps/*"]}"#),
            (
                "apps/web/package.json",
                r#"{"devDependencies": {"vitest": "^1"}}"#,
            ),
        ]);

        let targets = discover_targets(&root, &RunSettings::default()).unwrap();
        let names: Vec<_> = targets.iter().map(ProjectTarget::name).collect();
        assert_eq!(names, ["apps/web"]);
    }

    #[test]
    fn lone_root_project_is_its_own_target() {
        let (_temp, root) = workspace_with_files(&[("Cargo.toml", "[package]\nname = \"solo\"")]);

        let targets = discover_targets(&root, &RunSettings::default()).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].path(), &root);
    }

    #[test]
    fn node_modules_are_never_targets() {
        let (_temp, root) = workspace_with_files(&[
            ("app/package.json", r#"{"devDependencies": {"mocha": "^10"}}"#),
            (
                "app/node_modules/dep/package.json",
                r#"{"devDependencies": {"jest": "^29"}}"#,
            ),
        ]);

        let targets = discover_targets(&root, &RunSettings::default()).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name(), "app");
    }

    #[test]
    fn configured_command_and_issue_override_defaults() {
        let (_temp, root) = workspace_with_files(&[(
            "scraper-app/package.json",
            r#"{"devDependencies": {"jest": "^29"}}"#,
        )]);

        let options = crate::Options::from_toml_str(
            r#"
            [project."scraper-app"]
            command = ["pnpm", "test"]
            issue = 123
            "#,
        )
        .unwrap();

        let targets = discover_targets(&root, &options.to_settings()).unwrap();
        assert_eq!(targets[0].command().to_string(), "pnpm test");
        assert_eq!(targets[0].issue(), Some(123));
    }
}
