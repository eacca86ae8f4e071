//! Working-directory state for a session.
//!
//! The session cwd is only ever changed by a successful `cd` or by
//! re-derivation, and is always a directory that was verified when it was
//! set. Paths are canonical so containment checks against the workspace
//! root are plain prefix comparisons.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// A `cd` that did not change directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdError {
    #[error("cd: no such file or directory: {0}")]
    NoSuchDirectory(String),
    #[error("cd: {0}: outside of workspace")]
    OutsideWorkspace(String),
}

impl CdError {
    /// Text shown in the output stream.
    #[must_use]
    pub fn message(&self) -> String {
        format!("{self}\n")
    }
}

/// Canonicalize `path` if it names an existing directory.
#[must_use]
pub fn verified_dir(path: &Path) -> Option<PathBuf> {
    let canonical = dunce::canonicalize(path).ok()?;
    canonical.is_dir().then_some(canonical)
}

/// Resolve a `cd` target against the current directory.
///
/// `None` goes to the workspace root, or `home` without one. `~` and `~/x`
/// expand against the same base. With a root, the result must lie inside it.
///
/// # Errors
/// Returns [`CdError`] if the target is missing, not a directory or escapes
/// the workspace.
pub fn resolve_cd(
    cwd: &Path,
    root: Option<&Path>,
    home: Option<&Path>,
    target: Option<&str>,
) -> Result<PathBuf, CdError> {
    let base = root.or(home);
    let candidate = match target {
        None => match base {
            Some(base) => base.to_path_buf(),
            None => return Ok(cwd.to_path_buf()),
        },
        Some(raw) => expand(raw, cwd, base),
    };
    let shown = target.unwrap_or("~");

    let resolved =
        verified_dir(&candidate).ok_or_else(|| CdError::NoSuchDirectory(shown.to_string()))?;

    if let Some(root) = root {
        if !resolved.starts_with(root) {
            return Err(CdError::OutsideWorkspace(shown.to_string()));
        }
    }
    Ok(resolved)
}

fn expand(raw: &str, cwd: &Path, base: Option<&Path>) -> PathBuf {
    let tilde = raw
        .strip_prefix('~')
        .filter(|rest| rest.is_empty() || rest.starts_with(['/', '\\']));
    match (tilde, base) {
        (Some(rest), Some(base)) => base.join(rest.trim_start_matches(['/', '\\'])),
        _ => cwd.join(raw),
    }
}

/// Re-verify a stored cwd before it is used.
///
/// A cwd that vanished, or that lies outside `root`, falls back to the root.
/// Without a root it falls back to `fallback`.
#[must_use]
pub fn rederive(cwd: &Path, root: Option<&Path>, fallback: &Path) -> PathBuf {
    let current = verified_dir(cwd);
    match root {
        Some(root) => current
            .filter(|dir| dir.starts_with(root))
            .unwrap_or_else(|| root.to_path_buf()),
        None => current.unwrap_or_else(|| fallback.to_path_buf()),
    }
}

/// Render a cwd for the prompt: `~` plus the root-relative path with
/// forward slashes, or the absolute path outside a workspace.
#[must_use]
pub fn display_cwd(cwd: &Path, root: Option<&Path>) -> String {
    let Some(relative) = root.and_then(|root| cwd.strip_prefix(root).ok()) else {
        return cwd.display().to_string();
    };
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        "~".to_string()
    } else {
        format!("~/{}", parts.join("/"))
    }
}

/// Starting directory when no workspace applies.
#[must_use]
pub fn default_dir(configured: Option<&Path>) -> PathBuf {
    configured
        .and_then(verified_dir)
        .or_else(|| dirs::home_dir().as_deref().and_then(verified_dir))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Tree {
        _tmp: tempfile::TempDir,
        root: PathBuf,
    }

    fn tree() -> Tree {
        let tmp = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap().join("project");
        std::fs::create_dir_all(root.join("src/deep/er")).unwrap();
        std::fs::write(root.join("README.md"), "hi").unwrap();
        Tree { _tmp: tmp, root }
    }

    #[test]
    fn bare_cd_returns_to_root_from_any_depth() {
        let t = tree();
        let deep = t.root.join("src/deep/er");
        assert_eq!(resolve_cd(&deep, Some(&t.root), None, None), Ok(t.root.clone()));
    }

    #[test]
    fn relative_and_parent_targets() {
        let t = tree();
        let src = resolve_cd(&t.root, Some(&t.root), None, Some("src")).unwrap();
        assert_eq!(src, t.root.join("src"));
        let back = resolve_cd(&src, Some(&t.root), None, Some("..")).unwrap();
        assert_eq!(back, t.root);
    }

    #[test]
    fn parent_of_root_is_refused() {
        let t = tree();
        assert_eq!(
            resolve_cd(&t.root, Some(&t.root), None, Some("..")),
            Err(CdError::OutsideWorkspace("..".into()))
        );
        let outside = t.root.parent().unwrap().to_string_lossy().into_owned();
        assert!(resolve_cd(&t.root, Some(&t.root), None, Some(&outside)).is_err());
    }

    #[test]
    fn missing_or_file_targets_fail_with_shell_text() {
        let t = tree();
        let err = resolve_cd(&t.root, Some(&t.root), None, Some("nope")).unwrap_err();
        assert_eq!(err.message(), "cd: no such file or directory: nope\n");
        assert_eq!(
            resolve_cd(&t.root, Some(&t.root), None, Some("README.md")),
            Err(CdError::NoSuchDirectory("README.md".into()))
        );
    }

    #[test]
    fn tilde_expands_against_root() {
        let t = tree();
        let src = t.root.join("src");
        assert_eq!(resolve_cd(&src, Some(&t.root), None, Some("~")), Ok(t.root.clone()));
        assert_eq!(
            resolve_cd(&t.root, Some(&t.root), None, Some("~/src/deep")),
            Ok(t.root.join("src/deep"))
        );
    }

    #[test]
    fn absolute_targets_inside_root_are_accepted() {
        let t = tree();
        let target = t.root.join("src").to_string_lossy().into_owned();
        assert_eq!(
            resolve_cd(&t.root, Some(&t.root), None, Some(&target)),
            Ok(t.root.join("src"))
        );
    }

    #[test]
    fn without_root_home_is_the_base() {
        let t = tree();
        let src = t.root.join("src");
        assert_eq!(resolve_cd(&src, None, Some(&t.root), None), Ok(t.root.clone()));
        assert_eq!(resolve_cd(&src, None, None, None), Ok(src.clone()));
        let parent = t.root.parent().unwrap().to_path_buf();
        assert_eq!(resolve_cd(&t.root, None, None, Some("..")), Ok(parent));
    }

    #[test]
    fn rederive_resets_stale_or_foreign_cwd() {
        let t = tree();
        let src = t.root.join("src");
        assert_eq!(rederive(&src, Some(&t.root), Path::new("/")), src);

        let gone = t.root.join("gone");
        assert_eq!(rederive(&gone, Some(&t.root), Path::new("/")), t.root);

        let other = t.root.parent().unwrap().to_path_buf();
        assert_eq!(rederive(&other, Some(&src), Path::new("/")), src);
        assert_eq!(rederive(&gone, None, &src), src);
    }

    #[test]
    fn display_is_root_relative() {
        let t = tree();
        assert_eq!(display_cwd(&t.root, Some(&t.root)), "~");
        assert_eq!(display_cwd(&t.root.join("src/deep"), Some(&t.root)), "~/src/deep");
        let outside = t.root.parent().unwrap();
        assert_eq!(display_cwd(outside, Some(&t.root)), outside.display().to_string());
        assert_eq!(display_cwd(&t.root, None), t.root.display().to_string());
    }

    #[test]
    fn default_dir_prefers_configured_directory() {
        let t = tree();
        assert_eq!(default_dir(Some(&t.root)), t.root);
        assert!(default_dir(Some(&t.root.join("missing"))).is_absolute());
    }
}
