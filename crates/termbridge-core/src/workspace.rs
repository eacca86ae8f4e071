//! Workspace collaborator: maps a request context to a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{User, WorkspaceContext};

/// Trait for the workspace service.
#[async_trait]
pub trait WorkspaceResolver: Send + Sync {
    /// Resolve the workspace root for a context, or `None` when the context
    /// names no workspace (or one the user cannot reach).
    async fn resolve_root(&self, user: &User, ctx: &WorkspaceContext) -> Option<PathBuf>;
}

/// Resolver for contexts that never carry a workspace.
#[derive(Debug, Default, Clone)]
pub struct NoWorkspaces;

#[async_trait]
impl WorkspaceResolver for NoWorkspaces {
    async fn resolve_root(&self, _user: &User, _ctx: &WorkspaceContext) -> Option<PathBuf> {
        None
    }
}

/// Workspaces laid out as `<base>/<user id>/<project id>`.
#[derive(Debug, Clone)]
pub struct DirectoryWorkspaces {
    base: PathBuf,
}

impl DirectoryWorkspaces {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Base directory holding every user's workspaces.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }
}

/// Project ids become a single path component; anything else is rejected.
fn safe_component(raw: &str) -> Option<&str> {
    let ok = !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    ok.then_some(raw)
}

#[async_trait]
impl WorkspaceResolver for DirectoryWorkspaces {
    async fn resolve_root(&self, user: &User, ctx: &WorkspaceContext) -> Option<PathBuf> {
        let project = safe_component(ctx.project_id.as_deref()?)?;
        let user_dir = safe_component(&user.id)?;
        let root = self.base.join(user_dir).join(project);
        let root = std::fs::canonicalize(root).ok()?;
        root.is_dir().then_some(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_existing_project_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("7").join("demo")).unwrap();
        let resolver = DirectoryWorkspaces::new(tmp.path());
        let user = User::new("7", "octo");

        let root = resolver
            .resolve_root(&user, &WorkspaceContext::project("demo"))
            .await
            .unwrap();
        assert!(root.ends_with("7/demo"));
        assert!(root.is_absolute());
    }

    #[tokio::test]
    async fn rejects_missing_and_traversing_projects() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = DirectoryWorkspaces::new(tmp.path());
        let user = User::new("7", "octo");

        for project in ["missing", "..", "../7", "a/b", ""] {
            let ctx = WorkspaceContext::project(project);
            assert!(resolver.resolve_root(&user, &ctx).await.is_none(), "{project}");
        }
        assert!(
            resolver
                .resolve_root(&user, &WorkspaceContext::none())
                .await
                .is_none()
        );
    }
}
