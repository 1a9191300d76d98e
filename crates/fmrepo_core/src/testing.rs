//! Test isolation helpers built on registry overrides.

use crate::context::AppContext;
use crate::error::{FmError, FmResult};
use crate::registry::{OverrideGuard, RepositoryRegistry};
use crate::repository::Repository;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Temporary repository installed as an override.
///
/// Dropping restores the previous registry state, then removes the directory.
pub struct TempRepoOverride<'a> {
    guard: OverrideGuard<'a>,
    dir: Option<TempDir>,
}

impl TempRepoOverride<'_> {
    pub fn repository(&self) -> &Arc<Repository> {
        self.guard.repository()
    }

    pub fn root(&self) -> &Path {
        self.guard.repository().root()
    }

    /// Restores the registry and removes the directory, reporting removal
    /// failures instead of ignoring them.
    pub fn cleanup(mut self) -> FmResult<()> {
        self.guard.release();
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().map_err(|err| FmError::io(path, err))
            }
            None => Ok(()),
        }
    }
}

/// Installs a fresh temporary repository for `role` in `environment`.
pub fn install_temp_repo<'a>(
    registry: &'a RepositoryRegistry,
    role: &str,
    environment: &str,
) -> FmResult<TempRepoOverride<'a>> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("fmrepo-{role}-{environment}-"))
        .tempdir()
        .map_err(|err| FmError::io(std::env::temp_dir(), err))?;
    let repo = Arc::new(Repository::new(dir.path())?);
    Ok(TempRepoOverride {
        guard: registry.install_override(role, environment, repo),
        dir: Some(dir),
    })
}

/// Runs `body` against a temporary repository overriding `role` in the
/// context's environment; the override and directory are gone afterwards.
pub fn with_temp_repo<T>(
    ctx: &AppContext,
    role: &str,
    body: impl FnOnce(&Arc<Repository>) -> T,
) -> FmResult<T> {
    let temp = install_temp_repo(ctx.registry(), role, ctx.environment())?;
    let result = body(temp.repository());
    temp.cleanup()?;
    Ok(result)
}
