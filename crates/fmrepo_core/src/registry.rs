//! Role/environment scoped repository registry with restorable overrides.
//!
//! # Responsibility
//! - Resolve one shared `Repository` per `(role, environment)` pair.
//! - Let tests swap a pair's repository and restore it afterwards.
//!
//! # Invariants
//! - Overrides win over cached entries; cached entries are built once and
//!   returned as the same `Arc` until evicted.
//! - One mutex guards bookkeeping only. Directory creation, temp-dir removal
//!   and caller closures always run with the lock released.
//! - A guard restores exactly the two slots it snapshotted. Two guards on the
//!   same key released out of install order leave whatever the last release
//!   wrote (last release wins).

use crate::config::{Config, RepositoryTarget};
use crate::error::{FmError, FmResult};
use crate::repository::Repository;
use log::{debug, info, warn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::TempDir;

type RegistryKey = (String, String);

#[derive(Default)]
struct RegistryState {
    config: Config,
    cache: HashMap<RegistryKey, Arc<Repository>>,
    overrides: HashMap<RegistryKey, Arc<Repository>>,
    temp_dirs: Vec<TempDir>,
    // Bumped by `reset`/`replace_config` so in-flight builds skip caching.
    generation: u64,
}

/// Thread-safe cache of repositories keyed by role and environment.
#[derive(Default)]
pub struct RepositoryRegistry {
    state: Mutex<RegistryState>,
}

impl RepositoryRegistry {
    pub fn new(config: Config) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                config,
                ..RegistryState::default()
            }),
        }
    }

    /// Returns the repository for `(role, environment)`.
    ///
    /// # Errors
    /// - `FmError::Configuration` naming both role and environment when the
    ///   pair has no configured target.
    /// - Filesystem errors while creating a temporary repository.
    pub fn fetch(&self, role: &str, environment: &str) -> FmResult<Arc<Repository>> {
        let key = registry_key(role, environment);

        let (target, generation) = {
            let state = self.lock();
            if let Some(repo) = state.overrides.get(&key) {
                return Ok(Arc::clone(repo));
            }
            if let Some(repo) = state.cache.get(&key) {
                return Ok(Arc::clone(repo));
            }
            let target = state
                .config
                .target(role, environment)
                .cloned()
                .ok_or_else(|| FmError::not_configured(role, environment))?;
            (target, state.generation)
        };

        let (built, temp_dir) = build_repository(target, role, environment)?;

        let mut discarded = None;
        let resolved = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if let Some(repo) = state.overrides.get(&key) {
                discarded = temp_dir;
                Arc::clone(repo)
            } else if state.generation != generation {
                if let Some(dir) = temp_dir {
                    state.temp_dirs.push(dir);
                }
                built
            } else {
                match state.cache.entry(key) {
                    Entry::Occupied(entry) => {
                        discarded = temp_dir;
                        Arc::clone(entry.get())
                    }
                    Entry::Vacant(entry) => {
                        if let Some(dir) = temp_dir {
                            state.temp_dirs.push(dir);
                        }
                        info!(
                            "event=repository_build module=registry status=ok role={} environment={} root={}",
                            role,
                            environment,
                            built.root().display()
                        );
                        Arc::clone(entry.insert(built))
                    }
                }
            }
        };
        drop(discarded);
        Ok(resolved)
    }

    /// Installs `repo` as the override for `(role, environment)`.
    ///
    /// The returned guard restores the previous override and cache slots when
    /// released or dropped.
    pub fn install_override(
        &self,
        role: &str,
        environment: &str,
        repo: Arc<Repository>,
    ) -> OverrideGuard<'_> {
        let key = registry_key(role, environment);
        let (previous_override, previous_cache) = {
            let mut state = self.lock();
            let previous_override = state.overrides.insert(key.clone(), Arc::clone(&repo));
            let previous_cache = state.cache.remove(&key);
            (previous_override, previous_cache)
        };
        debug!(
            "event=override_install module=registry status=ok role={} environment={} root={}",
            role,
            environment,
            repo.root().display()
        );
        OverrideGuard {
            registry: self,
            key,
            installed: repo,
            previous_override,
            previous_cache,
            released: false,
        }
    }

    /// Runs `body` with `repo` installed as the override, restoring the
    /// previous state afterwards (also on panic).
    pub fn with_override<T>(
        &self,
        role: &str,
        environment: &str,
        repo: Arc<Repository>,
        body: impl FnOnce(&Arc<Repository>) -> T,
    ) -> T {
        let guard = self.install_override(role, environment, repo);
        let result = body(guard.repository());
        drop(guard);
        result
    }

    /// Clears every cached and overridden entry and removes temporary
    /// repositories created by this registry.
    pub fn reset(&self) {
        let temp_dirs = {
            let mut state = self.lock();
            state.cache.clear();
            state.overrides.clear();
            state.generation += 1;
            std::mem::take(&mut state.temp_dirs)
        };

        let removed = temp_dirs.len();
        for dir in temp_dirs {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(
                    "event=temp_cleanup module=registry status=error path={} error={}",
                    path.display(),
                    err
                );
            }
        }
        info!(
            "event=registry_reset module=registry status=ok temp_dirs_removed={}",
            removed
        );
    }

    /// Replaces the configuration and drops cached entries built from the old
    /// one. Overrides are kept.
    pub fn replace_config(&self, config: Config) {
        let mut state = self.lock();
        state.config = config;
        state.cache.clear();
        state.generation += 1;
    }

    pub fn config(&self) -> Config {
        self.lock().config.clone()
    }

    fn restore(
        &self,
        key: RegistryKey,
        previous_override: Option<Arc<Repository>>,
        previous_cache: Option<Arc<Repository>>,
    ) {
        let mut state = self.lock();
        state.overrides.remove(&key);
        state.cache.remove(&key);
        if let Some(repo) = previous_override {
            state.overrides.insert(key.clone(), repo);
        }
        if let Some(repo) = previous_cache {
            state.cache.insert(key, repo);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Poisoning is ignored: critical sections are infallible map updates.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped override handle returned by `RepositoryRegistry::install_override`.
#[must_use = "dropping the guard immediately restores the previous repository"]
pub struct OverrideGuard<'a> {
    registry: &'a RepositoryRegistry,
    key: RegistryKey,
    installed: Arc<Repository>,
    previous_override: Option<Arc<Repository>>,
    previous_cache: Option<Arc<Repository>>,
    released: bool,
}

impl OverrideGuard<'_> {
    /// Repository installed by this guard.
    pub fn repository(&self) -> &Arc<Repository> {
        &self.installed
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Restores the snapshotted slots. Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.restore(
            self.key.clone(),
            self.previous_override.take(),
            self.previous_cache.take(),
        );
        debug!(
            "event=override_release module=registry status=ok role={} environment={}",
            self.key.0, self.key.1
        );
    }
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

fn registry_key(role: &str, environment: &str) -> RegistryKey {
    (role.to_string(), environment.to_string())
}

fn build_repository(
    target: RepositoryTarget,
    role: &str,
    environment: &str,
) -> FmResult<(Arc<Repository>, Option<TempDir>)> {
    match target {
        RepositoryTarget::Existing(repo) => Ok((repo, None)),
        RepositoryTarget::Path(root) => Ok((Arc::new(Repository::new(root)?), None)),
        RepositoryTarget::Temporary => {
            let dir = tempfile::Builder::new()
                .prefix(&format!("fmrepo-{role}-{environment}-"))
                .tempdir()
                .map_err(|err| FmError::io(std::env::temp_dir(), err))?;
            let repo = Repository::new(dir.path())?;
            Ok((Arc::new(repo), Some(dir)))
        }
    }
}
