//! Static repository configuration and environment resolution.
//!
//! # Responsibility
//! - Map `role -> environment -> target` for the repository registry.
//! - Load and merge that mapping from YAML files.
//! - Pick the active environment from process variables.
//!
//! # Invariants
//! - Loading merges into existing entries; a missing file changes nothing.
//! - Targets in YAML must be strings; `<tmp>` requests a throwaway directory.

use crate::document::value_kind;
use crate::error::{FmError, FmResult};
use crate::repository::Repository;
use log::info;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// YAML sentinel requesting a temporary-directory repository.
pub const TEMPORARY_TARGET: &str = "<tmp>";
/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".fmrepo.yml";
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Environment variables consulted in priority order.
const ENVIRONMENT_VARIABLES: [&str; 4] = ["FMREPO_ENV", "JEKYLL_ENV", "RACK_ENV", "RAILS_ENV"];

/// Where a role's repository lives in one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryTarget {
    /// Use this repository instance as-is.
    Existing(Arc<Repository>),
    /// Open a repository rooted at this directory.
    Path(PathBuf),
    /// Create a fresh temporary directory, removed on registry reset.
    Temporary,
}

impl From<&str> for RepositoryTarget {
    fn from(value: &str) -> Self {
        if value == TEMPORARY_TARGET {
            Self::Temporary
        } else {
            Self::Path(PathBuf::from(value))
        }
    }
}

impl From<String> for RepositoryTarget {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<PathBuf> for RepositoryTarget {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for RepositoryTarget {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Arc<Repository>> for RepositoryTarget {
    fn from(value: Arc<Repository>) -> Self {
        Self::Existing(value)
    }
}

impl From<Repository> for RepositoryTarget {
    fn from(value: Repository) -> Self {
        Self::Existing(Arc::new(value))
    }
}

#[derive(Deserialize)]
#[serde(transparent)]
struct ConfigFile(BTreeMap<String, Option<BTreeMap<String, Value>>>);

/// Role -> environment -> target mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    repositories: BTreeMap<String, BTreeMap<String, RepositoryTarget>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(
        mut self,
        role: impl Into<String>,
        environment: impl Into<String>,
        target: impl Into<RepositoryTarget>,
    ) -> Self {
        self.set(role, environment, target);
        self
    }

    pub fn set(
        &mut self,
        role: impl Into<String>,
        environment: impl Into<String>,
        target: impl Into<RepositoryTarget>,
    ) -> &mut Self {
        self.repositories
            .entry(role.into())
            .or_default()
            .insert(environment.into(), target.into());
        self
    }

    pub fn target(&self, role: &str, environment: &str) -> Option<&RepositoryTarget> {
        self.repositories.get(role)?.get(environment)
    }

    pub fn environments(&self, role: &str) -> Option<&BTreeMap<String, RepositoryTarget>> {
        self.repositories.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.repositories.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Merges the YAML file at `path`. A missing file is ignored.
    ///
    /// # Errors
    /// - `FmError::Configuration` for unreadable YAML or non-string targets.
    /// - `FmError::Io` when the file exists but cannot be read.
    pub fn load_yaml(&mut self, path: impl AsRef<Path>) -> FmResult<&mut Self> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(self),
            Err(err) => return Err(FmError::io(path, err)),
        };
        self.merge_yaml(&text, &path.display().to_string())?;
        info!(
            "event=config_load module=config status=ok path={} roles={}",
            path.display(),
            self.repositories.len()
        );
        Ok(self)
    }

    /// Merges YAML text; `origin` names the source in error messages.
    pub fn merge_yaml(&mut self, text: &str, origin: &str) -> FmResult<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let file: Option<ConfigFile> = serde_yaml::from_str(text).map_err(|err| {
            FmError::Configuration(format!(
                "failed to parse YAML configuration file {origin}: {err}"
            ))
        })?;
        let Some(ConfigFile(roles)) = file else {
            return Ok(());
        };

        for (role, environments) in roles {
            for (environment, value) in environments.unwrap_or_default() {
                let target = match value {
                    Value::Null => continue,
                    Value::String(text) => RepositoryTarget::from(text),
                    other => {
                        return Err(FmError::Configuration(format!(
                            "repository must be a path string for role `{role}` in environment `{environment}`, got {}",
                            value_kind(&other)
                        )))
                    }
                };
                self.set(role.clone(), environment, target);
            }
        }
        Ok(())
    }

    /// Loads `.fmrepo.yml` from the current working directory, if present.
    pub fn load_default() -> FmResult<Self> {
        let mut config = Self::new();
        config.load_yaml(DEFAULT_CONFIG_FILE)?;
        Ok(config)
    }
}

/// Picks the first non-empty environment variable (`FMREPO_ENV`,
/// `JEKYLL_ENV`, `RACK_ENV`, `RAILS_ENV`), else `development`.
pub fn resolve_environment(lookup: impl Fn(&str) -> Option<String>) -> String {
    ENVIRONMENT_VARIABLES
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

/// `resolve_environment` over the current process environment.
pub fn environment_from_process() -> String {
    resolve_environment(|name| std::env::var(name).ok())
}
