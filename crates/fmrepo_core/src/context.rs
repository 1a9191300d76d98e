//! Application context: active environment plus the repository registry.
//!
//! # Responsibility
//! - Replace process-wide globals with one value built at startup and passed
//!   to whatever needs repository resolution.
//!
//! # Invariants
//! - The environment is fixed for the lifetime of a context.
//! - `reset` returns the registry to an empty cache/override state.

use crate::config::{environment_from_process, Config};
use crate::error::FmResult;
use crate::registry::RepositoryRegistry;
use crate::repository::Repository;
use log::info;
use std::sync::Arc;

pub struct AppContext {
    environment: String,
    registry: RepositoryRegistry,
}

impl AppContext {
    pub fn new(environment: impl Into<String>, config: Config) -> Self {
        Self {
            environment: environment.into(),
            registry: RepositoryRegistry::new(config),
        }
    }

    /// Builds a context from process environment variables and the
    /// `.fmrepo.yml` file in the working directory.
    pub fn from_env() -> FmResult<Self> {
        let environment = environment_from_process();
        let config = Config::load_default()?;
        info!(
            "event=context_init module=context status=ok environment={} roles={}",
            environment,
            config.roles().count()
        );
        Ok(Self::new(environment, config))
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn registry(&self) -> &RepositoryRegistry {
        &self.registry
    }

    /// Repository for `role` in the active environment.
    pub fn repository(&self, role: &str) -> FmResult<Arc<Repository>> {
        self.registry.fetch(role, &self.environment)
    }

    /// Edits a copy of the configuration and installs it. The closure runs
    /// without holding the registry lock.
    pub fn configure(&self, edit: impl FnOnce(&mut Config)) {
        let mut config = self.registry.config();
        edit(&mut config);
        self.registry.replace_config(config);
    }

    pub fn reset(&self) {
        self.registry.reset();
    }
}
