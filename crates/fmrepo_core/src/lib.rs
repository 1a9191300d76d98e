//! Core of the fmrepo document store.
//! Front-matter documents on disk, queried through lazy relations and
//! resolved per role and environment.

pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod logging;
pub mod model;
pub mod predicates;
pub mod record;
pub mod registry;
pub mod relation;
pub mod repository;
pub mod slug;
pub mod testing;

pub use config::{Config, RepositoryTarget, DEFAULT_CONFIG_FILE, TEMPORARY_TARGET};
pub use context::AppContext;
pub use document::{parse_document, render_document, Metadata};
pub use error::{FmError, FmResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{DocumentLoader, FrontMatterLoader, Model, ModelBuilder, NamingRule, DEFAULT_ROLE};
pub use predicates::{
    between, gt, gte, in_set, includes, lt, lte, matches, matches_pattern, present, Criteria,
    Criterion, Predicate,
};
pub use record::Record;
pub use registry::{OverrideGuard, RepositoryRegistry};
pub use relation::{Direction, Relation};
pub use repository::Repository;
pub use slug::slugify;

/// Re-exported so callers can build metadata without a direct dependency.
pub use serde_yaml::Value;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
