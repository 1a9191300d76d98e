//! Error taxonomy shared by every core component.
//!
//! # Responsibility
//! - Give callers one error type to match on across repository, query,
//!   registry and document layers.
//!
//! # Invariants
//! - Errors are surfaced immediately; nothing in core retries.
//! - Predicate evaluation never produces an error (mismatch means `false`).

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type FmResult<T> = Result<T, FmError>;

/// Error for repository, query and registry operations.
#[derive(Debug)]
pub enum FmError {
    /// No repository could be resolved for a model or record.
    NotBound(String),
    /// Record lookup by id found no file.
    NotFound(String),
    /// Path resolves outside the repository root.
    UnsafePath(PathBuf),
    /// Document text or metadata block is malformed.
    Parse(String),
    /// Missing glob, unconfigured role/environment, bad target value, etc.
    Configuration(String),
    /// Filesystem failure on a specific path.
    Io { path: PathBuf, source: std::io::Error },
}

impl FmError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn not_configured(role: &str, environment: &str) -> Self {
        Self::Configuration(format!(
            "no repository configured for role `{role}` in environment `{environment}`"
        ))
    }
}

impl Display for FmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotBound(message) => write!(f, "not bound: {message}"),
            Self::NotFound(id) => write!(f, "no such record: {id}"),
            Self::UnsafePath(path) => {
                write!(f, "path is outside repository root: {}", path.display())
            }
            Self::Parse(message) => write!(f, "parse error: {message}"),
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
            Self::Io { path, source } => write!(f, "io error at {}: {source}", path.display()),
        }
    }
}

impl Error for FmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::NotBound(_)
            | Self::NotFound(_)
            | Self::UnsafePath(_)
            | Self::Parse(_)
            | Self::Configuration(_) => None,
        }
    }
}

impl From<serde_yaml::Error> for FmError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::FmError;
    use std::error::Error;

    #[test]
    fn not_configured_names_role_and_environment() {
        let message = FmError::not_configured("places", "staging").to_string();
        assert!(message.contains("places"));
        assert!(message.contains("staging"));
    }

    #[test]
    fn io_error_exposes_source() {
        let err = FmError::io(
            "/srv/site/a.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/srv/site/a.md"));
    }
}
