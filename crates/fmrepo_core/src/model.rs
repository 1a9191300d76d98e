//! Per-model configuration: scope glob, excludes, naming rule and loader.
//!
//! # Responsibility
//! - Describe which documents belong to a model and how new ones are named.
//! - Resolve the repository a model works against.
//!
//! # Invariants
//! - A model is immutable once built and shared behind `Arc`.
//! - The naming rule runs only when saving a record without a path.

use crate::context::AppContext;
use crate::document::{parse_document, Metadata};
use crate::error::{FmError, FmResult};
use crate::record::Record;
use crate::relation::Relation;
use crate::repository::Repository;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Role a model resolves through when no repository is bound.
pub const DEFAULT_ROLE: &str = "default";

/// Computes the desired root-relative path for a new record.
pub type NamingRule = Arc<dyn Fn(&Metadata, &str, &Repository) -> String + Send + Sync>;

/// Turns a file under a repository into `(metadata, body)`.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, repo: &Repository, path: &Path) -> FmResult<(Metadata, String)>;
}

/// Default loader for `---` delimited YAML front matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontMatterLoader;

impl DocumentLoader for FrontMatterLoader {
    fn load(&self, repo: &Repository, path: &Path) -> FmResult<(Metadata, String)> {
        parse_document(&repo.read(path)?)
    }
}

/// Declarative description of one document collection.
pub struct Model {
    name: String,
    role: String,
    repository: Option<Arc<Repository>>,
    glob: Option<String>,
    exclude: Vec<String>,
    naming_rule: Option<NamingRule>,
    loader: Arc<dyn DocumentLoader>,
}

impl Model {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            model: Model {
                name: name.into(),
                role: DEFAULT_ROLE.to_string(),
                repository: None,
                glob: None,
                exclude: Vec::new(),
                naming_rule: None,
                loader: Arc::new(FrontMatterLoader),
            },
        }
    }

    /// Type tag reported through the `_model` field.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn glob(&self) -> Option<&str> {
        self.glob.as_deref()
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn bound_repository(&self) -> Option<&Arc<Repository>> {
        self.repository.as_ref()
    }

    /// Returns the bound repository, else the context's repository for this
    /// model's role.
    ///
    /// # Errors
    /// - `FmError::NotBound` when neither a binding nor a context exists.
    /// - Registry errors (e.g. unconfigured role/environment) unchanged.
    pub fn resolve_repository(&self, ctx: Option<&AppContext>) -> FmResult<Arc<Repository>> {
        if let Some(repo) = &self.repository {
            return Ok(Arc::clone(repo));
        }
        match ctx {
            Some(ctx) => ctx.repository(&self.role),
            None => Err(FmError::NotBound(format!(
                "model `{}` is not bound to a repository",
                self.name
            ))),
        }
    }

    /// Query over every document of this model in `repo`.
    pub fn relation(self: &Arc<Self>, repo: Arc<Repository>) -> Relation {
        Relation::new(repo, Arc::clone(self))
    }

    /// Query over the resolved repository (see `resolve_repository`).
    pub fn all(self: &Arc<Self>, ctx: Option<&AppContext>) -> FmResult<Relation> {
        Ok(self.relation(self.resolve_repository(ctx)?))
    }

    /// Builds an unsaved record, attached to the bound repository if any.
    pub fn new_record(self: &Arc<Self>, metadata: Metadata, body: impl Into<String>) -> Record {
        Record::new(
            Arc::clone(self),
            self.repository.clone(),
            None,
            metadata,
            body.into(),
        )
    }

    /// Builds and saves a record in `repo`, naming it through the naming rule.
    pub fn create(
        self: &Arc<Self>,
        repo: &Arc<Repository>,
        metadata: Metadata,
        body: impl Into<String>,
    ) -> FmResult<Record> {
        let mut record = Record::new(
            Arc::clone(self),
            Some(Arc::clone(repo)),
            None,
            metadata,
            body.into(),
        );
        record.save()?;
        Ok(record)
    }

    /// Loads the document at absolute `path` as a persisted record.
    pub fn load(self: &Arc<Self>, repo: &Arc<Repository>, path: &Path) -> FmResult<Record> {
        let (metadata, body) = self.loader.load(repo, path)?;
        let mut record = Record::new(
            Arc::clone(self),
            Some(Arc::clone(repo)),
            Some(path.to_path_buf()),
            metadata,
            body,
        );
        record.mark_persisted();
        Ok(record)
    }

    pub(crate) fn loader(&self) -> &dyn DocumentLoader {
        self.loader.as_ref()
    }

    pub(crate) fn desired_path(
        &self,
        metadata: &Metadata,
        body: &str,
        repo: &Repository,
    ) -> FmResult<PathBuf> {
        let rule = self.naming_rule.as_ref().ok_or_else(|| {
            FmError::Configuration(format!(
                "model `{}` has no naming rule and no path was provided",
                self.name
            ))
        })?;
        Ok(PathBuf::from(rule(metadata, body, repo)))
    }
}

impl Debug for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("repository", &self.repository)
            .field("glob", &self.glob)
            .field("exclude", &self.exclude)
            .field("has_naming_rule", &self.naming_rule.is_some())
            .finish()
    }
}

/// Builder for `Model`.
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    /// Glob (relative to root) selecting this model's documents.
    pub fn scope(mut self, glob: impl Into<String>) -> Self {
        self.model.glob = Some(glob.into());
        self
    }

    /// Filename-glob patterns, matched against root-relative paths, that
    /// drop documents from the scope.
    pub fn exclude<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.model.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn naming(
        mut self,
        rule: impl Fn(&Metadata, &str, &Repository) -> String + Send + Sync + 'static,
    ) -> Self {
        self.model.naming_rule = Some(Arc::new(rule));
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.model.role = role.into();
        self
    }

    /// Binds a repository, bypassing registry resolution.
    pub fn bind(mut self, repo: Arc<Repository>) -> Self {
        self.model.repository = Some(repo);
        self
    }

    pub fn loader(mut self, loader: impl DocumentLoader + 'static) -> Self {
        self.model.loader = Arc::new(loader);
        self
    }

    pub fn build(self) -> Arc<Model> {
        Arc::new(self.model)
    }
}
