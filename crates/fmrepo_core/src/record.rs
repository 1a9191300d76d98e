//! Loaded or pending document record.
//!
//! # Responsibility
//! - Hold one document's metadata and body plus its location.
//! - Resolve reserved virtual fields for queries.
//! - Persist, reload and delete through the owning repository.
//!
//! # Invariants
//! - `id` is the root-relative path with `/` separators.
//! - A record without a path gets one from the model's naming rule on first
//!   save, passed through collision resolution.

use crate::document::{render_document, Metadata};
use crate::error::{FmError, FmResult};
use crate::model::Model;
use crate::repository::{slash_path, Repository};
use log::debug;
use once_cell::unsync::OnceCell;
use serde_yaml::Value;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Root-relative path, also the record identifier.
pub const FIELD_ID: &str = "_id";
/// Absolute filesystem path.
pub const FIELD_PATH: &str = "_path";
pub const FIELD_REL_PATH: &str = "_rel_path";
/// Modification time in milliseconds since the Unix epoch.
pub const FIELD_MTIME: &str = "_mtime";
/// Owning model name.
pub const FIELD_MODEL: &str = "_model";

#[derive(Debug, Clone)]
pub struct Record {
    model: Arc<Model>,
    repo: Option<Arc<Repository>>,
    path: Option<PathBuf>,
    metadata: Metadata,
    body: String,
    new_record: bool,
    mtime: OnceCell<Option<SystemTime>>,
}

impl Record {
    pub(crate) fn new(
        model: Arc<Model>,
        repo: Option<Arc<Repository>>,
        path: Option<PathBuf>,
        metadata: Metadata,
        body: String,
    ) -> Self {
        Self {
            model,
            repo,
            path,
            metadata,
            body,
            new_record: true,
            mtime: OnceCell::new(),
        }
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.new_record = false;
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn repository(&self) -> Option<&Arc<Repository>> {
        self.repo.as_ref()
    }

    /// Attaches the repository used by `save`, `destroy` and `reload`.
    pub fn attach(&mut self, repo: Arc<Repository>) {
        self.repo = Some(repo);
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Returns a string metadata value, `None` for absent or non-string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Absolute path, `None` until the record is first saved.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn rel_path(&self) -> Option<PathBuf> {
        let repo = self.repo.as_ref()?;
        repo.rel(self.path.as_ref()?).ok()
    }

    pub fn id(&self) -> Option<String> {
        self.rel_path().map(|rel| slash_path(&rel))
    }

    /// File modification time, read once from disk on first access.
    pub fn mtime(&self) -> Option<SystemTime> {
        *self.mtime.get_or_init(|| {
            let repo = self.repo.as_ref()?;
            repo.modified(self.path.as_ref()?).ok()
        })
    }

    pub fn is_new_record(&self) -> bool {
        self.new_record
    }

    pub fn is_persisted(&self) -> bool {
        !self.new_record
    }

    /// Resolves a query field: reserved virtual fields first, then metadata.
    pub fn field(&self, name: &str) -> Option<Cow<'_, Value>> {
        match name {
            FIELD_ID | FIELD_REL_PATH => self.id().map(|id| Cow::Owned(Value::from(id))),
            FIELD_PATH => self
                .path
                .as_ref()
                .map(|path| Cow::Owned(Value::from(path.to_string_lossy().into_owned()))),
            FIELD_MTIME => self
                .mtime()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| {
                    let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                    Cow::Owned(Value::from(millis))
                }),
            FIELD_MODEL => Some(Cow::Owned(Value::from(self.model.name()))),
            _ => self.metadata.get(name).map(Cow::Borrowed),
        }
    }

    /// Renders the persisted document text.
    pub fn render(&self) -> FmResult<String> {
        render_document(&self.metadata, &self.body)
    }

    /// Writes the record atomically, assigning a path on first save.
    pub fn save(&mut self) -> FmResult<()> {
        let repo = self.require_repo()?;
        let path = match &self.path {
            Some(path) => path.clone(),
            None => {
                let desired = self
                    .model
                    .desired_path(&self.metadata, &self.body, &repo)?;
                repo.abs(repo.resolve_collision(desired)?)
            }
        };

        repo.write_atomic(&path, &self.render()?)?;

        debug!(
            "event=record_save module=record status=ok model={} path={} new_record={}",
            self.model.name(),
            path.display(),
            self.new_record
        );
        self.path = Some(path);
        self.new_record = false;
        self.mtime = OnceCell::new();
        Ok(())
    }

    /// Deletes the backing file; a record without a path is left alone.
    pub fn destroy(&self) -> FmResult<()> {
        let repo = self.require_repo()?;
        match &self.path {
            Some(path) => repo.delete(path),
            None => Ok(()),
        }
    }

    /// Replaces metadata and body with the current file contents.
    pub fn reload(&mut self) -> FmResult<()> {
        let repo = self.require_repo()?;
        let path = self
            .path
            .clone()
            .ok_or_else(|| FmError::NotFound("record has no path".to_string()))?;
        let (metadata, body) = self.model.loader().load(&repo, &path)?;
        self.metadata = metadata;
        self.body = body;
        self.new_record = false;
        self.mtime = OnceCell::new();
        Ok(())
    }

    fn require_repo(&self) -> FmResult<Arc<Repository>> {
        self.repo.clone().ok_or_else(|| {
            FmError::NotBound(format!(
                "record of model `{}` is not bound to a repository",
                self.model.name()
            ))
        })
    }
}
