//! Path-safe primitive file operations anchored at one root directory.
//!
//! # Responsibility
//! - Enumerate, read, write and delete documents under the repository root.
//! - Resolve deterministic collision-free names for new documents.
//!
//! # Invariants
//! - Every path-taking operation resolves inside `root` or fails with
//!   `FmError::UnsafePath`; nothing touches the filesystem first.
//! - Writes go through a temp file in the destination directory followed by
//!   a rename, so readers never observe a partially written document.
//! - `resolve_collision` is not safe against concurrent writers computing the
//!   same name (check-then-write window); one writer per process is assumed.

use crate::error::{FmError, FmResult};
use glob::MatchOptions;
use log::debug;
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::time::SystemTime;

/// Flat-file document repository rooted at an absolute directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    /// Creates a repository rooted at `root`, made absolute against the
    /// current working directory. The directory does not need to exist yet.
    pub fn new(root: impl AsRef<Path>) -> FmResult<Self> {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).map_err(|err| FmError::io(root, err))?;
        Ok(Self {
            root: normalize_lexically(&absolute),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns absolute paths under root matching `pattern`.
    ///
    /// `pattern` is relative to root. Brace alternatives such as
    /// `_posts/**/*.{md,markdown}` are expanded before matching. Wildcards
    /// never match a leading `.`, so hidden files, hidden directories and
    /// in-flight temp files from `write_atomic` are skipped. The result
    /// carries no ordering guarantee.
    pub fn glob(&self, pattern: &str) -> FmResult<Vec<PathBuf>> {
        let escaped_root = glob::Pattern::escape(&self.root.to_string_lossy());
        let options = MatchOptions {
            require_literal_leading_dot: true,
            ..MatchOptions::new()
        };
        let mut matched = BTreeSet::new();

        for alternative in expand_braces(pattern) {
            let full = format!(
                "{}{MAIN_SEPARATOR}{}",
                escaped_root.trim_end_matches(MAIN_SEPARATOR),
                alternative.trim_start_matches(['/', MAIN_SEPARATOR])
            );
            let entries = glob::glob_with(&full, options).map_err(|err| {
                FmError::Configuration(format!("invalid glob pattern `{alternative}`: {err}"))
            })?;
            for entry in entries {
                let path = entry.map_err(|err| {
                    let path = err.path().to_path_buf();
                    FmError::io(path, std::io::Error::from(err))
                })?;
                matched.insert(path);
            }
        }

        Ok(matched.into_iter().collect())
    }

    /// Reads a document as UTF-8 text.
    pub fn read(&self, path: impl AsRef<Path>) -> FmResult<String> {
        let path = self.assert_within_root(path)?;
        fs::read_to_string(&path).map_err(|err| FmError::io(&path, err))
    }

    /// Writes `content` to `path` atomically, creating parent directories.
    ///
    /// # Side effects
    /// - Creates a hidden `.<name>.*.tmp` file next to the destination; it is
    ///   renamed onto `path` on success and removed on any earlier failure.
    pub fn write_atomic(&self, path: impl AsRef<Path>, content: &str) -> FmResult<()> {
        let path = self.assert_within_root(path)?;
        let dir = path
            .parent()
            .ok_or_else(|| FmError::UnsafePath(path.clone()))?;
        fs::create_dir_all(dir).map_err(|err| FmError::io(dir, err))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|err| FmError::io(dir, err))?;

        temp.write_all(content.as_bytes())
            .map_err(|err| FmError::io(temp.path(), err))?;
        temp.flush().map_err(|err| FmError::io(temp.path(), err))?;

        // Dropping the returned temp file on failure unlinks it.
        temp.persist(&path)
            .map_err(|err| FmError::io(&path, err.error))?;

        debug!(
            "event=write_atomic module=repository status=ok path={} bytes={}",
            path.display(),
            content.len()
        );
        Ok(())
    }

    /// Removes the file at `path`. Missing files are not an error.
    pub fn delete(&self, path: impl AsRef<Path>) -> FmResult<()> {
        let path = self.assert_within_root(path)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(
                    "event=delete module=repository status=ok path={}",
                    path.display()
                );
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FmError::io(&path, err)),
        }
    }

    /// Returns the first unused relative path derived from `candidate`.
    ///
    /// Probes `candidate`, then `name-2.ext`, `name-3.ext`, ... until a free
    /// slot is found.
    pub fn resolve_collision(&self, candidate: impl AsRef<Path>) -> FmResult<PathBuf> {
        let candidate = candidate.as_ref();
        if !self.occupied(candidate)? {
            return Ok(candidate.to_path_buf());
        }

        let parent = candidate.parent().unwrap_or_else(|| Path::new(""));
        let stem = candidate
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = candidate
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let mut suffix: u64 = 2;
        loop {
            let next = parent.join(format!("{stem}-{suffix}{extension}"));
            if !self.occupied(&next)? {
                return Ok(next);
            }
            suffix += 1;
        }
    }

    /// Converts a root-relative path into a normalized absolute path.
    pub fn abs(&self, rel: impl AsRef<Path>) -> PathBuf {
        normalize_lexically(&self.root.join(rel))
    }

    /// Converts an absolute path under root into a root-relative path.
    pub fn rel(&self, path: impl AsRef<Path>) -> FmResult<PathBuf> {
        let path = self.assert_within_root(path)?;
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| FmError::UnsafePath(path.clone()))
    }

    pub fn exists(&self, rel: impl AsRef<Path>) -> bool {
        self.abs(rel).exists()
    }

    /// Returns the modification time of a file under root.
    pub fn modified(&self, path: impl AsRef<Path>) -> FmResult<SystemTime> {
        let path = self.assert_within_root(path)?;
        fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(|err| FmError::io(&path, err))
    }

    /// Fails unless `path` normalizes to root itself or to a location below
    /// it. Returns the normalized absolute path.
    ///
    /// The check is textual: the normalized path must equal root, or start
    /// with root immediately followed by the path separator. A sibling such
    /// as `/srv/site-other` does not pass for root `/srv/site`.
    pub fn assert_within_root(&self, path: impl AsRef<Path>) -> FmResult<PathBuf> {
        let path = path.as_ref();
        let absolute =
            std::path::absolute(path).map_err(|_| FmError::UnsafePath(path.to_path_buf()))?;
        let candidate = normalize_lexically(&absolute);

        let root_text = self.root.to_string_lossy();
        let candidate_text = candidate.to_string_lossy();
        let inside = if candidate_text == root_text {
            true
        } else if root_text.ends_with(MAIN_SEPARATOR) {
            candidate_text.starts_with(root_text.as_ref())
        } else {
            candidate_text.starts_with(&format!("{root_text}{MAIN_SEPARATOR}"))
        };

        if inside {
            Ok(candidate)
        } else {
            Err(FmError::UnsafePath(candidate))
        }
    }

    fn occupied(&self, rel: &Path) -> FmResult<bool> {
        let path = self.assert_within_root(self.abs(rel))?;
        Ok(path.exists())
    }
}

/// Joins path components with `/` regardless of platform.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Expands shell-style brace alternatives (`a.{md,txt}`) into plain globs.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut commas = Vec::new();
    for (offset, ch) in pattern[open..].char_indices() {
        let index = open + offset;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(index);
                    break;
                }
            }
            ',' if depth == 1 => commas.push(index),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = Vec::with_capacity(commas.len() + 2);
    bounds.push(open);
    bounds.extend(commas);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|window| {
            let alternative = &pattern[window[0] + 1..window[1]];
            expand_braces(&format!("{prefix}{alternative}{suffix}"))
        })
        .collect()
}
