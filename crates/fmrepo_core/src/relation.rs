//! Chainable, lazily executed queries over a model's documents.
//!
//! # Responsibility
//! - Accumulate filters, orderings and pagination without touching disk.
//! - Execute the full scan -> load -> filter -> sort -> paginate pipeline on
//!   terminal calls.
//!
//! # Invariants
//! - Chaining never mutates the receiver; derived relations share nothing
//!   mutable.
//! - Filters are conjunctive, within one `filter` call and across calls.
//! - Missing values sort after present ones ascending, before them
//!   descending.
//! - Glob enumeration order is never relied upon; only explicit orderings
//!   define result order.

use crate::error::{FmError, FmResult};
use crate::model::Model;
use crate::predicates::{display_value, natural_cmp, Criteria};
use crate::record::Record;
use crate::repository::{slash_path, Repository};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Sort direction for `Relation::order`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Immutable query over one model in one repository.
#[derive(Debug, Clone)]
pub struct Relation {
    repo: Arc<Repository>,
    model: Arc<Model>,
    filters: Vec<Criteria>,
    orders: Vec<(String, Direction)>,
    limit: Option<usize>,
    offset: usize,
}

impl Relation {
    pub fn new(repo: Arc<Repository>, model: Arc<Model>) -> Self {
        Self {
            repo,
            model,
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Adds a `where` clause: every criterion must hold.
    pub fn filter(&self, criteria: impl Into<Criteria>) -> Self {
        let mut next = self.clone();
        next.filters.push(criteria.into());
        next
    }

    /// Appends a sort key; earlier keys take precedence.
    pub fn order(&self, field: impl Into<String>, direction: Direction) -> Self {
        let mut next = self.clone();
        next.orders.push((field.into(), direction));
        next
    }

    pub fn limit(&self, count: usize) -> Self {
        let mut next = self.clone();
        next.limit = Some(count);
        next
    }

    pub fn offset(&self, count: usize) -> Self {
        let mut next = self.clone();
        next.offset = count;
        next
    }

    /// Executes the query and returns the matching records.
    pub fn to_vec(&self) -> FmResult<Vec<Record>> {
        let started_at = Instant::now();
        let candidates = self.candidate_paths()?;
        let candidate_count = candidates.len();

        let mut records = Vec::with_capacity(candidate_count);
        for path in &candidates {
            let record = self.model.load(&self.repo, path)?;
            if self.matches_filters(&record) {
                records.push(record);
            }
        }

        if !self.orders.is_empty() {
            records = merge_sort_by(records, &|a, b| self.compare(a, b));
        }

        let records: Vec<Record> = records
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();

        debug!(
            "event=relation_execute module=relation status=ok model={} candidates={} results={} duration_ms={}",
            self.model.name(),
            candidate_count,
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    /// Identifiers of the matching records, in result order.
    pub fn ids(&self) -> FmResult<Vec<String>> {
        Ok(self.to_vec()?.iter().filter_map(Record::id).collect())
    }

    pub fn first(&self) -> FmResult<Option<Record>> {
        Ok(self.limit(1).to_vec()?.into_iter().next())
    }

    /// Number of matching records; always performs the full scan.
    pub fn count(&self) -> FmResult<usize> {
        Ok(self.to_vec()?.len())
    }

    /// Loads one record by root-relative id, ignoring filters.
    pub fn find(&self, id: &str) -> FmResult<Record> {
        let path = self.repo.assert_within_root(self.repo.abs(id))?;
        if !path.is_file() {
            return Err(FmError::NotFound(id.to_string()));
        }
        self.model.load(&self.repo, &path)
    }

    pub fn find_by(&self, criteria: impl Into<Criteria>) -> FmResult<Option<Record>> {
        self.filter(criteria).first()
    }

    fn candidate_paths(&self) -> FmResult<Vec<PathBuf>> {
        let glob = self.model.glob().ok_or_else(|| {
            FmError::Configuration(format!("model `{}` has no scope glob", self.model.name()))
        })?;

        let excludes = self
            .model
            .exclude()
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|err| {
                    FmError::Configuration(format!("invalid exclude pattern `{pattern}`: {err}"))
                })
            })
            .collect::<FmResult<Vec<_>>>()?;

        let mut paths = Vec::new();
        for path in self.repo.glob(glob)? {
            if !path.is_file() {
                continue;
            }
            let rel = slash_path(&self.repo.rel(&path)?);
            if excludes.iter().any(|pattern| pattern.matches(&rel)) {
                continue;
            }
            paths.push(path);
        }
        Ok(paths)
    }

    fn matches_filters(&self, record: &Record) -> bool {
        self.filters.iter().all(|criteria| {
            criteria
                .iter()
                .all(|(field, criterion)| criterion.holds(record.field(field).as_deref()))
        })
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (field, direction) in &self.orders {
            let ordering =
                compare_with_missing(a.field(field).as_deref(), b.field(field).as_deref());
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Natural ordering with absent (or null) values greater than any present
/// value. Falls back to string forms when the types do not order.
pub fn compare_with_missing(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(left), Some(right)) => natural_cmp(left, right)
            .unwrap_or_else(|| display_value(left).cmp(&display_value(right))),
    }
}

// The string fallback is not transitive across mixed types, which
// `slice::sort_by` may reject with a panic; merge sort only needs pairwise
// answers.
fn merge_sort_by<T>(items: Vec<T>, compare: &impl Fn(&T, &T) -> Ordering) -> Vec<T> {
    if items.len() <= 1 {
        return items;
    }

    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let mut left = merge_sort_by(left, compare).into_iter().peekable();
    let mut right = merge_sort_by(right, compare).into_iter().peekable();

    let mut merged = Vec::with_capacity(left.len() + right.len());
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => compare(r, l) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged
}
