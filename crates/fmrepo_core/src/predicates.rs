//! Filter criteria and the predicate library.
//!
//! # Responsibility
//! - Model a filter criterion as literal equality or a boolean test.
//! - Provide the stock predicate constructors used in `Relation::filter`.
//!
//! # Invariants
//! - Predicates are pure and never fail: missing fields or operand types
//!   that cannot be ordered evaluate to `false`.

use crate::error::{FmError, FmResult};
use regex::Regex;
use serde_yaml::Value;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Boolean test over a resolved field value (`None` when the field is absent).
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>);

impl Predicate {
    /// Wraps a caller-supplied test.
    pub fn new(test: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(test))
    }

    pub fn test(&self, value: Option<&Value>) -> bool {
        (self.0)(value)
    }
}

impl Debug for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// One field condition inside a filter.
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Field must equal the literal. An absent field counts as null and
    /// numbers compare by value.
    Equals(Value),
    /// Field value (possibly absent) must satisfy the predicate.
    Test(Predicate),
}

impl Criterion {
    pub fn holds(&self, value: Option<&Value>) -> bool {
        match self {
            Self::Equals(expected) => literal_eq(value.unwrap_or(&Value::Null), expected),
            Self::Test(predicate) => predicate.test(value),
        }
    }
}

impl From<Predicate> for Criterion {
    fn from(value: Predicate) -> Self {
        Self::Test(value)
    }
}

impl From<Value> for Criterion {
    fn from(value: Value) -> Self {
        Self::Equals(value)
    }
}

macro_rules! literal_criterion {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Criterion {
                fn from(value: $ty) -> Self {
                    Self::Equals(Value::from(value))
                }
            }
        )*
    };
}

literal_criterion!(&str, String, bool, i32, i64, u32, u64, f64);

/// Conjunction of field criteria, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    entries: Vec<(String, Criterion)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a literal-equality condition.
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Criterion::Equals(value.into()))
    }

    /// Adds a predicate condition.
    pub fn test(self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.with(field, Criterion::Test(predicate))
    }

    pub fn with(mut self, field: impl Into<String>, criterion: impl Into<Criterion>) -> Self {
        self.entries.push((field.into(), criterion.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Criterion)> {
        self.entries
            .iter()
            .map(|(field, criterion)| (field.as_str(), criterion))
    }
}

impl<K, C> FromIterator<(K, C)> for Criteria
where
    K: Into<String>,
    C: Into<Criterion>,
{
    fn from_iter<I: IntoIterator<Item = (K, C)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |criteria, (field, criterion)| {
                criteria.with(field, criterion)
            })
    }
}

impl<K, C, const N: usize> From<[(K, C); N]> for Criteria
where
    K: Into<String>,
    C: Into<Criterion>,
{
    fn from(value: [(K, C); N]) -> Self {
        value.into_iter().collect()
    }
}

impl<K, C> From<Vec<(K, C)>> for Criteria
where
    K: Into<String>,
    C: Into<Criterion>,
{
    fn from(value: Vec<(K, C)>) -> Self {
        value.into_iter().collect()
    }
}

/// True for a sequence containing `target`, or a string containing the
/// string form of `target`.
pub fn includes(target: impl Into<Value>) -> Predicate {
    let target = target.into();
    let needle = display_value(&target);
    Predicate::new(move |value| match value {
        Some(Value::Sequence(items)) => items.contains(&target),
        Some(Value::String(text)) => text.contains(needle.as_str()),
        _ => false,
    })
}

/// True when the value (absent counts as null) is one of `values`.
pub fn in_set<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Predicate {
    let set: Vec<Value> = values.into_iter().map(Into::into).collect();
    Predicate::new(move |value| set.contains(value.unwrap_or(&Value::Null)))
}

/// False for absent, null, blank strings and empty collections.
pub fn present() -> Predicate {
    Predicate::new(|value| match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Sequence(items)) => !items.is_empty(),
        Some(Value::Mapping(map)) => !map.is_empty(),
        Some(_) => true,
    })
}

/// True only for string values matching `regex`.
pub fn matches(regex: Regex) -> Predicate {
    Predicate::new(move |value| match value {
        Some(Value::String(text)) => regex.is_match(text),
        _ => false,
    })
}

/// Compiles `pattern` and returns a `matches` predicate.
pub fn matches_pattern(pattern: &str) -> FmResult<Predicate> {
    let regex = Regex::new(pattern).map_err(|err| {
        FmError::Configuration(format!("invalid regex pattern `{pattern}`: {err}"))
    })?;
    Ok(matches(regex))
}

pub fn gt(threshold: impl Into<Value>) -> Predicate {
    ordered(threshold.into(), |ordering| ordering == Ordering::Greater)
}

pub fn gte(threshold: impl Into<Value>) -> Predicate {
    ordered(threshold.into(), |ordering| ordering != Ordering::Less)
}

pub fn lt(threshold: impl Into<Value>) -> Predicate {
    ordered(threshold.into(), |ordering| ordering == Ordering::Less)
}

pub fn lte(threshold: impl Into<Value>) -> Predicate {
    ordered(threshold.into(), |ordering| ordering != Ordering::Greater)
}

/// Inclusive range test.
pub fn between(lower: impl Into<Value>, upper: impl Into<Value>) -> Predicate {
    let lower = lower.into();
    let upper = upper.into();
    Predicate::new(move |value| {
        let Some(value) = value else {
            return false;
        };
        matches!(
            (natural_cmp(value, &lower), natural_cmp(value, &upper)),
            (
                Some(Ordering::Greater | Ordering::Equal),
                Some(Ordering::Less | Ordering::Equal)
            )
        )
    })
}

fn literal_eq(value: &Value, expected: &Value) -> bool {
    match (value, expected) {
        (Value::Number(_), Value::Number(_)) => {
            natural_cmp(value, expected) == Some(Ordering::Equal)
        }
        _ => value == expected,
    }
}

fn ordered(threshold: Value, accept: fn(Ordering) -> bool) -> Predicate {
    Predicate::new(move |value| {
        value
            .and_then(|value| natural_cmp(value, &threshold))
            .is_some_and(accept)
    })
}

/// Natural ordering between two values, `None` when the types do not order.
///
/// Numbers compare numerically (integers exactly, otherwise as floats),
/// strings and booleans compare with themselves, sequences compare
/// elementwise.
pub fn natural_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                Some(a.cmp(&b))
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                Some(a.cmp(&b))
            } else {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Sequence(a), Value::Sequence(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                match natural_cmp(x, y)? {
                    Ordering::Equal => continue,
                    decided => return Some(decided),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        (Value::Tagged(a), Value::Tagged(b)) if a.tag == b.tag => natural_cmp(&a.value, &b.value),
        _ => None,
    }
}

/// String form used by `includes` and by the ordering fallback.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}
