//! Front-matter document codec.
//!
//! # Responsibility
//! - Split raw document text into a YAML metadata map and a body.
//! - Render metadata + body back into the persisted text format.
//!
//! # Invariants
//! - Text without an opening `---` line is all body, no metadata.
//! - An opening delimiter without a closing `---`/`...` line is an error.
//! - Rendered output always ends with a newline.

use crate::error::{FmError, FmResult};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Metadata block of one document, keyed by field name.
pub type Metadata = BTreeMap<String, Value>;

const OPEN_DELIMITER: &str = "---";
const CLOSE_DELIMITERS: [&str; 2] = ["---", "..."];

/// Parses raw document text into `(metadata, body)`.
///
/// One line break directly after the closing delimiter is dropped from the
/// body.
pub fn parse_document(raw: &str) -> FmResult<(Metadata, String)> {
    if !(raw.starts_with("---\n") || raw.starts_with("---\r\n")) {
        return Ok((Metadata::new(), raw.to_string()));
    }

    let lines: Vec<&str> = raw.split_inclusive('\n').collect();
    if lines.first().map(|line| line.trim()) != Some(OPEN_DELIMITER) {
        return Ok((Metadata::new(), raw.to_string()));
    }

    let close = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| CLOSE_DELIMITERS.contains(&line.trim()))
        .map(|(index, _)| index)
        .ok_or_else(|| FmError::Parse("unclosed front matter delimiter".to_string()))?;

    let yaml_text: String = lines[1..close].concat();
    let body_text: String = lines[close + 1..].concat();
    let body = body_text
        .strip_prefix("\r\n")
        .or_else(|| body_text.strip_prefix('\n'))
        .unwrap_or(&body_text)
        .to_string();

    Ok((parse_metadata(&yaml_text)?, body))
}

/// Renders metadata and body into persisted document text.
pub fn render_document(metadata: &Metadata, body: &str) -> FmResult<String> {
    let mut out = String::from("---\n");
    if !metadata.is_empty() {
        let yaml = serde_yaml::to_string(metadata)
            .map_err(|err| FmError::Parse(format!("failed to serialize metadata: {err}")))?;
        out.push_str(yaml.strip_prefix("---\n").unwrap_or(&yaml));
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str("---\n\n");
    out.push_str(body);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn parse_metadata(yaml_text: &str) -> FmResult<Metadata> {
    if yaml_text.trim().is_empty() {
        return Ok(Metadata::new());
    }

    let value: Value = serde_yaml::from_str(yaml_text)
        .map_err(|err| FmError::Parse(format!("YAML parse error: {err}")))?;

    match value {
        Value::Null => Ok(Metadata::new()),
        Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, value)| -> FmResult<(String, Value)> { Ok((metadata_key(key)?, value)) })
            .collect(),
        other => Err(FmError::Parse(format!(
            "metadata block must be a mapping, got {}",
            value_kind(&other)
        ))),
    }
}

fn metadata_key(key: Value) -> FmResult<String> {
    match key {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(FmError::Parse(format!(
            "metadata keys must be scalars, got {}",
            value_kind(&other)
        ))),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
