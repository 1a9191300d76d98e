//! Slug generation for naming rules.

use once_cell::sync::Lazy;
use regex::Regex;

static QUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"]"#).expect("valid quote regex"));
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid separator regex"));

/// Lowercase, dash-separated form of `text`; `untitled` when nothing is left.
///
/// Quotes are dropped, every other run of characters outside `[a-z0-9]`
/// collapses to one dash.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let unquoted = QUOTE_RE.replace_all(&lowered, "");
    let dashed = SEPARATOR_RE.replace_all(&unquoted, "-");

    let trimmed = dashed.trim_matches('-');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
