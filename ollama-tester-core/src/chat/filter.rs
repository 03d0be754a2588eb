//! Regex post-processing of model responses.

use crate::error::{Result, TesterError};
use regex::{Regex, RegexBuilder};
use std::fmt;

pub const NO_PATTERN: &str = "[No regular expression provided]";
pub const NO_MATCHES: &str = "[No matches found]";
const GROUP_SEPARATOR: &str = " | ";

/// Outcome of filtering a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterResult {
    NoPattern,
    NoMatches,
    /// One line per match.
    Matches(String),
}

impl fmt::Display for FilterResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterResult::NoPattern => f.write_str(NO_PATTERN),
            FilterResult::NoMatches => f.write_str(NO_MATCHES),
            FilterResult::Matches(text) => f.write_str(text),
        }
    }
}

/// Applies `pattern` to `text` with `^`/`$` matching at line boundaries.
///
/// Without capture groups every match is a line; with one group its value
/// is the line; with more, the groups are joined with `" | "`. Groups that
/// did not take part in a match count as empty.
pub fn apply_filter(text: &str, pattern: &str) -> Result<FilterResult> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Ok(FilterResult::NoPattern);
    }

    let regex = RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|e| TesterError::InvalidPattern(e.to_string()))?;

    let lines = collect_matches(&regex, text.trim());
    if lines.is_empty() {
        return Ok(FilterResult::NoMatches);
    }

    Ok(FilterResult::Matches(lines.join("\n")))
}

fn collect_matches(regex: &Regex, text: &str) -> Vec<String> {
    let groups = regex.captures_len() - 1;

    match groups {
        0 => regex.find_iter(text).map(|m| m.as_str().to_string()).collect(),
        1 => regex
            .captures_iter(text)
            .map(|caps| caps.get(1).map_or("", |m| m.as_str()).to_string())
            .collect(),
        _ => regex
            .captures_iter(text)
            .map(|caps| {
                (1..=groups)
                    .map(|i| caps.get(i).map_or("", |m| m.as_str()))
                    .collect::<Vec<_>>()
                    .join(GROUP_SEPARATOR)
            })
            .collect(),
    }
}
