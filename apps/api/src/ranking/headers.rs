//! Header resolution: gives every criterion a short display header.
//!
//! Validation order (first failure wins):
//! 1. completeness: one returned key per criterion
//! 2. equality: returned keys are exactly the criteria, verbatim
//! 3. distinct headers: no two criteria share a header
//! 4. reserved headers: no header reuses a fixed table column

use std::collections::HashSet;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::ranking::criteria::CriteriaSet;
use crate::ranking::harness::{GenerationContract, Stage, Violation, ViolationKind};
use crate::ranking::keys::{same_key_set, KeySetDiff};
use crate::ranking::prompts::render;
use crate::ranking::scorer::CANDIDATE_NAME_KEY;
use crate::ranking::table::TOTAL_SCORE_COLUMN;

/// Columns the ranked table always carries; a header may not take these names.
pub const RESERVED_HEADERS: [&str; 2] = [CANDIDATE_NAME_KEY, TOTAL_SCORE_COLUMN];

pub const MISSING_CRITERIA_CORRECTION: &str = "In the previous attempt you left out some of the \
    criteria. Every criterion provided must have a header; do not skip any.";

pub const CRITERIA_MISMATCH_CORRECTION: &str = "In the previous attempt you returned a header for \
    each criterion, but some criteria keys did not match the provided criteria. Use every \
    criterion text as a key exactly as it was given.";

pub const DUPLICATE_HEADERS_CORRECTION: &str = "In the previous attempt two or more criteria \
    received the same header. Every criterion needs its own distinct header.";

pub const RESERVED_HEADER_CORRECTION: &str = "In the previous attempt a header was named \
    \"Candidate Name\" or \"Total Score\". Those names are reserved for the score table; give \
    every criterion a header that describes the criterion itself.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub criterion: String,
    pub header: String,
}

/// One-to-one mapping Criterion → Header, stored in input-criteria order.
/// The header sequence is the column order of the ranked table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMapping {
    entries: Vec<HeaderEntry>,
}

impl HeaderMapping {
    #[cfg(test)]
    pub fn criteria(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.criterion.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.header.as_str())
    }

    /// Column list for the ranked table, materialized once.
    pub fn columns(&self) -> Vec<String> {
        self.headers().map(str::to_owned).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// JSON object `{criterion: header}` in mapping order, for the scoring prompt.
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl Serialize for HeaderMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.criterion, &entry.header)?;
        }
        map.end()
    }
}

/// Model response shape: `{"criteria_headers": {criterion: header}}`.
#[derive(Debug, Deserialize)]
pub struct HeadersPayload {
    pub criteria_headers: serde_json::Map<String, serde_json::Value>,
}

pub struct HeadersContract<'a> {
    pub template: &'a str,
    pub criteria: &'a CriteriaSet,
}

impl GenerationContract for HeadersContract<'_> {
    type Parsed = HeadersPayload;
    type Output = HeaderMapping;

    fn stage(&self) -> Stage {
        Stage::Headers
    }

    fn instruction(&self, correction: &str) -> String {
        let criteria_json = serde_json::to_string(self.criteria.as_slice()).unwrap_or_default();
        render(
            self.template,
            &[("criteria", &criteria_json), ("correction", correction)],
        )
    }

    fn validate(&self, parsed: HeadersPayload) -> Result<HeaderMapping, Violation> {
        validate_headers(self.criteria, &parsed.criteria_headers)
    }
}

/// Checks a returned header map against the input criteria and builds the mapping.
pub fn validate_headers(
    criteria: &CriteriaSet,
    returned: &serde_json::Map<String, serde_json::Value>,
) -> Result<HeaderMapping, Violation> {
    if returned.len() != criteria.len() {
        return Err(Violation::new(
            ViolationKind::MissingEntries,
            format!(
                "expected {} criteria headers, got {}",
                criteria.len(),
                returned.len()
            ),
            MISSING_CRITERIA_CORRECTION,
        ));
    }

    if !same_key_set(returned.keys().map(String::as_str), criteria.iter()) {
        let diff = KeySetDiff::between(returned.keys().map(String::as_str), criteria.iter());
        return Err(Violation::new(
            ViolationKind::KeyMismatch,
            format!("returned criteria do not match input: {}", diff.describe()),
            CRITERIA_MISMATCH_CORRECTION,
        ));
    }

    let mut entries = Vec::with_capacity(criteria.len());
    for criterion in criteria.iter() {
        let header = match returned.get(criterion) {
            Some(serde_json::Value::String(header)) if !header.trim().is_empty() => header.clone(),
            other => {
                return Err(Violation::new(
                    ViolationKind::InvalidValue,
                    format!("header for '{criterion}' is not a non-empty string: {other:?}"),
                    MISSING_CRITERIA_CORRECTION,
                ))
            }
        };
        entries.push(HeaderEntry {
            criterion: criterion.to_string(),
            header,
        });
    }

    let mut seen = HashSet::new();
    let duplicates: Vec<&str> = entries
        .iter()
        .map(|e| e.header.as_str())
        .filter(|h| !seen.insert(*h))
        .collect();
    if !duplicates.is_empty() {
        return Err(Violation::new(
            ViolationKind::DuplicateHeaders,
            format!("headers used more than once: {duplicates:?}"),
            DUPLICATE_HEADERS_CORRECTION,
        ));
    }

    let reserved: Vec<&str> = entries
        .iter()
        .map(|e| e.header.as_str())
        .filter(|h| RESERVED_HEADERS.contains(h))
        .collect();
    if !reserved.is_empty() {
        return Err(Violation::new(
            ViolationKind::ReservedHeader,
            format!("headers collide with reserved table columns: {reserved:?}"),
            RESERVED_HEADER_CORRECTION,
        ));
    }

    Ok(HeaderMapping { entries })
}

#[cfg(test)]
pub(crate) fn mapping_from_pairs(pairs: &[(&str, &str)]) -> HeaderMapping {
    HeaderMapping {
        entries: pairs
            .iter()
            .map(|(criterion, header)| HeaderEntry {
                criterion: criterion.to_string(),
                header: header.to_string(),
            })
            .collect(),
    }
}
