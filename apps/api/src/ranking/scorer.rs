//! Résumé scoring: one Candidate Record per résumé, keyed by the mapping's headers.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ranking::harness::{GenerationContract, Stage, Violation, ViolationKind};
use crate::ranking::headers::HeaderMapping;
use crate::ranking::keys::{same_key_set, KeySetDiff};
use crate::ranking::prompts::render;

/// Key carrying the candidate's name in the scoring response.
pub const CANDIDATE_NAME_KEY: &str = "Candidate Name";
pub const MAX_SCORE: u64 = 5;

pub const MISSING_SCORES_CORRECTION: &str = "In the previous attempt you left out some of the \
    criteria. A candidate must be evaluated on every criterion, no matter what; follow the rules.";

pub const HEADER_MISMATCH_CORRECTION: &str = "In the previous attempt you returned a score for \
    each criterion, but some keys did not match the provided criteria headers. Use every header \
    exactly as it was given.";

pub const INVALID_SCORE_CORRECTION: &str = "In the previous attempt some values were invalid. \
    \"Candidate Name\" must be the non-empty name of the candidate and every \
    score must be a whole number from 0 to 5.";

/// A scored résumé: candidate name plus one score per header, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateRecord {
    pub name: String,
    pub scores: Vec<(String, u8)>,
}

impl CandidateRecord {
    pub fn score(&self, header: &str) -> Option<u8> {
        self.scores
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, score)| *score)
    }

    pub fn total(&self) -> u32 {
        self.scores.iter().map(|(_, score)| u32::from(*score)).sum()
    }
}

pub struct ScoringContract<'a> {
    pub template: &'a str,
    pub resume_text: &'a str,
    pub headers: &'a HeaderMapping,
}

impl GenerationContract for ScoringContract<'_> {
    type Parsed = Map<String, Value>;
    type Output = CandidateRecord;

    fn stage(&self) -> Stage {
        Stage::Scores
    }

    fn instruction(&self, correction: &str) -> String {
        let headers_json = self.headers.to_prompt_json();
        render(
            self.template,
            &[
                ("content", self.resume_text),
                ("criteria_headers", &headers_json),
                ("correction", correction),
            ],
        )
    }

    fn validate(&self, parsed: Map<String, Value>) -> Result<CandidateRecord, Violation> {
        validate_scores(self.headers, &parsed)
    }
}

/// Checks a returned score object against the header mapping and builds the record.
pub fn validate_scores(
    headers: &HeaderMapping,
    returned: &Map<String, Value>,
) -> Result<CandidateRecord, Violation> {
    // Completeness: every header plus the name key.
    if returned.len() != headers.len() + 1 {
        return Err(Violation::new(
            ViolationKind::MissingEntries,
            format!(
                "expected {} scores plus a name, got {} keys",
                headers.len(),
                returned.len()
            ),
            MISSING_SCORES_CORRECTION,
        ));
    }

    let score_keys = returned
        .keys()
        .map(String::as_str)
        .filter(|k| *k != CANDIDATE_NAME_KEY);
    if !same_key_set(score_keys.clone(), headers.headers()) {
        let diff = KeySetDiff::between(score_keys, headers.headers());
        return Err(Violation::new(
            ViolationKind::KeyMismatch,
            format!("returned headers do not match input: {}", diff.describe()),
            HEADER_MISMATCH_CORRECTION,
        ));
    }

    let name = match returned.get(CANDIDATE_NAME_KEY) {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        other => {
            return Err(Violation::new(
                ViolationKind::InvalidValue,
                format!("candidate name is not a non-empty string: {other:?}"),
                INVALID_SCORE_CORRECTION,
            ))
        }
    };

    let mut scores = Vec::with_capacity(headers.len());
    for header in headers.headers() {
        let score = returned
            .get(header)
            .and_then(Value::as_u64)
            .filter(|score| *score <= MAX_SCORE);
        match score {
            Some(score) => scores.push((header.to_string(), score as u8)),
            None => {
                return Err(Violation::new(
                    ViolationKind::InvalidValue,
                    format!(
                        "score for '{header}' is not a whole number in 0..={MAX_SCORE}: {:?}",
                        returned.get(header)
                    ),
                    INVALID_SCORE_CORRECTION,
                ))
            }
        }
    }

    Ok(CandidateRecord { name, scores })
}
