//! Criteria extraction: turns a job description into an ordered Criteria Set.

use serde::{Deserialize, Serialize};

use crate::ranking::harness::{GenerationContract, Stage, Violation};
use crate::ranking::prompts::render;

/// Ordered, duplicate-free criteria extracted from one job description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CriteriaSet(Vec<String>);

impl CriteriaSet {
    /// Keeps the first occurrence of each criterion; text is kept verbatim.
    pub fn new(criteria: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            if !unique.contains(&criterion) {
                unique.push(criterion);
            }
        }
        Self(unique)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for CriteriaSet {
    fn from(criteria: Vec<String>) -> Self {
        Self::new(criteria)
    }
}

impl From<CriteriaSet> for Vec<String> {
    fn from(set: CriteriaSet) -> Self {
        set.0
    }
}

/// Wire shape shared by the model response and the HTTP API: `{"criteria": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaPayload {
    pub criteria: CriteriaSet,
}

/// Contract for the extraction stage. Only the JSON shape is checked; the content of
/// each criterion cannot be verified mechanically.
pub struct CriteriaContract<'a> {
    pub template: &'a str,
    pub job_description: &'a str,
}

impl GenerationContract for CriteriaContract<'_> {
    type Parsed = CriteriaPayload;
    type Output = CriteriaSet;

    fn stage(&self) -> Stage {
        Stage::Criteria
    }

    fn instruction(&self, correction: &str) -> String {
        render(
            self.template,
            &[("content", self.job_description), ("correction", correction)],
        )
    }

    fn validate(&self, parsed: CriteriaPayload) -> Result<CriteriaSet, Violation> {
        Ok(parsed.criteria)
    }
}
