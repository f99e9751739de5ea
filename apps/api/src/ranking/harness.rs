//! Validated-generation harness: the shared ask → parse → validate → correct loop.
//!
//! Each stage describes itself as a [`GenerationContract`]: how to build the instruction
//! for a given correction context, what JSON shape to parse, and how to validate the
//! parsed value. [`generate_validated`] drives the attempts and never fails outward:
//! it returns either the accepted value or an [`Exhaustion`] sentinel.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::llm_client::{strip_json_fences, GenerationBackend, LlmError};

/// Correction sent after a response that is not valid JSON of the expected shape.
pub const INVALID_JSON_CORRECTION: &str = "In the previous attempt you did not return a valid \
    JSON response in the required format. Return only a JSON object that follows the format \
    described above exactly.";

/// The pipeline stage a contract belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Criteria,
    Headers,
    Scores,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Criteria => "criteria",
            Stage::Headers => "headers",
            Stage::Scores => "scores",
        }
    }

    /// User-facing message reported when the stage exhausts its attempts.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Stage::Criteria => "Failed to generate a response, please try again!!",
            Stage::Headers => "Failed to generate criteria headers, please try again!!",
            Stage::Scores => "Failed to generate scores, please try again!!",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Fewer or more keys than required.
    MissingEntries,
    /// Right count, wrong key text.
    KeyMismatch,
    /// Two criteria were given the same header.
    DuplicateHeaders,
    /// A header takes the name of a fixed table column.
    ReservedHeader,
    /// A value has the wrong type or is out of range.
    InvalidValue,
}

/// A contract violation: what went wrong and the correction to send next time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: String,
    pub correction: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, detail: impl Into<String>, correction: &str) -> Self {
        Self {
            kind,
            detail: detail.into(),
            correction: correction.to_string(),
        }
    }
}

/// One stage's request/response contract.
pub trait GenerationContract {
    /// The JSON shape the raw response must deserialize into.
    type Parsed: DeserializeOwned;
    /// The accepted value handed back to the caller.
    type Output;

    fn stage(&self) -> Stage;

    /// Builds the full instruction text. `correction` is empty on the first attempt.
    fn instruction(&self, correction: &str) -> String;

    /// Checks the parsed value against the contract and converts it on success.
    fn validate(&self, parsed: Self::Parsed) -> Result<Self::Output, Violation>;
}

/// What a single attempt produced.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Accepted(T),
    /// The generation client gave no usable response.
    Unavailable(LlmError),
    /// The response was not JSON of the expected shape.
    Malformed(serde_json::Error),
    Violated(Violation),
}

/// Sentinel returned when a stage runs out of attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exhaustion {
    pub stage: Stage,
    pub attempts: u32,
    pub last_failure: String,
}

impl Exhaustion {
    pub fn message(&self) -> &'static str {
        self.stage.failure_message()
    }
}

/// Result of a validated generation: the accepted value or the stage's error sentinel.
#[derive(Debug)]
pub enum Generated<T> {
    Accepted { value: T, attempts: u32 },
    Exhausted(Exhaustion),
}

impl<T> Generated<T> {
    #[cfg(test)]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Generated::Accepted { .. })
    }

    pub fn into_result(self) -> Result<T, Exhaustion> {
        match self {
            Generated::Accepted { value, .. } => Ok(value),
            Generated::Exhausted(exhaustion) => Err(exhaustion),
        }
    }
}

/// Parses and validates one raw response. Pure; no backend involved.
pub fn evaluate<C>(contract: &C, raw: &str) -> AttemptOutcome<C::Output>
where
    C: GenerationContract + ?Sized,
{
    match serde_json::from_str::<C::Parsed>(strip_json_fences(raw)) {
        Ok(parsed) => match contract.validate(parsed) {
            Ok(value) => AttemptOutcome::Accepted(value),
            Err(violation) => AttemptOutcome::Violated(violation),
        },
        Err(e) => AttemptOutcome::Malformed(e),
    }
}

/// Runs up to `max_attempts` generate/validate rounds for `contract`.
///
/// Exactly one backend call is made per attempt. A failed attempt sets the correction
/// context for the next one; a transport failure leaves it unchanged.
pub async fn generate_validated<C>(
    backend: &dyn GenerationBackend,
    contract: &C,
    max_attempts: u32,
) -> Generated<C::Output>
where
    C: GenerationContract + ?Sized,
{
    let stage = contract.stage();
    let mut correction = String::new();
    let mut last_failure = String::from("no attempts were made");

    for attempt in 1..=max_attempts {
        let instruction = contract.instruction(&correction);
        debug!(stage = %stage, attempt, %instruction, "Sending instruction");

        let outcome = match backend.generate(&instruction).await {
            Ok(raw) => {
                debug!(stage = %stage, attempt, raw_response = %raw, "Received response");
                evaluate(contract, &raw)
            }
            Err(e) => AttemptOutcome::Unavailable(e),
        };

        match outcome {
            AttemptOutcome::Accepted(value) => {
                info!(stage = %stage, attempt, "Response accepted");
                return Generated::Accepted {
                    value,
                    attempts: attempt,
                };
            }
            AttemptOutcome::Unavailable(e) => {
                warn!(stage = %stage, attempt, max_attempts, "No usable response: {e}");
                last_failure = format!("no usable response: {e}");
            }
            AttemptOutcome::Malformed(e) => {
                warn!(stage = %stage, attempt, max_attempts, "Invalid JSON response: {e}");
                last_failure = format!("invalid JSON: {e}");
                correction = INVALID_JSON_CORRECTION.to_string();
            }
            AttemptOutcome::Violated(violation) => {
                warn!(
                    stage = %stage,
                    attempt,
                    max_attempts,
                    kind = ?violation.kind,
                    "Contract violation: {}",
                    violation.detail
                );
                last_failure = violation.detail;
                correction = violation.correction;
            }
        }
    }

    warn!(stage = %stage, max_attempts, "Attempts exhausted: {last_failure}");
    Generated::Exhausted(Exhaustion {
        stage,
        attempts: max_attempts,
        last_failure,
    })
}
