//! Résumé ranking: criteria extraction, header resolution and scoring, each driven
//! through the validated-generation harness, then aggregated into a ranked table.

pub mod criteria;
pub mod engine;
pub mod handlers;
pub mod harness;
pub mod headers;
pub mod keys;
pub mod prompts;
pub mod scorer;
pub mod sink;
pub mod table;
