//! Ranking engine: runs the three validated stages against one generation backend.
//!
//! Flow: extract_criteria → resolve_headers → score_batch (bounded concurrency) → ranked table.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::AttemptBudgets;
use crate::llm_client::GenerationBackend;
use crate::ranking::criteria::{CriteriaContract, CriteriaSet};
use crate::ranking::harness::{generate_validated, Generated};
use crate::ranking::headers::{HeaderMapping, HeadersContract};
use crate::ranking::prompts::PromptTemplates;
use crate::ranking::scorer::{CandidateRecord, ScoringContract};
use crate::ranking::table::ScoreTable;

/// Extracted text of one uploaded résumé.
#[derive(Debug, Clone)]
pub struct ResumeText {
    pub file_name: String,
    pub text: String,
}

/// A résumé left out of the ranking, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct BatchOutcome {
    /// Accepted records, already ranked.
    pub table: ScoreTable,
    pub failures: Vec<CandidateFailure>,
}

#[derive(Clone)]
pub struct RankingEngine {
    backend: Arc<dyn GenerationBackend>,
    prompts: Arc<PromptTemplates>,
    budgets: AttemptBudgets,
    scoring_concurrency: usize,
}

impl RankingEngine {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        prompts: Arc<PromptTemplates>,
        budgets: AttemptBudgets,
        scoring_concurrency: usize,
    ) -> Self {
        Self {
            backend,
            prompts,
            budgets,
            scoring_concurrency: scoring_concurrency.max(1),
        }
    }

    pub async fn extract_criteria(&self, job_description: &str) -> Generated<CriteriaSet> {
        let contract = CriteriaContract {
            template: &self.prompts.criteria,
            job_description,
        };
        generate_validated(self.backend.as_ref(), &contract, self.budgets.criteria).await
    }

    pub async fn resolve_headers(&self, criteria: &CriteriaSet) -> Generated<HeaderMapping> {
        let contract = HeadersContract {
            template: &self.prompts.headers,
            criteria,
        };
        generate_validated(self.backend.as_ref(), &contract, self.budgets.headers).await
    }

    pub async fn score_resume(
        &self,
        resume_text: &str,
        headers: &HeaderMapping,
    ) -> Generated<CandidateRecord> {
        let contract = ScoringContract {
            template: &self.prompts.scoring,
            resume_text,
            headers,
        };
        generate_validated(self.backend.as_ref(), &contract, self.budgets.scoring).await
    }

    /// Scores every résumé with at most `scoring_concurrency` in flight.
    ///
    /// Records enter the table in upload order before ranking, so ties never depend on
    /// completion order. A résumé whose scoring is exhausted is reported in `failures`.
    pub async fn score_batch(
        &self,
        resumes: Vec<ResumeText>,
        headers: Arc<HeaderMapping>,
    ) -> BatchOutcome {
        let total = resumes.len();
        let permits = Arc::new(Semaphore::new(self.scoring_concurrency));
        let mut tasks = JoinSet::new();

        for (index, resume) in resumes.into_iter().enumerate() {
            let engine = self.clone();
            let headers = Arc::clone(&headers);
            let permits = Arc::clone(&permits);
            let span = info_span!("score_resume", file = %resume.file_name);

            tasks.spawn(
                async move {
                    let _permit = permits.acquire_owned().await.ok();
                    let outcome = engine.score_resume(&resume.text, &headers).await;
                    (index, resume.file_name, outcome)
                }
                .instrument(span),
            );
        }

        let mut finished = Vec::with_capacity(total);
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => finished.push(result),
                Err(e) => {
                    error!("Scoring task failed: {e}");
                    failures.push(CandidateFailure {
                        file_name: "<unknown>".to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        finished.sort_by_key(|(index, _, _)| *index);

        let mut table = ScoreTable::new(headers.columns());
        for (_, file_name, outcome) in finished {
            match outcome.into_result() {
                Ok(record) => table.push(&record),
                Err(exhaustion) => {
                    warn!(
                        file = %file_name,
                        attempts = exhaustion.attempts,
                        "Skipping résumé: {}",
                        exhaustion.last_failure
                    );
                    failures.push(CandidateFailure {
                        file_name,
                        reason: exhaustion.message().to_string(),
                    });
                }
            }
        }

        info!(
            scored = table.len(),
            skipped = failures.len(),
            "Scored {total} résumés"
        );
        BatchOutcome {
            table: table.rank(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::llm_client::testing::{FnBackend, ScriptedBackend};
    use crate::llm_client::LlmError;
    use crate::ranking::harness::Stage;
    use crate::ranking::headers::mapping_from_pairs;

    fn engine(backend: impl GenerationBackend + 'static, concurrency: usize) -> RankingEngine {
        RankingEngine::new(
            Arc::new(backend),
            Arc::new(PromptTemplates::default()),
            AttemptBudgets::default(),
            concurrency,
        )
    }

    fn mapping() -> Arc<HeaderMapping> {
        Arc::new(mapping_from_pairs(&[
            ("5+ years Python", "Python Experience"),
            ("Strong communication skills", "Communication Skills"),
        ]))
    }

    fn resume(file_name: &str, text: &str) -> ResumeText {
        ResumeText {
            file_name: file_name.to_string(),
            text: text.to_string(),
        }
    }

    /// Scores by résumé marker embedded in the instruction.
    fn scoring_reply(instruction: &str) -> Result<String, LlmError> {
        let reply = if instruction.contains("MARKER-ALICE") {
            r#"{"Candidate Name": "Alice", "Python Experience": 5, "Communication Skills": 2}"#
        } else if instruction.contains("MARKER-BOB") {
            r#"{"Candidate Name": "Bob", "Python Experience": 1, "Communication Skills": 3}"#
        } else if instruction.contains("MARKER-CARA") {
            r#"{"Candidate Name": "Cara", "Python Experience": 2, "Communication Skills": 2}"#
        } else {
            "sorry, no JSON today"
        };
        Ok(reply.to_string())
    }

    #[tokio::test]
    async fn test_extract_then_resolve_headers() {
        let backend = ScriptedBackend::new([
            r#"{"criteria": ["5+ years Python", "Strong communication skills"]}"#,
            r#"{"criteria_headers": {
                "5+ years Python": "Python Experience",
                "Strong communication skills": "Communication Skills"
            }}"#,
        ]);
        let engine = engine(backend, 2);

        let criteria = engine
            .extract_criteria("Backend engineer with Python")
            .await
            .into_result()
            .unwrap();
        assert_eq!(criteria.len(), 2);

        let mapping = engine
            .resolve_headers(&criteria)
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            mapping.columns(),
            ["Python Experience", "Communication Skills"]
        );
    }

    #[tokio::test]
    async fn test_headers_stage_exhaustion_is_reported() {
        let engine = engine(ScriptedBackend::repeating(r#"{"criteria_headers": {}}"#), 2);
        let criteria = CriteriaSet::new(vec!["5+ years Python".to_string()]);

        let exhaustion = engine
            .resolve_headers(&criteria)
            .await
            .into_result()
            .unwrap_err();
        assert_eq!(exhaustion.stage, Stage::Headers);
        assert_eq!(exhaustion.attempts, AttemptBudgets::default().headers);
    }

    #[tokio::test]
    async fn test_batch_ranks_by_total_and_skips_failures() {
        let engine = engine(FnBackend(scoring_reply), 3);
        let outcome = engine
            .score_batch(
                vec![
                    resume("bob.pdf", "MARKER-BOB"),
                    resume("broken.docx", "unreadable"),
                    resume("alice.pdf", "MARKER-ALICE"),
                ],
                mapping(),
            )
            .await;

        let rows = outcome.table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Alice");
        assert_eq!(rows[0].total, 7);
        assert_eq!(rows[1].name, "Bob");
        assert_eq!(rows[1].total, 4);

        assert_eq!(
            outcome.failures,
            vec![CandidateFailure {
                file_name: "broken.docx".to_string(),
                reason: Stage::Scores.failure_message().to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_ties_follow_upload_order() {
        let engine = engine(FnBackend(scoring_reply), 4);
        let outcome = engine
            .score_batch(
                vec![
                    resume("cara.pdf", "MARKER-CARA"),
                    resume("bob.pdf", "MARKER-BOB"),
                ],
                mapping(),
            )
            .await;

        let names: Vec<_> = outcome.table.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Cara", "Bob"]);
    }

    #[tokio::test]
    async fn test_empty_batch_yields_empty_table() {
        let engine = engine(FnBackend(scoring_reply), 2);
        let outcome = engine.score_batch(Vec::new(), mapping()).await;

        assert!(outcome.table.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(
            outcome.table.columns(),
            ["Python Experience", "Communication Skills"]
        );
    }

    /// Tracks the highest number of overlapping calls.
    struct SlowBackend {
        in_flight: AtomicUsize,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GenerationBackend for SlowBackend {
        async fn generate(&self, _instruction: &str) -> Result<String, LlmError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(
                r#"{"Candidate Name": "Sam", "Python Experience": 3, "Communication Skills": 3}"#
                    .to_string(),
            )
        }
    }

    #[tokio::test]
    async fn test_scoring_concurrency_is_bounded() {
        let peak = Arc::new(AtomicUsize::new(0));
        let backend = SlowBackend {
            in_flight: AtomicUsize::new(0),
            peak: Arc::clone(&peak),
        };
        let engine = engine(backend, 2);
        let resumes = (0..6)
            .map(|i| resume(&format!("r{i}.pdf"), "text"))
            .collect();

        let outcome = engine.score_batch(resumes, mapping()).await;

        assert_eq!(outcome.table.len(), 6);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency was {peak}");
        assert!(peak >= 1);
    }
}
