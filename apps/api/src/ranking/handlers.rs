use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::documents::{extract_document_text, DocumentKind};
use crate::errors::AppError;
use crate::ranking::criteria::{CriteriaPayload, CriteriaSet};
use crate::ranking::engine::{CandidateFailure, ResumeText};
use crate::ranking::headers::HeaderMapping;
use crate::ranking::sink::SinkReceipt;
use crate::state::AppState;

const SCORES_SAVED_MESSAGE: &str = "Scores are successfully generated and saved in csv file.";
const NO_VALID_RESUMES_MESSAGE: &str = "No valid resumes were processed successfully";
const INVALID_CRITERIA_MESSAGE: &str = "Invalid input JSON format for criteria!!";

/// One uploaded file, extension already checked.
struct Upload {
    file_name: String,
    kind: DocumentKind,
    data: Bytes,
}

impl Upload {
    fn new(file_name: String, data: Bytes) -> Result<Self, AppError> {
        let kind = DocumentKind::from_file_name(&file_name)?;
        Ok(Self {
            file_name,
            kind,
            data,
        })
    }
}

#[derive(Serialize)]
pub struct ScoreResponse {
    pub message: &'static str,
    pub batch_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub output: SinkReceipt,
    pub criteria_headers: HeaderMapping,
    pub ranking: Value,
    pub skipped: Vec<CandidateFailure>,
}

/// GET /
pub async fn handle_root() -> Json<Value> {
    Json(json!({ "message": "Welcome to Resume Ranker" }))
}

/// POST /extract-criteria
/// Multipart field `file`: a job description (.pdf or .docx).
pub async fn handle_extract_criteria(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CriteriaPayload>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name().map_or(true, |name| name != "file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some(Upload::new(file_name, data)?);
    }
    let upload = upload
        .ok_or_else(|| AppError::Validation("Missing multipart field 'file'".to_string()))?;

    let job_description = extract_document_text(upload.kind, upload.data).await?;
    info!(
        file = %upload.file_name,
        kind = %upload.kind,
        chars = job_description.len(),
        "Extracting criteria from job description"
    );

    let criteria = state
        .engine
        .extract_criteria(&job_description)
        .await
        .into_result()?;
    info!("Extracted {} criteria", criteria.len());

    Ok(Json(CriteriaPayload { criteria }))
}

/// POST /score-resumes
/// Multipart fields: repeated `files` (.pdf or .docx) and `criteria` = `{"criteria": [...]}`.
pub async fn handle_score_resumes(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ScoreResponse>, AppError> {
    let mut uploads = Vec::new();
    let mut raw_criteria = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                uploads.push(Upload::new(file_name, data)?);
            }
            "criteria" => raw_criteria = Some(field.text().await?),
            _ => {}
        }
    }

    let raw_criteria = raw_criteria
        .ok_or_else(|| AppError::Validation("Missing multipart field 'criteria'".to_string()))?;
    let criteria = serde_json::from_str::<CriteriaPayload>(&raw_criteria)
        .map_err(|_| AppError::Validation(INVALID_CRITERIA_MESSAGE.to_string()))?
        .criteria;
    if criteria.is_empty() {
        return Err(AppError::Validation(
            "Criteria list must not be empty".to_string(),
        ));
    }
    if uploads.is_empty() {
        return Err(AppError::Validation(
            "At least one résumé file is required".to_string(),
        ));
    }

    let batch_id = Uuid::new_v4();
    let span = info_span!("score_batch", %batch_id);
    run_batch(state, criteria, uploads, batch_id)
        .instrument(span)
        .await
        .map(Json)
}

async fn run_batch(
    state: AppState,
    criteria: CriteriaSet,
    uploads: Vec<Upload>,
    batch_id: Uuid,
) -> Result<ScoreResponse, AppError> {
    info!(
        criteria = criteria.len(),
        resumes = uploads.len(),
        "Scoring batch started"
    );
    let headers = state.engine.resolve_headers(&criteria).await.into_result()?;

    let mut resumes = Vec::with_capacity(uploads.len());
    let mut skipped = Vec::new();
    for upload in uploads {
        match extract_document_text(upload.kind, upload.data).await {
            Ok(text) => resumes.push(ResumeText {
                file_name: upload.file_name,
                text,
            }),
            Err(e) => {
                warn!(file = %upload.file_name, "Skipping unreadable résumé: {e}");
                skipped.push(CandidateFailure {
                    file_name: upload.file_name,
                    reason: e.to_string(),
                });
            }
        }
    }

    let headers = Arc::new(headers);
    let outcome = state
        .engine
        .score_batch(resumes, Arc::clone(&headers))
        .await;
    skipped.extend(outcome.failures);

    if outcome.table.is_empty() {
        return Err(AppError::UnprocessableEntity(
            NO_VALID_RESUMES_MESSAGE.to_string(),
        ));
    }

    let ranking =
        serde_json::to_value(outcome.table.ranking()).map_err(|e| AppError::Internal(e.into()))?;

    let sink = Arc::clone(&state.sink);
    let table = outcome.table;
    let output = tokio::task::spawn_blocking(move || sink.persist(&table))
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    let criteria_headers = Arc::try_unwrap(headers).unwrap_or_else(|shared| (*shared).clone());

    Ok(ScoreResponse {
        message: SCORES_SAVED_MESSAGE,
        batch_id,
        generated_at: Utc::now(),
        output,
        criteria_headers,
        ranking,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::tests::sample_config;
    use crate::documents::build_docx;
    use crate::llm_client::testing::{FnBackend, ScriptedBackend};
    use crate::llm_client::{GenerationBackend, LlmError};
    use crate::ranking::engine::RankingEngine;
    use crate::ranking::prompts::PromptTemplates;
    use crate::ranking::sink::CsvFileSink;
    use crate::routes::build_router;

    const BOUNDARY: &str = "ranker-test-boundary";
    const CRITERIA: &str =
        r#"{"criteria": ["5+ years Python", "Strong communication skills"]}"#;

    enum Part<'a> {
        File(&'a str, &'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::File(name, file_name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn app(backend: Arc<dyn GenerationBackend>, csv_path: &std::path::Path) -> Router {
        let config = sample_config();
        let engine = RankingEngine::new(
            backend,
            Arc::new(PromptTemplates::default()),
            config.budgets,
            config.scoring_concurrency,
        );
        build_router(AppState {
            engine,
            sink: Arc::new(CsvFileSink::new(csv_path)),
            config,
        })
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Answers the header prompt, then scores résumés by an embedded marker.
    fn pipeline_reply(instruction: &str) -> Result<String, LlmError> {
        let reply = if instruction.contains("\"criteria_headers\"") {
            r#"{"criteria_headers": {
                "5+ years Python": "Python Experience",
                "Strong communication skills": "Communication Skills"
            }}"#
        } else if instruction.contains("MARKER-ALICE") {
            r#"{"Candidate Name": "Alice", "Python Experience": 5, "Communication Skills": 2}"#
        } else if instruction.contains("MARKER-BOB") {
            r#"{"Candidate Name": "Bob", "Python Experience": 1, "Communication Skills": 3}"#
        } else {
            "no idea"
        };
        Ok(reply.to_string())
    }

    #[tokio::test]
    async fn test_root_returns_welcome_message() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(ScriptedBackend::new(Vec::<String>::new())), &dir.path().join("s.csv"));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"message": "Welcome to Resume Ranker"})
        );
    }

    #[tokio::test]
    async fn test_invalid_extension_rejected_before_any_generation() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::repeating("{}"));
        let app = app(backend.clone(), &dir.path().join("s.csv"));

        let request = multipart_request(
            "/score-resumes",
            &[
                Part::File("files", "resume.txt", b"plain text"),
                Part::Text("criteria", CRITERIA),
            ],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNSUPPORTED_FILE");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("resume.txt has invalid extension"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_criteria_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(ScriptedBackend::repeating("{}")), &dir.path().join("s.csv"));
        let resume = build_docx(&["MARKER-ALICE"]);

        for criteria in ["not json", r#"{"criteria": []}"#, r#"{"items": ["x"]}"#] {
            let request = multipart_request(
                "/score-resumes",
                &[
                    Part::File("files", "alice.docx", &resume),
                    Part::Text("criteria", criteria),
                ],
            );
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "criteria: {criteria}");
        }
    }

    #[tokio::test]
    async fn test_score_resumes_ranks_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("scores.csv");
        let app = app(Arc::new(FnBackend(pipeline_reply)), &csv_path);

        let bob = build_docx(&["MARKER-BOB", "Support engineer"]);
        let alice = build_docx(&["MARKER-ALICE", "Senior Python engineer"]);
        let request = multipart_request(
            "/score-resumes",
            &[
                Part::Text("criteria", CRITERIA),
                Part::File("files", "bob.docx", &bob),
                Part::File("files", "alice.DOCX", &alice),
                Part::File("files", "broken.pdf", b"not a pdf"),
            ],
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["message"], SCORES_SAVED_MESSAGE);
        assert_eq!(
            body["criteria_headers"],
            json!({
                "5+ years Python": "Python Experience",
                "Strong communication skills": "Communication Skills"
            })
        );
        assert_eq!(body["ranking"][0]["Candidate Name"], "Alice");
        assert_eq!(body["ranking"][0]["Total Score"], 7);
        assert_eq!(body["ranking"][1]["Candidate Name"], "Bob");
        assert_eq!(body["skipped"][0]["file_name"], "broken.pdf");
        assert_eq!(body["output"]["rows"], 2);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("Candidate Name,Python Experience,Communication Skills,Total Score"));
    }

    #[tokio::test]
    async fn test_all_resumes_skipped_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("scores.csv");
        let app = app(Arc::new(FnBackend(pipeline_reply)), &csv_path);

        let unknown = build_docx(&["Nobody in particular"]);
        let request = multipart_request(
            "/score-resumes",
            &[
                Part::Text("criteria", CRITERIA),
                Part::File("files", "unknown.docx", &unknown),
            ],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!csv_path.exists());
    }

    #[tokio::test]
    async fn test_header_failure_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::repeating(r#"{"criteria_headers": {}}"#));
        let app = app(backend.clone(), &dir.path().join("s.csv"));
        let resume = build_docx(&["MARKER-ALICE"]);

        let request = multipart_request(
            "/score-resumes",
            &[
                Part::File("files", "alice.docx", &resume),
                Part::Text("criteria", CRITERIA),
            ],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "GENERATION_FAILED");
        assert_eq!(
            body["error"]["message"],
            "Failed to generate criteria headers, please try again!!"
        );
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_extract_criteria_returns_criteria() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new([
            "not json",
            r#"{"criteria": ["5+ years Python", "5+ years Python", "AWS certification"]}"#,
        ]));
        let app = app(backend.clone(), &dir.path().join("s.csv"));
        let job = build_docx(&["Backend Engineer", "Required: 5+ years Python, AWS certification"]);

        let request = multipart_request("/extract-criteria", &[Part::File("file", "job.docx", &job)]);
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"criteria": ["5+ years Python", "AWS certification"]})
        );
        assert!(backend.instructions()[0].contains("Required: 5+ years Python"));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_extract_criteria_without_file_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(ScriptedBackend::repeating("{}")), &dir.path().join("s.csv"));

        let request = multipart_request("/extract-criteria", &[Part::Text("note", "hello")]);
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
