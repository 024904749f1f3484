use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::models::{Issue, IssueKind, Severity};
use crate::services::analyzer::AnalysisService;
use crate::services::extractor::{extract_text, MIN_EXTRACTED_CHARS};
use crate::services::report_service::{ReportService, UploadMeta};
use crate::services::scoring::overall_score;
use crate::utils::auth::Claims;
use crate::utils::validation::validate_upload;
use axum::{
    extract::{Multipart, State},
    Extension, Json,
};
use sea_orm::EntityTrait;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ScoreBreakdown {
    pub structural: i32,
    pub formatting: i32,
    pub grammar: i32,
    pub overall: i32,
}

#[derive(Serialize, ToSchema)]
pub struct Violation {
    pub id: String,
    pub title: IssueKind,
    pub description: String,
    pub severity: Severity,
    pub category: IssueKind,
}

#[derive(Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(rename = "analysisId")]
    pub analysis_id: String,
    pub status: reports::ReportStatus,
    pub scores: ScoreBreakdown,
    pub violations: Vec<Violation>,
    pub suggestions: Vec<String>,
}

fn to_violations(issues: &[Issue]) -> Vec<Violation> {
    issues
        .iter()
        .enumerate()
        .map(|(idx, issue)| Violation {
            id: format!("v_{}", idx),
            title: issue.kind,
            description: issue.description.clone(),
            severity: issue.severity,
            category: issue.kind,
        })
        .collect()
}

#[utoipa::path(
    post,
    path = "/api/analyze",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Report analyzed and persisted", body = AnalyzeResponse),
        (status = 400, description = "Missing file, unsupported type, or unreadable content"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large")
    ),
    security(("jwt" = []))
)]
pub async fn analyze_report(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    // Resolve the user up front so a dangling token cannot create orphan rows.
    let user = Users::find_by_id(&claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut upload: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::BadRequest(format!("Invalid multipart payload: {}", e))
        }
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("report").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge
            } else {
                AppError::BadRequest(format!("Failed to read file field: {}", e))
            }
        })?;

        upload = Some((filename, mime_type, bytes.to_vec()));
        break;
    }

    let (filename, mime_type, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let sanitized_filename = validate_upload(
        &filename,
        Some(&mime_type),
        bytes.len(),
        &bytes[..bytes.len().min(8)],
        state.config.max_file_size,
    )
    .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let text = extract_text(&bytes, &mime_type)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    tracing::info!(
        filename = %sanitized_filename,
        chars = text.len(),
        "Extracted text from upload"
    );

    if text.chars().count() < MIN_EXTRACTED_CHARS {
        return Err(AppError::BadRequest(
            "Could not extract sufficient text from file.".to_string(),
        ));
    }

    let findings = AnalysisService::new(state.ai.clone(), state.config.clone())
        .analyze(&text)
        .await;

    let overall = overall_score(
        findings.structural_score,
        findings.formatting_score,
        findings.grammar_score,
    );

    let saved = ReportService::new(state.db.clone())
        .save_analysis(
            &user.id,
            UploadMeta {
                filename: sanitized_filename,
                mime_type,
                size_bytes: bytes.len() as i64,
            },
            &findings,
            overall,
            &text,
        )
        .await?;

    Ok(Json(AnalyzeResponse {
        success: true,
        analysis_id: saved.analysis.id,
        status: saved.report.status,
        scores: ScoreBreakdown {
            structural: findings.structural_score,
            formatting: findings.formatting_score,
            grammar: findings.grammar_score,
            overall,
        },
        violations: to_violations(&findings.issues),
        suggestions: findings.suggestion_texts(),
    }))
}
