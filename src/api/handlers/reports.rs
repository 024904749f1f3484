use crate::api::error::AppError;
use crate::entities::*;
use crate::services::report_service::ReportService;
use crate::utils::auth::Claims;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize)]
pub struct ListReportsQuery {
    #[serde(default)]
    pub archived: bool,
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisSummary {
    pub id: String,
    #[serde(rename = "structuralScore")]
    pub structural_score: i32,
    #[serde(rename = "formattingScore")]
    pub formatting_score: i32,
    #[serde(rename = "grammarScore")]
    pub grammar_score: i32,
    #[serde(rename = "overallScore")]
    pub overall_score: i32,
    pub violations: serde_json::Value,
    pub suggestions: serde_json::Value,
}

#[derive(Serialize, ToSchema)]
pub struct ReportSummary {
    pub id: String,
    pub filename: String,
    pub status: reports::ReportStatus,
    #[serde(rename = "isArchived")]
    pub is_archived: bool,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub analysis: Option<AnalysisSummary>,
}

#[derive(Serialize, ToSchema)]
pub struct ListReportsResponse {
    pub reports: Vec<ReportSummary>,
}

#[derive(Deserialize, ToSchema)]
pub struct ArchiveRequest {
    /// "archive" or "unarchive"; anything else unarchives, as a plain boolean
    /// toggle would.
    pub action: String,
}

#[derive(Serialize, ToSchema)]
pub struct ArchiveResponse {
    pub success: bool,
    pub report: reports::Model,
}

fn summarize(report: reports::Model, analysis: Option<analyses::Model>) -> ReportSummary {
    ReportSummary {
        id: report.id,
        filename: report.filename,
        status: report.status,
        is_archived: report.is_archived,
        uploaded_at: report.uploaded_at,
        analysis: analysis.map(|a| AnalysisSummary {
            id: a.id,
            structural_score: a.structural_score,
            formatting_score: a.formatting_score,
            grammar_score: a.grammar_score,
            overall_score: a.overall_score,
            // Stored as JSON text; decode so clients get arrays, not strings
            violations: serde_json::from_str(&a.violations)
                .unwrap_or(serde_json::Value::Array(vec![])),
            suggestions: serde_json::from_str(&a.suggestions)
                .unwrap_or(serde_json::Value::Array(vec![])),
        }),
    }
}

#[utoipa::path(
    get,
    path = "/api/reports",
    params(("archived" = Option<bool>, Query, description = "List archived instead of active reports")),
    responses(
        (status = 200, description = "Ten most recent reports", body = ListReportsResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("jwt" = []))
)]
pub async fn list_reports(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListReportsQuery>,
) -> Result<Json<ListReportsResponse>, AppError> {
    let rows = ReportService::new(state.db.clone())
        .list_recent(&claims.sub, query.archived)
        .await?;

    let reports = rows
        .into_iter()
        .map(|(report, analysis)| summarize(report, analysis))
        .collect();

    Ok(Json(ListReportsResponse { reports }))
}

#[utoipa::path(
    post,
    path = "/api/reports/{id}/archive",
    request_body = ArchiveRequest,
    params(("id" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Archive flag updated", body = ArchiveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Report not owned by the caller")
    ),
    security(("jwt" = []))
)]
pub async fn archive_report(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<ArchiveRequest>,
) -> Result<Json<ArchiveResponse>, AppError> {
    let archived = payload.action == "archive";

    let report = ReportService::new(state.db.clone())
        .set_archived(&claims.sub, &id, archived)
        .await?;

    Ok(Json(ArchiveResponse {
        success: true,
        report,
    }))
}
