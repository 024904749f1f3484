pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::ai::AiClient;
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::analyze::analyze_report,
        api::handlers::chat::chat,
        api::handlers::reports::list_reports,
        api::handlers::reports::archive_report,
    ),
    components(
        schemas(
            api::handlers::auth::RegisterRequest,
            api::handlers::auth::LoginRequest,
            api::handlers::auth::AuthResponse,
            api::handlers::analyze::AnalyzeResponse,
            api::handlers::analyze::ScoreBreakdown,
            api::handlers::analyze::Violation,
            api::handlers::chat::ChatRequest,
            api::handlers::chat::ChatResponse,
            api::handlers::reports::ListReportsResponse,
            api::handlers::reports::ReportSummary,
            api::handlers::reports::AnalysisSummary,
            api::handlers::reports::ArchiveRequest,
            api::handlers::reports::ArchiveResponse,
            entities::reports::Model,
            entities::reports::ReportStatus,
            models::Issue,
            models::IssueKind,
            models::Severity,
            services::ai::ChatTurn,
            services::ai::TurnRole,
        )
    ),
    tags(
        (name = "auth", description = "Authentication endpoints"),
        (name = "analysis", description = "Report upload and compliance analysis"),
        (name = "chat", description = "Report Q&A assistant")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub ai: Arc<dyn AiClient>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/register", post(api::handlers::auth::register))
        .route("/login", post(api::handlers::auth::login))
        .route(
            "/api/analyze",
            post(api::handlers::analyze::analyze_report)
                .layer(from_fn(api::middleware::auth::require_auth)),
        )
        .route(
            "/api/chat",
            post(api::handlers::chat::chat).layer(from_fn(api::middleware::auth::require_auth)),
        )
        .route(
            "/api/reports",
            get(api::handlers::reports::list_reports)
                .layer(from_fn(api::middleware::auth::require_auth)),
        )
        .route(
            "/api/reports/:id/archive",
            post(api::handlers::reports::archive_report)
                .layer(from_fn(api::middleware::auth::require_auth)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/api/analyze"));
        assert!(json.contains("/api/chat"));
        assert!(json.contains("/api/reports"));
        assert!(json.contains("multipart/form-data"));
    }
}
