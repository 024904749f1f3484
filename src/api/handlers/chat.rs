use crate::api::error::AppError;
use crate::services::ai::ChatTurn;
use crate::services::chat::ChatService;
use crate::utils::auth::Claims;
use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    /// When present, the answer is grounded in that report's extracted text.
    #[serde(rename = "reportId")]
    pub report_id: Option<String>,
    pub message: Option<String>,
    /// Prior turns, used only for report-free guideline chat.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub answer: String,
}

#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Missing message"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Report or analysis context not found")
    ),
    security(("jwt" = []))
)]
pub async fn chat(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = payload
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest("Message is required".to_string()))?;

    let service = ChatService::new(state.db.clone(), state.ai.clone(), state.config.clone());

    let answer = match payload.report_id.as_deref() {
        Some(report_id) => {
            service
                .ask_about_report(&claims.sub, report_id, message)
                .await?
        }
        None => service.ask_general(&payload.history, message).await?,
    };

    Ok(Json(ChatResponse { answer }))
}
