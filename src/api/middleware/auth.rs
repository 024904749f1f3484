use crate::api::error::AppError;
use crate::utils::auth::validate_jwt;
use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

/// Shared JWT signing secret.
///
/// The "secret" default exists for local development only; deployments set
/// JWT_SECRET.
pub fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string())
}

/// Bearer-token guard. Validated claims are inserted as a request extension
/// for handlers to read.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = validate_jwt(token, &jwt_secret()).map_err(|_| AppError::Unauthorized)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
