use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{AppState, error::AppError, utils::success_to_api_response};

use super::model;

#[derive(Debug, Deserialize)]
pub struct SendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[axum::debug_handler]
pub async fn send_verification(
    State(state): State<AppState>,
    Json(req): Json<SendVerificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !req.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".into()));
    }

    let code = model::generate_code();
    model::store_code(
        &state.redis,
        &req.email,
        &code,
        state.config.email_code_ttl_secs,
    )
    .await?;

    // SMTP dispatch is handled out of process; the code is logged for the
    // relay to pick up in development.
    tracing::info!("verification code issued for {}", req.email);
    tracing::debug!("code for {}: {}", req.email, code);

    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({
            "sent": true,
            "expires_in": state.config.email_code_ttl_secs,
        })),
    ))
}

#[axum::debug_handler]
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !model::verify_code(&state.redis, &req.email, &req.code).await? {
        return Err(AppError::InvalidVerificationCode);
    }

    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "verified": true })),
    ))
}
