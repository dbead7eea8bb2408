use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    routes::email,
    utils::{Claims, generate_access_token, generate_refresh_token, success_to_api_response, verify_token},
};

use super::model::{
    ChangePasswordRequest, LoginRequest, Member, MemberProfile, RefreshTokenRequest,
    RegisterRequest, ResetPasswordRequest, SocialIdentity, SocialLoginRequest, TokenResponse,
    UpdateNicknameRequest,
};

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = email.len() <= 254
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if !valid {
        return Err(AppError::Validation("Invalid email address".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 || password.len() > 24 {
        return Err(AppError::Validation(
            "Password must be between 8 and 24 characters".into(),
        ));
    }
    Ok(())
}

fn validate_nickname(nickname: &str) -> Result<(), AppError> {
    let count = nickname.chars().count();
    if count < 2 || count > 24 {
        return Err(AppError::Validation(
            "Nickname must be between 2 and 24 characters".into(),
        ));
    }
    Ok(())
}

async fn issue_token_pair(state: &AppState, member: &Member) -> Result<TokenResponse, AppError> {
    let access_token = generate_access_token(member.member_id, &state.config)?;
    let refresh_token = generate_refresh_token(member.member_id, &state.config)?;

    Member::store_refresh_token(&state.pool, member.member_id, &refresh_token).await?;

    Ok(TokenResponse {
        member_id: member.member_id,
        nickname: member.nickname.clone(),
        access_token,
        refresh_token,
    })
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    validate_nickname(&req.nickname)?;

    // Registration requires a verification code to have been confirmed
    // first. The flag is only consumed once the insert has succeeded, so a
    // duplicate email or nickname does not force the user to re-verify.
    if !email::model::is_verified(&state.redis, &req.email).await? {
        return Err(AppError::EmailNotVerified);
    }

    let member = Member::create(&state.pool, &req).await?;
    email::model::consume_verified(&state.redis, &req.email).await?;

    let tokens = issue_token_pair(&state, &member).await?;

    Ok((StatusCode::CREATED, success_to_api_response(tokens)))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let member = Member::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or(AppError::LoginFailed)?;

    // Social-only accounts carry no password hash.
    if !member.verify_login(&req.password)? {
        return Err(AppError::LoginFailed);
    }

    let tokens = issue_token_pair(&state, &member).await?;
    Ok((StatusCode::OK, success_to_api_response(tokens)))
}

#[axum::debug_handler]
pub async fn social_login(
    State(state): State<AppState>,
    Json(req): Json<SocialLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let userinfo_url = state
        .config
        .userinfo_url(&req.provider)
        .ok_or_else(|| AppError::Validation(format!("Unknown provider: {}", req.provider)))?
        .to_string();

    let identity =
        SocialIdentity::fetch(&state.http, &req.provider, &userinfo_url, &req.access_token)
            .await?;

    let member =
        match Member::find_by_social(&state.pool, &identity.provider, &identity.social_id).await? {
            Some(member) => member,
            None => Member::create_social(&state.pool, &identity).await?,
        };

    let tokens = issue_token_pair(&state, &member).await?;
    Ok((StatusCode::OK, success_to_api_response(tokens)))
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_token(&req.refresh_token, &state.config)?;
    if !claims.is_refresh {
        return Err(AppError::Unauthorized);
    }

    let member = Member::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // The presented token must be the one issued last; logout clears it.
    if member.refresh_token.as_deref() != Some(req.refresh_token.as_str()) {
        return Err(AppError::Unauthorized);
    }

    let tokens = issue_token_pair(&state, &member).await?;
    Ok((StatusCode::OK, success_to_api_response(tokens)))
}

#[axum::debug_handler]
pub async fn logout(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Member::clear_refresh_token(&state.pool, claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "logged_out": true })),
    ))
}

#[axum::debug_handler]
pub async fn me(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let member = Member::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AppError::MemberNotFound)?;

    let profile = MemberProfile {
        member_id: member.member_id,
        email: member.email,
        nickname: member.nickname,
        social_provider: member.social_provider,
        profile_image_url: member
            .profile_image_key
            .as_deref()
            .map(|key| state.storage.object_url(key)),
    };

    Ok((StatusCode::OK, success_to_api_response(profile)))
}

#[axum::debug_handler]
pub async fn update_nickname(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<UpdateNicknameRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_nickname(&req.nickname)?;

    let member = Member::update_nickname(&state.pool, claims.sub, &req.nickname).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "nickname": member.nickname })),
    ))
}

#[axum::debug_handler]
pub async fn change_password(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Mismatched pair fails before anything touches the database.
    if req.new_password != req.new_password_check {
        return Err(AppError::Validation(
            "New password and confirmation do not match".into(),
        ));
    }
    validate_password(&req.new_password)?;

    let member = Member::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AppError::MemberNotFound)?;

    if !member.verify_login(&req.current_password)? {
        return Err(AppError::LoginFailed);
    }

    Member::update_password(&state.pool, claims.sub, &req.new_password).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "updated": true })),
    ))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.new_password != req.new_password_check {
        return Err(AppError::Validation(
            "New password and confirmation do not match".into(),
        ));
    }
    validate_password(&req.new_password)?;

    if !email::model::verify_code(&state.redis, &req.email, &req.verification_code).await? {
        return Err(AppError::InvalidVerificationCode);
    }

    let member = Member::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or(AppError::MemberNotFound)?;

    Member::update_password(&state.pool, member.member_id, &req.new_password).await?;
    // Force a fresh login after the reset.
    Member::clear_refresh_token(&state.pool, member.member_id).await?;

    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "reset": true })),
    ))
}

#[axum::debug_handler]
pub async fn deactivate(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let member = Member::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AppError::MemberNotFound)?;

    Member::delete(&state.pool, claims.sub).await?;

    if let Some(key) = member.profile_image_key.as_deref() {
        if let Err(e) = state.storage.delete_object(key).await {
            tracing::warn!("failed to remove profile image {}: {}", key, e);
        }
    }

    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "deleted": true })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_rejects_garbage() {
        assert!(validate_email("traveler@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("user@example.").is_err());
        assert!(validate_email("user@.example.com").is_err());
    }

    #[test]
    fn password_length_is_enforced() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("just-right-1").is_ok());
        assert!(validate_password(&"x".repeat(25)).is_err());
    }

    #[test]
    fn nickname_length_counts_chars_not_bytes() {
        assert!(validate_nickname("여행자").is_ok());
        assert!(validate_nickname("a").is_err());
    }
}
