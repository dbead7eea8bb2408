use axum::{
    extract::{Extension, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    routes::member::Member,
    storage::ObjectStorage,
    utils::{Claims, success_to_api_response},
};

/// Maps an accepted content type to the stored file extension.
fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[axum::debug_handler]
pub async fn upload_image(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {}", e)))?
        .ok_or_else(|| AppError::Validation("Missing image field".into()))?;

    let content_type = field
        .content_type()
        .ok_or_else(|| AppError::Validation("Missing image content type".into()))?
        .to_string();
    let ext = extension_for(&content_type)
        .ok_or_else(|| AppError::Validation("Only jpeg, png and webp images are accepted".into()))?;

    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read image body: {}", e)))?;
    if bytes.is_empty() {
        return Err(AppError::Validation("Image body is empty".into()));
    }
    if bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::Validation(format!(
            "Image exceeds the {} byte limit",
            state.config.max_upload_bytes
        )));
    }

    let member = Member::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AppError::MemberNotFound)?;

    let key = ObjectStorage::object_key("profile", ext);
    state
        .storage
        .put_object(&key, &content_type, bytes.to_vec())
        .await?;

    Member::update_profile_image(&state.pool, claims.sub, Some(&key)).await?;

    // The old object is orphaned at worst; the row already points at the new one.
    if let Some(old_key) = member.profile_image_key.as_deref() {
        if let Err(e) = state.storage.delete_object(old_key).await {
            tracing::warn!("failed to remove replaced profile image {}: {}", old_key, e);
        }
    }

    Ok((
        StatusCode::CREATED,
        success_to_api_response(serde_json::json!({
            "profile_image_url": state.storage.object_url(&key),
        })),
    ))
}

#[axum::debug_handler]
pub async fn delete_image(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let member = Member::find_by_id(&state.pool, claims.sub)
        .await?
        .ok_or(AppError::MemberNotFound)?;

    let key = member
        .profile_image_key
        .ok_or_else(|| AppError::Validation("No profile image to delete".into()))?;

    Member::update_profile_image(&state.pool, claims.sub, None).await?;
    state.storage.delete_object(&key).await?;

    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "deleted": true })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_known_image_types_map_to_extensions() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("image/gif"), None);
        assert_eq!(extension_for("application/pdf"), None);
    }
}
