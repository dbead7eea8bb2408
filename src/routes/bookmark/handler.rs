use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    routes::place::TravelPlace,
    utils::{Claims, PageQuery, success_to_api_response},
};

use super::model::Bookmark;

#[derive(Debug, Deserialize)]
pub struct CreateBookmarkRequest {
    pub place_id: Uuid,
}

#[axum::debug_handler]
pub async fn create_bookmark(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateBookmarkRequest>,
) -> Result<impl IntoResponse, AppError> {
    Bookmark::create(&state.pool, claims.sub, req.place_id).await?;
    TravelPlace::invalidate_cache(&state.redis, req.place_id).await;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(serde_json::json!({ "place_id": req.place_id })),
    ))
}

#[axum::debug_handler]
pub async fn delete_bookmark(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(place_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Bookmark::delete(&state.pool, claims.sub, place_id).await?;
    TravelPlace::invalidate_cache(&state.redis, place_id).await;

    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "deleted": true })),
    ))
}

#[axum::debug_handler]
pub async fn list_bookmarks(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let bookmarks = Bookmark::list_for_member(&state.pool, claims.sub, &page).await?;
    Ok((StatusCode::OK, success_to_api_response(bookmarks)))
}
