use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    storage::ObjectStorage,
    utils::{PageQuery, Paginated, success_to_api_response},
};

use super::model::{PlaceInfo, TravelPlace};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: Option<f64>,
}

fn to_info(place: TravelPlace, storage: &ObjectStorage, distance_m: Option<f64>) -> PlaceInfo {
    PlaceInfo {
        place_id: place.place_id,
        name: place.name,
        country: place.country,
        city: place.city,
        description: place.description,
        latitude: place.latitude,
        longitude: place.longitude,
        image_url: place.image_key.as_deref().map(|k| storage.object_url(k)),
        bookmark_count: place.bookmark_count,
        distance_m,
    }
}

#[axum::debug_handler]
pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let places = TravelPlace::list(&state.pool, &page).await?;

    let infos = Paginated {
        items: places
            .items
            .into_iter()
            .map(|p| to_info(p, &state.storage, None))
            .collect::<Vec<_>>(),
        total: places.total,
        page: places.page,
        size: places.size,
    };

    Ok((StatusCode::OK, success_to_api_response(infos)))
}

#[axum::debug_handler]
pub async fn find_by_id(
    State(state): State<AppState>,
    Path(place_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let place = TravelPlace::find_by_id(&state.pool, &state.redis, place_id)
        .await?
        .ok_or(AppError::PlaceNotFound)?;

    Ok((
        StatusCode::OK,
        success_to_api_response(to_info(place, &state.storage, None)),
    ))
}

#[axum::debug_handler]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let keyword = query.keyword.trim();
    if keyword.is_empty() {
        return Err(AppError::Validation("Search keyword must not be empty".into()));
    }

    let page = PageQuery {
        page: query.page,
        size: query.size,
    };
    let places = TravelPlace::search(&state.pool, keyword, &page).await?;

    let infos = Paginated {
        items: places
            .items
            .into_iter()
            .map(|p| to_info(p, &state.storage, None))
            .collect::<Vec<_>>(),
        total: places.total,
        page: places.page,
        size: places.size,
    };

    Ok((StatusCode::OK, success_to_api_response(infos)))
}

#[axum::debug_handler]
pub async fn nearby(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let radius = query
        .radius
        .unwrap_or(5000.0)
        .min(state.config.max_search_radius);

    let places = TravelPlace::find_nearby(&state.pool, query.latitude, query.longitude, radius)
        .await?;

    let infos = places
        .into_iter()
        .map(|(place, distance)| to_info(place, &state.storage, Some(distance)))
        .collect::<Vec<_>>();

    Ok((StatusCode::OK, success_to_api_response(infos)))
}
