use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    utils::{Claims, success_to_api_response},
};

use super::guard::{Capability, require_attendee, require_author, require_capability};
use super::model::{AttendeePermission, TravelSchedule};

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRoutesRequest {
    pub place_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddAttendeeRequest {
    pub member_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePermissionRequest {
    pub permission: AttendeePermission,
}

fn validate_schedule(name: &str, start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    let count = name.trim().chars().count();
    if count < 1 || count > 50 {
        return Err(AppError::Validation(
            "Schedule name must be between 1 and 50 characters".into(),
        ));
    }
    if start > end {
        return Err(AppError::Validation(
            "Schedule start date must not be after its end date".into(),
        ));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn create_schedule(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_schedule(&req.name, req.start_date, req.end_date)?;

    let schedule = TravelSchedule::create(
        &state.pool,
        req.name.trim(),
        req.start_date,
        req.end_date,
        claims.sub,
    )
    .await?;

    Ok((StatusCode::CREATED, success_to_api_response(schedule)))
}

#[axum::debug_handler]
pub async fn list_schedules(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let schedules = TravelSchedule::list_for_member(&state.pool, claims.sub).await?;
    Ok((StatusCode::OK, success_to_api_response(schedules)))
}

#[axum::debug_handler]
pub async fn get_schedule(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_attendee(&state.pool, schedule_id, claims.sub).await?;

    let detail = TravelSchedule::detail(&state.pool, schedule_id).await?;
    Ok((StatusCode::OK, success_to_api_response(detail)))
}

#[axum::debug_handler]
pub async fn update_schedule(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_schedule(&req.name, req.start_date, req.end_date)?;
    require_capability(&state.pool, schedule_id, claims.sub, Capability::Edit).await?;

    let schedule = TravelSchedule::update(
        &state.pool,
        schedule_id,
        req.name.trim(),
        req.start_date,
        req.end_date,
    )
    .await?;

    Ok((StatusCode::OK, success_to_api_response(schedule)))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_author(&state.pool, schedule_id, claims.sub).await?;

    TravelSchedule::delete(&state.pool, schedule_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "deleted": true })),
    ))
}

#[axum::debug_handler]
pub async fn replace_routes(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Json(req): Json<ReplaceRoutesRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.place_ids.len() > 100 {
        return Err(AppError::Validation(
            "A schedule route is limited to 100 stops".into(),
        ));
    }
    require_capability(&state.pool, schedule_id, claims.sub, Capability::Edit).await?;

    TravelSchedule::replace_routes(&state.pool, schedule_id, &req.place_ids).await?;

    let routes = TravelSchedule::routes(&state.pool, schedule_id).await?;
    Ok((StatusCode::OK, success_to_api_response(routes)))
}

#[axum::debug_handler]
pub async fn list_attendees(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    require_attendee(&state.pool, schedule_id, claims.sub).await?;

    let attendees = TravelSchedule::attendees(&state.pool, schedule_id).await?;
    Ok((StatusCode::OK, success_to_api_response(attendees)))
}

#[axum::debug_handler]
pub async fn add_attendee(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
    Json(req): Json<AddAttendeeRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_author(&state.pool, schedule_id, claims.sub).await?;

    let attendee = TravelSchedule::add_attendee(&state.pool, schedule_id, req.member_id).await?;
    Ok((StatusCode::CREATED, success_to_api_response(attendee)))
}

#[axum::debug_handler]
pub async fn update_permission(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path((schedule_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_author(&state.pool, schedule_id, claims.sub).await?;

    // The author's own row is never mutable, not even by the author.
    if member_id == claims.sub {
        return Err(AppError::AuthorImmutable);
    }

    let target = TravelSchedule::find_attendee(&state.pool, schedule_id, member_id)
        .await?
        .ok_or(AppError::AttendeeNotFound)?;
    if target.is_author() {
        return Err(AppError::AuthorImmutable);
    }

    let attendee =
        TravelSchedule::update_attendee_permission(&state.pool, schedule_id, member_id, req.permission)
            .await?;
    Ok((StatusCode::OK, success_to_api_response(attendee)))
}

#[axum::debug_handler]
pub async fn remove_attendee(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path((schedule_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    require_author(&state.pool, schedule_id, claims.sub).await?;

    let target = TravelSchedule::find_attendee(&state.pool, schedule_id, member_id)
        .await?
        .ok_or(AppError::AttendeeNotFound)?;
    if target.is_author() {
        return Err(AppError::AuthorImmutable);
    }

    TravelSchedule::remove_attendee(&state.pool, schedule_id, member_id).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "removed": true })),
    ))
}

#[axum::debug_handler]
pub async fn leave_schedule(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(schedule_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let attendee = require_attendee(&state.pool, schedule_id, claims.sub).await?;
    if attendee.is_author() {
        return Err(AppError::AuthorCannotLeave);
    }

    TravelSchedule::remove_attendee(&state.pool, schedule_id, claims.sub).await?;
    Ok((
        StatusCode::OK,
        success_to_api_response(serde_json::json!({ "left": true })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_must_be_ordered() {
        let start = NaiveDate::from_ymd_opt(2026, 9, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 9, 5).unwrap();
        assert!(validate_schedule("Jeju trip", start, end).is_err());
        assert!(validate_schedule("Jeju trip", end, start).is_ok());
        // Single-day trips are allowed.
        assert!(validate_schedule("Day out", start, start).is_ok());
    }

    #[test]
    fn schedule_name_must_not_be_blank() {
        let day = NaiveDate::from_ymd_opt(2026, 9, 10).unwrap();
        assert!(validate_schedule("   ", day, day).is_err());
        assert!(validate_schedule(&"x".repeat(51), day, day).is_err());
    }
}
