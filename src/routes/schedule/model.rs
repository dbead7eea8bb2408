use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, is_unique_violation};

/// Hard cap on attendee rows per schedule, the author included.
pub const MAX_ATTENDEES: usize = 5;

fn check_capacity(current: usize) -> Result<(), AppError> {
    if current >= MAX_ATTENDEES {
        return Err(AppError::AttendeeLimitExceeded);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendee_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendeeRole {
    Author,
    Guest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendee_permission", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendeePermission {
    All,
    Edit,
    Chat,
    Read,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct TravelSchedule {
    pub schedule_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct TravelAttendee {
    pub schedule_id: Uuid,
    pub member_id: Uuid,
    pub role: AttendeeRole,
    pub permission: AttendeePermission,
    pub joined_at: DateTime<Utc>,
}

/// Attendee row joined with the member's nickname, for listings.
#[derive(Debug, Serialize, FromRow)]
pub struct AttendeeInfo {
    pub member_id: Uuid,
    pub nickname: String,
    pub role: AttendeeRole,
    pub permission: AttendeePermission,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct RouteStop {
    pub route_order: i32,
    pub place_id: Uuid,
    pub place_name: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ScheduleSummary {
    pub schedule_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub role: AttendeeRole,
    pub permission: AttendeePermission,
    pub attendee_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ScheduleDetail {
    #[serde(flatten)]
    pub schedule: TravelSchedule,
    pub attendees: Vec<AttendeeInfo>,
    pub routes: Vec<RouteStop>,
}

impl TravelSchedule {
    /// Creates the schedule together with its author attendee row; the author
    /// always holds role AUTHOR and permission ALL.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        author_id: Uuid,
    ) -> Result<Self, AppError> {
        let mut tx = pool.begin().await?;

        let schedule = sqlx::query_as::<_, TravelSchedule>(
            "INSERT INTO travel_schedules (schedule_id, name, start_date, end_date, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             RETURNING schedule_id, name, start_date, end_date, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO travel_attendees (schedule_id, member_id, role, permission, joined_at)
             VALUES ($1, $2, 'AUTHOR', 'ALL', NOW())",
        )
        .bind(schedule.schedule_id)
        .bind(author_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            "member {} created schedule {}",
            author_id,
            schedule.schedule_id
        );
        Ok(schedule)
    }

    pub async fn find_by_id(pool: &PgPool, schedule_id: Uuid) -> Result<Option<Self>, AppError> {
        let schedule = sqlx::query_as::<_, TravelSchedule>(
            "SELECT schedule_id, name, start_date, end_date, created_at
             FROM travel_schedules WHERE schedule_id = $1",
        )
        .bind(schedule_id)
        .fetch_optional(pool)
        .await?;

        Ok(schedule)
    }

    pub async fn list_for_member(
        pool: &PgPool,
        member_id: Uuid,
    ) -> Result<Vec<ScheduleSummary>, AppError> {
        let schedules = sqlx::query_as::<_, ScheduleSummary>(
            "SELECT s.schedule_id, s.name, s.start_date, s.end_date,
                    a.role, a.permission,
                    (SELECT COUNT(*) FROM travel_attendees c
                     WHERE c.schedule_id = s.schedule_id) AS attendee_count
             FROM travel_schedules s
             JOIN travel_attendees a ON a.schedule_id = s.schedule_id
             WHERE a.member_id = $1
             ORDER BY s.start_date DESC",
        )
        .bind(member_id)
        .fetch_all(pool)
        .await?;

        Ok(schedules)
    }

    pub async fn detail(pool: &PgPool, schedule_id: Uuid) -> Result<ScheduleDetail, AppError> {
        let schedule = Self::find_by_id(pool, schedule_id)
            .await?
            .ok_or(AppError::ScheduleNotFound)?;

        let attendees = Self::attendees(pool, schedule_id).await?;
        let routes = Self::routes(pool, schedule_id).await?;

        Ok(ScheduleDetail {
            schedule,
            attendees,
            routes,
        })
    }

    pub async fn update(
        pool: &PgPool,
        schedule_id: Uuid,
        name: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, AppError> {
        let schedule = sqlx::query_as::<_, TravelSchedule>(
            "UPDATE travel_schedules SET name = $1, start_date = $2, end_date = $3
             WHERE schedule_id = $4
             RETURNING schedule_id, name, start_date, end_date, created_at",
        )
        .bind(name)
        .bind(start_date)
        .bind(end_date)
        .bind(schedule_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::ScheduleNotFound)?;

        Ok(schedule)
    }

    pub async fn delete(pool: &PgPool, schedule_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM travel_schedules WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ScheduleNotFound);
        }
        Ok(())
    }

    pub async fn routes(pool: &PgPool, schedule_id: Uuid) -> Result<Vec<RouteStop>, AppError> {
        let routes = sqlx::query_as::<_, RouteStop>(
            "SELECT r.route_order, r.place_id, p.name AS place_name
             FROM travel_routes r
             JOIN travel_places p ON r.place_id = p.place_id
             WHERE r.schedule_id = $1
             ORDER BY r.route_order",
        )
        .bind(schedule_id)
        .fetch_all(pool)
        .await?;

        Ok(routes)
    }

    /// Replaces the ordered stop list wholesale; order is the position in the
    /// submitted list.
    pub async fn replace_routes(
        pool: &PgPool,
        schedule_id: Uuid,
        place_ids: &[Uuid],
    ) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let (known,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM travel_places WHERE place_id = ANY($1)")
                .bind(place_ids)
                .fetch_one(&mut *tx)
                .await?;
        let distinct: std::collections::HashSet<&Uuid> = place_ids.iter().collect();
        if known != distinct.len() as i64 {
            return Err(AppError::PlaceNotFound);
        }

        sqlx::query("DELETE FROM travel_routes WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&mut *tx)
            .await?;

        for (order, place_id) in place_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO travel_routes (schedule_id, route_order, place_id)
                 VALUES ($1, $2, $3)",
            )
            .bind(schedule_id)
            .bind(order as i32 + 1)
            .bind(place_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn attendees(
        pool: &PgPool,
        schedule_id: Uuid,
    ) -> Result<Vec<AttendeeInfo>, AppError> {
        let attendees = sqlx::query_as::<_, AttendeeInfo>(
            "SELECT a.member_id, m.nickname, a.role, a.permission, a.joined_at
             FROM travel_attendees a
             JOIN members m ON a.member_id = m.member_id
             WHERE a.schedule_id = $1
             ORDER BY a.joined_at",
        )
        .bind(schedule_id)
        .fetch_all(pool)
        .await?;

        Ok(attendees)
    }

    /// Adds a GUEST attendee with READ permission. The schedule row is
    /// locked first so two concurrent adds cannot both pass the capacity
    /// check.
    pub async fn add_attendee(
        pool: &PgPool,
        schedule_id: Uuid,
        member_id: Uuid,
    ) -> Result<TravelAttendee, AppError> {
        let mut tx = pool.begin().await?;

        // Attendee inserts serialize on the schedule row. Locking the
        // attendee rows themselves is not enough: a transaction that waited
        // on them still counts against its pre-commit snapshot and misses
        // rows the winner inserted.
        let locked: Option<(Uuid,)> = sqlx::query_as(
            "SELECT schedule_id FROM travel_schedules WHERE schedule_id = $1 FOR UPDATE",
        )
        .bind(schedule_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(AppError::ScheduleNotFound);
        }

        let current: Vec<(Uuid,)> =
            sqlx::query_as("SELECT member_id FROM travel_attendees WHERE schedule_id = $1")
                .bind(schedule_id)
                .fetch_all(&mut *tx)
                .await?;

        if current.iter().any(|(id,)| *id == member_id) {
            return Err(AppError::AlreadyAttendee);
        }
        check_capacity(current.len())?;

        let member_exists: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM members WHERE member_id = $1")
                .bind(member_id)
                .fetch_optional(&mut *tx)
                .await?;
        if member_exists.is_none() {
            return Err(AppError::MemberNotFound);
        }

        let attendee = sqlx::query_as::<_, TravelAttendee>(
            "INSERT INTO travel_attendees (schedule_id, member_id, role, permission, joined_at)
             VALUES ($1, $2, 'GUEST', 'READ', NOW())
             RETURNING schedule_id, member_id, role, permission, joined_at",
        )
        .bind(schedule_id)
        .bind(member_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyAttendee
            } else {
                e.into()
            }
        })?;

        tx.commit().await?;
        Ok(attendee)
    }

    pub async fn find_attendee(
        pool: &PgPool,
        schedule_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<TravelAttendee>, AppError> {
        let attendee = sqlx::query_as::<_, TravelAttendee>(
            "SELECT schedule_id, member_id, role, permission, joined_at
             FROM travel_attendees
             WHERE schedule_id = $1 AND member_id = $2",
        )
        .bind(schedule_id)
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        Ok(attendee)
    }

    /// Only guards call this; role is never touched here.
    pub async fn update_attendee_permission(
        pool: &PgPool,
        schedule_id: Uuid,
        member_id: Uuid,
        permission: AttendeePermission,
    ) -> Result<TravelAttendee, AppError> {
        let attendee = sqlx::query_as::<_, TravelAttendee>(
            "UPDATE travel_attendees SET permission = $1
             WHERE schedule_id = $2 AND member_id = $3 AND role <> 'AUTHOR'
             RETURNING schedule_id, member_id, role, permission, joined_at",
        )
        .bind(permission)
        .bind(schedule_id)
        .bind(member_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::AttendeeNotFound)?;

        Ok(attendee)
    }

    pub async fn remove_attendee(
        pool: &PgPool,
        schedule_id: Uuid,
        member_id: Uuid,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "DELETE FROM travel_attendees
             WHERE schedule_id = $1 AND member_id = $2 AND role <> 'AUTHOR'",
        )
        .bind(schedule_id)
        .bind(member_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::AttendeeNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifth_attendee_fits_sixth_does_not() {
        // Capacity counts the author's row too.
        assert!(check_capacity(4).is_ok());
        assert!(matches!(
            check_capacity(5),
            Err(AppError::AttendeeLimitExceeded)
        ));
        assert!(check_capacity(6).is_err());
    }

    #[test]
    fn roles_and_permissions_serialize_uppercase() {
        assert_eq!(
            serde_json::to_string(&AttendeeRole::Author).unwrap(),
            "\"AUTHOR\""
        );
        assert_eq!(
            serde_json::to_string(&AttendeePermission::Read).unwrap(),
            "\"READ\""
        );
        let p: AttendeePermission = serde_json::from_str("\"CHAT\"").unwrap();
        assert_eq!(p, AttendeePermission::Chat);
    }
}
