use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, is_unique_violation};
use crate::utils::{PageQuery, Paginated};

#[derive(Debug, Serialize, FromRow)]
pub struct Bookmark {
    pub member_id: Uuid,
    pub place_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Bookmark joined with the place it points at, for listings.
#[derive(Debug, Serialize, FromRow)]
pub struct BookmarkedPlace {
    pub place_id: Uuid,
    pub name: String,
    pub country: String,
    pub city: String,
    pub image_key: Option<String>,
    pub bookmark_count: i32,
    pub bookmarked_at: DateTime<Utc>,
}

impl Bookmark {
    /// Inserts the (member, place) pair and bumps the place's denormalized
    /// counter in the same transaction. A second insert for the same pair
    /// fails with a conflict, never a duplicate row.
    pub async fn create(pool: &PgPool, member_id: Uuid, place_id: Uuid) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let place_exists: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM travel_places WHERE place_id = $1 FOR UPDATE")
                .bind(place_id)
                .fetch_optional(&mut *tx)
                .await?;
        if place_exists.is_none() {
            return Err(AppError::PlaceNotFound);
        }

        sqlx::query("INSERT INTO bookmarks (member_id, place_id, created_at) VALUES ($1, $2, NOW())")
            .bind(member_id)
            .bind(place_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::BookmarkExists
                } else {
                    e.into()
                }
            })?;

        sqlx::query(
            "UPDATE travel_places SET bookmark_count = bookmark_count + 1 WHERE place_id = $1",
        )
        .bind(place_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(pool: &PgPool, member_id: Uuid, place_id: Uuid) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query("DELETE FROM bookmarks WHERE member_id = $1 AND place_id = $2")
            .bind(member_id)
            .bind(place_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::BookmarkNotFound);
        }

        sqlx::query(
            "UPDATE travel_places SET bookmark_count = GREATEST(bookmark_count - 1, 0)
             WHERE place_id = $1",
        )
        .bind(place_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_for_member(
        pool: &PgPool,
        member_id: Uuid,
        page: &PageQuery,
    ) -> Result<Paginated<BookmarkedPlace>, AppError> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookmarks WHERE member_id = $1")
                .bind(member_id)
                .fetch_one(pool)
                .await?;

        let items = sqlx::query_as::<_, BookmarkedPlace>(
            "SELECT p.place_id, p.name, p.country, p.city, p.image_key,
                    p.bookmark_count, b.created_at AS bookmarked_at
             FROM bookmarks b
             JOIN travel_places p ON b.place_id = p.place_id
             WHERE b.member_id = $1
             ORDER BY b.created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(member_id)
        .bind(page.size())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        Ok(Paginated {
            items,
            total,
            page: page.page(),
            size: page.size(),
        })
    }
}
