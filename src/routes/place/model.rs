use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::utils::{PageQuery, Paginated, calculate_distance};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct TravelPlace {
    pub place_id: Uuid,
    pub name: String,
    pub country: String,
    pub city: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub image_key: Option<String>,
    pub bookmark_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PlaceInfo {
    pub place_id: Uuid,
    pub name: String,
    pub country: String,
    pub city: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub image_url: Option<String>,
    pub bookmark_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

const PLACE_COLUMNS: &str = "place_id, name, country, city, description, \
     latitude, longitude, image_key, bookmark_count, created_at";

const PLACE_CACHE_EXPIRE: u64 = 600;
const PLACE_ID_CACHE_PREFIX: &str = "place:id:";

impl TravelPlace {
    /// Detail lookup, read-through cached in Redis.
    pub async fn find_by_id(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        place_id: Uuid,
    ) -> Result<Option<Self>, AppError> {
        let cache_key = format!("{}{}", PLACE_ID_CACHE_PREFIX, place_id);

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
            if let Ok(json_str) = cached {
                if let Ok(place) = serde_json::from_str::<TravelPlace>(&json_str) {
                    tracing::debug!("place cache hit: {}", cache_key);
                    return Ok(Some(place));
                }
            }
        }

        let place = sqlx::query_as::<_, TravelPlace>(&format!(
            "SELECT {PLACE_COLUMNS} FROM travel_places WHERE place_id = $1"
        ))
        .bind(place_id)
        .fetch_optional(pool)
        .await?;

        if let Some(ref p) = place {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(p) {
                    let _: Result<(), redis::RedisError> =
                        conn.set_ex(&cache_key, json_str, PLACE_CACHE_EXPIRE).await;
                }
            }
        }

        Ok(place)
    }

    pub async fn invalidate_cache(redis: &Arc<RedisClient>, place_id: Uuid) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cache_key = format!("{}{}", PLACE_ID_CACHE_PREFIX, place_id);
            let _: Result<(), redis::RedisError> = conn.del(&cache_key).await;
        }
    }

    /// Most-bookmarked first.
    pub async fn list(pool: &PgPool, page: &PageQuery) -> Result<Paginated<Self>, AppError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM travel_places")
            .fetch_one(pool)
            .await?;

        let items = sqlx::query_as::<_, TravelPlace>(&format!(
            "SELECT {PLACE_COLUMNS} FROM travel_places
             ORDER BY bookmark_count DESC, created_at DESC
             LIMIT $1 OFFSET $2"
        ))
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

    pub async fn search(
        pool: &PgPool,
        keyword: &str,
        page: &PageQuery,
    ) -> Result<Paginated<Self>, AppError> {
        let pattern = format!("%{}%", keyword);

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM travel_places
             WHERE name ILIKE $1 OR country ILIKE $1 OR city ILIKE $1",
        )
        .bind(&pattern)
        .fetch_one(pool)
        .await?;

        let items = sqlx::query_as::<_, TravelPlace>(&format!(
            "SELECT {PLACE_COLUMNS} FROM travel_places
             WHERE name ILIKE $1 OR country ILIKE $1 OR city ILIKE $1
             ORDER BY bookmark_count DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(&pattern)
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

    /// Bounding-box prefilter in SQL, exact haversine cut in memory.
    pub async fn find_nearby(
        pool: &PgPool,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
    ) -> Result<Vec<(Self, f64)>, AppError> {
        let lat_delta = radius_m / 111_000.0;
        let lon_delta = radius_m / (111_000.0 * latitude.to_radians().cos().abs().max(0.01));

        let candidates = sqlx::query_as::<_, TravelPlace>(&format!(
            "SELECT {PLACE_COLUMNS} FROM travel_places
             WHERE latitude BETWEEN $1 AND $2 AND longitude BETWEEN $3 AND $4"
        ))
        .bind(latitude - lat_delta)
        .bind(latitude + lat_delta)
        .bind(longitude - lon_delta)
        .bind(longitude + lon_delta)
        .fetch_all(pool)
        .await?;

        let mut nearby: Vec<(TravelPlace, f64)> = candidates
            .into_iter()
            .filter_map(|place| {
                let d = calculate_distance(latitude, longitude, place.latitude, place.longitude);
                (d <= radius_m).then_some((place, d))
            })
            .collect();

        nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(nearby)
    }
}
