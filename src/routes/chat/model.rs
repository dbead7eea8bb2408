use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;

pub const MAX_MESSAGE_CHARS: usize = 1000;

const MESSAGE_CACHE_EXPIRE: u64 = 300;
const MESSAGE_CACHE_PREFIX: &str = "chat:schedule:";
const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 100;

/// Append-only chat record. The nickname is snapshotted at send time so
/// history stays stable across renames.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub schedule_id: Uuid,
    pub member_id: Uuid,
    pub nickname: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub fn validate_content(content: &str) -> Result<(), AppError> {
    if content.trim().is_empty() {
        return Err(AppError::Validation("Message must not be empty".into()));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::MessageTooLong);
    }
    Ok(())
}

impl ChatMessage {
    pub async fn create(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        schedule_id: Uuid,
        member_id: Uuid,
        nickname: &str,
        content: &str,
    ) -> Result<Self, AppError> {
        let message = sqlx::query_as::<_, ChatMessage>(
            "INSERT INTO chat_messages (message_id, schedule_id, member_id, nickname, content, created_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             RETURNING message_id, schedule_id, member_id, nickname, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(schedule_id)
        .bind(member_id)
        .bind(nickname)
        .bind(content)
        .fetch_one(pool)
        .await?;

        // New message invalidates the cached latest page.
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cache_key = format!("{}{}", MESSAGE_CACHE_PREFIX, schedule_id);
            let _: Result<(), redis::RedisError> = conn.del(&cache_key).await;
        }

        Ok(message)
    }

    /// Latest-first history, cursored by message id. The first page is served
    /// from Redis when possible.
    pub async fn history(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        schedule_id: Uuid,
        before: Option<Uuid>,
        limit: Option<i64>,
    ) -> Result<Vec<Self>, AppError> {
        let plan = PagePlan::new(before.is_some(), limit);
        let limit = plan.limit;

        let cache_key = format!("{}{}", MESSAGE_CACHE_PREFIX, schedule_id);
        if plan.cacheable {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
                if let Ok(json_str) = cached {
                    if let Ok(messages) = serde_json::from_str::<Vec<ChatMessage>>(&json_str) {
                        tracing::debug!("chat history cache hit: {}", cache_key);
                        return Ok(messages.into_iter().take(limit as usize).collect());
                    }
                }
            }
        }

        let messages = match before {
            Some(before_id) => {
                sqlx::query_as::<_, ChatMessage>(
                    "SELECT message_id, schedule_id, member_id, nickname, content, created_at
                     FROM chat_messages
                     WHERE schedule_id = $1
                       AND created_at < (SELECT created_at FROM chat_messages WHERE message_id = $2)
                     ORDER BY created_at DESC
                     LIMIT $3",
                )
                .bind(schedule_id)
                .bind(before_id)
                .bind(limit)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ChatMessage>(
                    "SELECT message_id, schedule_id, member_id, nickname, content, created_at
                     FROM chat_messages
                     WHERE schedule_id = $1
                     ORDER BY created_at DESC
                     LIMIT $2",
                )
                .bind(schedule_id)
                .bind(plan.fetch)
                .fetch_all(pool)
                .await?
            }
        };

        if plan.cacheable {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(&messages) {
                    let _: Result<(), redis::RedisError> =
                        conn.set_ex(&cache_key, json_str, MESSAGE_CACHE_EXPIRE).await;
                }
            }
        }

        Ok(messages.into_iter().take(limit as usize).collect())
    }
}

/// How a history request maps onto the query and the first-page cache. The
/// cached page always holds the full default page so a small read cannot
/// leave a truncated page behind for later larger reads.
#[derive(Debug, PartialEq, Eq)]
struct PagePlan {
    limit: i64,
    fetch: i64,
    cacheable: bool,
}

impl PagePlan {
    fn new(cursored: bool, limit: Option<i64>) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let cacheable = !cursored && limit <= DEFAULT_PAGE;
        PagePlan {
            limit,
            fetch: if cacheable { DEFAULT_PAGE } else { limit },
            cacheable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_blank_messages_are_rejected() {
        assert!(validate_content("").is_err());
        assert!(validate_content("   ").is_err());
        assert!(validate_content("hello").is_ok());
    }

    #[test]
    fn small_first_page_reads_still_fill_the_cache() {
        // A limit-10 read must not cache a 10-row page that a later
        // default-limit read would be truncated by.
        let plan = PagePlan::new(false, Some(10));
        assert_eq!(plan.limit, 10);
        assert_eq!(plan.fetch, DEFAULT_PAGE);
        assert!(plan.cacheable);

        let plan = PagePlan::new(false, None);
        assert_eq!(plan.limit, DEFAULT_PAGE);
        assert_eq!(plan.fetch, DEFAULT_PAGE);
        assert!(plan.cacheable);
    }

    #[test]
    fn oversized_and_cursored_reads_bypass_the_cache() {
        let plan = PagePlan::new(false, Some(80));
        assert_eq!(plan.fetch, 80);
        assert!(!plan.cacheable);

        let plan = PagePlan::new(true, Some(10));
        assert_eq!(plan.fetch, 10);
        assert!(!plan.cacheable);

        // Limits clamp before planning.
        let plan = PagePlan::new(false, Some(0));
        assert_eq!(plan.limit, 1);
        assert_eq!(plan.fetch, DEFAULT_PAGE);
    }

    #[test]
    fn limit_is_chars_not_bytes() {
        // 1000 multibyte chars are fine even though they exceed 1000 bytes.
        let msg = "가".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_content(&msg).is_ok());

        let too_long = "가".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            validate_content(&too_long),
            Err(AppError::MessageTooLong)
        ));
    }
}
