use rand::Rng;
use redis::{AsyncCommands, Client as RedisClient};
use std::sync::Arc;

use crate::error::AppError;

const CODE_KEY_PREFIX: &str = "email:code:";
const VERIFIED_KEY_PREFIX: &str = "email:verified:";

// How long a confirmed verification stays usable by register / reset-password.
const VERIFIED_TTL_SECS: u64 = 1800;

pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Stores a fresh verification code for the address, replacing any previous one.
pub async fn store_code(
    redis: &Arc<RedisClient>,
    email: &str,
    code: &str,
    ttl_secs: u64,
) -> Result<(), AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let key = format!("{}{}", CODE_KEY_PREFIX, email);
    let _: () = conn.set_ex(key, code, ttl_secs).await?;
    Ok(())
}

/// Compares the submitted code; on a match the code is burned and the address
/// flagged verified for a short window.
pub async fn verify_code(
    redis: &Arc<RedisClient>,
    email: &str,
    code: &str,
) -> Result<bool, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let key = format!("{}{}", CODE_KEY_PREFIX, email);

    let stored: Option<String> = conn.get(&key).await?;
    match stored {
        Some(stored) if stored == code => {
            let _: () = conn.del(&key).await?;
            let verified_key = format!("{}{}", VERIFIED_KEY_PREFIX, email);
            let _: () = conn.set_ex(verified_key, 1, VERIFIED_TTL_SECS).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Checks the verified flag without consuming it.
pub async fn is_verified(redis: &Arc<RedisClient>, email: &str) -> Result<bool, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let key = format!("{}{}", VERIFIED_KEY_PREFIX, email);
    let set: bool = conn.exists(&key).await?;
    Ok(set)
}

/// Consumes the verified flag, returning whether it was set.
pub async fn consume_verified(redis: &Arc<RedisClient>, email: &str) -> Result<bool, AppError> {
    let mut conn = redis.get_multiplexed_async_connection().await?;
    let key = format!("{}{}", VERIFIED_KEY_PREFIX, email);
    let removed: i64 = conn.del(&key).await?;
    Ok(removed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
