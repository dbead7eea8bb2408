use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, is_unique_violation};
use crate::utils::{hash_password, verify_password};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub member_id: Uuid,
    pub email: String,
    pub nickname: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub social_provider: Option<String>,
    #[serde(skip_serializing)]
    pub social_id: Option<String>,
    pub profile_image_key: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SocialLoginRequest {
    pub provider: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNicknameRequest {
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_check: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub verification_code: String,
    pub new_password: String,
    pub new_password_check: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub member_id: Uuid,
    pub nickname: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct MemberProfile {
    pub member_id: Uuid,
    pub email: String,
    pub nickname: String,
    pub social_provider: Option<String>,
    pub profile_image_url: Option<String>,
}

/// Identity attributes pulled from a social provider's userinfo endpoint.
#[derive(Debug)]
pub struct SocialIdentity {
    pub provider: String,
    pub social_id: String,
    pub email: Option<String>,
    pub nickname: Option<String>,
}

impl SocialIdentity {
    /// Providers disagree on field names, so take the first of the usual
    /// suspects for id / email / display name.
    pub async fn fetch(
        http: &reqwest::Client,
        provider: &str,
        userinfo_url: &str,
        access_token: &str,
    ) -> Result<Self, AppError> {
        let body: serde_json::Value = http
            .get(userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()
            .map_err(|_| AppError::Unauthorized)?
            .json()
            .await?;

        let social_id = body
            .get("sub")
            .or_else(|| body.get("id"))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or(AppError::Unauthorized)?;

        let email = body
            .get("email")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let nickname = body
            .get("nickname")
            .or_else(|| body.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(SocialIdentity {
            provider: provider.to_string(),
            social_id,
            email,
            nickname,
        })
    }
}

const MEMBER_COLUMNS: &str = "member_id, email, nickname, password_hash, \
     social_provider, social_id, profile_image_key, refresh_token, created_at";

impl Member {
    pub async fn create(pool: &PgPool, req: &RegisterRequest) -> Result<Self, AppError> {
        let password_hash = hash_password(&req.password)?;

        let member = sqlx::query_as::<_, Member>(&format!(
            "INSERT INTO members (member_id, email, nickname, password_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&req.email)
        .bind(&req.nickname)
        .bind(password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::MemberExists
            } else {
                e.into()
            }
        })?;

        tracing::info!("registered member {}", member.member_id);
        Ok(member)
    }

    pub async fn create_social(
        pool: &PgPool,
        identity: &SocialIdentity,
    ) -> Result<Self, AppError> {
        let member_id = Uuid::new_v4();
        let email = identity
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@{}.social", identity.social_id, identity.provider));
        let nickname = identity
            .nickname
            .clone()
            .unwrap_or_else(|| format!("traveler{}", &member_id.simple().to_string()[0..6]));

        let member = sqlx::query_as::<_, Member>(&format!(
            "INSERT INTO members (member_id, email, nickname, social_provider, social_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(member_id)
        .bind(email)
        .bind(nickname)
        .bind(&identity.provider)
        .bind(&identity.social_id)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::MemberExists
            } else {
                e.into()
            }
        })?;

        tracing::info!(
            "created member {} from {} login",
            member.member_id,
            identity.provider
        );
        Ok(member)
    }

    pub async fn find_by_id(pool: &PgPool, member_id: Uuid) -> Result<Option<Self>, AppError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = $1"
        ))
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, AppError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub async fn find_by_social(
        pool: &PgPool,
        provider: &str,
        social_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members
             WHERE social_provider = $1 AND social_id = $2"
        ))
        .bind(provider)
        .bind(social_id)
        .fetch_optional(pool)
        .await?;

        Ok(member)
    }

    pub fn verify_login(&self, password: &str) -> Result<bool, AppError> {
        match &self.password_hash {
            Some(hash) => Ok(verify_password(password, hash)?),
            None => Ok(false),
        }
    }

    pub async fn update_nickname(
        pool: &PgPool,
        member_id: Uuid,
        nickname: &str,
    ) -> Result<Self, AppError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "UPDATE members SET nickname = $1 WHERE member_id = $2
             RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(nickname)
        .bind(member_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::NicknameExists
            } else {
                e.into()
            }
        })?
        .ok_or(AppError::MemberNotFound)?;

        Ok(member)
    }

    pub async fn update_password(
        pool: &PgPool,
        member_id: Uuid,
        new_password: &str,
    ) -> Result<(), AppError> {
        let password_hash = hash_password(new_password)?;

        let result = sqlx::query("UPDATE members SET password_hash = $1 WHERE member_id = $2")
            .bind(password_hash)
            .bind(member_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::MemberNotFound);
        }
        Ok(())
    }

    pub async fn store_refresh_token(
        pool: &PgPool,
        member_id: Uuid,
        refresh_token: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE members SET refresh_token = $1 WHERE member_id = $2")
            .bind(refresh_token)
            .bind(member_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn clear_refresh_token(pool: &PgPool, member_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE members SET refresh_token = NULL WHERE member_id = $1")
            .bind(member_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn update_profile_image(
        pool: &PgPool,
        member_id: Uuid,
        key: Option<&str>,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE members SET profile_image_key = $1 WHERE member_id = $2")
            .bind(key)
            .bind(member_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::MemberNotFound);
        }
        Ok(())
    }

    /// Hard-deletes the account. Schedules the member authored go with it;
    /// bookmark counters are walked back before the cascade removes the rows.
    pub async fn delete(pool: &PgPool, member_id: Uuid) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE travel_places SET bookmark_count = GREATEST(bookmark_count - 1, 0)
             WHERE place_id IN (SELECT place_id FROM bookmarks WHERE member_id = $1)",
        )
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM travel_schedules WHERE schedule_id IN (
                 SELECT schedule_id FROM travel_attendees
                 WHERE member_id = $1 AND role = 'AUTHOR'
             )",
        )
        .bind(member_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM members WHERE member_id = $1")
            .bind(member_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::MemberNotFound);
        }

        tx.commit().await?;
        tracing::info!("deactivated member {}", member_id);
        Ok(())
    }
}
