use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // member id
    pub exp: i64,         // expiry timestamp
    pub iat: i64,         // issued at
    pub is_refresh: bool, // refresh tokens are only valid at the refresh endpoint
}

pub fn generate_access_token(
    member_id: Uuid,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(member_id, config.access_token_expiration().as_secs(), false, config)
}

pub fn generate_refresh_token(
    member_id: Uuid,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(member_id, config.refresh_token_expiration().as_secs(), true, config)
}

fn issue_token(
    member_id: Uuid,
    lifetime_secs: u64,
    is_refresh: bool,
    config: &Config,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = now
        .checked_add_signed(Duration::seconds(lifetime_secs as i64))
        .unwrap_or(now)
        .timestamp();

    let claims = Claims {
        sub: member_id,
        exp: expiration,
        iat: now.timestamp(),
        is_refresh,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Haversine distance between two coordinates, in meters.
pub fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Uniform response envelope for every REST endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: "success".into(),
        data: Some(data),
        code: None,
    })
}

pub fn error_to_api_response<T>(code: i32, message: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: false,
        message,
        data: None,
        code: Some(code),
    })
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn size(&self) -> i64 {
        self.size.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.size()
    }
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const MEMBER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const CONFLICT: i32 = 1006;
    pub const TOKEN_EXPIRED: i32 = 1007;
    pub const EMAIL_VERIFICATION: i32 = 1008;
    pub const ATTENDEE_LIMIT: i32 = 1009;
    pub const MESSAGE_TOO_LONG: i32 = 1010;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://localhost".into(),
            jwt_secret: "test-secret".into(),
            access_token_expiration_secs: 3600,
            refresh_token_expiration_secs: 86400,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            max_search_radius: 50000.0,
            storage_endpoint: "http://localhost:9000".into(),
            storage_bucket: "tripway".into(),
            storage_access_token: None,
            max_upload_bytes: 5 * 1024 * 1024,
            email_code_ttl_secs: 300,
            google_userinfo_url: "https://example.com/google".into(),
            kakao_userinfo_url: "https://example.com/kakao".into(),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let config = test_config();
        let member_id = Uuid::new_v4();

        let token = generate_access_token(member_id, &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();

        assert_eq!(claims.sub, member_id);
        assert!(!claims.is_refresh);
    }

    #[test]
    fn refresh_token_is_marked() {
        let config = test_config();
        let token = generate_refresh_token(Uuid::new_v4(), &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert!(claims.is_refresh);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let config = test_config();
        let token = generate_access_token(Uuid::new_v4(), &config).unwrap();
        let mut other = test_config();
        other.jwt_secret = "another-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn haversine_is_roughly_right() {
        // Seoul to Busan is about 325 km.
        let d = calculate_distance(37.5665, 126.9780, 35.1796, 129.0756);
        assert!(d > 300_000.0 && d < 350_000.0);
        assert!(calculate_distance(1.0, 2.0, 1.0, 2.0) < 1e-6);
    }

    #[test]
    fn page_query_clamps() {
        let q = PageQuery { page: Some(0), size: Some(500) };
        assert_eq!(q.page(), 1);
        assert_eq!(q.size(), 100);
        let q = PageQuery { page: None, size: None };
        assert_eq!(q.offset(), 0);
    }
}
