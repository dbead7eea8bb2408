use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub access_token_expiration_secs: u64,
    pub refresh_token_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub max_search_radius: f64,
    pub storage_endpoint: String,
    pub storage_bucket: String,
    pub storage_access_token: Option<String>,
    pub max_upload_bytes: usize,
    pub email_code_ttl_secs: u64,
    pub google_userinfo_url: String,
    pub kakao_userinfo_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let access_expiration = env::var("ACCESS_TOKEN_EXPIRATION")
            .unwrap_or_else(|_| "1".into())
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(1);
        let refresh_expiration = env::var("REFRESH_TOKEN_EXPIRATION")
            .unwrap_or_else(|_| "336".into())
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(336);

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            jwt_secret: env::var("JWT_SECRET")?,
            access_token_expiration_secs: access_expiration * 3600,
            refresh_token_expiration_secs: refresh_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "100".into())
                .parse()
                .unwrap_or(100),
            max_search_radius: env::var("MAX_SEARCH_RADIUS")
                .unwrap_or_else(|_| "50000".into())
                .parse()
                .unwrap_or(50000.0),
            storage_endpoint: env::var("STORAGE_ENDPOINT")?,
            storage_bucket: env::var("STORAGE_BUCKET")?,
            storage_access_token: env::var("STORAGE_ACCESS_TOKEN").ok(),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "5242880".into())
                .parse()
                .unwrap_or(5 * 1024 * 1024),
            email_code_ttl_secs: env::var("EMAIL_CODE_TTL")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .unwrap_or(300),
            google_userinfo_url: env::var("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v3/userinfo".into()),
            kakao_userinfo_url: env::var("KAKAO_USERINFO_URL")
                .unwrap_or_else(|_| "https://kapi.kakao.com/v2/user/me".into()),
        })
    }

    pub fn access_token_expiration(&self) -> Duration {
        Duration::from_secs(self.access_token_expiration_secs)
    }

    pub fn refresh_token_expiration(&self) -> Duration {
        Duration::from_secs(self.refresh_token_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Userinfo endpoint used to verify a social access token for a provider.
    pub fn userinfo_url(&self, provider: &str) -> Option<&str> {
        match provider {
            "google" => Some(self.google_userinfo_url.as_str()),
            "kakao" => Some(self.kakao_userinfo_url.as_str()),
            _ => None,
        }
    }
}
