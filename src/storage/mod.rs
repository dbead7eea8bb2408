use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;

/// Thin client for an S3-compatible object store. Objects are written with
/// plain HTTP PUT/DELETE against `{endpoint}/{bucket}/{key}`.
pub struct ObjectStorage {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_token: Option<String>,
}

impl ObjectStorage {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: config.storage_endpoint.trim_end_matches('/').to_string(),
            bucket: config.storage_bucket.clone(),
            access_token: config.storage_access_token.clone(),
        }
    }

    /// Object keys follow `{timestamp}_{tag}_{uuid}.{ext}`.
    pub fn object_key(tag: &str, ext: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            tag,
            Uuid::new_v4(),
            ext
        )
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    pub async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        let digest = hex_digest(&bytes);
        let mut req = self
            .http
            .put(self.object_url(key))
            .header("Content-Type", content_type)
            .header("x-amz-content-sha256", digest)
            .body(bytes);

        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Storage(format!(
                "upload of {} failed with status {}",
                key,
                resp.status()
            )));
        }

        tracing::debug!("stored object {}", key);
        Ok(())
    }

    /// Deleting an object that is already gone is not an error.
    pub async fn delete_object(&self, key: &str) -> Result<(), AppError> {
        let mut req = self.http.delete(self.object_url(key));
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(AppError::Storage(format!(
                "delete of {} failed with status {}",
                key,
                resp.status()
            )));
        }

        Ok(())
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_has_timestamp_tag_uuid_and_extension() {
        let key = ObjectStorage::object_key("profile", "png");
        assert!(key.ends_with(".png"));

        let stem = key.trim_end_matches(".png");
        let parts: Vec<&str> = stem.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].parse::<i64>().is_ok());
        assert_eq!(parts[1], "profile");
        assert!(Uuid::parse_str(parts[2]).is_ok());
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let d = hex_digest(b"hello");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
