use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

/// Every business failure the API can produce, mapped to a stable
/// (HTTP status, numeric code, message) triple.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    Unauthorized,
    TokenExpired,
    LoginFailed,
    EmailNotVerified,
    InvalidVerificationCode,
    MemberExists,
    NicknameExists,
    MemberNotFound,
    PlaceNotFound,
    ScheduleNotFound,
    NotAttendee,
    AttendeeNotFound,
    PermissionDenied,
    AuthorOnly,
    AuthorImmutable,
    AuthorCannotLeave,
    AttendeeLimitExceeded,
    AlreadyAttendee,
    BookmarkExists,
    BookmarkNotFound,
    MessageTooLong,
    RateLimited(u64),
    Storage(String),
    Database(sqlx::Error),
    Cache(redis::RedisError),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MessageTooLong => StatusCode::BAD_REQUEST,
            AppError::Unauthorized
            | AppError::TokenExpired
            | AppError::LoginFailed
            | AppError::InvalidVerificationCode => StatusCode::UNAUTHORIZED,
            AppError::EmailNotVerified
            | AppError::NotAttendee
            | AppError::PermissionDenied
            | AppError::AuthorOnly
            | AppError::AuthorImmutable
            | AppError::AuthorCannotLeave => StatusCode::FORBIDDEN,
            AppError::MemberNotFound
            | AppError::PlaceNotFound
            | AppError::ScheduleNotFound
            | AppError::AttendeeNotFound
            | AppError::BookmarkNotFound => StatusCode::NOT_FOUND,
            AppError::MemberExists
            | AppError::NicknameExists
            | AppError::AlreadyAttendee
            | AppError::AttendeeLimitExceeded
            | AppError::BookmarkExists => StatusCode::CONFLICT,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::MessageTooLong => error_codes::MESSAGE_TOO_LONG,
            AppError::Unauthorized | AppError::LoginFailed => error_codes::AUTH_FAILED,
            AppError::TokenExpired => error_codes::TOKEN_EXPIRED,
            AppError::EmailNotVerified | AppError::InvalidVerificationCode => {
                error_codes::EMAIL_VERIFICATION
            }
            AppError::MemberExists | AppError::NicknameExists => error_codes::MEMBER_EXISTS,
            AppError::MemberNotFound
            | AppError::PlaceNotFound
            | AppError::ScheduleNotFound
            | AppError::AttendeeNotFound
            | AppError::BookmarkNotFound => error_codes::NOT_FOUND,
            AppError::NotAttendee
            | AppError::PermissionDenied
            | AppError::AuthorOnly
            | AppError::AuthorImmutable
            | AppError::AuthorCannotLeave => error_codes::PERMISSION_DENIED,
            AppError::AttendeeLimitExceeded => error_codes::ATTENDEE_LIMIT,
            AppError::AlreadyAttendee | AppError::BookmarkExists => error_codes::CONFLICT,
            AppError::RateLimited(_) => error_codes::RATE_LIMIT,
            AppError::Storage(_)
            | AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Unauthorized => "Authentication required".into(),
            AppError::TokenExpired => "Token has expired".into(),
            AppError::LoginFailed => "Invalid email or password".into(),
            AppError::EmailNotVerified => "Email address has not been verified".into(),
            AppError::InvalidVerificationCode => "Invalid or expired verification code".into(),
            AppError::MemberExists => "A member with this email already exists".into(),
            AppError::NicknameExists => "This nickname is already taken".into(),
            AppError::MemberNotFound => "Member not found".into(),
            AppError::PlaceNotFound => "Travel place not found".into(),
            AppError::ScheduleNotFound => "Schedule not found".into(),
            AppError::NotAttendee => "You are not an attendee of this schedule".into(),
            AppError::AttendeeNotFound => "Attendee not found in this schedule".into(),
            AppError::PermissionDenied => "Your permission does not allow this action".into(),
            AppError::AuthorOnly => "Only the schedule author may do this".into(),
            AppError::AuthorImmutable => "The author's attendee row cannot be changed".into(),
            AppError::AuthorCannotLeave => "The author cannot leave their own schedule".into(),
            AppError::AttendeeLimitExceeded => "A schedule can have at most 5 attendees".into(),
            AppError::AlreadyAttendee => "This member is already an attendee".into(),
            AppError::BookmarkExists => "This place is already bookmarked".into(),
            AppError::BookmarkNotFound => "Bookmark not found".into(),
            AppError::MessageTooLong => "Chat messages are limited to 1000 characters".into(),
            AppError::RateLimited(secs) => {
                format!("Too many requests, retry after {} seconds", secs)
            }
            AppError::Storage(msg) => format!("Object storage error: {}", msg),
            AppError::Database(e) => format!("Database error: {}", e),
            AppError::Cache(e) => format!("Cache error: {}", e),
            AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
        }
        (status, error_to_api_response::<()>(self.code(), self.message())).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Cache(e)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing failed: {}", e))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::Unauthorized,
        }
    }
}

/// Postgres unique-constraint violations carry SQLSTATE 23505.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_class() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotAttendee.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::ScheduleNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::AttendeeLimitExceeded.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::MessageTooLong.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn capacity_error_has_its_own_code() {
        assert_eq!(
            AppError::AttendeeLimitExceeded.code(),
            error_codes::ATTENDEE_LIMIT
        );
        assert_ne!(
            AppError::AttendeeLimitExceeded.code(),
            AppError::AlreadyAttendee.code()
        );
    }
}
