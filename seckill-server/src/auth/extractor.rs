//! Identity Extractor
//!
//! Reads the caller's user id from the `X-User-Id` header

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use shared::error::{AppError, ErrorCode};

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// 当前用户上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: i64,
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Check if already extracted
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(*user);
        }

        let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
            tracing::debug!(uri = %parts.uri, "Request without user id header");
            return Err(AppError::not_authenticated());
        };

        let id = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| {
                tracing::warn!(uri = %parts.uri, "Malformed user id header");
                AppError::new(ErrorCode::InvalidIdentity)
            })?;

        let user = CurrentUser { id };
        parts.extensions.insert(user);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<CurrentUser, AppError> {
        let mut builder = Request::builder().uri("/api/voucher-order/seckill/1");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header() {
        assert_eq!(extract(Some("42")).await.unwrap(), CurrentUser { id: 42 });
    }

    #[tokio::test]
    async fn test_missing_header() {
        let err = extract(None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_malformed_header() {
        for bad in ["abc", "-3", "0", ""] {
            let err = extract(Some(bad)).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidIdentity, "{bad:?}");
        }
    }
}
