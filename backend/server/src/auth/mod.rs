//! # Authentication
//!
//! Requests authenticate with `Authorization: Token <jwt>` (`Bearer` is accepted too).
//!
//! - [`CurrentUser`]: any signed-in account
//! - [`VerifiedUser`]: signed in and the email address has been confirmed
//! - [`MaybeUser`]: anonymous allowed, a bad token is still rejected
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

pub mod jwt;
pub mod password;

use crate::{config::Config, error::AppError, models::User, state::AppState};
use jwt::Claims;

pub const NO_CREDENTIALS: &str = "Authentication credentials were not provided.";
pub const NOT_VERIFIED: &str = "Your account has not been verified.";
pub const BAD_HEADER: &str = "Invalid authorization header.";
pub const UNKNOWN_USER: &str = "No user matching this token was found.";

pub fn issue_token(config: &Config, user: &User) -> Result<String, AppError> {
    let claims = Claims::new(user.id, &user.username, config.token_ttl_hours);

    jwt::encode(&claims, &config.jwt_secret)
}

/// Token from the `Authorization` header. An empty header counts as absent.
fn credentials(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::forbidden(BAD_HEADER))?
        .trim();
    if value.is_empty() {
        return Ok(None);
    }

    match value.split_once(' ') {
        Some((scheme, token))
            if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") =>
        {
            Ok(Some(token.trim()))
        }
        _ => Err(AppError::forbidden(BAD_HEADER)),
    }
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<User>, AppError> {
    let Some(token) = credentials(parts)? else {
        return Ok(None);
    };

    let claims = jwt::decode(token, &state.config.jwt_secret)?;

    state
        .db
        .read()
        .await
        .user(claims.id)
        .cloned()
        .map(Some)
        .ok_or_else(|| AppError::forbidden(UNKNOWN_USER))
}

pub struct CurrentUser(pub User);

pub struct VerifiedUser(pub User);

pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<u64> {
        self.0.as_ref().map(|user| user.id)
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.map(MaybeUser)
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| AppError::forbidden(NO_CREDENTIALS))
    }
}

impl FromRequestParts<Arc<AppState>> for VerifiedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if !user.is_verified {
            return Err(AppError::Unauthorized(NOT_VERIFIED.to_string()));
        }

        Ok(VerifiedUser(user))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, header::AUTHORIZATION};

    use super::credentials;

    fn parts(header: Option<&str>) -> axum::http::request::Parts {
        let mut builder = Request::builder().uri("/api/user");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }

        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_missing_and_empty_header() {
        assert_eq!(credentials(&parts(None)).unwrap(), None);
        assert_eq!(credentials(&parts(Some(""))).unwrap(), None);
    }

    #[test]
    fn test_schemes() {
        assert_eq!(credentials(&parts(Some("Token abc"))).unwrap(), Some("abc"));
        assert_eq!(credentials(&parts(Some("Bearer abc"))).unwrap(), Some("abc"));
        assert_eq!(credentials(&parts(Some("token  abc "))).unwrap(), Some("abc"));
    }

    #[test]
    fn test_unknown_scheme() {
        assert!(credentials(&parts(Some("Basic abc"))).is_err());
        assert!(credentials(&parts(Some("abc"))).is_err());
    }
}
