/// Bearer token extractors
///
/// - [`AuthUser`]: a valid `Authorization: Bearer <jwt>` is required
/// - [`MaybeAuthUser`]: the header is optional, but a token that is present
///   must be valid
///
/// # Example
///
/// ```no_run
/// use mildew_api::middleware::auth::AuthUser;
///
/// async fn whoami(user: AuthUser) -> String {
///     format!("user {}", user.user_id)
/// }
/// ```

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use mildew_shared::auth::jwt;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub nickname: String,
}

/// Caller that may or may not be authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

/// Validates the bearer token in `headers`, if any
///
/// # Errors
///
/// 401 if the header isn't a bearer token, or the token is expired or invalid
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Option<AuthUser>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Malformed authorization header".to_string()))?;

    let token = match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => return Err(ApiError::Unauthorized("Expected Bearer token".to_string())),
    };

    let claims = jwt::validate_token(token, secret)?;

    Ok(Some(AuthUser {
        user_id: claims.sub,
        nickname: claims.nickname,
    }))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state.jwt_secret())?
            .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state.jwt_secret()).map(MaybeAuthUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use mildew_shared::auth::jwt::{create_token, Claims};

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn bearer(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_no_header_is_anonymous() {
        assert_eq!(authenticate(&HeaderMap::new(), SECRET).unwrap(), None);
    }

    #[test]
    fn test_valid_token() {
        let token = create_token(&Claims::new(7, "Grower".to_string(), 1.0).unwrap(), SECRET).unwrap();
        let user = authenticate(&bearer(&format!("bearer {}", token)), SECRET)
            .unwrap()
            .unwrap();
        assert_eq!(user.user_id, 7);
        assert_eq!(user.nickname, "Grower");
    }

    #[test]
    fn test_wrong_scheme() {
        let err = authenticate(&bearer("Basic dXNlcjpwYXNz"), SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = authenticate(&bearer("Bearer"), SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_non_utf8_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
        );
        let err = authenticate(&headers, SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims::with_expiration(7, "Grower".to_string(), chrono::Duration::seconds(-60)).unwrap();
        let token = create_token(&claims, SECRET).unwrap();
        let err = authenticate(&bearer(&format!("Bearer {}", token)), SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_invalid_token() {
        let err = authenticate(&bearer("Bearer not.a.token"), SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
