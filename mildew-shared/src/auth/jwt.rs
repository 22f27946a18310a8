/// JWT token generation and validation module
///
/// Tokens are signed using HS256 (HMAC-SHA256) and carry the user's ID and
/// nickname. Expiry is configured in hours (fractional values allowed).
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC with SHA-256)
/// - **Validation**: Signature, expiration, not-before and issuer checks
/// - **Secret Management**: Secrets should be at least 32 bytes (256 bits)
///
/// # Example
///
/// ```
/// use mildew_shared::auth::jwt::{create_token, validate_token, Claims};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let claims = Claims::new(42, "Grower".to_string(), 24.0)?;
/// let token = create_token(&claims, "your-secret-key")?;
///
/// let validated = validate_token(&token, "your-secret-key")?;
/// assert_eq!(validated.sub, 42);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Issuer claim written into and required on every token
pub const ISSUER: &str = "mildew";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Token has expired
    #[error("Token已过期")]
    Expired,

    /// Signature, issuer or format check failed
    #[error("无效的Token")]
    Invalid(String),
}

/// JWT claims structure
///
/// # Standard Claims
///
/// - `sub`: Subject (user ID)
/// - `iss`: Issuer (always "mildew")
/// - `iat`: Issued at timestamp
/// - `exp`: Expiration timestamp
/// - `nbf`: Not before timestamp
///
/// # Custom Claims
///
/// - `nickname`: Display name at the time of login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: i64,

    /// Issuer - Always "mildew"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Display name (custom claim)
    pub nickname: String,
}

impl Claims {
    /// Creates claims expiring `expire_hours` from now
    ///
    /// # Errors
    ///
    /// Returns `JwtError::CreateError` unless `expire_hours` is a positive
    /// lifetime that fits in a timestamp
    pub fn new(user_id: i64, nickname: String, expire_hours: f64) -> Result<Self, JwtError> {
        let seconds = (expire_hours * 3600.0).round();
        if !seconds.is_finite() || seconds <= 0.0 || seconds >= i64::MAX as f64 {
            return Err(JwtError::CreateError(format!(
                "Invalid token lifetime: {} hours",
                expire_hours
            )));
        }

        let expires_in = Duration::try_seconds(seconds as i64).ok_or_else(|| {
            JwtError::CreateError(format!("Invalid token lifetime: {} hours", expire_hours))
        })?;
        Self::with_expiration(user_id, nickname, expires_in)
    }

    /// Creates claims with a custom expiration
    ///
    /// # Errors
    ///
    /// Returns `JwtError::CreateError` if the expiry overflows the calendar
    pub fn with_expiration(
        user_id: i64,
        nickname: String,
        expires_in: Duration,
    ) -> Result<Self, JwtError> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(expires_in)
            .ok_or_else(|| JwtError::CreateError("Expiration out of range".to_string()))?;

        Ok(Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            nbf: now.timestamp(),
            nickname,
        })
    }

    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Gets time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now().timestamp();
        if self.exp > now {
            Some(Duration::seconds(self.exp - now))
        } else {
            None
        }
    }
}

/// Creates a JWT token from claims
///
/// # Errors
///
/// Returns `JwtError::CreateError` if token creation fails
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates a JWT token and extracts claims
///
/// # Errors
///
/// - `JwtError::Expired` if the token has expired
/// - `JwtError::Invalid` for any other failure (signature, issuer, format)
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::Invalid(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_claims_creation() {
        let claims = Claims::new(7, "Grower".to_string(), 24.0).unwrap();

        assert_eq!(claims.sub, 7);
        assert_eq!(claims.nickname, "Grower");
        assert_eq!(claims.iss, "mildew");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_fractional_hours() {
        let claims = Claims::new(1, "n".to_string(), 0.5).unwrap();
        assert_eq!(claims.exp - claims.iat, 1800);

        let left = claims.time_until_expiration().unwrap();
        assert!(left.num_seconds() > 1790);
        assert!(left.num_seconds() <= 1800);
    }

    #[test]
    fn test_create_and_validate_token() {
        let claims = Claims::new(11, "Grower".to_string(), 1.0).unwrap();
        let token = create_token(&claims, SECRET).expect("Should create token");

        let validated = validate_token(&token, SECRET).expect("Should validate token");
        assert_eq!(validated.sub, 11);
        assert_eq!(validated.nickname, "Grower");
        assert_eq!(validated.iss, "mildew");
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let claims = Claims::new(1, "n".to_string(), 1.0).unwrap();
        let token = create_token(&claims, "secret1").unwrap();

        let result = validate_token(&token, "wrong-secret");
        assert!(matches!(result, Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_validate_expired_token() {
        let claims = Claims::with_expiration(1, "n".to_string(), Duration::seconds(-3600)).unwrap();
        assert!(claims.is_expired());
        assert!(claims.time_until_expiration().is_none());

        let token = create_token(&claims, SECRET).unwrap();
        let result = validate_token(&token, SECRET);
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_validate_garbage() {
        assert!(matches!(
            validate_token("not.a.token", SECRET),
            Err(JwtError::Invalid(_))
        ));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let mut claims = Claims::new(1, "n".to_string(), 1.0).unwrap();
        claims.iss = "someone-else".to_string();
        let token = create_token(&claims, SECRET).unwrap();

        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_unusable_lifetimes_rejected() {
        for hours in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e13, 1e300] {
            assert!(
                matches!(Claims::new(1, "n".to_string(), hours), Err(JwtError::CreateError(_))),
                "lifetime {} should be rejected",
                hours
            );
        }
    }

    #[test]
    fn test_expiration_overflow_rejected() {
        let result = Claims::with_expiration(1, "n".to_string(), Duration::MAX);
        assert!(matches!(result, Err(JwtError::CreateError(_))));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(JwtError::Expired.to_string(), "Token已过期");
        assert_eq!(JwtError::Invalid("x".to_string()).to_string(), "无效的Token");
    }
}
