/// Authentication utilities
///
/// # Modules
///
/// - [`password`]: bcrypt / Argon2id password hashing and validation
/// - [`jwt`]: JWT token generation and validation
///
/// # Example
///
/// ```no_run
/// use mildew_shared::auth::password::{hash_password, verify_password, PasswordScheme};
/// use mildew_shared::auth::jwt::{create_token, validate_token, Claims};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password", PasswordScheme::default())?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(1, "Grower".to_string(), 24.0)?;
/// let token = create_token(&claims, "secret-key")?;
/// let claims = validate_token(&token, "secret-key")?;
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod password;
