/// Password hashing module
///
/// Two schemes are supported:
///
/// - **bcrypt** (default): Compatible with hashes written by passlib's
///   `CryptContext(schemes=["bcrypt"])`, so accounts from the earlier
///   deployment keep working. Cost 12 matches passlib's default.
/// - **Argon2id**: 64 MB memory, 3 iterations, 4 lanes, 32-byte output.
///
/// Verification detects the scheme from the stored hash, so a server can be
/// switched to Argon2id for new accounts while old bcrypt hashes still verify.
///
/// # Example
///
/// ```
/// use mildew_shared::auth::password::{hash_password, verify_password, PasswordScheme};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("leaf-spot-2024", PasswordScheme::Bcrypt { cost: 4 })?;
/// assert!(verify_password("leaf-spot-2024", &hash)?);
/// assert!(!verify_password("wrong", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder, Version,
};
use std::str::FromStr;

/// Default bcrypt cost factor
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Longest password bcrypt can hash without truncation
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Shortest accepted password
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Invalid password hash format
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Hashing scheme used for new passwords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordScheme {
    /// bcrypt with the given cost (4..=31)
    Bcrypt { cost: u32 },

    /// Argon2id with fixed parameters
    Argon2id,
}

impl Default for PasswordScheme {
    fn default() -> Self {
        PasswordScheme::Bcrypt {
            cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl FromStr for PasswordScheme {
    type Err = String;

    /// Parses `bcrypt` or `argon2id`; bcrypt gets the default cost
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bcrypt" => Ok(PasswordScheme::default()),
            "argon2" | "argon2id" => Ok(PasswordScheme::Argon2id),
            other => Err(format!("Unknown password scheme: {}", other)),
        }
    }
}

/// Hashes a password with the given scheme
///
/// # Returns
///
/// A modular crypt string (`$2b$...`) for bcrypt or a PHC string
/// (`$argon2id$...`) for Argon2id.
///
/// # Errors
///
/// Returns `PasswordError::HashError` if hashing fails (e.g. bcrypt cost out of range)
pub fn hash_password(password: &str, scheme: PasswordScheme) -> Result<String, PasswordError> {
    match scheme {
        PasswordScheme::Bcrypt { cost } => bcrypt::hash(password, cost)
            .map_err(|e| PasswordError::HashError(format!("bcrypt: {}", e))),
        PasswordScheme::Argon2id => hash_argon2id(password),
    }
}

fn hash_argon2id(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = ParamsBuilder::new()
        .m_cost(65536) // 64 MB
        .t_cost(3)
        .p_cost(4)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(password_hash.to_string())
}

/// Verifies a password against a stored hash of either scheme
///
/// # Returns
///
/// `Ok(true)` if password matches, `Ok(false)` if it doesn't match
///
/// # Errors
///
/// Returns `PasswordError::InvalidHash` if the hash is not a recognised format
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    if is_bcrypt_hash(hash) {
        return bcrypt::verify(password, hash)
            .map_err(|e| PasswordError::InvalidHash(format!("bcrypt: {}", e)));
    }

    if hash.starts_with("$argon2") {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

        // Parameters are embedded in the hash
        return match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::VerifyError(format!("Verification failed: {}", e))),
        };
    }

    Err(PasswordError::InvalidHash(
        "Unrecognised hash prefix".to_string(),
    ))
}

fn is_bcrypt_hash(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
}

/// Validates a new password
///
/// Rules:
/// - At least 6 characters
/// - At most 72 bytes (bcrypt truncates anything longer)
/// - Not only whitespace
///
/// # Example
///
/// ```
/// use mildew_shared::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("soybean").is_ok());
/// assert!(validate_password_strength("abc").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_CHARS
        ));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(format!(
            "Password must be at most {} bytes long",
            MAX_PASSWORD_BYTES
        ));
    }

    if password.trim().is_empty() {
        return Err("Password must not be blank".to_string());
    }

    Ok(())
}
