/// Account endpoints
///
/// - `POST /user/register` - Create an account
/// - `POST /user/login` - Exchange credentials for a bearer token
/// - `GET /user/me` - Current user
/// - `PUT /user/me` - Change nickname and/or password

use crate::{
    app::AppState,
    envelope::{Envelope, REGISTER_OK},
    error::{ApiError, ApiResult, ValidationErrorDetail},
    middleware::auth::AuthUser,
};
use axum::{extract::State, http::StatusCode, Json};
use mildew_shared::{
    auth::{jwt, password},
    models::user::{CreateUser, User},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64, message = "Username must be 1 to 64 characters"))]
    pub username: String,

    /// Checked by `validate_password_strength`
    pub password: String,

    /// Defaults to the username
    #[validate(length(min = 1, max = 64, message = "Nickname must be 1 to 64 characters"))]
    pub nickname: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,

    /// Always `bearer`
    pub token_type: &'static str,

    /// Token lifetime in seconds
    pub expires_in: i64,

    pub user: User,
}

/// Profile update request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(length(min = 1, max = 64, message = "Nickname must be 1 to 64 characters"))]
    pub nickname: Option<String>,

    /// New password
    pub password: Option<String>,

    /// Required when `password` is set
    pub current_password: Option<String>,
}

fn weak_password(message: String) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail {
        field: "password".to_string(),
        message,
    }])
}

/// Hashes on the blocking pool; bcrypt at cost 12 takes a few hundred ms
async fn hash(state: &AppState, plain: String) -> ApiResult<String> {
    let scheme = state.config.jwt.password_scheme;
    tokio::task::spawn_blocking(move || password::hash_password(&plain, scheme))
        .await
        .map_err(|e| ApiError::InternalError(format!("Hashing task failed: {}", e)))?
        .map_err(Into::into)
}

/// `None` when the stored value is not a hash this server can check
async fn verify(plain: String, hash: String) -> ApiResult<Option<bool>> {
    let result = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| ApiError::InternalError(format!("Verification task failed: {}", e)))?;

    match result {
        Ok(matches) => Ok(Some(matches)),
        Err(password::PasswordError::InvalidHash(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /user/register
/// Content-Type: application/json
///
/// { "username": "grower", "password": "soybean", "nickname": "Grower" }
/// ```
///
/// # Response
///
/// ```json
/// { "is_success": true, "message": "注册成功", "created_at": "...", "data": { "user_id": 1 } }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Username taken (`注册失败, 由于...` envelope)
/// - `422 Unprocessable Entity`: Validation failed
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<Envelope>> {
    req.validate().map_err(ApiError::from_validation)?;
    password::validate_password_strength(&req.password).map_err(weak_password)?;

    let password_hash = hash(&state, req.password).await?;
    let nickname = req.nickname.unwrap_or_else(|| req.username.clone());

    let user = match User::create(
        &state.db,
        CreateUser {
            username: req.username.clone(),
            password_hash,
            nickname,
        },
    )
    .await
    {
        Ok(user) => user,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            tracing::info!(username = %req.username, "Registration rejected: username taken");
            return Err(ApiError::registration_failed(StatusCode::CONFLICT, "用户名已存在"));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id = user.id, username = %user.username, "User registered");

    Ok(Json(Envelope::success(REGISTER_OK, json!({ "user_id": user.id }))))
}

/// Login endpoint
///
/// # Response
///
/// ```json
/// { "access_token": "eyJ...", "token_type": "bearer", "expires_in": 86400, "user": {...} }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown username, wrong password or an unreadable stored hash
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate().map_err(ApiError::from_validation)?;

    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = User::find_by_username(&state.db, &req.username)
        .await?
        .ok_or_else(invalid)?;

    match verify(req.password, user.password_hash.clone()).await? {
        Some(true) => {}
        Some(false) => {
            tracing::info!(user_id = user.id, "Login rejected: wrong password");
            return Err(invalid());
        }
        None => {
            tracing::warn!(user_id = user.id, "Login rejected: stored password is not a recognised hash");
            return Err(invalid());
        }
    }

    let claims = jwt::Claims::new(user.id, user.nickname.clone(), state.config.jwt.expire_hours)?;
    let access_token = jwt::create_token(&claims, state.jwt_secret())?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        expires_in: claims.exp - claims.iat,
        user,
    }))
}

/// Current user
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

/// Updates the current user's nickname and/or password
///
/// # Errors
///
/// - `400 Bad Request`: `password` without `current_password`
/// - `401 Unauthorized`: `current_password` is wrong
/// - `422 Unprocessable Entity`: Validation failed
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateMeRequest>,
) -> ApiResult<Json<User>> {
    req.validate().map_err(ApiError::from_validation)?;

    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if let Some(new_password) = req.password {
        let current = req
            .current_password
            .ok_or_else(|| ApiError::BadRequest("current_password is required to change password".to_string()))?;

        if verify(current, user.password_hash.clone()).await? != Some(true) {
            return Err(ApiError::Unauthorized("Current password is incorrect".to_string()));
        }

        password::validate_password_strength(&new_password).map_err(weak_password)?;
        let password_hash = hash(&state, new_password).await?;
        User::update_password(&state.db, user.id, &password_hash).await?;
        tracing::info!(user_id = user.id, "Password changed");
    }

    let user = match req.nickname {
        Some(nickname) => User::update_nickname(&state.db, user.id, &nickname)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?,
        None => User::find_by_id(&state.db, user.id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?,
    };

    Ok(Json(user))
}
