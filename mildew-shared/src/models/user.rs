/// User model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE "user" (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     username TEXT NOT NULL UNIQUE,
///     password TEXT NOT NULL,
///     nickname TEXT NOT NULL,
///     created_at TEXT NOT NULL
/// );
/// ```
///
/// The `password` column holds a bcrypt or Argon2id hash, never plaintext.
///
/// # Example
///
/// ```no_run
/// use mildew_shared::models::user::{User, CreateUser};
/// use sqlx::SqlitePool;
///
/// # async fn example(pool: SqlitePool) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     username: "farmer".to_string(),
///     password_hash: "$2b$12$...".to_string(),
///     nickname: "Farmer".to_string(),
/// }).await?;
///
/// let found = User::find_by_username(&pool, "farmer").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// User model representing a user account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub id: i64,

    /// Login name, unique across all users
    pub username: String,

    /// Password hash (bcrypt or Argon2id PHC string)
    #[serde(skip_serializing)]
    #[sqlx(rename = "password")]
    pub password_hash: String,

    /// Display name
    pub nickname: String,

    /// When the user account was created
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    /// Login name
    pub username: String,

    /// Password hash (NOT plaintext password!)
    pub password_hash: String,

    /// Display name
    pub nickname: String,
}

impl User {
    /// Creates a new user in the database
    ///
    /// # Errors
    ///
    /// Returns a database error with a unique constraint violation if the
    /// username is taken.
    pub async fn create(pool: &SqlitePool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO "user" (username, password, nickname, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password, nickname, created_at
            "#,
        )
        .bind(data.username)
        .bind(data.password_hash)
        .bind(data.nickname)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password, nickname, created_at
            FROM "user"
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by username (exact match)
    pub async fn find_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password, nickname, created_at
            FROM "user"
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Updates the display name
    ///
    /// Returns the updated user, or None if the user doesn't exist.
    pub async fn update_nickname(
        pool: &SqlitePool,
        id: i64,
        nickname: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE "user" SET nickname = $2
            WHERE id = $1
            RETURNING id, username, password, nickname, created_at
            "#,
        )
        .bind(id)
        .bind(nickname)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Replaces the stored password hash
    pub async fn update_password(
        pool: &SqlitePool,
        id: i64,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"UPDATE "user" SET password = $2 WHERE id = $1"#)
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user
    ///
    /// ⚠️  This also deletes all of the user's detection records due to CASCADE.
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM "user" WHERE id = $1"#)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    };

    async fn setup() -> SqlitePool {
        let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn new_user(username: &str) -> CreateUser {
        CreateUser {
            username: username.to_string(),
            password_hash: "$2b$12$hash".to_string(),
            nickname: format!("{} nick", username),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let pool = setup().await;

        let user = User::create(&pool, new_user("alice")).await.unwrap();
        assert!(user.id > 0);
        assert_eq!(user.username, "alice");
        assert_eq!(user.nickname, "alice nick");

        let by_id = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");

        let by_name = User::find_by_username(&pool, "alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);

        assert!(User::find_by_username(&pool, "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let pool = setup().await;

        User::create(&pool, new_user("alice")).await.unwrap();
        let err = User::create(&pool, new_user("alice")).await.unwrap_err();

        match err {
            sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
            other => panic!("expected unique violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_user() {
        let pool = setup().await;
        let user = User::create(&pool, new_user("alice")).await.unwrap();

        let updated = User::update_nickname(&pool, user.id, "Alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.nickname, "Alice");

        assert!(User::update_password(&pool, user.id, "$2b$12$other").await.unwrap());
        let reloaded = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, "$2b$12$other");

        assert!(User::update_nickname(&pool, 999, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_password_hash_not_serialized() {
        let pool = setup().await;
        let user = User::create(&pool, new_user("alice")).await.unwrap();

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[tokio::test]
    async fn test_delete_user() {
        let pool = setup().await;
        let user = User::create(&pool, new_user("alice")).await.unwrap();

        assert!(User::delete(&pool, user.id).await.unwrap());
        assert!(!User::delete(&pool, user.id).await.unwrap());
        assert!(User::find_by_id(&pool, user.id).await.unwrap().is_none());
    }
}
