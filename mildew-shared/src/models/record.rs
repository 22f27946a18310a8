/// Detection record model and database operations
///
/// Every successful detection made on behalf of a known user is stored as one
/// record holding the full response envelope as JSON.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE mildewdata (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     type TEXT NOT NULL DEFAULT 'mildew',
///     data TEXT NOT NULL DEFAULT '{}',
///     created_at TEXT NOT NULL,
///     user_id INTEGER REFERENCES "user" (id) ON DELETE CASCADE
/// );
/// ```
///
/// `type` is kept as free text: rows written by the earlier deployment may carry
/// the legacy default `mildew`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{types::Json, SqlitePool};

use super::DetectionKind;

/// Stored detection result
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MildewRecord {
    /// Unique record ID
    pub id: i64,

    /// Detection kind (`downy`, `powdery`, `frogeye`, or legacy values)
    #[sqlx(rename = "type")]
    pub kind: String,

    /// Result payload
    pub data: Json<JsonValue>,

    /// When the detection was made
    pub created_at: DateTime<Utc>,

    /// Owner
    pub user_id: Option<i64>,
}

/// Input for creating a record
#[derive(Debug, Clone)]
pub struct CreateMildewRecord {
    /// Owner
    pub user_id: i64,

    /// Detection kind
    pub kind: DetectionKind,

    /// Result payload
    pub data: JsonValue,
}

const COLUMNS: &str = "id, type, data, created_at, user_id";

impl MildewRecord {
    /// Stores a detection result
    ///
    /// # Errors
    ///
    /// Returns a foreign key violation if the user does not exist.
    pub async fn create(pool: &SqlitePool, input: CreateMildewRecord) -> Result<Self, sqlx::Error> {
        let record = sqlx::query_as::<_, MildewRecord>(&format!(
            "INSERT INTO mildewdata (type, data, created_at, user_id) \
             VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}"
        ))
        .bind(input.kind.as_str())
        .bind(Json(input.data))
        .bind(Utc::now())
        .bind(input.user_id)
        .fetch_one(pool)
        .await?;

        Ok(record)
    }

    /// Finds a record by ID regardless of owner
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        let record = sqlx::query_as::<_, MildewRecord>(&format!(
            "SELECT {COLUMNS} FROM mildewdata WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Finds a record by ID, only if it belongs to `user_id`
    pub async fn find_by_id_and_user(
        pool: &SqlitePool,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let record = sqlx::query_as::<_, MildewRecord>(&format!(
            "SELECT {COLUMNS} FROM mildewdata WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// Lists a user's records, newest first, optionally filtered by kind
    pub async fn list_by_user(
        pool: &SqlitePool,
        user_id: i64,
        kind: Option<DetectionKind>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let records = sqlx::query_as::<_, MildewRecord>(&format!(
            "SELECT {COLUMNS} FROM mildewdata \
             WHERE user_id = $1 AND ($2 IS NULL OR type = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(user_id)
        .bind(kind.map(|k| k.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    /// Counts a user's records, optionally filtered by kind
    pub async fn count_by_user(
        pool: &SqlitePool,
        user_id: i64,
        kind: Option<DetectionKind>,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM mildewdata WHERE user_id = $1 AND ($2 IS NULL OR type = $2)",
        )
        .bind(user_id)
        .bind(kind.map(|k| k.as_str()))
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Deletes a record owned by `user_id`
    ///
    /// Returns false when the record doesn't exist or belongs to someone else.
    pub async fn delete(pool: &SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM mildewdata WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
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
    use crate::models::user::{CreateUser, User};
    use serde_json::json;

    async fn setup() -> (SqlitePool, User) {
        let pool = create_pool(DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let user = User::create(
            &pool,
            CreateUser {
                username: "grower".to_string(),
                password_hash: "hash".to_string(),
                nickname: "Grower".to_string(),
            },
        )
        .await
        .unwrap();
        (pool, user)
    }

    fn record(user_id: i64, kind: DetectionKind) -> CreateMildewRecord {
        CreateMildewRecord {
            user_id,
            kind,
            data: json!({ "is_success": true, "data": [] }),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_record() {
        let (pool, user) = setup().await;

        let created = MildewRecord::create(&pool, record(user.id, DetectionKind::Downy))
            .await
            .unwrap();
        assert_eq!(created.kind, "downy");
        assert_eq!(created.user_id, Some(user.id));
        assert_eq!(created.data.0["is_success"], true);

        let found = MildewRecord::find_by_id(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);

        assert!(MildewRecord::find_by_id_and_user(&pool, created.id, user.id + 1)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_record_for_missing_user_rejected() {
        let (pool, _user) = setup().await;
        let result = MildewRecord::create(&pool, record(4242, DetectionKind::Downy)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_and_count_with_filter() {
        let (pool, user) = setup().await;

        for kind in [DetectionKind::Downy, DetectionKind::Downy, DetectionKind::Frogeye] {
            MildewRecord::create(&pool, record(user.id, kind)).await.unwrap();
        }

        assert_eq!(MildewRecord::count_by_user(&pool, user.id, None).await.unwrap(), 3);
        assert_eq!(
            MildewRecord::count_by_user(&pool, user.id, Some(DetectionKind::Downy))
                .await
                .unwrap(),
            2
        );

        let all = MildewRecord::list_by_user(&pool, user.id, None, 10, 0).await.unwrap();
        assert_eq!(all.len(), 3);
        // Newest first
        assert!(all[0].id > all[2].id);

        let page = MildewRecord::list_by_user(&pool, user.id, None, 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);

        let frogeye = MildewRecord::list_by_user(&pool, user.id, Some(DetectionKind::Frogeye), 10, 0)
            .await
            .unwrap();
        assert_eq!(frogeye.len(), 1);
        assert_eq!(frogeye[0].kind, "frogeye");
    }

    #[tokio::test]
    async fn test_delete_is_owner_scoped() {
        let (pool, user) = setup().await;
        let created = MildewRecord::create(&pool, record(user.id, DetectionKind::Powdery))
            .await
            .unwrap();

        assert!(!MildewRecord::delete(&pool, created.id, user.id + 1).await.unwrap());
        assert!(MildewRecord::delete(&pool, created.id, user.id).await.unwrap());
        assert!(MildewRecord::find_by_id(&pool, created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_delete_cascades() {
        let (pool, user) = setup().await;
        let created = MildewRecord::create(&pool, record(user.id, DetectionKind::Downy))
            .await
            .unwrap();

        User::delete(&pool, user.id).await.unwrap();
        assert!(MildewRecord::find_by_id(&pool, created.id).await.unwrap().is_none());
    }
}
