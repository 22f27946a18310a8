/// Stored detection records of the calling user
///
/// - `GET /records?kind=&limit=&offset=` - Newest first, with the total
/// - `GET /records/:id` - One record
/// - `DELETE /records/:id` - Remove a record
///
/// Records of other users are reported as missing.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::auth::AuthUser,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mildew_shared::models::{record::MildewRecord, DetectionKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListRecordsQuery {
    /// `downy`, `powdery` or `frogeye`
    pub kind: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListRecordsResponse {
    pub records: Vec<MildewRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_records(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListRecordsQuery>,
) -> ApiResult<Json<ListRecordsResponse>> {
    let kind = query
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(str::parse::<DetectionKind>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let records = MildewRecord::list_by_user(&state.db, auth.user_id, kind, limit, offset).await?;
    let total = MildewRecord::count_by_user(&state.db, auth.user_id, kind).await?;

    Ok(Json(ListRecordsResponse {
        records,
        total,
        limit,
        offset,
    }))
}

pub async fn get_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MildewRecord>> {
    MildewRecord::find_by_id_and_user(&state.db, id, auth.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Record not found".to_string()))
}

pub async fn delete_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !MildewRecord::delete(&state.db, id, auth.user_id).await? {
        return Err(ApiError::NotFound("Record not found".to_string()));
    }

    tracing::info!(user_id = auth.user_id, record_id = id, "Record deleted");
    Ok(StatusCode::NO_CONTENT)
}
