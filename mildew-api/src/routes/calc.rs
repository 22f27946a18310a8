/// Detection endpoints
///
/// Each takes a multipart upload with the image in field `file` and answers
/// with the result envelope.
///
/// - `POST /calc/downy` - Downy mildew, graded; always stored
/// - `POST /calc/powdery` - Powdery mildew, grouped by class
/// - `POST /calc/frogeye` - Frogeye leaf spot, per-leaf lesion analysis
///
/// Inference is bounded by the shared semaphore (`INFERENCE_CONCURRENCY`) and
/// `INFERENCE_TIMEOUT_SECS`, which also covers waiting for a permit. A timed
/// out inference keeps its permit until the work behind it finishes.

use crate::{
    app::AppState,
    envelope::{Envelope, DETECT_OK},
    error::{ApiError, ApiResult},
    middleware::{auth::MaybeAuthUser, client_ip::ClientIp},
};
use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Extension, Json,
};
use bytes::Bytes;
use mildew_engine::{
    detector::{DetectParams, Detector},
    imaging, lesion,
    predictor::{PredictError, Predictor},
    summary,
};
use mildew_shared::models::{
    record::{CreateMildewRecord, MildewRecord},
    user::User,
    DetectionKind,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Multipart field holding the image
pub const UPLOAD_FIELD: &str = "file";

/// Legacy query parameter accepted by `/calc/downy` when `ALLOW_LEGACY_USER_ID` is set
#[derive(Debug, Default, Deserialize)]
pub struct LegacyUserQuery {
    pub user_id: Option<i64>,
}

/// Reads the `file` field from a multipart body
///
/// # Errors
///
/// - 400 if the field is missing or the body is malformed
/// - 413 if the body exceeds `MAX_UPLOAD_BYTES`
pub async fn read_upload(mut multipart: Multipart) -> ApiResult<Bytes> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::BadRequest(format!("Missing multipart field `{}`", UPLOAD_FIELD)))
}

fn detector(state: &AppState, kind: DetectionKind) -> ApiResult<Arc<dyn Detector>> {
    state
        .detectors
        .get(kind)
        .ok_or_else(|| ApiError::detection_failed(StatusCode::SERVICE_UNAVAILABLE, format!("{} detector not loaded", kind)))
}

fn timed_out(timeout: Duration) -> ApiError {
    tracing::warn!(timeout_secs = timeout.as_secs_f64(), "Inference timed out");
    ApiError::detection_failed(
        StatusCode::SERVICE_UNAVAILABLE,
        format!("推理超时 ({}s)", timeout.as_secs()),
    )
}

/// Runs `work` under the inference semaphore and timeout
///
/// The work runs on its own task that owns the permit. A timeout only stops
/// the wait, so blocking work that is still running keeps its slot.
pub async fn run_inference<T, F>(inference: &Arc<Semaphore>, timeout: Duration, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, PredictError>> + Send + 'static,
{
    let deadline = tokio::time::Instant::now() + timeout;

    let permit = match tokio::time::timeout_at(deadline, inference.clone().acquire_owned()).await {
        Ok(permit) => permit.map_err(|_| ApiError::ServiceUnavailable("Inference pool closed".to_string()))?,
        Err(_) => return Err(timed_out(timeout)),
    };

    let task = tokio::spawn(async move {
        let result = work.await;
        drop(permit);
        result
    });

    match tokio::time::timeout_at(deadline, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(e)) => Err(ApiError::InternalError(format!("Inference task failed: {}", e))),
        Err(_) => Err(timed_out(timeout)),
    }
}

/// Confirms the user still exists
async fn require_user(state: &AppState, user_id: i64) -> ApiResult<User> {
    User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(ApiError::user_not_found)
}

async fn store(state: &AppState, user_id: i64, kind: DetectionKind, envelope: &Envelope) -> ApiResult<()> {
    let data = to_json(envelope)?;
    let record = MildewRecord::create(&state.db, CreateMildewRecord { user_id, kind, data }).await?;
    tracing::debug!(record_id = record.id, user_id, kind = %kind, "Stored detection record");
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::InternalError(format!("Failed to serialize result: {}", e)))
}

/// Downy mildew detection
///
/// The caller is identified by bearer token. With `ALLOW_LEGACY_USER_ID` set,
/// older clients may send `?user_id=` instead. The annotated image is kept in
/// `IMAGE_CACHE_DIR`.
///
/// # Response
///
/// ```json
/// {
///   "is_success": true,
///   "message": "识别成功",
///   "created_at": "2024-06-01T08:30:00Z",
///   "data": [{ "id": 1, "xyxy": [12.0, 40.5, 80.0, 96.2], "conf": 0.91, "cls": 2 }],
///   "grades": { "2级": 1 }
/// }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: No token, and no honoured `user_id`
/// - `404 Not Found`: `用户不存在`
/// - `422 Unprocessable Entity`: Not an image
pub async fn downy(
    State(state): State<AppState>,
    MaybeAuthUser(auth): MaybeAuthUser,
    Extension(client_ip): Extension<ClientIp>,
    Query(legacy): Query<LegacyUserQuery>,
    multipart: Multipart,
) -> ApiResult<Json<Envelope>> {
    let legacy_user_id = legacy.user_id.filter(|_| state.config.api.allow_legacy_user_id);
    if legacy.user_id.is_some() && legacy_user_id.is_none() && auth.is_none() {
        tracing::info!(client_ip = %client_ip, "Ignoring ?user_id= while ALLOW_LEGACY_USER_ID is off");
    }

    let user_id = auth
        .map(|a| a.user_id)
        .or(legacy_user_id)
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;
    let user = require_user(&state, user_id).await?;

    let upload = read_upload(multipart).await?;
    let started = Instant::now();

    let predictor = Predictor::new(detector(&state, DetectionKind::Downy)?, state.config.detection.params);
    let cache_dir = state.config.storage.image_cache_dir.clone();
    let prediction = run_inference(&state.inference, state.config.detection.timeout, async move {
        predictor.predict(upload, Some(cache_dir.as_path())).await
    })
    .await?;

    let envelope = Envelope::success(DETECT_OK, to_json(&prediction.detections)?)
        .with("grades", to_json(&summary::count_grades(&prediction.detections))?);
    store(&state, user.id, DetectionKind::Downy, &envelope).await?;

    tracing::info!(
        user_id = user.id,
        kind = "downy",
        detections = prediction.detections.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        client_ip = %client_ip,
        "Detection finished"
    );

    Ok(Json(envelope))
}

/// Powdery mildew detection
///
/// Stored only when the caller is authenticated.
///
/// # Response
///
/// ```json
/// {
///   "is_success": true,
///   "message": "识别成功",
///   "created_at": "2024-06-01T08:30:00Z",
///   "data": [{ "id": 1, "xyxy": [...], "conf": 0.77, "cls": 1 }],
///   "classes": { "T1": [{ "id": 1, "xyxy": "omit", "conf": "0.77", "cls": 1 }] }
/// }
/// ```
pub async fn powdery(
    State(state): State<AppState>,
    MaybeAuthUser(auth): MaybeAuthUser,
    Extension(client_ip): Extension<ClientIp>,
    multipart: Multipart,
) -> ApiResult<Json<Envelope>> {
    let user = match auth {
        Some(auth) => Some(require_user(&state, auth.user_id).await?),
        None => None,
    };

    let upload = read_upload(multipart).await?;
    let started = Instant::now();

    let predictor = Predictor::new(detector(&state, DetectionKind::Powdery)?, state.config.detection.params);
    let prediction = run_inference(&state.inference, state.config.detection.timeout, async move {
        predictor.predict(upload, None).await
    })
    .await?;

    let envelope = Envelope::success(DETECT_OK, to_json(&prediction.detections)?)
        .with("classes", to_json(&summary::organize_by_class(&prediction.detections))?);
    if let Some(user) = &user {
        store(&state, user.id, DetectionKind::Powdery, &envelope).await?;
    }

    tracing::info!(
        user_id = user.as_ref().map(|u| u.id),
        kind = "powdery",
        detections = prediction.detections.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        client_ip = %client_ip,
        "Detection finished"
    );

    Ok(Json(envelope))
}

/// Frogeye leaf spot detection and lesion grading
///
/// Runs at the frogeye thresholds (`FROGEYE_CONF`/`FROGEYE_IOU`). The
/// annotated image is compressed and saved under `STATIC_DIR`; anonymous
/// uploads are filed under user id 0.
///
/// # Response
///
/// ```json
/// {
///   "is_success": true,
///   "message": "识别成功",
///   "created_at": "2024-06-01T08:30:00Z",
///   "data": [{ "leaf_index": 0, "leaf_area": 5120, "lesion_area": 320,
///              "lesion_ratio": 0.0625, "lesion_count": 6,
///              "avg_gray_value": 88.5, "tier": 7 }],
///   "image_path": "static/results/frogeye/ID1-20240601083000-1a2b3c4d.jpg"
/// }
/// ```
pub async fn frogeye(
    State(state): State<AppState>,
    MaybeAuthUser(auth): MaybeAuthUser,
    Extension(client_ip): Extension<ClientIp>,
    multipart: Multipart,
) -> ApiResult<Json<Envelope>> {
    let user = match auth {
        Some(auth) => Some(require_user(&state, auth.user_id).await?),
        None => None,
    };

    let upload = read_upload(multipart).await?;
    let started = Instant::now();

    let params: DetectParams = state.config.detection.frogeye_params;
    let predictor = Predictor::new(detector(&state, DetectionKind::Frogeye)?, params);

    let (leaves, jpeg) = run_inference(&state.inference, state.config.detection.timeout, async move {
        let detected = predictor.detect(upload).await?;
        let analysed = tokio::task::spawn_blocking(move || {
            let report = lesion::analyze(&detected.detections, &detected.image);
            let annotated = report.annotated_jpeg(imaging::DEFAULT_JPEG_QUALITY)?;
            let compressed = imaging::compress(&annotated, imaging::COMPRESS_QUALITY)?;
            Ok::<_, imaging::ImageError>((report.leaves, compressed))
        })
        .await??;
        Ok::<_, PredictError>(analysed)
    })
    .await?;

    let owner = user.as_ref().map(|u| u.id).unwrap_or(0);
    let image_path = imaging::save_static(&state.config.storage.static_dir, owner, DetectionKind::Frogeye.as_str(), &jpeg).await?;

    let envelope = Envelope::success(DETECT_OK, to_json(&leaves)?).with("image_path", json!(image_path));
    if let Some(user) = &user {
        store(&state, user.id, DetectionKind::Frogeye, &envelope).await?;
    }

    tracing::info!(
        user_id = user.as_ref().map(|u| u.id),
        kind = "frogeye",
        leaves = leaves.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        client_ip = %client_ip,
        "Detection finished"
    );

    Ok(Json(envelope))
}
