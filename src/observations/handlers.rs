use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{CreateObservationRequest, ListParams},
    repo_types::Observation,
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::AppError,
    extract::{ValidJson, ValidMultipart, ValidPath, ValidQuery},
    state::AppState,
    uploads::{MediaPipeline, UploadItem, UploadRequest},
};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/observations", get(list_observations))
        .route("/observations/", get(list_observations))
        .route("/observations/:id", get(get_observation))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/observations", post(create_observation))
        .route("/observations/", post(create_observation))
        .route("/observations/:id/view", post(view_observation))
        .route(
            "/observations/upload",
            post(upload_observation).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_observations(
    State(state): State<AppState>,
    ValidQuery(p): ValidQuery<ListParams>,
) -> Result<Json<Vec<Observation>>, AppError> {
    let items = services::list_observations(state.observations.as_ref(), p.skip, p.limit).await?;
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_observation(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Observation>, AppError> {
    state
        .observations
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Observation not found".into()))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create_observation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidJson(body): ValidJson<CreateObservationRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Observation>), AppError> {
    let obs = services::create_observation(state.observations.as_ref(), user.id, body).await?;
    Ok((StatusCode::CREATED, location(obs.id), Json(obs)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn view_observation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Observation>, AppError> {
    services::increment_if_not_owner(state.observations.as_ref(), id, user.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Observation not found".into()))
}

/// POST /observations/upload (multipart)
/// Fields: caption, latitude, longitude, and 1-5 image files under `files`,
/// `files[]` or `images`.
#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn upload_observation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidMultipart(mut mp): ValidMultipart,
) -> Result<(StatusCode, HeaderMap, Json<Observation>), AppError> {
    let mut caption = None;
    let mut latitude = None;
    let mut longitude = None;
    let mut files = Vec::new();

    while let Some(field) = mp.next_field().await.map_err(|e| {
        warn!(error = %e, "unreadable multipart body");
        AppError::from(e)
    })? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("caption") => caption = Some(text(field).await?),
            Some("latitude") => latitude = Some(text(field).await?),
            Some("longitude") => longitude = Some(text(field).await?),
            Some("files") | Some("files[]") | Some("images") => {
                let filename = field.file_name().map(|s| s.to_string());
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await?;
                files.push(UploadItem {
                    filename,
                    content_type,
                    body,
                });
            }
            _ => {}
        }
    }

    let req = UploadRequest {
        user_id: user.id,
        caption: caption.ok_or_else(|| AppError::validation("caption is required"))?,
        latitude: number("latitude", latitude)?,
        longitude: number("longitude", longitude)?,
        files,
    };

    let pipeline = MediaPipeline::new(
        state.observations.clone(),
        state.storage.clone(),
        &state.config.storage,
    );
    let obs = pipeline.ingest_detached(req).await?;
    info!(observation_id = obs.id, "upload accepted");
    Ok((StatusCode::CREATED, location(obs.id), Json(obs)))
}

async fn text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    Ok(field.text().await?)
}

fn number(name: &str, raw: Option<String>) -> Result<f64, AppError> {
    raw.ok_or_else(|| AppError::validation(format!("{name} is required")))?
        .trim()
        .parse::<f64>()
        .map_err(|_| AppError::validation(format!("{name} must be a number")))
}

fn location(id: i64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&format!("/observations/{id}")) {
        headers.insert(header::LOCATION, v);
    }
    headers
}
