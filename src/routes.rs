use axum::http::StatusCode;
use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::{PackageError, StoreError};
use crate::model::Course;
use crate::store::{PackageRecord, Store};
use crate::{archive, import};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let content_dir = state.config.data_dir.join("content");
    Router::new()
        // package records (import side)
        .route("/api/packages", get(list_packages))
        .route("/api/packages/upload", post(upload_package))
        .route("/api/packages/:id", get(get_package).delete(delete_package))
        .route(
            "/api/packages/:id/progress/:user_id",
            get(get_progress).post(update_progress),
        )
        // course editing (export side)
        .route("/api/courses", get(list_courses).post(create_course))
        .route(
            "/api/courses/:id",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/api/courses/:id/draft", get(get_draft).put(save_draft))
        .route("/api/courses/:id/publish", post(publish_course))
        // extracted package content for the player
        .nest_service("/content", ServeDir::new(content_dir))
        .with_state(state)
}

// --- packages ---

async fn list_packages(
    State(state): State<AppState>,
) -> Result<Json<Vec<PackageRecord>>, (StatusCode, String)> {
    Ok(Json(state.store.list_packages().map_err(store_err)?))
}

async fn get_package(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PackageRecord>, (StatusCode, String)> {
    Ok(Json(state.store.get_package(&id).map_err(store_err)?))
}

async fn upload_package(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<Json<PackageRecord>, (StatusCode, String)> {
    let mut title = None;
    let mut description = String::new();
    let mut zip_bytes: Option<Vec<u8>> = None;

    while let Some(field) = mp.next_field().await.map_err(e500)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "title" => title = Some(field.text().await.map_err(e500)?),
            "description" => description = field.text().await.map_err(e500)?,
            "file" => zip_bytes = Some(field.bytes().await.map_err(e500)?.to_vec()),
            _ => {}
        }
    }
    let bytes = zip_bytes.ok_or(e400("file is required"))?;

    let record = import::import_archive(&bytes, title, description, &state.config)
        .map_err(package_err)?;
    materialize_content(&state, &record, &bytes).map_err(package_err)?;
    state.store.save_package(&record).map_err(store_err)?;
    Ok(Json(record))
}

async fn delete_package(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.store.delete_package(&id).map_err(store_err)?;
    let dir = state.config.data_dir.join("content").join(&id);
    if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(package = %id, error = %err, "failed to remove extracted content");
        }
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn update_progress(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
    Json(data): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    // existence check keeps progress blobs from accumulating for deleted ids
    state.store.get_package(&id).map_err(store_err)?;
    state
        .store
        .save_progress(&id, &user_id, &data)
        .map_err(store_err)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn get_progress(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let progress = state
        .store
        .get_progress(&id, &user_id)
        .map_err(store_err)?
        .unwrap_or_else(|| serde_json::json!({}));
    Ok(Json(progress))
}

// --- courses ---

async fn list_courses(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let records = state.store.list_courses().map_err(store_err)?;
    Ok(Json(serde_json::to_value(records).map_err(e500)?))
}

async fn create_course(
    State(state): State<AppState>,
    Json(course): Json<Course>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let record = state.store.create_course(course).map_err(store_err)?;
    Ok(Json(serde_json::to_value(record).map_err(e500)?))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let record = state.store.get_course(&id).map_err(store_err)?;
    Ok(Json(serde_json::to_value(record).map_err(e500)?))
}

async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(course): Json<Course>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let record = state.store.update_course(&id, course).map_err(store_err)?;
    Ok(Json(serde_json::to_value(record).map_err(e500)?))
}

async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state.store.delete_course(&id).map_err(store_err)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// --- drafts ---

async fn save_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(course): Json<Course>,
) -> Result<Json<Value>, (StatusCode, String)> {
    // draft for a course that was never created is still allowed; the id
    // becomes the draft's identity
    let draft = state.store.save_draft(&id, &course).map_err(store_err)?;
    Ok(Json(serde_json::to_value(draft).map_err(e500)?))
}

async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match state.store.get_draft(&id).map_err(store_err)? {
        Some(draft) => Ok(Json(serde_json::to_value(draft).map_err(e500)?)),
        None => Err((StatusCode::NOT_FOUND, format!("no draft for course {id}"))),
    }
}

// --- publish ---

/// Publish flow: Editing -> Publishing -> Published | PublishFailed.
/// Every failure path returns before anything stored for the course is
/// touched, so a failed publish leaves the course and its draft intact.
async fn publish_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PackageRecord>, (StatusCode, String)> {
    let course_record = state.store.get_course(&id).map_err(store_err)?;
    tracing::info!(course = %id, "publishing course");

    let (record, archive_bytes) =
        import::publish_course(&course_record.course, &state.config).map_err(package_err)?;

    materialize_content(&state, &record, &archive_bytes).map_err(package_err)?;
    state.store.save_package(&record).map_err(store_err)?;
    state.store.clear_draft(&id).map_err(store_err)?;
    tracing::info!(course = %id, package = %record.id, "course published");
    Ok(Json(record))
}

/// Write the raw archive to disk and extract its launchable content under
/// `content/<package id>/` for ServeDir. When the manifest was adopted from
/// a nested zip, the nested archive is what gets extracted.
fn materialize_content(
    state: &AppState,
    record: &PackageRecord,
    outer_bytes: &[u8],
) -> Result<(), PackageError> {
    let archives_dir = state.config.data_dir.join("archives");
    std::fs::create_dir_all(&archives_dir)
        .map_err(|e| PackageError::Serialization(e.to_string()))?;
    std::fs::write(archives_dir.join(format!("{}.zip", record.id)), outer_bytes)
        .map_err(|e| PackageError::Serialization(e.to_string()))?;

    let content_bytes = match &record.nested_zip_info.extracted_zip_name {
        Some(nested) if record.nested_zip_info.extracted_nested_zip => {
            archive::entry_bytes(outer_bytes, nested)?
        }
        _ => outer_bytes.to_vec(),
    };
    let out_dir = state.config.data_dir.join("content").join(&record.id);
    archive::extract_to_dir(&content_bytes, &out_dir)
}

// --- helpers ---

fn e400<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn e500<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    tracing::error!(error=%e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn package_err(err: PackageError) -> (StatusCode, String) {
    match &err {
        PackageError::CorruptArchive(_)
        | PackageError::EntryMissing(_)
        | PackageError::ArchiveTooLarge { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        PackageError::Serialization(_) => {
            tracing::error!(error = %err, "packaging pipeline failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        PackageError::Store(store) => store_status(store, err.to_string()),
    }
}

fn store_err(err: StoreError) -> (StatusCode, String) {
    store_status(&err, err.to_string())
}

fn store_status(err: &StoreError, message: String) -> (StatusCode, String) {
    match err {
        StoreError::QuotaExceeded { .. } => (StatusCode::INSUFFICIENT_STORAGE, message),
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, message),
        StoreError::InvalidKey(_) => (StatusCode::BAD_REQUEST, message),
        _ => {
            tracing::error!(error = %message, "storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}
