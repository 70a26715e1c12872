use log::error;
use rocket::State;
use rocket::fs::NamedFile;
use rocket::http::Header;
use rocket::serde::json::Json;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::spawn_blocking;

use crate::api::{AppError, AppResult};
use crate::capability::MapVariant;
use crate::common::RECENT_RECORDS_WINDOW;
use crate::database::schema::record::{OperationRecord, OperationType, RecordStatus};
use crate::pipeline::Pipeline;
use crate::pipeline::error::PipelineError;
use crate::pipeline::metrics::Metrics;

/// What clients get to see of a record. Server paths stay internal.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub id: String,
    pub original_name: String,
    pub output_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub chaotic_map: MapVariant,
    pub operation_type: OperationType,
    pub status: RecordStatus,
    pub metrics: Metrics,
    pub created_at: u64,
}

impl From<OperationRecord> for ImageSummary {
    fn from(record: OperationRecord) -> Self {
        Self {
            id: record.id.to_string(),
            original_name: record.original_name,
            output_name: record.output_name,
            size_bytes: record.size_bytes,
            mime_type: record.mime_type,
            chaotic_map: record.chaotic_map,
            operation_type: record.operation_type,
            status: record.status,
            metrics: record.metrics,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageListResponse {
    pub success: bool,
    pub images: Vec<ImageSummary>,
}

#[get("/images")]
pub async fn list_images(pipeline: &State<Pipeline>) -> AppResult<Json<ImageListResponse>> {
    let store = pipeline.store().clone();
    let records = spawn_blocking(move || store.list_recent(RECENT_RECORDS_WINDOW)).await??;
    Ok(Json(ImageListResponse {
        success: true,
        images: records.into_iter().map(ImageSummary::from).collect(),
    }))
}

#[delete("/images/<id>")]
pub async fn delete_image(pipeline: &State<Pipeline>, id: &str) -> AppResult<Json<Value>> {
    pipeline
        .delete_record(id)
        .await
        .map_err(AppError::from_pipeline)?;
    Ok(Json(json!({ "success": true })))
}

/// A stored output artifact served as an attachment under its stored name.
#[derive(Responder)]
pub struct StoredArtifact {
    file: NamedFile,
    disposition: Header<'static>,
}

async fn serve_stored(
    pipeline: &Pipeline,
    id: &str,
    expected: OperationType,
) -> AppResult<StoredArtifact> {
    let store = pipeline.store().clone();
    let record_id = id.to_string();
    let record = spawn_blocking(move || store.find(&record_id))
        .await??
        .filter(|record| record.operation_type == expected)
        .ok_or_else(|| AppError::from_pipeline(PipelineError::NotFound))?;

    let file = NamedFile::open(&record.output_path).await.map_err(|err| {
        error!("Record {} points at an unreadable artifact: {}", record.id, err);
        AppError::from_pipeline(PipelineError::NotFound)
    })?;

    Ok(StoredArtifact {
        file,
        disposition: Header::new(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", record.output_name),
        ),
    })
}

#[get("/download/<id>")]
pub async fn download_image(pipeline: &State<Pipeline>, id: &str) -> AppResult<StoredArtifact> {
    serve_stored(pipeline, id, OperationType::Basic).await
}

#[get("/download-stego/<id>")]
pub async fn download_stego_image(
    pipeline: &State<Pipeline>,
    id: &str,
) -> AppResult<StoredArtifact> {
    serve_stored(pipeline, id, OperationType::Steganography).await
}
