use anyhow::{Context, anyhow};
use rocket::State;
use rocket::form::{Errors, Form};
use rocket::fs::TempFile;
use rocket::http::{ContentType, Header};
use rocket::serde::json::Json;
use serde::Serialize;
use std::path::Path;

use crate::api::{AppError, AppResult, decrypt_failure};
use crate::capability::MapVariant;
use crate::pipeline::flows::RecoveredArtifact;
use crate::pipeline::metrics::Metrics;
use crate::pipeline::{Pipeline, UploadedArtifact};
use crate::utils::PathExt;

#[derive(FromForm, Debug)]
pub struct EncryptForm<'r> {
    pub image: TempFile<'r>,
    pub key: String,
    #[field(name = "chaoticMap", default = MapVariant::Logistic)]
    pub chaotic_map: MapVariant,
}

#[derive(FromForm, Debug)]
pub struct DecryptForm<'r> {
    pub image: TempFile<'r>,
    pub key: String,
}

#[derive(FromForm, Debug)]
pub struct StegoEncryptForm<'r> {
    #[field(name = "secretImage")]
    pub secret_image: TempFile<'r>,
    #[field(name = "coverImage")]
    pub cover_image: TempFile<'r>,
    pub key: String,
    #[field(name = "chaoticMap", default = MapVariant::Logistic)]
    pub chaotic_map: MapVariant,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    pub success: bool,
    pub image_id: String,
    pub encrypted_name: String,
    pub encryption_time: u64,
    pub metrics: Metrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StegoResponse {
    pub success: bool,
    pub image_id: String,
    pub stego_name: String,
    pub encryption_time: u64,
    pub metrics: Metrics,
}

/// A recovered artifact served back as an attachment.
#[derive(Responder)]
pub struct ArtifactDownload {
    bytes: Vec<u8>,
    content_type: ContentType,
    disposition: Header<'static>,
}

fn unwrap_form<T>(form: Result<Form<T>, Errors<'_>>) -> AppResult<T> {
    match form {
        Ok(form) => Ok(form.into_inner()),
        Err(errors) => {
            let error_chain = errors
                .iter()
                .map(|e| anyhow!(e.to_string()))
                .reduce(|acc, e| acc.context(e.to_string()));

            match error_chain {
                Some(chain) => Err(AppError::bad_request(chain.context("Failed to parse form"))),
                None => Err(AppError::bad_request(anyhow!(
                    "Failed to parse form with unknown error"
                ))),
            }
        }
    }
}

/// Rocket strips the extension from multipart names; rebuild it from the
/// declared content type so records keep a usable client name.
fn client_file_name(file: &TempFile<'_>, fallback: &str) -> String {
    let name = file
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|| fallback.to_string());
    match file.content_type().and_then(|ct| ct.extension()) {
        Some(ext) => format!("{}.{}", name, ext.as_str().to_lowercase()),
        None => name,
    }
}

async fn stage_upload(
    pipeline: &Pipeline,
    file: &mut TempFile<'_>,
    fallback: &str,
) -> AppResult<UploadedArtifact> {
    let original_name = client_file_name(file, fallback);
    let size_bytes = file.len();
    let mime_type = file
        .content_type()
        .map(|ct| ct.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let destination = pipeline.staging().allocate(&original_name);
    file.move_copy_to(&destination)
        .await
        .context("Failed to store the upload")?;

    Ok(UploadedArtifact {
        staged: pipeline.staging().adopt(destination),
        original_name,
        mime_type,
        size_bytes,
    })
}

fn attachment(recovered: RecoveredArtifact) -> ArtifactDownload {
    let extension = Path::new(&recovered.file_name).ext_lower();
    let content_type = ContentType::from_extension(&extension).unwrap_or(ContentType::Binary);
    ArtifactDownload {
        bytes: recovered.bytes,
        content_type,
        disposition: Header::new(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", recovered.file_name),
        ),
    }
}

#[post("/encrypt", data = "<form>")]
pub async fn encrypt_image(
    pipeline: &State<Pipeline>,
    form: Result<Form<EncryptForm<'_>>, Errors<'_>>,
) -> AppResult<Json<EncryptResponse>> {
    let mut inner_form = unwrap_form(form)?;
    let artifact = stage_upload(pipeline, &mut inner_form.image, "image").await?;

    let completed = pipeline
        .encrypt(artifact, &inner_form.key, inner_form.chaotic_map)
        .await
        .map_err(AppError::from_pipeline)?;

    let record = completed.record;
    Ok(Json(EncryptResponse {
        success: true,
        image_id: record.id.to_string(),
        encrypted_name: record.output_name,
        encryption_time: record.metrics.encryption_time_ms,
        metrics: record.metrics,
    }))
}

#[post("/decrypt", data = "<form>")]
pub async fn decrypt_image(
    pipeline: &State<Pipeline>,
    form: Result<Form<DecryptForm<'_>>, Errors<'_>>,
) -> AppResult<ArtifactDownload> {
    let mut inner_form = unwrap_form(form)?;
    let artifact = stage_upload(pipeline, &mut inner_form.image, "encrypted").await?;

    let recovered = pipeline
        .decrypt(artifact, &inner_form.key)
        .await
        .map_err(decrypt_failure)?;

    Ok(attachment(recovered))
}

#[post("/encrypt-stego", data = "<form>")]
pub async fn encrypt_stego_image(
    pipeline: &State<Pipeline>,
    form: Result<Form<StegoEncryptForm<'_>>, Errors<'_>>,
) -> AppResult<Json<StegoResponse>> {
    let mut inner_form = unwrap_form(form)?;
    let secret = stage_upload(pipeline, &mut inner_form.secret_image, "secret").await?;
    let cover = stage_upload(pipeline, &mut inner_form.cover_image, "cover").await?;

    let completed = pipeline
        .encrypt_stego(secret, cover, &inner_form.key, inner_form.chaotic_map)
        .await
        .map_err(AppError::from_pipeline)?;

    let record = completed.record;
    Ok(Json(StegoResponse {
        success: true,
        image_id: record.id.to_string(),
        stego_name: record.output_name,
        encryption_time: record.metrics.encryption_time_ms,
        metrics: record.metrics,
    }))
}

#[post("/decrypt-stego", data = "<form>")]
pub async fn decrypt_stego_image(
    pipeline: &State<Pipeline>,
    form: Result<Form<DecryptForm<'_>>, Errors<'_>>,
) -> AppResult<ArtifactDownload> {
    let mut inner_form = unwrap_form(form)?;
    let artifact = stage_upload(pipeline, &mut inner_form.image, "stego").await?;

    let recovered = pipeline
        .decrypt_stego(artifact, &inner_form.key)
        .await
        .map_err(decrypt_failure)?;

    Ok(attachment(recovered))
}
