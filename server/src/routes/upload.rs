//! Publish a screenshot to the image host and hand back its public URL for
//! the editor to embed.

use std::sync::Arc;

use axum::Json;
use axum::extract::Multipart;
use axum::extract::State;
use serde::Serialize;
use tracing::error;
use tracing::info;

use intake_core::Attachment;
use intake_imgur::ImgurError;
use intake_imgur::MAX_IMAGE_BYTES;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    url: String,
    filename: String,
    size: usize,
    #[serde(rename = "type")]
    content_type: String,
    is_public_url: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_hash: Option<String>,
}

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<Attachment> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Formulario inválido: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "imagen".to_string());
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .to_string()
            });
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Archivo inválido: {e}")))?;
        file = Some(Attachment {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let Some(file) = file else {
        return Err(ApiError::bad_request("No se proporcionó ningún archivo"));
    };

    if !file.is_image() {
        return Err(ApiError::bad_request("El archivo debe ser una imagen"));
    }
    if file.bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::bad_request(
            "La imagen es demasiado grande. Máximo 10MB",
        ));
    }

    match state.imgur.upload(&file).await {
        Ok(uploaded) => {
            info!(link = %uploaded.link, "image published");
            Ok(Json(UploadResponse {
                url: uploaded.link,
                filename: file.filename,
                size: file.bytes.len(),
                content_type: file.content_type,
                is_public_url: true,
                delete_hash: uploaded.delete_hash,
            }))
        }
        Err(e @ (ImgurError::Validation(_) | ImgurError::MissingLink)) => {
            Err(ApiError::bad_request(e.to_string()))
        }
        Err(e) => {
            error!(error = %e, "image upload failed");
            Err(ApiError::bad_gateway(format!(
                "Error al procesar la imagen: {e}"
            )))
        }
    }
}
