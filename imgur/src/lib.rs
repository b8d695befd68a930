//! Image host adapter.
//!
//! Screenshots pasted into the form are published here so the tracker
//! description can link a stable URL, and previously published images are
//! fetched back when they need to be attached to the created issue.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use intake_core::Attachment;

const DEFAULT_BASE_URL: &str = "https://api.imgur.com";
/// Anonymous uploads work against a public client id; a dedicated one comes
/// from configuration.
const DEFAULT_CLIENT_ID: &str = "546c25a59c58ad7";
/// The host rejects larger uploads anyway; failing early saves the transfer.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ImgurError {
    #[error("{0}")]
    Validation(String),

    #[error("image host error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("image host returned no link")]
    MissingLink,

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A successfully published image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub link: String,
    /// Lets an operator delete the image later.
    pub delete_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    #[serde(default)]
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    deletehash: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

pub struct ImgurClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl ImgurClient {
    pub fn new(client_id: Option<String>) -> Result<Self, ImgurError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: client_id.unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
        })
    }

    /// Point the client at a different endpoint (tests use a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Publish an image and return its public URL. Only images up to
    /// [`MAX_IMAGE_BYTES`] are accepted; a rejected upload is an error, the
    /// portal has no inline fallback.
    pub async fn upload(&self, attachment: &Attachment) -> Result<UploadedImage, ImgurError> {
        if !attachment.is_image() {
            return Err(ImgurError::Validation(
                "El archivo debe ser una imagen".to_string(),
            ));
        }
        if attachment.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImgurError::Validation(
                "La imagen es demasiado grande. Máximo 10MB".to_string(),
            ));
        }

        let payload = serde_json::json!({
            "image": BASE64.encode(&attachment.bytes),
            "type": "base64",
            "name": attachment.filename,
        });

        let response = self
            .http
            .post(format!("{}/3/image", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Client-ID {}", self.client_id),
            )
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "image upload rejected");
            return Err(ImgurError::Api {
                status: status.as_u16(),
                message: extract_error(&body).unwrap_or_else(|| format!("Error {status}")),
            });
        }

        let parsed: UploadResponse = response.json().await?;
        let link = parsed
            .data
            .as_ref()
            .and_then(|data| data.link.clone())
            .filter(|_| parsed.success);
        match link {
            Some(link) => {
                debug!(%link, "image uploaded");
                Ok(UploadedImage {
                    link,
                    delete_hash: parsed.data.and_then(|data| data.deletehash),
                })
            }
            None => Err(ImgurError::MissingLink),
        }
    }

    /// Fetch a previously published image back as an attachment, so it can be
    /// attached to the created issue. The filename is synthesized from the
    /// position in the description and the URL's extension.
    pub async fn download(&self, url: &str, index: usize) -> Result<Attachment, ImgurError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImgurError::Api {
                status: status.as_u16(),
                message: format!("download failed with {status}"),
            });
        }

        let extension = url
            .rsplit('.')
            .next()
            .filter(|ext| matches!(*ext, "png" | "jpg" | "jpeg" | "gif" | "webp"))
            .unwrap_or("png");
        let content_type = match extension {
            "jpg" => "image/jpeg".to_string(),
            other => format!("image/{other}"),
        };

        let bytes = response.bytes().await?;
        Ok(Attachment {
            filename: format!("imgur-image-{}.{extension}", index + 1),
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}

fn extract_error(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("data")?.get("error")?;
    match error {
        serde_json::Value::String(message) => Some(message.clone()),
        other => other.get("message").and_then(|m| m.as_str()).map(String::from),
    }
}
