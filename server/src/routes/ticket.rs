//! The main intake flow: validate the submitted ticket, create the tracker
//! issue, attach files, notify the team chat.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::ConnectInfo;
use axum::extract::FromRequest;
use axum::extract::Multipart;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::error;
use tracing::info;
use tracing::warn;

use intake_core::Attachment;
use intake_core::TicketRequest;
use intake_core::TicketResponse;
use intake_core::TicketType;
use intake_core::Urgency;
use intake_core::adf;
use intake_core::projects;
use intake_core::sanitize;
use intake_jira::JiraError;

use crate::error::ApiError;
use crate::routes::client_ip;
use crate::state::AppState;

const MAX_SUBJECT_CHARS: usize = 255;

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Json<TicketResponse>, ApiError> {
    let ip = client_ip(request.headers(), Some(peer));
    if !state.rate_limiter.check(&ip) {
        return Err(ApiError::too_many_requests(
            "Demasiadas solicitudes. Intenta en un minuto.",
        ));
    }

    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let (mut ticket, uploads) = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(format!("Formulario inválido: {e}")))?;
        parse_multipart(multipart).await?
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), super::MAX_BODY_BYTES)
            .await
            .map_err(|e| ApiError::bad_request(format!("Cuerpo inválido: {e}")))?;
        let ticket = serde_json::from_slice::<TicketRequest>(&bytes)
            .map_err(|e| ApiError::bad_request(format!("JSON inválido: {e}")))?;
        (ticket, Vec::new())
    };

    // Sanitize before validating: the description keeps its markup, the rest
    // is plain text.
    ticket.subject = sanitize::sanitize_text(&ticket.subject);
    ticket.description = sanitize::sanitize_html(&ticket.description);
    ticket.contact = ticket
        .contact
        .as_deref()
        .map(sanitize::sanitize_text)
        .filter(|contact| !contact.is_empty());

    if ticket.client.is_empty() || ticket.description.is_empty() {
        return Err(ApiError::bad_request(
            "Campos requeridos faltantes: cliente y descripción son obligatorios",
        ));
    }

    let Some(project) = projects::lookup(&ticket.client) else {
        return Err(ApiError::bad_request("Cliente no válido"));
    };

    // The assistant may propose the subject later; an empty one is derived
    // from the description instead of rejected.
    if ticket.subject.is_empty() {
        ticket.subject = sanitize::default_subject(&ticket.description);
        info!(subject = %ticket.subject, "subject defaulted from description");
    }
    if ticket.subject.chars().count() > MAX_SUBJECT_CHARS {
        return Err(ApiError::bad_request(
            "El asunto no puede exceder 255 caracteres",
        ));
    }

    // Screenshots already published to the image host get fetched back so the
    // issue carries them as real attachments, not just links.
    let mut attachments = uploads;
    for (index, url) in adf::imgur_urls(&ticket.description).iter().enumerate() {
        match state.imgur.download(url, index).await {
            Ok(attachment) => attachments.push(attachment),
            Err(e) => warn!(%url, error = %e, "could not fetch hosted image"),
        }
    }

    let created = match state.jira.create_issue(&ticket, project).await {
        Ok(created) => created,
        Err(JiraError::Api { message, .. }) => {
            error!(%message, "issue creation rejected");
            return Err(ApiError::internal(message));
        }
        Err(e) => {
            error!(error = %e, "issue creation failed");
            return Err(ApiError::internal("Error de conexión con Jira"));
        }
    };
    info!(issue = %created.key, "issue created");

    if !attachments.is_empty() {
        // The tracker may not serve a brand-new issue to the attachments
        // endpoint immediately.
        tokio::time::sleep(state.attach_delay).await;
        if let Err(e) = state
            .jira
            .attach_files_with_delay(&created.key, &attachments, state.attach_retry_delay)
            .await
        {
            // Attachment failure never fails the ticket.
            error!(issue = %created.key, error = %e, "attaching files failed");
        }
    }

    if let Some(chat) = &state.chat {
        if let Err(e) = chat
            .notify(&ticket, project.name, &created.key, &created.url)
            .await
        {
            // Notification failure never fails the ticket either.
            error!(issue = %created.key, error = %e, "chat notification failed");
        }
    }

    Ok(Json(TicketResponse::ok(created.key, created.url)))
}

/// Pull the ticket fields and the `archivo_*` file parts out of a multipart
/// submission.
async fn parse_multipart(
    mut multipart: Multipart,
) -> Result<(TicketRequest, Vec<Attachment>), ApiError> {
    let mut client = String::new();
    let mut subject = String::new();
    let mut description = String::new();
    let mut ticket_type: Option<String> = None;
    let mut urgency: Option<String> = None;
    let mut contact: Option<String> = None;
    let mut due_date: Option<String> = None;
    let mut attachments = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Formulario inválido: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name.starts_with("archivo_") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{name}.bin"));
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
            attachments.push(Attachment {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Campo inválido: {e}")))?;
        match name.as_str() {
            "cliente" => client = value,
            "asunto" => subject = value,
            "descripcion" => description = value,
            "tipo" => ticket_type = Some(value),
            "urgencia" => urgency = Some(value),
            "contacto" => contact = Some(value).filter(|v| !v.is_empty()),
            "dueDate" => due_date = Some(value).filter(|v| !v.is_empty()),
            other => warn!(field = %other, "ignoring unknown form field"),
        }
    }

    let ticket_type: TicketType = parse_variant(ticket_type.as_deref())
        .ok_or_else(|| ApiError::bad_request("Tipo de ticket no válido"))?;
    let urgency: Urgency = parse_variant(urgency.as_deref())
        .ok_or_else(|| ApiError::bad_request("Urgencia no válida"))?;

    Ok((
        TicketRequest {
            client,
            subject,
            description,
            ticket_type,
            urgency,
            contact,
            due_date,
        },
        attachments,
    ))
}

/// Parse a serde unit variant (`"Bug"` -> `TicketType::Bug`) from form text.
fn parse_variant<T: DeserializeOwned>(value: Option<&str>) -> Option<T> {
    let value = value?;
    serde_json::from_value(serde_json::Value::String(value.to_string())).ok()
}
