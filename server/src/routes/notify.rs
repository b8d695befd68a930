//! Standalone notification endpoint: re-send the chat message for an already
//! created issue.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use intake_core::TicketRequest;
use intake_core::projects;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyRequest {
    ticket: TicketRequest,
    issue_key: String,
    issue_url: String,
}

pub async fn notify(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: NotifyRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("Datos incompletos"))?;
    if request.issue_key.is_empty() || request.issue_url.is_empty() {
        return Err(ApiError::bad_request("Datos incompletos"));
    }

    let Some(chat) = &state.chat else {
        return Err(ApiError::internal("Webhook URL no configurada"));
    };

    let client_name = projects::lookup(&request.ticket.client)
        .map(|project| project.name)
        .unwrap_or(&request.ticket.client)
        .to_string();

    if let Err(e) = chat
        .notify(
            &request.ticket,
            &client_name,
            &request.issue_key,
            &request.issue_url,
        )
        .await
    {
        error!(issue = %request.issue_key, error = %e, "notification failed");
        return Err(ApiError::internal(e.to_string()));
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
