//! Clarification endpoint. This route never fails the form: with no
//! assistant configured, or when the provider errors, it answers 200 with a
//! pass-through response and a human-readable interpretation so the customer
//! can simply submit the ticket as-is.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use bytes::Bytes;
use tracing::error;
use tracing::info;

use intake_assistant::AnalyzeRequest;
use intake_assistant::AnalyzeResponse;
use intake_assistant::AssistantError;

use crate::error::ApiError;
use crate::state::AppState;

const NOT_CONFIGURED: &str =
    "Asistente de IA no configurado. Continuando con la solicitud original.";

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let request: AnalyzeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("JSON inválido: {e}")))?;

    let Some(assistant) = &state.assistant else {
        return Ok(Json(AnalyzeResponse::pass_through(NOT_CONFIGURED)));
    };

    match assistant.analyze(&request).await {
        Ok(analysis) => {
            info!(
                needs_clarification = analysis.needs_clarification,
                "clarification turn completed"
            );
            Ok(Json(analysis))
        }
        Err(e) => {
            error!(error = %e, "clarification turn failed");
            Ok(Json(AnalyzeResponse::pass_through(degraded_message(&e))))
        }
    }
}

/// Map provider failures to the message shown in the form.
fn degraded_message(error: &AssistantError) -> &'static str {
    match error {
        AssistantError::Authentication(_) => {
            "Error de autenticación con el asistente. Verifica la API key."
        }
        AssistantError::RateLimited(_) if error.is_token_rate_limit() => {
            "Límite de tokens por minuto excedido. Las imágenes grandes consumen muchos tokens. \
             Intenta más tarde o reduce el tamaño de las imágenes."
        }
        AssistantError::RateLimited(_) => "Límite de solicitudes excedido. Intenta más tarde.",
        AssistantError::BadRequest(_) => {
            "Solicitud inválida al asistente. Verifica la configuración."
        }
        _ => "Error al analizar la solicitud. Continuando con el envío.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_messages_follow_error_class() {
        let auth = AssistantError::Authentication("bad key".to_string());
        assert!(degraded_message(&auth).contains("autenticación"));

        let tokens = AssistantError::RateLimited("too many input tokens".to_string());
        assert!(degraded_message(&tokens).contains("tokens"));

        let requests = AssistantError::RateLimited("requests".to_string());
        assert!(degraded_message(&requests).contains("solicitudes"));

        let other = AssistantError::Parse("x".to_string());
        assert!(degraded_message(&other).contains("Continuando"));
    }
}
