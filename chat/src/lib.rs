//! Posts a notification to the team chat space when a ticket is created.
//!
//! The webhook accepts a plain `{ "text": ... }` message; some spaces are
//! configured to reject it, so an HTTP 400 is retried once with the cards-v2
//! payload before giving up.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use tracing::warn;
use url::Url;

use intake_core::TicketRequest;
use intake_core::sanitize;

mod message;

pub use message::card_message;
pub use message::simple_message;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat webhook error ({status}): {message}")]
    Webhook { status: u16, message: String },

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct WebhookErrorBody {
    #[serde(default)]
    error: Option<WebhookErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct WebhookErrorDetail {
    message: String,
}

pub struct ChatNotifier {
    http: reqwest::Client,
    webhook: Url,
}

impl ChatNotifier {
    pub fn new(webhook: Url) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, webhook })
    }

    /// Send the new-ticket notification. Tries the simple text format first
    /// and falls back to cards when the space rejects it with a 400.
    pub async fn notify(
        &self,
        ticket: &TicketRequest,
        client_name: &str,
        issue_key: &str,
        issue_url: &str,
    ) -> Result<(), ChatError> {
        let simple = simple_message(ticket, client_name, issue_key, issue_url);
        debug!(issue = %issue_key, "sending chat notification");

        let response = self.post(&simple).await?;
        let response = if response.status() == reqwest::StatusCode::BAD_REQUEST {
            warn!(issue = %issue_key, "simple message rejected, retrying with cards");
            let card = card_message(ticket, client_name, issue_key, issue_url);
            self.post(&card).await?
        } else {
            response
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<WebhookErrorBody>(&body)
                .ok()
                .and_then(|parsed| parsed.error)
                .map(|detail| detail.message)
                .unwrap_or_else(|| format!("Error {status}"));
            return Err(ChatError::Webhook {
                status: status.as_u16(),
                message,
            });
        }

        debug!(issue = %issue_key, "chat notification delivered");
        Ok(())
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<reqwest::Response, ChatError> {
        Ok(self
            .http
            .post(self.webhook.clone())
            .header(reqwest::header::USER_AGENT, "Ticket-Portal/1.0")
            .json(payload)
            .send()
            .await?)
    }
}

/// Description reduced to a single plain-text line for the notification.
pub(crate) fn description_preview(description: &str) -> String {
    sanitize::truncate(&sanitize::strip_tags(description), 300)
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::TicketType;
    use intake_core::Urgency;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_string_contains;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn ticket() -> TicketRequest {
        TicketRequest {
            client: "hiraoka".to_string(),
            subject: "Checkout *roto*".to_string(),
            description: "<p>El checkout no carga en staging</p>".to_string(),
            ticket_type: TicketType::Bug,
            urgency: Urgency::High,
            contact: None,
            due_date: None,
        }
    }

    fn notifier(server: &MockServer) -> ChatNotifier {
        let url = Url::parse(&format!("{}/v1/spaces/AAA/messages", server.uri()))
            .expect("webhook url");
        ChatNotifier::new(url).expect("notifier")
    }

    #[tokio::test]
    async fn sends_simple_text_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/spaces/AAA/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "spaces/AAA/messages/x"
            })))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server)
            .notify(&ticket(), "HIRAOKA", "HIR-42", "https://acme.atlassian.net/browse/HIR-42")
            .await
            .expect("notify");
    }

    #[tokio::test]
    async fn falls_back_to_cards_on_bad_request() {
        let server = MockServer::start().await;
        // The card payload is accepted; the plain-text one is not.
        Mock::given(method("POST"))
            .and(path("/v1/spaces/AAA/messages"))
            .and(body_string_contains("cardsV2"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/spaces/AAA/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": 400, "message": "text not allowed" }
            })))
            .mount(&server)
            .await;

        notifier(&server)
            .notify(&ticket(), "HIRAOKA", "HIR-42", "https://acme.atlassian.net/browse/HIR-42")
            .await
            .expect("cards fallback should succeed");
    }

    #[tokio::test]
    async fn surfaces_webhook_error_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": { "code": 403, "message": "webhook disabled" }
            })))
            .mount(&server)
            .await;

        let err = notifier(&server)
            .notify(&ticket(), "HIRAOKA", "HIR-42", "https://acme.atlassian.net/browse/HIR-42")
            .await
            .err()
            .expect("should fail");
        match err {
            ChatError::Webhook { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "webhook disabled");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
