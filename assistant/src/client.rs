use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use crate::error::AssistantError;
use crate::error::Result;
use crate::types::Message;
use crate::types::MessageCreateParams;

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Client for the provider's messages API.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Client {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AssistantError::Configuration(
                "API key is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests use a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(&self.api_key).map_err(|_| {
            AssistantError::Configuration("API key contains invalid characters".to_string())
        })?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    /// Send a message creation request, retrying transient failures with
    /// exponential backoff.
    pub async fn create_message(&self, params: &MessageCreateParams) -> Result<Message> {
        let url = format!("{}/v1/messages", self.base_url);
        let headers = self.headers()?;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt - 1);
                debug!(attempt, ?delay, "retrying assistant request");
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .post(&url)
                .headers(headers.clone())
                .json(params)
                .send()
                .await;

            let error = match response {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp.json::<Message>().await?);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    parse_api_error(status, &body)
                }
                Err(e) => AssistantError::Network(e),
            };

            if error.is_retryable() && attempt < MAX_RETRIES {
                warn!(attempt, %error, "assistant request failed");
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error
            .unwrap_or_else(|| AssistantError::Parse("retry loop ended without error".to_string())))
    }
}

fn parse_api_error(status: u16, body: &str) -> AssistantError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: String,
        #[serde(default)]
        message: Option<String>,
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error.message.unwrap_or(parsed.error.error_type))
        .unwrap_or_else(|_| body.to_string());

    match status {
        400 => AssistantError::BadRequest(message),
        401 | 403 => AssistantError::Authentication(message),
        429 => AssistantError::RateLimited(message),
        _ => AssistantError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentBlockParam;
    use crate::types::MessageParam;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::header;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn params() -> MessageCreateParams {
        MessageCreateParams {
            model: "claude-3-5-haiku-20241022".to_string(),
            max_tokens: 1024,
            messages: vec![MessageParam::user(vec![ContentBlockParam::text("hola")])],
            temperature: Some(0.7),
        }
    }

    #[test]
    fn client_requires_api_key() {
        assert!(matches!(
            Client::new(""),
            Err(AssistantError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn create_message_sends_version_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-5-haiku-20241022",
                "content": [{ "type": "text", "text": "respuesta" }],
                "usage": { "input_tokens": 10, "output_tokens": 5 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let message = Client::new("test-key")
            .expect("client")
            .with_base_url(server.uri())
            .create_message(&params())
            .await
            .expect("message");
        assert_eq!(message.text(), "respuesta");
    }

    #[tokio::test]
    async fn retries_server_errors() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::atomic::Ordering;

        struct FlakyModel {
            calls: AtomicUsize,
        }

        impl wiremock::Respond for FlakyModel {
            fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(529).set_body_json(serde_json::json!({
                        "error": { "type": "overloaded_error", "message": "overloaded" }
                    }))
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "content": [{ "type": "text", "text": "ok" }]
                    }))
                }
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(FlakyModel {
                calls: AtomicUsize::new(0),
            })
            .expect(2)
            .mount(&server)
            .await;

        let message = Client::new("test-key")
            .expect("client")
            .with_base_url(server.uri())
            .create_message(&params())
            .await
            .expect("retry should recover");
        assert_eq!(message.text(), "ok");
    }

    #[tokio::test]
    async fn authentication_errors_fail_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "type": "authentication_error", "message": "invalid x-api-key" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = Client::new("bad-key")
            .expect("client")
            .with_base_url(server.uri())
            .create_message(&params())
            .await
            .err()
            .expect("should fail");
        assert!(matches!(err, AssistantError::Authentication(_)));
    }

    #[test]
    fn parse_api_error_classifies_by_status() {
        let body = r#"{"error":{"type":"rate_limit_error","message":"too many input tokens"}}"#;
        let err = parse_api_error(429, body);
        assert!(matches!(err, AssistantError::RateLimited(_)));
        assert!(err.is_token_rate_limit());

        let err = parse_api_error(500, "not json");
        assert!(matches!(err, AssistantError::Api { status: 500, .. }));
        assert!(err.is_retryable());
    }
}
