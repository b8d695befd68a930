use std::time::Duration;

use intake_assistant::Client as AssistantClient;
use intake_chat::ChatNotifier;
use intake_core::Config;
use intake_core::rate_limit::RateLimiter;
use intake_imgur::ImgurClient;
use intake_jira::JiraClient;

/// Everything the route handlers share. Wrapped in an `Arc` by the router.
pub struct AppState {
    pub jira: JiraClient,
    /// Absent when no webhook is configured; ticket creation still works.
    pub chat: Option<ChatNotifier>,
    /// Absent when no API key is configured; the analyze route degrades to a
    /// pass-through response.
    pub assistant: Option<AssistantClient>,
    pub imgur: ImgurClient,
    pub rate_limiter: RateLimiter,
    /// Wait between creating an issue and attaching files to it.
    pub attach_delay: Duration,
    /// Base delay for the attachment retry loop.
    pub attach_retry_delay: Duration,
}

impl AppState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let jira = JiraClient::new(&config.jira)?;
        let chat = match config.chat_webhook.clone() {
            Some(webhook) => Some(ChatNotifier::new(webhook)?),
            None => {
                tracing::warn!("chat webhook not configured, notifications disabled");
                None
            }
        };
        let assistant = match config.anthropic_api_key.clone() {
            Some(key) => Some(AssistantClient::new(key)?),
            None => {
                tracing::warn!("assistant API key not configured, clarification disabled");
                None
            }
        };
        let imgur = ImgurClient::new(config.imgur_client_id.clone())?;

        Ok(Self {
            jira,
            chat,
            assistant,
            imgur,
            rate_limiter: RateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window,
            ),
            attach_delay: config.attach_delay,
            attach_retry_delay: Duration::from_secs(2),
        })
    }
}
