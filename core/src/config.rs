//! Environment configuration.
//!
//! Values arrive through environment variables (a `.env` file is loaded by
//! the binary before this runs). Hosts and webhook URLs are routinely pasted
//! with trailing slashes, spaces or stray newlines, so everything is cleaned
//! before use. Tracker credentials are required; the chat webhook and the
//! assistant key are optional and their features degrade gracefully.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const JIRA_HOST_ENV: &str = "JIRA_HOST";
pub const JIRA_EMAIL_ENV: &str = "JIRA_EMAIL";
pub const JIRA_API_TOKEN_ENV: &str = "JIRA_API_TOKEN";
pub const CHAT_WEBHOOK_ENV: &str = "GOOGLE_CHAT_WEBHOOK_URL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const IMGUR_CLIENT_ID_ENV: &str = "IMGUR_CLIENT_ID";
pub const BIND_ADDR_ENV: &str = "INTAKE_BIND_ADDR";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {message}")]
    InvalidVar { var: &'static str, message: String },
}

/// Tracker connection settings.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    /// Instance base URL, without a trailing slash.
    pub host: String,
    pub email: String,
    pub api_token: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jira: JiraConfig,
    pub chat_webhook: Option<Url>,
    pub anthropic_api_key: Option<String>,
    pub imgur_client_id: Option<String>,
    pub bind_addr: SocketAddr,
    pub rate_limit: RateLimitConfig,
    /// Wait before attaching files to a freshly created issue; the tracker
    /// may not serve the issue immediately after creation.
    pub attach_delay: Duration,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load via an explicit lookup function; tests pass a map instead of
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = clean_host(
            &lookup(JIRA_HOST_ENV).ok_or(ConfigError::MissingVar(JIRA_HOST_ENV))?,
        );
        if host.is_empty() {
            return Err(ConfigError::MissingVar(JIRA_HOST_ENV));
        }
        let email = required_clean(&lookup, JIRA_EMAIL_ENV)?;
        let api_token = required_clean(&lookup, JIRA_API_TOKEN_ENV)?;

        let chat_webhook = match lookup(CHAT_WEBHOOK_ENV).map(|raw| clean(&raw)) {
            None => None,
            Some(raw) if raw.is_empty() => None,
            Some(raw) => Some(Url::parse(&raw).map_err(|e| ConfigError::InvalidVar {
                var: CHAT_WEBHOOK_ENV,
                message: e.to_string(),
            })?),
        };

        let anthropic_api_key = lookup(ANTHROPIC_API_KEY_ENV)
            .map(|raw| clean(&raw))
            .filter(|key| !key.is_empty());
        let imgur_client_id = lookup(IMGUR_CLIENT_ID_ENV)
            .map(|raw| clean(&raw))
            .filter(|id| !id.is_empty());

        let bind_addr = match lookup(BIND_ADDR_ENV) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
                var: BIND_ADDR_ENV,
                message: format!("{raw:?} is not a socket address"),
            })?,
            None => DEFAULT_BIND_ADDR
                .parse()
                .map_err(|_| ConfigError::InvalidVar {
                    var: BIND_ADDR_ENV,
                    message: "default bind address failed to parse".to_string(),
                })?,
        };

        Ok(Self {
            jira: JiraConfig {
                host,
                email,
                api_token,
            },
            chat_webhook,
            anthropic_api_key,
            imgur_client_id,
            bind_addr,
            rate_limit: RateLimitConfig::default(),
            attach_delay: Duration::from_secs(3),
        })
    }
}

fn required_clean(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
) -> Result<String, ConfigError> {
    let value = lookup(var).map(|raw| clean(&raw)).unwrap_or_default();
    if value.is_empty() {
        return Err(ConfigError::MissingVar(var));
    }
    Ok(value)
}

/// Trim whitespace and drop embedded CR/LF (pasted values carry them more
/// often than one would hope).
fn clean(raw: &str) -> String {
    raw.trim().replace(['\r', '\n'], "")
}

/// `clean` plus trailing-slash removal, for base URLs.
fn clean_host(raw: &str) -> String {
    clean(raw).trim_end_matches('/').to_string()
}
