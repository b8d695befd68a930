use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use rand::Rng;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use intake_core::Attachment;
use intake_core::Project;
use intake_core::TicketRequest;
use intake_core::adf;
use intake_core::adf::AdfNode;
use intake_core::config::JiraConfig;

use crate::error::JiraError;
use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTACH_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// An issue created in the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIssue {
    pub key: String,
    pub url: String,
}

/// HTTP client for the tracker's REST v3 API.
pub struct JiraClient {
    http: reqwest::Client,
    host: String,
    auth: HeaderValue,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self> {
        if config.host.is_empty() || config.email.is_empty() || config.api_token.is_empty() {
            return Err(JiraError::Configuration(
                "host, email and api token are all required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let token = BASE64.encode(format!("{}:{}", config.email, config.api_token));
        let mut auth = HeaderValue::from_str(&format!("Basic {token}")).map_err(|_| {
            JiraError::Configuration("credentials contain invalid header characters".to_string())
        })?;
        auth.set_sensitive(true);

        Ok(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn auth(&self) -> HeaderValue {
        self.auth.clone()
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/rest/api/3/{path}", self.host)
    }

    /// Create an issue for the ticket in the given project.
    pub async fn create_issue(
        &self,
        ticket: &TicketRequest,
        project: Project,
    ) -> Result<CreatedIssue> {
        let description = build_description(ticket);

        let payload = serde_json::json!({
            "fields": {
                "project": { "key": project.key },
                "summary": ticket.subject,
                "description": description,
                "issuetype": { "name": ticket.ticket_type.tracker_issue_type() },
                "priority": { "name": ticket.urgency.tracker_priority() },
            }
        });
        // The `duedate` field is not available on every project, so the due
        // date only travels inside the description.

        let response = self
            .http
            .post(self.api_url("issue"))
            .header(AUTHORIZATION, self.auth())
            .header(ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JiraError::Api {
                status: status.as_u16(),
                message: first_error_message(&body, status.as_u16()),
            });
        }

        let created: IssueCreated = response.json().await?;
        let url = format!("{}/browse/{}", self.host, created.key);
        debug!(issue = %created.key, "issue created");

        Ok(CreatedIssue {
            key: created.key,
            url,
        })
    }

    /// Attach files to an existing issue, retrying while the tracker still
    /// returns 404 for the freshly created issue. A failed attachment aborts
    /// the remaining ones; callers treat the whole operation as best-effort.
    pub async fn attach_files(&self, issue_key: &str, attachments: &[Attachment]) -> Result<()> {
        self.attach_files_with_delay(issue_key, attachments, DEFAULT_RETRY_BASE_DELAY)
            .await
    }

    /// Same as [`attach_files`] with an explicit retry base delay (tests run
    /// with a few milliseconds instead of seconds).
    ///
    /// [`attach_files`]: JiraClient::attach_files
    pub async fn attach_files_with_delay(
        &self,
        issue_key: &str,
        attachments: &[Attachment],
        retry_base_delay: Duration,
    ) -> Result<()> {
        if !self.verify_issue(issue_key).await {
            // Create-only permission is a legal setup: the probe failing does
            // not mean the attach will. Give the tracker a moment and try.
            warn!(issue = %issue_key, "issue not readable before attaching, continuing anyway");
            tokio::time::sleep(retry_base_delay).await;
        }

        for attachment in attachments {
            if attachment.is_empty() {
                warn!(file = %attachment.filename, "skipping empty attachment");
                continue;
            }
            self.attach_one(issue_key, attachment, retry_base_delay)
                .await?;
        }

        Ok(())
    }

    async fn attach_one(
        &self,
        issue_key: &str,
        attachment: &Attachment,
        retry_base_delay: Duration,
    ) -> Result<()> {
        let url = self.api_url(&format!("issue/{issue_key}/attachments"));
        let mut last_message = String::new();

        for attempt in 1..=MAX_ATTACH_ATTEMPTS {
            if attempt > 1 {
                let delay = backoff(retry_base_delay, attempt);
                debug!(
                    file = %attachment.filename,
                    attempt,
                    ?delay,
                    "retrying attachment"
                );
                tokio::time::sleep(delay).await;
            }

            // A multipart form cannot be reused across attempts.
            let part = reqwest::multipart::Part::bytes(attachment.bytes.clone())
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.content_type)
                .map_err(|_| JiraError::Configuration(format!(
                    "invalid content type {:?} for {}",
                    attachment.content_type, attachment.filename
                )))?;
            let form = reqwest::multipart::Form::new().part("file", part);

            let result = self
                .http
                .post(&url)
                .header(AUTHORIZATION, self.auth())
                // Required, the endpoint rejects the request as CSRF without it.
                .header("X-Atlassian-Token", "no-check")
                .multipart(form)
                .send()
                .await;

            let error = match result {
                Ok(response) if response.status().is_success() => {
                    debug!(file = %attachment.filename, attempt, "attachment uploaded");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    JiraError::Api {
                        status,
                        message: first_error_message(&body, status),
                    }
                }
                Err(e) => JiraError::Http(e),
            };

            if !error.is_retryable_attach() {
                return Err(error);
            }
            warn!(file = %attachment.filename, attempt, %error, "attachment attempt failed");
            last_message = error.to_string();
        }

        Err(JiraError::AttachExhausted {
            filename: attachment.filename.clone(),
            attempts: MAX_ATTACH_ATTEMPTS,
            message: last_message,
        })
    }

    /// Probe whether an issue exists and is readable. Failures are reported
    /// as `false`, never as an error: the caller may hold create-only
    /// permission.
    pub async fn verify_issue(&self, issue_key: &str) -> bool {
        let url = self.api_url(&format!("issue/{issue_key}?fields=key"));
        match self
            .http
            .get(url)
            .header(AUTHORIZATION, self.auth())
            .header(ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(issue = %issue_key, status = %response.status(), "issue probe failed");
                false
            }
            Err(e) => {
                warn!(issue = %issue_key, error = %e, "issue probe failed");
                false
            }
        }
    }
}

/// Description HTML for the issue: the sanitized editor fragment plus a
/// metadata block with contact and due date when present, converted to ADF.
fn build_description(ticket: &TicketRequest) -> AdfNode {
    let mut html = ticket.description.clone();

    let mut metadata = Vec::new();
    if let Some(contact) = ticket.contact.as_deref().filter(|c| !c.is_empty()) {
        metadata.push(format!("Contacto: {contact}"));
    }
    if let Some(due) = ticket.due_date.as_deref().filter(|d| !d.is_empty()) {
        metadata.push(format!("Fecha de vencimiento: {} ({due})", spanish_date(due)));
    }
    if !metadata.is_empty() {
        let items: String = metadata
            .iter()
            .map(|m| format!("<li>{m}</li>"))
            .collect();
        html.push_str(&format!(
            "<hr><p><strong>Información adicional:</strong></p><ul>{items}</ul>"
        ));
    }

    if html.contains('<') && html.contains('>') {
        adf::html_to_adf(&html)
    } else {
        AdfNode::plain_doc(&html)
    }
}

/// `2026-09-01` -> `1/9/2026`; unparseable input is passed through.
fn spanish_date(iso: &str) -> String {
    match NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
        Ok(date) => date.format("%-d/%-m/%Y").to_string(),
        Err(_) => iso.to_string(),
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    let exp = 2u32.saturating_pow(attempt.saturating_sub(2));
    let millis = base.as_millis() as u64 * u64::from(exp);
    let jitter = rand::rng().random_range(0.9..1.1);
    Duration::from_millis((millis as f64 * jitter) as u64)
}

/// Pull the first human-readable message out of a tracker error body:
/// `errorMessages[0]`, else the first `errors` value, else a generic label.
fn first_error_message(body: &str, status: u16) -> String {
    #[derive(Deserialize)]
    struct ApiErrorBody {
        #[serde(default, rename = "errorMessages")]
        error_messages: Vec<String>,
        #[serde(default)]
        errors: std::collections::BTreeMap<String, String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = parsed.error_messages.into_iter().next() {
            return message;
        }
        if let Some((_, message)) = parsed.errors.into_iter().next() {
            return message;
        }
    }
    format!("Error {status}")
}

#[derive(Deserialize)]
struct IssueCreated {
    key: String,
}
