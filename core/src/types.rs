use serde::Deserialize;
use serde::Serialize;

/// Kind of request the customer is filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketType {
    Bug,
    Task,
    Support,
}

impl TicketType {
    /// Issue type name in the tracker. There is no `Support` issue type, so
    /// support requests are filed as tasks.
    pub fn tracker_issue_type(self) -> &'static str {
        match self {
            TicketType::Bug => "Bug",
            TicketType::Task | TicketType::Support => "Task",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            TicketType::Bug => "\u{1f41b}",
            TicketType::Task => "\u{1f4cb}",
            TicketType::Support => "\u{1f3a7}",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TicketType::Bug => "Bug",
            TicketType::Task => "Task",
            TicketType::Support => "Support",
        }
    }
}

/// How urgent the customer says the request is. Maps 1:1 onto tracker
/// priority names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn tracker_priority(self) -> &'static str {
        self.as_str()
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Urgency::Low => "\u{1f7e2}",
            Urgency::Medium => "\u{1f7e1}",
            Urgency::High => "\u{1f534}",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
        }
    }
}

/// A ticket as submitted by the form.
///
/// `subject` may be empty on input; callers derive a default from the
/// description before the ticket reaches any adapter. `description` is HTML
/// produced by the rich-text editor and must be sanitized before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    /// Client slug, resolved against the project registry.
    #[serde(alias = "cliente")]
    pub client: String,
    #[serde(alias = "asunto", default)]
    pub subject: String,
    #[serde(alias = "descripcion")]
    pub description: String,
    #[serde(alias = "tipo")]
    pub ticket_type: TicketType,
    #[serde(alias = "urgencia")]
    pub urgency: Urgency,
    #[serde(alias = "contacto", default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Due date in `YYYY-MM-DD` format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

/// Wire response for the ticket routes. Field names match what the form
/// expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TicketResponse {
    pub fn ok(issue_key: impl Into<String>, issue_url: impl Into<String>) -> Self {
        Self {
            success: true,
            issue_key: Some(issue_key.into()),
            issue_url: Some(issue_url.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            issue_key: None,
            issue_url: None,
            error: Some(message.into()),
        }
    }
}

/// An in-memory file: a form upload or an image fetched back from the image
/// host.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}
