//! The ticket clarification operation.
//!
//! Each call is one turn of the loop: the form sends the ticket draft, the
//! conversation so far and any screenshots; the model either asks the next
//! clarifying question or declares the ticket complete and returns
//! suggestions. The model is instructed to answer with a single JSON object,
//! which is extracted from whatever prose surrounds it.

use std::sync::LazyLock;

use regex::Regex;
use regex::RegexBuilder;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use intake_core::TicketRequest;
use intake_core::sanitize;

use crate::client::Client;
use crate::error::Result;
use crate::types::ContentBlockParam;
use crate::types::MessageCreateParams;
use crate::types::MessageParam;

const MODEL: &str = "claude-3-5-haiku-20241022";
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f64 = 0.7;
/// Screenshots pasted into the editor balloon the description; anything past
/// this many characters adds tokens without adding signal.
const MAX_DESCRIPTION_CHARS: usize = 2000;

pub const DEFAULT_INTERPRETATION: &str = "Tu solicitud está completa y clara.";

#[expect(clippy::unwrap_used)]
static DATA_URL_IMAGES: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r#"<img[^>]*src="data:image/[^"]*"[^>]*>"#)
        .case_insensitive(true)
        .build()
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior exchange in the clarification conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

/// What the form posts to `/api/ai/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub ticket: TicketRequest,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
    /// Screenshot sources: `data:` URLs or previously published image-host
    /// URLs.
    #[serde(default)]
    pub images: Vec<String>,
}

/// Field suggestions for the final ticket. Wire names match the form fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(rename = "tipo", skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<String>,
    #[serde(rename = "urgencia", skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(rename = "asunto", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(rename = "descripcion", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "dueDate", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub needs_clarification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Suggestions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
}

impl AnalyzeResponse {
    /// Pass-through response used whenever the assistant cannot run; the
    /// form continues with the original ticket.
    pub fn pass_through(interpretation: impl Into<String>) -> Self {
        Self {
            needs_clarification: false,
            question: None,
            suggestions: None,
            interpretation: Some(interpretation.into()),
        }
    }
}

impl Client {
    /// Run one clarification turn.
    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        let description = clean_description(&request.ticket.description);

        let mut messages: Vec<MessageParam> = Vec::new();
        for turn in &request.conversation_history {
            match turn.role {
                TurnRole::User => {
                    messages.push(MessageParam::user(vec![ContentBlockParam::text(
                        turn.content.clone(),
                    )]));
                }
                TurnRole::Assistant => {
                    messages.push(MessageParam::assistant_text(turn.content.clone()));
                }
            }
        }

        let prompt = if messages.is_empty() {
            initial_prompt(&request.ticket, &description, request.images.len())
        } else {
            continuation_prompt(&request.ticket, &description, &request.conversation_history)
        };

        let mut content = vec![ContentBlockParam::text(prompt)];
        content.extend(image_blocks(&request.images));
        messages.push(MessageParam::user(content));

        debug!(
            turns = request.conversation_history.len(),
            images = request.images.len(),
            "running clarification turn"
        );

        let message = self
            .create_message(&MessageCreateParams {
                model: MODEL.to_string(),
                max_tokens: MAX_TOKENS,
                messages,
                temperature: Some(TEMPERATURE),
            })
            .await?;

        Ok(parse_analysis(&message.text()))
    }
}

/// Replace inline screenshot data with a marker and cap the length.
fn clean_description(description: &str) -> String {
    let replaced = DATA_URL_IMAGES.replace_all(description, "[Imagen adjunta]");
    sanitize::truncate(&replaced, MAX_DESCRIPTION_CHARS)
}

fn ticket_summary(ticket: &TicketRequest, description: &str) -> String {
    let mut summary = format!(
        "- Cliente: {client}\n- Asunto: {subject}\n- Descripción: {description}\n- Tipo: {ticket_type}\n- Urgencia: {urgency}\n",
        client = ticket.client,
        subject = if ticket.subject.is_empty() {
            "(no proporcionado)"
        } else {
            &ticket.subject
        },
        ticket_type = ticket.ticket_type.as_str(),
        urgency = ticket.urgency.as_str(),
    );
    if let Some(contact) = ticket.contact.as_deref().filter(|c| !c.is_empty()) {
        summary.push_str(&format!("- Contacto: {contact}\n"));
    }
    if let Some(due) = ticket.due_date.as_deref().filter(|d| !d.is_empty()) {
        summary.push_str(&format!("- Fecha de vencimiento: {due}\n"));
    }
    summary
}

/// The response contract appended to every prompt.
fn response_contract() -> &'static str {
    r#"Responde SOLO con un objeto JSON válido con esta estructura:
{
  "needsClarification": true/false,
  "question": "pregunta específica si needsClarification es true, null si es false",
  "suggestions": {
    "tipo": "Bug, Task o Support",
    "urgencia": "Low, Medium o High",
    "asunto": "asunto mejorado si aplica",
    "descripcion": "descripción mejorada si aplica",
    "dueDate": "fecha sugerida en formato YYYY-MM-DD si aplica"
  },
  "interpretation": "interpretación de la solicitud (solo si needsClarification es false)"
}
Usa exactamente los valores Bug/Task/Support y Low/Medium/High."#
}

fn initial_prompt(ticket: &TicketRequest, description: &str, image_count: usize) -> String {
    let mut prompt = String::from(
        "Eres un asistente que ayuda a clientes a completar tickets de soporte. \
         Si faltan pasos para reproducir, resultado esperado, resultado actual o \
         contexto técnico, haz una pregunta específica; si la información está \
         completa, sugiere tipo, urgencia, asunto y una descripción estructurada.\n\n\
         Información inicial del ticket:\n",
    );
    prompt.push_str(&ticket_summary(ticket, description));
    if image_count > 0 {
        prompt.push_str(&format!(
            "- Imágenes adjuntas: {image_count}; analízalas para entender el problema\n"
        ));
    }
    prompt.push('\n');
    prompt.push_str(response_contract());
    prompt
}

fn continuation_prompt(
    ticket: &TicketRequest,
    description: &str,
    history: &[ChatTurn],
) -> String {
    let transcript: String = history
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::User => "Cliente",
                TurnRole::Assistant => "Asistente",
            };
            format!("{speaker}: {}\n\n", turn.content)
        })
        .collect();

    let mut prompt = format!(
        "Continúa la conversación con el cliente. Historial:\n\n{transcript}\
         Información actual del ticket:\n"
    );
    prompt.push_str(&ticket_summary(ticket, description));
    prompt.push_str(
        "\nSi aún falta información haz otra pregunta específica; si ya es \
         suficiente, entrega la interpretación y las sugerencias incluyendo \
         todo lo que el cliente aportó.\n\n",
    );
    prompt.push_str(response_contract());
    prompt
}

/// Screenshot sources to content blocks. Unparseable data URLs and unknown
/// hosts are skipped.
fn image_blocks(images: &[String]) -> Vec<ContentBlockParam> {
    let mut blocks = Vec::new();
    for source in images {
        if let Some(rest) = source.strip_prefix("data:") {
            let Some((header, data)) = rest.split_once(",") else {
                warn!("skipping malformed image data URL");
                continue;
            };
            let media_type = header.split(';').next().unwrap_or("image/png");
            if !media_type.starts_with("image/") {
                continue;
            }
            blocks.push(ContentBlockParam::image_base64(media_type, data));
        } else if source.contains("imgur.com") {
            blocks.push(ContentBlockParam::image_url(source.clone()));
        }
    }
    blocks
}

/// Extract the response object from the model output. The model is told to
/// answer with bare JSON but routinely wraps it in prose or a code fence;
/// everything between the first `{` and the last `}` is treated as the
/// object. Unparseable output degrades to a pass-through response built from
/// the leading prose.
fn parse_analysis(text: &str) -> AnalyzeResponse {
    if let Some(json) = extract_json_object(text)
        && let Ok(mut analysis) = serde_json::from_str::<AnalyzeResponse>(json)
    {
        if let Some(interpretation) = analysis.interpretation.take() {
            analysis.interpretation = Some(clean_interpretation(&interpretation));
        }
        return analysis;
    }

    warn!("model output did not contain a parseable response object");
    let leading: String = text.chars().take_while(|&c| c != '{').collect();
    let leading = sanitize::truncate(leading.trim(), 300);
    AnalyzeResponse::pass_through(if leading.is_empty() {
        DEFAULT_INTERPRETATION.to_string()
    } else {
        leading
    })
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// The model sometimes echoes the JSON inside the interpretation field;
/// keep only the prose before it.
fn clean_interpretation(interpretation: &str) -> String {
    if interpretation.contains('{') && interpretation.contains('}') {
        let prose: String = interpretation.chars().take_while(|&c| c != '{').collect();
        let prose = prose.trim();
        if prose.is_empty() {
            return DEFAULT_INTERPRETATION.to_string();
        }
        return prose.to_string();
    }
    interpretation.to_string()
}
