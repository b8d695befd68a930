//! Notification payload builders.

use intake_core::TicketRequest;

use crate::description_preview;

/// The plain-text message format, preferred because every space accepts it.
pub fn simple_message(
    ticket: &TicketRequest,
    client_name: &str,
    issue_key: &str,
    issue_url: &str,
) -> serde_json::Value {
    // Markdown control characters in the subject break the webhook's own
    // formatting.
    let subject: String = ticket
        .subject
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect();
    let preview = description_preview(&ticket.description);

    let text = format!(
        "🔔 *Nueva Solicitud de Ticket*\n\n\
         *Cliente:* {client_name}\n\
         *Ticket:* {issue_key}\n\
         *Asunto:* {subject}\n\
         *Tipo:* {type_emoji} {ticket_type}\n\
         *Urgencia:* {urgency_emoji} {urgency}\n\
         *Descripción:* {preview}\n\n\
         <{issue_url}|Ver en Jira>",
        type_emoji = ticket.ticket_type.emoji(),
        ticket_type = ticket.ticket_type.as_str(),
        urgency_emoji = ticket.urgency.emoji(),
        urgency = ticket.urgency.as_str(),
    );

    serde_json::json!({ "text": text })
}

/// Cards-v2 fallback for spaces that reject plain text.
pub fn card_message(
    ticket: &TicketRequest,
    client_name: &str,
    issue_key: &str,
    issue_url: &str,
) -> serde_json::Value {
    let preview = description_preview(&ticket.description);

    serde_json::json!({
        "cardsV2": [{
            "cardId": format!("card-{issue_key}"),
            "card": {
                "header": {
                    "title": "🔔 Nueva Solicitud",
                    "subtitle": issue_key,
                },
                "sections": [{
                    "widgets": [
                        { "decoratedText": { "topLabel": "Cliente", "text": client_name } },
                        { "decoratedText": { "topLabel": "Asunto", "text": ticket.subject } },
                        { "decoratedText": {
                            "topLabel": "Tipo",
                            "text": format!("{} {}", ticket.ticket_type.emoji(), ticket.ticket_type.as_str()),
                        } },
                        { "decoratedText": {
                            "topLabel": "Urgencia",
                            "text": format!("{} {}", ticket.urgency.emoji(), ticket.urgency.as_str()),
                        } },
                        { "decoratedText": {
                            "topLabel": "Descripción",
                            "text": preview,
                            "wrapText": true,
                        } },
                        { "buttonList": { "buttons": [{
                            "text": "Ver en Jira",
                            "onClick": { "openLink": { "url": issue_url } },
                        }] } },
                    ]
                }]
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::TicketType;
    use intake_core::Urgency;
    use pretty_assertions::assert_eq;

    fn ticket() -> TicketRequest {
        TicketRequest {
            client: "hiraoka".to_string(),
            subject: "Cupones *no* _aplican_".to_string(),
            description: "<p>El total   no refleja el  descuento</p>".to_string(),
            ticket_type: TicketType::Bug,
            urgency: Urgency::Medium,
            contact: None,
            due_date: None,
        }
    }

    #[test]
    fn simple_message_contains_every_field() {
        let message = simple_message(
            &ticket(),
            "HIRAOKA",
            "HIR-42",
            "https://acme.atlassian.net/browse/HIR-42",
        );
        let text = message["text"].as_str().expect("text field");

        assert!(text.contains("*Cliente:* HIRAOKA"));
        assert!(text.contains("*Ticket:* HIR-42"));
        // Markdown specials stripped from the subject.
        assert!(text.contains("*Asunto:* Cupones no aplican"));
        assert!(text.contains("🐛 Bug"));
        assert!(text.contains("🟡 Medium"));
        // Markup stripped and whitespace collapsed in the preview.
        assert!(text.contains("*Descripción:* El total no refleja el descuento"));
        assert!(text.contains("<https://acme.atlassian.net/browse/HIR-42|Ver en Jira>"));
    }

    #[test]
    fn long_descriptions_are_truncated_in_the_preview() {
        let mut long = ticket();
        long.description = format!("<p>{}</p>", "palabra ".repeat(100));
        let message = simple_message(&long, "HIRAOKA", "HIR-42", "https://x/browse/HIR-42");
        let text = message["text"].as_str().expect("text field");
        let preview_line = text
            .lines()
            .find(|line| line.starts_with("*Descripción:*"))
            .expect("preview line");
        assert!(preview_line.ends_with("..."));
        // 300 chars of preview plus the label and ellipsis.
        assert!(preview_line.chars().count() < 330);
    }

    #[test]
    fn card_message_links_the_issue() {
        let message = card_message(
            &ticket(),
            "HIRAOKA",
            "HIR-42",
            "https://acme.atlassian.net/browse/HIR-42",
        );
        assert_eq!(message["cardsV2"][0]["cardId"], "card-HIR-42");
        let card = &message["cardsV2"][0]["card"];
        assert_eq!(card["header"]["subtitle"], "HIR-42");
        let widgets = card["sections"][0]["widgets"]
            .as_array()
            .expect("widgets");
        assert_eq!(widgets.len(), 6);
        assert_eq!(
            widgets[5]["buttonList"]["buttons"][0]["onClick"]["openLink"]["url"],
            "https://acme.atlassian.net/browse/HIR-42"
        );
    }
}
