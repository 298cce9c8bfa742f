use crate::core::shared::models::{Ticket, User};
use crate::web::filters::{html_escape, nl2br};

use super::OutgoingEmail;

/// What happened to a ticket, for notification emails.
#[derive(Debug, Clone)]
pub enum TicketEvent {
    Created,
    Responded { responder: String },
    Closed,
    Rejected { justification: String },
    StatusChanged,
}

impl TicketEvent {
    pub fn subject(&self, ticket: &Ticket) -> String {
        match self {
            Self::Created => format!("New ticket #{}: {}", ticket.id, ticket.title),
            Self::Responded { .. } => format!("New response on ticket #{}", ticket.id),
            Self::Closed => format!("Ticket #{} closed", ticket.id),
            Self::Rejected { .. } => format!("Ticket #{} rejected", ticket.id),
            Self::StatusChanged => format!("Ticket #{} status changed", ticket.id),
        }
    }

    pub fn message(&self, ticket: &Ticket) -> String {
        match self {
            Self::Created => format!(
                "A new ticket was created.\n\nTitle: {}\nStatus: {}\nCriticality: {}\n\nDescription:\n{}",
                ticket.title, ticket.status, ticket.criticality, ticket.description
            ),
            Self::Responded { responder } => format!(
                "A new response was added to ticket #{}.\n\nTitle: {}\nStatus: {}\n\nResponded by: {}",
                ticket.id, ticket.title, ticket.status, responder
            ),
            Self::Closed => format!(
                "Ticket #{} was closed.\n\nTitle: {}\nStatus: {}",
                ticket.id, ticket.title, ticket.status
            ),
            Self::Rejected { justification } => format!(
                "Ticket #{} was rejected.\n\nTitle: {}\nStatus: {}\n\nJustification:\n{}",
                ticket.id, ticket.title, ticket.status, justification
            ),
            Self::StatusChanged => format!(
                "Ticket #{} was updated.\n\nTitle: {}\nStatus: {}\nCriticality: {}",
                ticket.id, ticket.title, ticket.status, ticket.criticality
            ),
        }
    }
}

/// Wraps a plain-text message in the default HTML layout.
pub fn render_default_template(company: &str, subject: &str, message: &str, link: Option<(&str, &str)>) -> String {
    let button = link
        .map(|(href, label)| {
            format!(
                r#"<p><a class="button" href="{}">{}</a></p>"#,
                html_escape(href),
                html_escape(label)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{subject}</title>
<style>
body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; }}
.container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
.header {{ background-color: #0056b3; color: white; padding: 20px; text-align: center; }}
.content {{ padding: 20px; background-color: #f9f9f9; border: 1px solid #ddd; }}
.footer {{ text-align: center; margin-top: 20px; font-size: 12px; color: #777; }}
.button {{ display: inline-block; background-color: #0056b3; color: white; padding: 10px 20px; text-decoration: none; border-radius: 4px; }}
</style>
</head>
<body>
<div class="container">
<div class="header"><h2>{company}</h2><p>Ticket System</p></div>
<div class="content"><h3>{subject}</h3><p>{message}</p>{button}</div>
<div class="footer">
<p>This is an automated message from the {company} ticket system.</p>
<p>Please do not reply to this email.</p>
</div>
</div>
</body>
</html>"#,
        subject = html_escape(subject),
        company = html_escape(company),
        message = nl2br(&html_escape(message)),
        button = button,
    )
}

pub fn ticket_event_email(
    event: &TicketEvent,
    ticket: &Ticket,
    recipients: Vec<String>,
    company: &str,
    public_url: &str,
) -> OutgoingEmail {
    let subject = event.subject(ticket);
    let message = event.message(ticket);
    let link = format!("{}/tickets/{}", public_url.trim_end_matches('/'), ticket.id);
    let html = render_default_template(company, &subject, &message, Some((&link, "View ticket")));
    OutgoingEmail::new(recipients, subject, html).with_text(message)
}

pub fn password_reset_email(user: &User, reset_link: &str, company: &str) -> OutgoingEmail {
    let subject = "Password reset".to_string();
    let message = format!(
        "Hello {},\n\nA password reset was requested for your account. \
         The link below is valid for one hour.\n\n{}\n\n\
         If you did not request this, you can ignore this email.",
        user.name, reset_link
    );
    let html = render_default_template(company, &subject, &message, Some((reset_link, "Reset password")));
    OutgoingEmail::new(vec![user.email.clone()], subject, html).with_text(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::enums::{Criticality, TicketStatus};

    fn ticket() -> Ticket {
        Ticket {
            id: 42,
            title: "Printer <offline>".to_string(),
            description: "Floor 3\nsince Monday".to_string(),
            status: TicketStatus::Open,
            criticality: Criticality::High,
            created_at: chrono::Utc::now().naive_utc(),
            author_id: 1,
        }
    }

    #[test]
    fn test_subjects_per_event() {
        let t = ticket();
        assert_eq!(TicketEvent::Created.subject(&t), "New ticket #42: Printer <offline>");
        assert_eq!(
            TicketEvent::Responded { responder: "Ana".into() }.subject(&t),
            "New response on ticket #42"
        );
        assert_eq!(TicketEvent::Closed.subject(&t), "Ticket #42 closed");
        assert_eq!(
            TicketEvent::Rejected { justification: "dup".into() }.subject(&t),
            "Ticket #42 rejected"
        );
    }

    #[test]
    fn test_rejection_message_carries_justification() {
        let msg = TicketEvent::Rejected { justification: "Duplicate of #7".into() }.message(&ticket());
        assert!(msg.contains("Duplicate of #7"));
    }

    #[test]
    fn test_template_escapes_and_links() {
        let email = ticket_event_email(
            &TicketEvent::Created,
            &ticket(),
            vec!["admin@example.com".into()],
            "ACME",
            "https://help.example.com/",
        );
        assert!(email.html_body.contains("Printer &lt;offline&gt;"));
        assert!(email.html_body.contains("https://help.example.com/tickets/42"));
        assert!(email.html_body.contains("Floor 3<br>since Monday"));
        assert_eq!(email.to, vec!["admin@example.com".to_string()]);
    }
}
