//! Outbound email.
//!
//! Messages go through an ordered list of transports: SMTP first, then the
//! EmailJS HTTP API. In development without SMTP credentials every message
//! is only logged. Callers that must not fail on delivery use
//! [`EmailService::notify`], which logs and swallows errors.

pub mod templates;

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::shared::state::AppState;
use crate::security::CryptoManager;
use crate::web::auth::AdminUser;

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    /// Plain text used by transports that cannot carry HTML.
    pub text_body: Option<String>,
    pub attachments: Vec<EmailAttachment>,
}

impl OutgoingEmail {
    pub fn new(to: Vec<String>, subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            html_body: html_body.into(),
            text_body: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    pub fn with_attachment(mut self, attachment: EmailAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    fn plain_text(&self) -> &str {
        self.text_body.as_deref().unwrap_or(&self.html_body)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid message: {0}")]
    Build(String),
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("HTTP relay error: {0}")]
    Http(String),
    #[error("No email transport is configured")]
    NotConfigured,
    #[error("All email transports failed: {}", .0.join("; "))]
    AllFailed(Vec<String>),
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

// ============================================================================
// SMTP
// ============================================================================

#[cfg(feature = "mail")]
pub struct SmtpEmailTransport {
    host: String,
    port: u16,
    username: String,
    password: String,
    from_name: String,
}

#[cfg(feature = "mail")]
impl SmtpEmailTransport {
    pub fn new(host: &str, port: u16, username: &str, password: &str, from_name: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            from_name: from_name.to_string(),
        }
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<lettre::Message, EmailError> {
        use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};

        let from: Mailbox = format!("{} <{}>", self.from_name, self.username)
            .parse()
            .map_err(|e| EmailError::Build(format!("Invalid from address: {e}")))?;

        let mut builder = lettre::Message::builder().from(from).subject(&email.subject);
        for recipient in &email.to {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| EmailError::Build(format!("Invalid to address {recipient}: {e}")))?;
            builder = builder.to(to);
        }

        let result = if email.attachments.is_empty() {
            builder
                .header(ContentType::TEXT_HTML)
                .body(email.html_body.clone())
        } else {
            let mut parts = MultiPart::mixed().singlepart(SinglePart::html(email.html_body.clone()));
            for attachment in &email.attachments {
                let content_type = match ContentType::parse(&attachment.content_type) {
                    Ok(ct) => ct,
                    Err(_) => ContentType::parse("application/octet-stream")
                        .map_err(|e| EmailError::Build(format!("Invalid content type: {e}")))?,
                };
                parts = parts.singlepart(
                    Attachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            builder.multipart(parts)
        };

        result.map_err(|e| EmailError::Build(format!("Failed to build email: {e}")))
    }
}

#[cfg(feature = "mail")]
#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        use lettre::{transport::smtp::authentication::Credentials, SmtpTransport, Transport};

        let message = self.build_message(email)?;
        let host = self.host.clone();
        let port = self.port;
        let creds = Credentials::new(self.username.clone(), self.password.clone());

        tokio::task::spawn_blocking(move || {
            let builder = if port == 465 {
                SmtpTransport::relay(&host)
            } else {
                SmtpTransport::starttls_relay(&host)
            }
            .map_err(|e| EmailError::Smtp(format!("SMTP relay error: {e}")))?;

            let mailer = builder.port(port).credentials(creds).build();
            mailer
                .send(&message)
                .map(|_| ())
                .map_err(|e| EmailError::Smtp(format!("Failed to send email: {e}")))
        })
        .await
        .map_err(|e| EmailError::Smtp(format!("SMTP task failed: {e}")))?
    }
}

// ============================================================================
// EMAILJS
// ============================================================================

pub struct EmailJsTransport {
    client: reqwest::Client,
    url: String,
    service_id: String,
    template_id: String,
    user_id: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct EmailJsPayload<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: EmailJsParams<'a>,
}

#[derive(Debug, Serialize)]
struct EmailJsParams<'a> {
    to_email: String,
    from_name: &'a str,
    subject: &'a str,
    message: &'a str,
}

impl EmailJsTransport {
    pub fn new(url: &str, service_id: &str, template_id: &str, user_id: &str, from_name: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            url: url.to_string(),
            service_id: service_id.to_string(),
            template_id: template_id.to_string(),
            user_id: user_id.to_string(),
            from_name: from_name.to_string(),
        }
    }
}

#[async_trait]
impl EmailTransport for EmailJsTransport {
    fn name(&self) -> &'static str {
        "emailjs"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let payload = EmailJsPayload {
            service_id: &self.service_id,
            template_id: &self.template_id,
            user_id: &self.user_id,
            template_params: EmailJsParams {
                to_email: email.to.join(", "),
                from_name: &self.from_name,
                subject: &email.subject,
                message: email.plain_text(),
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EmailError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(EmailError::Http(format!("{status}: {body}")))
        }
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

/// Logs messages instead of sending them and keeps a copy for inspection.
#[derive(Default)]
pub struct SimulatedTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailTransport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        info!(
            to = %email.to.join(", "),
            subject = %email.subject,
            "[simulated email] not delivered"
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct EmailService {
    transports: Vec<Arc<dyn EmailTransport>>,
    enabled: bool,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field(
                "transports",
                &self.transports.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl EmailService {
    pub fn new(transports: Vec<Arc<dyn EmailTransport>>) -> Self {
        Self {
            transports,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            transports: Vec::new(),
            enabled: false,
        }
    }

    /// Builds the transport chain from configuration. `enc:` values are
    /// decrypted with `crypto`.
    pub fn from_config(config: &AppConfig, crypto: &CryptoManager) -> anyhow::Result<Self> {
        let email = &config.email;
        if !email.enabled {
            info!("Email delivery disabled by configuration");
            return Ok(Self::disabled());
        }

        let password = crypto.reveal(&email.password)?;
        if config.environment.is_development() && password.is_empty() {
            info!("Development mode without SMTP password: emails will be simulated");
            return Ok(Self::new(vec![Arc::new(SimulatedTransport::new())]));
        }

        let mut transports: Vec<Arc<dyn EmailTransport>> = Vec::new();

        #[cfg(feature = "mail")]
        if !email.username.is_empty() && !password.is_empty() {
            transports.push(Arc::new(SmtpEmailTransport::new(
                &email.smtp_host,
                email.smtp_port,
                &email.username,
                &password,
                &email.from_name,
            )));
        }

        let service_id = crypto.reveal(&email.emailjs_service_id)?;
        let template_id = crypto.reveal(&email.emailjs_template_id)?;
        let user_id = crypto.reveal(&email.emailjs_user_id)?;
        if !service_id.is_empty() && !template_id.is_empty() && !user_id.is_empty() {
            transports.push(Arc::new(EmailJsTransport::new(
                &email.emailjs_url,
                &service_id,
                &template_id,
                &user_id,
                &email.from_name,
            )));
        }

        if transports.is_empty() {
            warn!("No email transport configured; notifications will not be emailed");
        }
        Ok(Self::new(transports))
    }

    /// Tries each transport in order. Returns the name of the one that
    /// delivered the message.
    pub async fn send(&self, email: &OutgoingEmail) -> Result<&'static str, EmailError> {
        if email.to.is_empty() {
            return Err(EmailError::Build("No recipients".to_string()));
        }
        if self.transports.is_empty() {
            return Err(EmailError::NotConfigured);
        }

        let mut failures = Vec::new();
        for transport in &self.transports {
            match transport.send(email).await {
                Ok(()) => {
                    info!(transport = transport.name(), subject = %email.subject, "Email sent");
                    return Ok(transport.name());
                }
                Err(e) => {
                    warn!(transport = transport.name(), "Email transport failed: {e}");
                    failures.push(format!("{}: {e}", transport.name()));
                }
            }
        }
        Err(EmailError::AllFailed(failures))
    }

    /// Delivery that never fails the caller.
    pub async fn notify(&self, email: OutgoingEmail) {
        if !self.enabled || email.to.is_empty() {
            return;
        }
        if let Err(e) = self.send(&email).await {
            warn!(subject = %email.subject, "Notification email not delivered: {e}");
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    pub filename: String,
    /// Base64 file content.
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

/// Decode request attachments. Entries that are not valid base64 are skipped.
fn decode_attachments(payloads: &[AttachmentPayload]) -> Vec<EmailAttachment> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    payloads
        .iter()
        .filter_map(|payload| match STANDARD.decode(payload.content.trim()) {
            Ok(data) => Some(EmailAttachment {
                filename: crate::core::shared::utils::sanitize_filename(&payload.filename),
                content_type: mime_guess::from_path(&payload.filename)
                    .first_or_octet_stream()
                    .to_string(),
                data,
            }),
            Err(e) => {
                warn!("Skipping attachment {}: {}", payload.filename, e);
                None
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct SendEmailResponse {
    pub success: bool,
    pub message: String,
    pub transport: String,
}

pub async fn send_email_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Json(req): Json<SendEmailRequest>,
) -> AppResult<Json<SendEmailResponse>> {
    let to: Vec<String> = req
        .to
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if to.is_empty() {
        return Err(AppError::validation("At least one recipient is required"));
    }
    if req.subject.trim().is_empty() || req.body.trim().is_empty() {
        return Err(AppError::validation("Subject and body are required"));
    }

    let html = templates::render_default_template(&state.config.company_name, &req.subject, &req.body, None);
    let email = decode_attachments(&req.attachments)
        .into_iter()
        .fold(
            OutgoingEmail::new(to, req.subject.trim(), html).with_text(req.body.clone()),
            OutgoingEmail::with_attachment,
        );
    let transport = state
        .email
        .send(&email)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(SendEmailResponse {
        success: true,
        message: "Email sent".to_string(),
        transport: transport.to_string(),
    }))
}

pub fn configure_email_routes() -> Router<Arc<AppState>> {
    Router::new().route(crate::core::urls::ApiUrls::EMAIL_SEND, post(send_email_handler))
}
