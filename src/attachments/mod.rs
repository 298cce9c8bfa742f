//! File attachments on tickets and responses, stored on local disk.

use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::UploadConfig;
use crate::core::error::{AppError, AppResult};
use crate::core::shared::models::{Attachment, NewAttachment, Ticket, User};
use crate::core::shared::schema::{attachments, responses};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{file_extension, now, sanitize_filename};
use crate::core::urls::ApiUrls;
use crate::security::generate_token;
use crate::tickets::{ensure_can_view, load_ticket};
use crate::web::AuthenticatedUser;

/// What an upload is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    Ticket(i32),
    Response(i32),
}

impl AttachmentTarget {
    fn from_ids(ticket_id: Option<i32>, response_id: Option<i32>) -> AppResult<Self> {
        match (ticket_id, response_id) {
            (Some(id), None) => Ok(Self::Ticket(id)),
            (None, Some(id)) => Ok(Self::Response(id)),
            _ => Err(AppError::validation(
                "Exactly one of ticket_id or response_id is required",
            )),
        }
    }

    fn prefix(&self) -> String {
        match self {
            Self::Ticket(id) => format!("t{id}_"),
            Self::Response(id) => format!("r{id}_"),
        }
    }
}

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

pub fn validate_upload(config: &UploadConfig, filename: &str, size: usize) -> AppResult<()> {
    if filename.trim().is_empty() {
        return Err(AppError::validation("No file selected"));
    }
    let allowed = file_extension(filename)
        .map(|ext| config.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false);
    if !allowed {
        return Err(AppError::validation(format!(
            "File type not allowed. Allowed: {}",
            config.allowed_extensions.join(", ")
        )));
    }
    if size == 0 {
        return Err(AppError::validation("The file is empty"));
    }
    if size > config.max_size {
        return Err(AppError::validation(format!(
            "File exceeds the maximum size of {} MB",
            config.max_size / (1024 * 1024)
        )));
    }
    Ok(())
}

/// `nonce` keeps two uploads of the same file within one second apart.
pub fn stored_name(target: AttachmentTarget, filename: &str, at: NaiveDateTime, nonce: &str) -> String {
    format!(
        "{}{}_{}_{}",
        target.prefix(),
        at.format("%Y%m%d%H%M%S"),
        nonce,
        sanitize_filename(filename)
    )
}

/// Creates `path` exclusively, so an existing upload is never overwritten.
async fn write_new(path: &std::path::Path, data: &[u8]) -> std::io::Result<()> {
    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    out.write_all(data).await?;
    out.flush().await
}

/// The ticket an upload target belongs to.
fn target_ticket(conn: &mut SqliteConnection, target: AttachmentTarget) -> AppResult<Ticket> {
    let ticket_id = match target {
        AttachmentTarget::Ticket(id) => id,
        AttachmentTarget::Response(id) => responses::table
            .find(id)
            .select(responses::ticket_id)
            .first::<i32>(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found("Response"))?,
    };
    load_ticket(conn, ticket_id)
}

fn attachment_ticket(conn: &mut SqliteConnection, attachment: &Attachment) -> AppResult<Ticket> {
    let target = AttachmentTarget::from_ids(attachment.ticket_id, attachment.response_id)?;
    target_ticket(conn, target)
}

fn load_attachment(conn: &mut SqliteConnection, id: i32) -> AppResult<Attachment> {
    attachments::table
        .find(id)
        .select(Attachment::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Attachment"))
}

/// Writes the file under the upload directory and records it.
pub async fn store(
    state: &AppState,
    user: &User,
    target: AttachmentTarget,
    file: UploadedFile,
) -> AppResult<Attachment> {
    let uploads = &state.config.uploads;
    validate_upload(uploads, &file.filename, file.data.len())?;

    {
        let mut conn = state.db()?;
        let ticket = target_ticket(&mut conn, target)?;
        ensure_can_view(user, &ticket)?;
    }

    let created_at = now();
    let stored = stored_name(target, &file.filename, created_at, &generate_token(6));
    let path: PathBuf = uploads.dir.join(&stored);
    tokio::fs::create_dir_all(&uploads.dir)
        .await
        .map_err(|e| AppError::internal(format!("Cannot create upload directory: {e}")))?;
    if let Err(e) = write_new(&path, &file.data).await {
        if e.kind() != std::io::ErrorKind::AlreadyExists {
            let _ = tokio::fs::remove_file(&path).await;
        }
        return Err(AppError::internal(format!("Cannot write upload: {e}")));
    }

    let content_type = file
        .content_type
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| mime_guess::from_path(&file.filename).first_or_octet_stream().to_string());
    let (ticket_id, response_id) = match target {
        AttachmentTarget::Ticket(id) => (Some(id), None),
        AttachmentTarget::Response(id) => (None, Some(id)),
    };

    let inserted = {
        let mut conn = state.db()?;
        diesel::insert_into(attachments::table)
            .values(&NewAttachment {
                filename: file.filename.trim().to_string(),
                stored_name: stored.clone(),
                path: path.to_string_lossy().to_string(),
                content_type,
                size: file.data.len() as i64,
                created_at,
                uploaded_by: user.id,
                ticket_id,
                response_id,
            })
            .returning(Attachment::as_returning())
            .get_result(&mut conn)
    };

    match inserted {
        Ok(attachment) => {
            info!(attachment_id = attachment.id, stored = %stored, "Attachment stored");
            Ok(attachment)
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove orphaned upload {}: {rm}", path.display());
            }
            Err(e.into())
        }
    }
}

fn parse_id(field: &str, value: &str) -> AppResult<Option<i32>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| AppError::validation(format!("Invalid {field}")))
}

pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut file = None;
    let mut ticket_id = None;
    let mut response_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid upload: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Invalid upload: {e}")))?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            "ticket_id" => {
                let text = field.text().await.map_err(|e| AppError::validation(e.to_string()))?;
                ticket_id = parse_id("ticket_id", &text)?;
            }
            "response_id" => {
                let text = field.text().await.map_err(|e| AppError::validation(e.to_string()))?;
                response_id = parse_id("response_id", &text)?;
            }
            _ => {}
        }
    }

    let target = AttachmentTarget::from_ids(ticket_id, response_id)?;
    let file = file.ok_or_else(|| AppError::validation("No file selected"))?;
    let attachment = store(&state, &user, target, file).await?;

    Ok(Json(json!({
        "success": true,
        "message": "File uploaded",
        "attachment": attachment,
    })))
}

pub async fn info_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Attachment>> {
    let mut conn = state.db()?;
    let attachment = load_attachment(&mut conn, id)?;
    ensure_can_view(&user, &attachment_ticket(&mut conn, &attachment)?)?;
    Ok(Json(attachment))
}

pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let attachment = {
        let mut conn = state.db()?;
        let attachment = load_attachment(&mut conn, id)?;
        ensure_can_view(&user, &attachment_ticket(&mut conn, &attachment)?)?;
        attachment
    };

    let bytes = match tokio::fs::read(&attachment.path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(attachment_id = id, "Attachment file missing on disk");
            return Err(AppError::not_found("File"));
        }
        Err(e) => return Err(AppError::internal(format!("Failed to read file: {e}"))),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, attachment.content_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                sanitize_filename(&attachment.filename)
            ),
        )
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(AppError::internal)
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let attachment = {
        let mut conn = state.db()?;
        let attachment = load_attachment(&mut conn, id)?;
        let ticket = attachment_ticket(&mut conn, &attachment)?;
        let allowed = user.is_admin || attachment.uploaded_by == user.id || ticket.author_id == user.id;
        if !allowed {
            return Err(AppError::forbidden());
        }
        diesel::delete(attachments::table.find(id)).execute(&mut conn)?;
        attachment
    };

    match tokio::fs::remove_file(&attachment.path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(attachment_id = id, "Failed to remove file: {e}"),
    }
    info!(attachment_id = id, user_id = user.id, "Attachment deleted");

    Ok(Json(json!({ "success": true, "message": "Attachment deleted" })))
}

pub fn configure_attachments_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::ATTACHMENTS, post(upload_handler))
        .route(ApiUrls::ATTACHMENT_BY_ID, get(info_handler).delete(delete_handler))
        .route(ApiUrls::ATTACHMENT_DOWNLOAD, get(download_handler))
}
