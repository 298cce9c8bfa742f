pub mod search;
pub mod ui;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::core::error::{AppError, AppResult};
use crate::core::shared::enums::{Criticality, NotificationKind, TicketStatus};
use crate::core::shared::models::{
    Attachment, NewResponse, NewTicket, Response, ResponseView, Ticket, TicketDetail, User,
};
use crate::core::shared::schema::{attachments, responses, tickets, users};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::now;
use crate::core::urls::ApiUrls;
use crate::email::templates::{ticket_event_email, TicketEvent};
use crate::notifications;
use crate::users as accounts;
use crate::web::{AdminUser, AuthenticatedUser};

use search::{SearchPage, SearchQuery, TicketStats};

pub const MAX_TITLE_LENGTH: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub criticality: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub justification: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct TicketActionResponse {
    pub success: bool,
    pub message: String,
    pub ticket: Ticket,
}

impl TicketActionResponse {
    fn new(message: &str, ticket: Ticket) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
            ticket,
        })
    }
}

pub fn load_ticket(conn: &mut SqliteConnection, id: i32) -> AppResult<Ticket> {
    tickets::table
        .find(id)
        .select(Ticket::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Ticket"))
}

pub fn ensure_can_view(user: &User, ticket: &Ticket) -> AppResult<()> {
    if user.is_admin || ticket.author_id == user.id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You do not have permission to view this ticket".to_string(),
        ))
    }
}

/// Ticket with author, responses (oldest first) and attachments.
pub fn load_detail(conn: &mut SqliteConnection, ticket: Ticket) -> AppResult<TicketDetail> {
    let (author_name, author_email) = users::table
        .find(ticket.author_id)
        .select((users::name, users::email))
        .first::<(String, String)>(conn)?;

    let responses = responses::table
        .inner_join(users::table)
        .filter(responses::ticket_id.eq(ticket.id))
        .order((responses::created_at.asc(), responses::id.asc()))
        .select((
            responses::id,
            responses::content,
            responses::created_at,
            responses::author_id,
            users::name,
        ))
        .load::<(i32, String, chrono::NaiveDateTime, i32, String)>(conn)?
        .into_iter()
        .map(|(id, content, created_at, author_id, author_name)| ResponseView {
            id,
            content,
            created_at,
            author_id,
            author_name,
        })
        .collect();

    let response_ids: Vec<Option<i32>> = responses::table
        .filter(responses::ticket_id.eq(ticket.id))
        .select(responses::id)
        .load::<i32>(conn)?
        .into_iter()
        .map(Some)
        .collect();
    let attachments = attachments::table
        .filter(
            attachments::ticket_id
                .eq(ticket.id)
                .or(attachments::response_id.eq_any(response_ids)),
        )
        .order(attachments::id.asc())
        .select(Attachment::as_select())
        .load(conn)?;

    Ok(TicketDetail {
        ticket,
        author_name,
        author_email,
        responses,
        attachments,
    })
}

fn author_email(conn: &mut SqliteConnection, ticket: &Ticket) -> AppResult<Vec<String>> {
    Ok(accounts::find_by_id(conn, ticket.author_id)?
        .map(|u| vec![u.email])
        .unwrap_or_default())
}

async fn email_event(state: &AppState, event: TicketEvent, ticket: &Ticket, recipients: Vec<String>) {
    let email = ticket_event_email(
        &event,
        ticket,
        recipients,
        &state.config.company_name,
        &state.config.public_url,
    );
    state.email.notify(email).await;
}

/// Creates an open ticket and notifies every other administrator.
pub async fn create_ticket(state: &AppState, author: &User, req: &CreateTicketRequest) -> AppResult<Ticket> {
    let title = req.title.trim();
    let description = req.description.trim();
    if title.is_empty() || description.is_empty() {
        return Err(AppError::validation("Title and description are required"));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::validation(format!(
            "Title must be at most {MAX_TITLE_LENGTH} characters"
        )));
    }
    let criticality = match req.criticality.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => Criticality::from_str(c).map_err(|_| AppError::validation(format!("Invalid criticality: {c}")))?,
        None => Criticality::default(),
    };

    let (ticket, recipients) = {
        let mut conn = state.db()?;
        conn.transaction::<_, AppError, _>(|conn| {
            let ticket = diesel::insert_into(tickets::table)
                .values(&NewTicket {
                    title: title.to_string(),
                    description: description.to_string(),
                    status: TicketStatus::Open,
                    criticality,
                    created_at: now(),
                    author_id: author.id,
                })
                .returning(Ticket::as_returning())
                .get_result(conn)?;

            let admins: Vec<i32> = accounts::admin_ids(conn)?
                .into_iter()
                .filter(|id| *id != author.id)
                .collect();
            notifications::record(
                conn,
                &admins,
                Some(ticket.id),
                NotificationKind::NewTicket,
                &format!("New ticket #{}: {}", ticket.id, ticket.title),
            )?;

            let recipients: Vec<String> = accounts::admin_emails(conn)?
                .into_iter()
                .filter(|email| *email != author.email)
                .collect();
            Ok((ticket, recipients))
        })?
    };

    info!(ticket_id = ticket.id, author_id = author.id, "Ticket created");
    email_event(state, TicketEvent::Created, &ticket, recipients).await;
    Ok(ticket)
}

/// Adds a response. The author is notified when someone else responds.
pub async fn add_response(state: &AppState, user: &User, ticket_id: i32, content: &str) -> AppResult<(Ticket, Response)> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::validation("The response cannot be empty"));
    }

    let (ticket, response, recipients) = {
        let mut conn = state.db()?;
        let ticket = load_ticket(&mut conn, ticket_id)?;
        ensure_can_view(user, &ticket)?;

        conn.transaction::<_, AppError, _>(|conn| {
            let response = diesel::insert_into(responses::table)
                .values(&NewResponse {
                    content: content.to_string(),
                    created_at: now(),
                    ticket_id,
                    author_id: user.id,
                })
                .returning(Response::as_returning())
                .get_result(conn)?;

            let mut recipients = Vec::new();
            if user.id != ticket.author_id {
                notifications::record(
                    conn,
                    &[ticket.author_id],
                    Some(ticket.id),
                    NotificationKind::Response,
                    &format!("New response on ticket #{}", ticket.id),
                )?;
                recipients = author_email(conn, &ticket)?;
            }
            Ok((ticket, response, recipients))
        })?
    };

    info!(ticket_id, response_id = response.id, "Response added");
    email_event(
        state,
        TicketEvent::Responded {
            responder: user.name.clone(),
        },
        &ticket,
        recipients,
    )
    .await;
    Ok((ticket, response))
}

/// Moves a ticket to `status` and notifies its author inside one transaction.
fn transition(
    conn: &mut SqliteConnection,
    ticket: &Ticket,
    status: TicketStatus,
    kind: NotificationKind,
    message: &str,
) -> AppResult<(Ticket, Vec<String>)> {
    conn.transaction::<_, AppError, _>(|conn| {
        let updated = diesel::update(tickets::table.find(ticket.id))
            .set(tickets::status.eq(status))
            .returning(Ticket::as_returning())
            .get_result(conn)?;
        notifications::record(conn, &[ticket.author_id], Some(ticket.id), kind, message)?;
        let recipients = author_email(conn, ticket)?;
        Ok((updated, recipients))
    })
}

pub async fn close_ticket(state: &AppState, admin: &User, ticket_id: i32) -> AppResult<Ticket> {
    let (ticket, recipients) = {
        let mut conn = state.db()?;
        let ticket = load_ticket(&mut conn, ticket_id)?;
        if ticket.status == TicketStatus::Closed {
            return Err(AppError::Conflict("Ticket is already closed".to_string()));
        }
        transition(
            &mut conn,
            &ticket,
            TicketStatus::Closed,
            NotificationKind::Closed,
            &format!("Ticket #{} was closed", ticket.id),
        )?
    };

    info!(ticket_id, admin_id = admin.id, "Ticket closed");
    email_event(state, TicketEvent::Closed, &ticket, recipients).await;
    Ok(ticket)
}

pub async fn reject_ticket(
    state: &AppState,
    admin: &User,
    ticket_id: i32,
    justification: Option<&str>,
) -> AppResult<Ticket> {
    let justification = justification.map(str::trim).unwrap_or_default();
    if justification.is_empty() {
        return Err(AppError::validation("A justification is required to reject a ticket"));
    }

    let (ticket, recipients) = {
        let mut conn = state.db()?;
        let ticket = load_ticket(&mut conn, ticket_id)?;
        if ticket.status == TicketStatus::Rejected {
            return Err(AppError::Conflict("Ticket is already rejected".to_string()));
        }
        transition(
            &mut conn,
            &ticket,
            TicketStatus::Rejected,
            NotificationKind::Rejected,
            &format!("Ticket #{} was rejected. Justification: {}", ticket.id, justification),
        )?
    };

    info!(ticket_id, admin_id = admin.id, "Ticket rejected");
    email_event(
        state,
        TicketEvent::Rejected {
            justification: justification.to_string(),
        },
        &ticket,
        recipients,
    )
    .await;
    Ok(ticket)
}

/// Sets any status. Setting the current status changes nothing.
pub async fn change_status(state: &AppState, admin: &User, ticket_id: i32, status: &str) -> AppResult<Ticket> {
    let status = TicketStatus::from_str(status.trim())
        .map_err(|_| AppError::validation(format!("Invalid status: {}", status.trim())))?;

    let (ticket, recipients) = {
        let mut conn = state.db()?;
        let ticket = load_ticket(&mut conn, ticket_id)?;
        if ticket.status == status {
            return Ok(ticket);
        }
        transition(
            &mut conn,
            &ticket,
            status,
            NotificationKind::StatusChanged,
            &format!("Ticket #{} status changed to {}", ticket.id, status.label()),
        )?
    };

    info!(ticket_id, admin_id = admin.id, status = status.as_str(), "Ticket status changed");
    email_event(state, TicketEvent::StatusChanged, &ticket, recipients).await;
    Ok(ticket)
}

pub async fn create_ticket_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Json(req): Json<CreateTicketRequest>,
) -> AppResult<Json<TicketActionResponse>> {
    let ticket = create_ticket(&state, &user, &req).await?;
    Ok(TicketActionResponse::new("Ticket created", ticket))
}

pub async fn get_ticket_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<TicketDetail>> {
    let mut conn = state.db()?;
    let ticket = load_ticket(&mut conn, id)?;
    ensure_can_view(&user, &ticket)?;
    Ok(Json(load_detail(&mut conn, ticket)?))
}

pub async fn respond_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(req): Json<RespondRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let (_, response) = add_response(&state, &user, id, &req.content).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Response added",
        "response": response,
    })))
}

pub async fn close_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<TicketActionResponse>> {
    let ticket = close_ticket(&state, &admin, id).await?;
    Ok(TicketActionResponse::new("Ticket closed", ticket))
}

pub async fn reject_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
    Json(req): Json<RejectRequest>,
) -> AppResult<Json<TicketActionResponse>> {
    let ticket = reject_ticket(&state, &admin, id, req.justification.as_deref()).await?;
    Ok(TicketActionResponse::new("Ticket rejected", ticket))
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
    Json(req): Json<ChangeStatusRequest>,
) -> AppResult<Json<TicketActionResponse>> {
    let ticket = change_status(&state, &admin, id, &req.status).await?;
    Ok(TicketActionResponse::new("Ticket status updated", ticket))
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
) -> AppResult<Json<TicketStats>> {
    let mut conn = state.db()?;
    Ok(Json(search::stats(&mut conn, &user)?))
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<SearchPage>> {
    let mut conn = state.db()?;
    Ok(Json(search::search(&mut conn, &user, &params)?))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::TICKETS, post(create_ticket_handler))
        .route(ApiUrls::TICKET_STATS, get(stats_handler))
        .route(ApiUrls::TICKET_BY_ID, get(get_ticket_handler))
        .route(ApiUrls::TICKET_RESPONSES, post(respond_handler))
        .route(ApiUrls::TICKET_CLOSE, post(close_handler))
        .route(ApiUrls::TICKET_REJECT, post(reject_handler))
        .route(ApiUrls::TICKET_STATUS, put(status_handler))
        .route(ApiUrls::SEARCH, get(search_handler))
}
