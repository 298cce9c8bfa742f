//! PDF exports: ticket listings and single-ticket reports.

pub mod pdf;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::core::error::{AppError, AppResult};
use crate::core::shared::enums::{Criticality, TicketStatus};
use crate::core::shared::models::{Ticket, TicketDetail, User};
use crate::core::shared::schema::tickets;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{format_timestamp, now};
use crate::core::urls::{ApiUrls, PageUrls};
use crate::tickets::search::{self, TicketFilter, TicketStats};
use crate::tickets::{ensure_can_view, load_detail, load_ticket};
use crate::web::filters::filesize;
use crate::web::{AuthenticatedUser, PageResult};

use pdf::{Cell, Color, Font, PdfError, ReportBuilder};

const TABLE_FONT_SIZE: f32 = 9.0;
const LIST_COLUMNS: [f32; 5] = [40.0, 220.0, 80.0, 80.0, 100.0];
const SUMMARY_COLUMNS: [f32; 2] = [150.0, 100.0];
const INFO_COLUMNS: [f32; 2] = [100.0, 400.0];

pub fn status_color(status: TicketStatus) -> Color {
    match status {
        TicketStatus::Open => Color::BLUE,
        TicketStatus::InProgress => Color::ORANGE,
        TicketStatus::Closed => Color::GREEN,
        TicketStatus::Rejected => Color::RED,
    }
}

pub fn criticality_color(criticality: Criticality) -> Color {
    match criticality {
        Criticality::Low => Color::GREEN,
        Criticality::Medium => Color::ORANGE,
        Criticality::High | Criticality::Urgent => Color::RED,
    }
}

fn list_title(user: &User) -> String {
    if user.is_admin {
        "All Tickets".to_string()
    } else {
        format!("My Tickets - {}", user.name)
    }
}

/// Listing report: title, metadata, ticket table and per-status summary.
pub fn ticket_list_pdf(company: &str, requested_by: &User, tickets: &[Ticket]) -> Result<Vec<u8>, PdfError> {
    let generated_at = format_timestamp(&now());
    let mut report = ReportBuilder::new(company, &generated_at);

    report.heading(&list_title(requested_by), 18.0);
    report.line(&format!("Generated: {generated_at}"), Font::Regular, 10.0, Color::DARK_GREY);
    report.line(
        &format!("Requested by: {} ({})", requested_by.name, requested_by.email),
        Font::Regular,
        10.0,
        Color::DARK_GREY,
    );
    report.line(&format!("Total tickets: {}", tickets.len()), Font::Regular, 10.0, Color::DARK_GREY);
    report.space(12.0);

    if tickets.is_empty() {
        report.line("No tickets found.", Font::Bold, 12.0, Color::BLACK);
        report.space(12.0);
    } else {
        let rows: Vec<Vec<Cell>> = tickets
            .iter()
            .map(|t| {
                vec![
                    Cell::plain(t.id.to_string()),
                    Cell::plain(t.title.clone()),
                    Cell::colored(t.status.label(), status_color(t.status)),
                    Cell::colored(t.criticality.label(), criticality_color(t.criticality)),
                    Cell::plain(format_timestamp(&t.created_at)),
                ]
            })
            .collect();
        report.table(
            &["ID", "Title", "Status", "Criticality", "Created"],
            &LIST_COLUMNS,
            &rows,
            TABLE_FONT_SIZE,
        );
    }

    let stats = TicketStats::from_tickets(tickets);
    let mut summary: Vec<Vec<Cell>> = TicketStatus::ALL
        .iter()
        .map(|status| {
            vec![
                Cell::colored(status.label(), status_color(*status)),
                Cell::plain(stats.count(*status).to_string()),
            ]
        })
        .collect();
    summary.push(vec![Cell::plain("Total"), Cell::plain(stats.total.to_string())]);

    report.ensure_space(120.0);
    report.heading("Summary", 13.0);
    report.table(&["Status", "Count"], &SUMMARY_COLUMNS, &summary, TABLE_FONT_SIZE);
    report.finish()
}

/// Single-ticket report with description, attachments and response history.
pub fn ticket_detail_pdf(company: &str, requested_by: &User, detail: &TicketDetail) -> Result<Vec<u8>, PdfError> {
    let ticket = &detail.ticket;
    let generated_at = format_timestamp(&now());
    let mut report = ReportBuilder::new(company, &generated_at);

    report.heading(&format!("Ticket #{}", ticket.id), 18.0);
    report.heading(&ticket.title, 14.0);
    report.line(
        &format!("Generated: {generated_at} by {}", requested_by.name),
        Font::Regular,
        10.0,
        Color::DARK_GREY,
    );
    report.space(8.0);

    let info = vec![
        vec![
            Cell::plain("Author"),
            Cell::plain(format!("{} ({})", detail.author_name, detail.author_email)),
        ],
        vec![
            Cell::plain("Status"),
            Cell::colored(ticket.status.label(), status_color(ticket.status)),
        ],
        vec![
            Cell::plain("Criticality"),
            Cell::colored(ticket.criticality.label(), criticality_color(ticket.criticality)),
        ],
        vec![Cell::plain("Created"), Cell::plain(format_timestamp(&ticket.created_at))],
    ];
    report.table(&["Field", "Value"], &INFO_COLUMNS, &info, 10.0);

    report.heading("Description", 13.0);
    report.paragraph(&ticket.description, 10.0, Color::BLACK);
    report.space(10.0);

    if !detail.attachments.is_empty() {
        report.heading("Attachments", 13.0);
        for attachment in &detail.attachments {
            report.line(
                &format!("- {} ({})", attachment.filename, filesize(attachment.size.max(0) as u64)),
                Font::Regular,
                10.0,
                Color::BLACK,
            );
        }
        report.space(10.0);
    }

    report.heading(&format!("Responses ({})", detail.responses.len()), 13.0);
    if detail.responses.is_empty() {
        report.line("No responses yet.", Font::Regular, 10.0, Color::DARK_GREY);
    }
    for (i, response) in detail.responses.iter().enumerate() {
        if i > 0 {
            report.rule(Color::LIGHT_GREY);
        }
        report.line(
            &format!("{} - {}", response.author_name, format_timestamp(&response.created_at)),
            Font::Bold,
            10.0,
            Color::DARK_BLUE,
        );
        report.paragraph(&response.content, 10.0, Color::BLACK);
    }

    report.finish()
}

fn pdf_response(bytes: Vec<u8>, filename: &str) -> AppResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(AppError::internal)
}

fn stamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

pub async fn export_tickets_pdf(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Query(filter): Query<TicketFilter>,
) -> PageResult {
    let rows = {
        let mut conn = state.db()?;
        search::list_tickets(&mut conn, &user, &filter)?
    };
    let bytes = ticket_list_pdf(&state.config.company_name, &user, &rows).map_err(AppError::internal)?;
    info!("User {} exported {} ticket(s) to PDF", user.id, rows.len());
    Ok(pdf_response(bytes, &format!("tickets_{}.pdf", stamp()))?)
}

pub async fn export_ticket_pdf(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> PageResult {
    let detail = {
        let mut conn = state.db()?;
        let ticket = load_ticket(&mut conn, id)?;
        ensure_can_view(&user, &ticket)?;
        load_detail(&mut conn, ticket)?
    };
    let bytes = ticket_detail_pdf(&state.config.company_name, &user, &detail).map_err(AppError::internal)?;
    Ok(pdf_response(bytes, &format!("ticket_{}_{}.pdf", id, stamp()))?)
}

#[derive(Debug, Deserialize)]
pub struct BulkExportRequest {
    #[serde(default)]
    pub ticket_ids: Vec<i32>,
}

/// Listing PDF for an explicit set of ids. Ids the caller may not see are
/// silently dropped.
pub async fn export_selected_pdf(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Json(req): Json<BulkExportRequest>,
) -> AppResult<Response> {
    if req.ticket_ids.is_empty() {
        return Err(AppError::validation("ticket_ids must be a non-empty list"));
    }

    let rows: Vec<Ticket> = {
        let mut conn = state.db()?;
        let mut query = tickets::table
            .filter(tickets::id.eq_any(&req.ticket_ids))
            .into_boxed();
        if !user.is_admin {
            query = query.filter(tickets::author_id.eq(user.id));
        }
        query
            .order(tickets::id.desc())
            .select(Ticket::as_select())
            .load(&mut conn)?
    };
    if rows.is_empty() {
        return Err(AppError::not_found("Tickets"));
    }

    let bytes = ticket_list_pdf(&state.config.company_name, &user, &rows).map_err(AppError::internal)?;
    pdf_response(bytes, &format!("tickets_selected_{}.pdf", stamp()))
}

pub fn configure_reports_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(PageUrls::TICKETS_PDF, get(export_tickets_pdf))
        .route(PageUrls::TICKET_PDF, get(export_ticket_pdf))
        .route(ApiUrls::TICKETS_PDF, post(export_selected_pdf))
}
