use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Form, Router,
};
use diesel::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::core::error::AppError;
use crate::core::shared::enums::{Criticality, TicketStatus};
use crate::core::shared::models::{Ticket, TicketDetail, User};
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::format_timestamp;
use crate::core::urls::{ApiUrls, PageUrls};
use crate::web::filters::{filesize, html_escape, nl2br, selected, truncate};
use crate::web::{flash_redirect, AdminUser, AuthenticatedUser, FlashLevel, PageContext, PageResult};

use super::search::{self, TicketFilter, TicketStats};
use super::CreateTicketRequest;

#[derive(Debug, Deserialize)]
pub struct RespondForm {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectForm {
    pub justification: Option<String>,
}

fn status_badge(status: TicketStatus) -> String {
    let class = match status {
        TicketStatus::Open => "badge-primary",
        TicketStatus::InProgress => "badge-warning",
        TicketStatus::Closed => "badge-success",
        TicketStatus::Rejected => "badge-danger",
    };
    format!(r#"<span class="badge {class}">{}</span>"#, status.label())
}

fn criticality_badge(criticality: Criticality) -> String {
    let class = match criticality {
        Criticality::Low => "badge-secondary",
        Criticality::Medium => "badge-info",
        Criticality::High => "badge-warning",
        Criticality::Urgent => "badge-danger",
    };
    format!(r#"<span class="badge {class}">{}</span>"#, criticality.label())
}

fn ticket_url(id: i32) -> String {
    ApiUrls::with_params(PageUrls::TICKET_DETAIL, &[("id", &id.to_string())])
}

fn render_empty_state(title: &str, description: &str) -> String {
    format!(
        r#"<div class="card" style="text-align:center"><h3>{}</h3><p class="muted">{}</p></div>"#,
        html_escape(title),
        html_escape(description)
    )
}

fn render_filters(action: &str, filter: &TicketFilter) -> String {
    let status_options: String = TicketStatus::ALL
        .iter()
        .map(|s| {
            format!(
                r#"<option value="{v}"{sel}>{label}</option>"#,
                v = s.as_str(),
                sel = selected(s.as_str(), filter.status().map(|f| f.as_str())),
                label = s.label()
            )
        })
        .collect();
    let criticality_options: String = Criticality::ALL
        .iter()
        .map(|c| {
            format!(
                r#"<option value="{v}"{sel}>{label}</option>"#,
                v = c.as_str(),
                sel = selected(c.as_str(), filter.criticality().map(|f| f.as_str())),
                label = c.label()
            )
        })
        .collect();
    let sort = match filter.sort_key() {
        search::SortKey::Id => "id",
        search::SortKey::Date => "date",
        search::SortKey::Criticality => "criticality",
    };
    let order = if filter.ascending() { "asc" } else { "desc" };

    format!(
        r#"<form class="card filters" method="get" action="{action}">
<label>Status <select name="status"><option value="">All</option>{status_options}</select></label>
<label>Criticality <select name="criticality"><option value="">All</option>{criticality_options}</select></label>
<label>From <input type="date" name="from" value="{from}"></label>
<label>To <input type="date" name="to" value="{to}"></label>
<label>Search <input name="q" value="{q}" placeholder="Title or description"></label>
<label>Sort <select name="sort"><option value="date"{s_date}>Date</option><option value="id"{s_id}>ID</option><option value="criticality"{s_crit}>Criticality</option></select></label>
<label>Order <select name="order"><option value="desc"{o_desc}>Descending</option><option value="asc"{o_asc}>Ascending</option></select></label>
<button type="submit">Filter</button> <a class="btn btn-secondary" href="{action}">Clear</a>
</form>"#,
        action = action,
        status_options = status_options,
        criticality_options = criticality_options,
        from = html_escape(filter.from.as_deref().unwrap_or_default()),
        to = html_escape(filter.to.as_deref().unwrap_or_default()),
        q = html_escape(filter.q.as_deref().unwrap_or_default()),
        s_date = selected("date", Some(sort)),
        s_id = selected("id", Some(sort)),
        s_crit = selected("criticality", Some(sort)),
        o_desc = selected("desc", Some(order)),
        o_asc = selected("asc", Some(order)),
    )
}

fn render_ticket_table(tickets: &[Ticket], authors: Option<&HashMap<i32, String>>) -> String {
    if tickets.is_empty() {
        return render_empty_state("No tickets found.", "Adjust the filters or open a new ticket.");
    }

    let author_header = if authors.is_some() { "<th>Author</th>" } else { "" };
    let rows: String = tickets
        .iter()
        .map(|t| {
            let author = authors
                .map(|names| {
                    format!(
                        "<td>{}</td>",
                        html_escape(names.get(&t.author_id).map(String::as_str).unwrap_or("-"))
                    )
                })
                .unwrap_or_default();
            format!(
                r#"<tr><td>#{id}</td><td><a href="{url}">{title}</a></td>{author}<td>{status}</td><td>{criticality}</td><td>{created}</td></tr>"#,
                id = t.id,
                url = ticket_url(t.id),
                title = html_escape(&truncate(&t.title, 60)),
                author = author,
                status = status_badge(t.status),
                criticality = criticality_badge(t.criticality),
                created = format_timestamp(&t.created_at),
            )
        })
        .collect();

    format!(
        r#"<div class="card"><table><thead><tr><th>ID</th><th>Title</th>{author_header}<th>Status</th><th>Criticality</th><th>Created</th></tr></thead><tbody>{rows}</tbody></table></div>"#
    )
}

fn render_stats(stats: &TicketStats) -> String {
    format!(
        r#"<div class="stats">
<div class="card stat"><strong>{}</strong>Total</div>
<div class="card stat"><strong>{}</strong>Open</div>
<div class="card stat"><strong>{}</strong>In Progress</div>
<div class="card stat"><strong>{}</strong>Urgent</div>
<div class="card stat"><strong>{}</strong>Closed</div>
<div class="card stat"><strong>{}</strong>Rejected</div>
</div>"#,
        stats.total, stats.open, stats.in_progress, stats.urgent, stats.closed, stats.rejected
    )
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    cookies: Cookies,
    Query(filter): Query<TicketFilter>,
) -> PageResult {
    let (tickets, stats, authors) = {
        let mut conn = state.db()?;
        let tickets = search::list_tickets(&mut conn, &admin, &filter)?;
        let stats = search::stats(&mut conn, &admin)?;
        let authors: HashMap<i32, String> = users::table
            .select((users::id, users::name))
            .load::<(i32, String)>(&mut conn)?
            .into_iter()
            .collect();
        (tickets, stats, authors)
    };

    let body = format!(
        r#"<h2>Dashboard</h2>{stats}{filters}{table}"#,
        stats = render_stats(&stats),
        filters = render_filters(PageUrls::DASHBOARD, &filter),
        table = render_ticket_table(&tickets, Some(&authors)),
    );
    Ok(PageContext::load(&state, Some(&admin), &cookies)
        .render("Dashboard", &body)
        .into_response())
}

pub async fn my_tickets(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    cookies: Cookies,
    Query(filter): Query<TicketFilter>,
) -> PageResult {
    // Administrators get the same listing limited to their own tickets.
    let own = User {
        is_admin: false,
        ..user.clone()
    };
    let tickets = {
        let mut conn = state.db()?;
        search::list_tickets(&mut conn, &own, &filter)?
    };

    let body = format!(
        r#"<h2>My Tickets</h2><p><a class="btn" href="{new}">New Ticket</a></p>{filters}{table}"#,
        new = PageUrls::TICKET_NEW,
        filters = render_filters(PageUrls::MY_TICKETS, &filter),
        table = render_ticket_table(&tickets, None),
    );
    Ok(PageContext::load(&state, Some(&user), &cookies)
        .render("My Tickets", &body)
        .into_response())
}

pub async fn new_ticket_page(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    cookies: Cookies,
) -> PageResult {
    let options: String = Criticality::ALL
        .iter()
        .map(|c| {
            format!(
                r#"<option value="{v}"{sel}>{label}</option>"#,
                v = c.as_str(),
                sel = selected(c.as_str(), Some(Criticality::default().as_str())),
                label = c.label()
            )
        })
        .collect();
    let body = format!(
        r#"<div class="card"><h2>New Ticket</h2>
<form method="post" action="{action}">
<label for="title">Title</label><input id="title" name="title" maxlength="{max}" required style="width:100%">
<label for="criticality">Criticality</label><select id="criticality" name="criticality">{options}</select>
<label for="description">Description</label><textarea id="description" name="description" required></textarea>
<p><button type="submit">Create ticket</button></p>
</form></div>"#,
        action = PageUrls::TICKET_NEW,
        max = super::MAX_TITLE_LENGTH,
        options = options,
    );
    Ok(PageContext::load(&state, Some(&user), &cookies)
        .render("New Ticket", &body)
        .into_response())
}

pub async fn new_ticket_submit(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    cookies: Cookies,
    Form(form): Form<CreateTicketRequest>,
) -> PageResult {
    match super::create_ticket(&state, &user, &form).await {
        Ok(ticket) => Ok(flash_redirect(
            &cookies,
            FlashLevel::Success,
            format!("Ticket #{} created successfully!", ticket.id),
            PageUrls::MY_TICKETS,
        )),
        Err(AppError::Validation(msg)) => Ok(flash_redirect(&cookies, FlashLevel::Error, msg, PageUrls::TICKET_NEW)),
        Err(e) => Err(e.into()),
    }
}

fn render_detail(detail: &TicketDetail, viewer: &User) -> String {
    let t = &detail.ticket;
    let id = t.id.to_string();

    let attachments = if detail.attachments.is_empty() {
        String::new()
    } else {
        let items: String = detail
            .attachments
            .iter()
            .map(|a| {
                format!(
                    r#"<li><a href="{url}">{name}</a> <span class="muted">({size})</span></li>"#,
                    url = ApiUrls::with_params(ApiUrls::ATTACHMENT_DOWNLOAD, &[("id", &a.id.to_string())]),
                    name = html_escape(&a.filename),
                    size = filesize(a.size.max(0) as u64),
                )
            })
            .collect();
        format!(r#"<div class="card"><h3>Attachments</h3><ul>{items}</ul></div>"#)
    };

    let responses = if detail.responses.is_empty() {
        r#"<p class="muted">No responses yet.</p>"#.to_string()
    } else {
        detail
            .responses
            .iter()
            .map(|r| {
                format!(
                    r#"<div class="response"><strong>{author}</strong> <span class="muted">{date}</span><p>{content}</p></div>"#,
                    author = html_escape(&r.author_name),
                    date = format_timestamp(&r.created_at),
                    content = nl2br(&html_escape(&r.content)),
                )
            })
            .collect()
    };

    let admin_actions = if viewer.is_admin {
        let close = if t.status == TicketStatus::Closed {
            String::new()
        } else {
            format!(
                r#"<form class="inline" method="post" action="{}"><button type="submit" class="btn-success">Close ticket</button></form>"#,
                ApiUrls::with_params(PageUrls::TICKET_CLOSE, &[("id", &id)])
            )
        };
        let reject = if t.status == TicketStatus::Rejected {
            String::new()
        } else {
            format!(
                r#"<form method="post" action="{}"><label for="justification">Rejection justification</label><textarea id="justification" name="justification" required></textarea><p><button type="submit" class="btn-danger">Reject ticket</button></p></form>"#,
                ApiUrls::with_params(PageUrls::TICKET_REJECT, &[("id", &id)])
            )
        };
        format!(r#"<div class="card"><h3>Administration</h3>{close}{reject}</div>"#)
    } else {
        String::new()
    };

    format!(
        r#"<div class="card">
<h2>Ticket #{id}: {title}</h2>
<p>{status} {criticality}</p>
<table>
<tr><th>Author</th><td>{author} &lt;{email}&gt;</td></tr>
<tr><th>Created</th><td>{created}</td></tr>
</table>
<h3>Description</h3><p>{description}</p>
<p><a class="btn btn-secondary" href="{pdf}">Export PDF</a></p>
</div>
{attachments}
<div class="card"><h3>Responses</h3>{responses}
<form method="post" action="{respond}"><label for="content">Add a response</label><textarea id="content" name="content" required></textarea><p><button type="submit">Send response</button></p></form>
</div>
{admin_actions}"#,
        id = t.id,
        title = html_escape(&t.title),
        status = status_badge(t.status),
        criticality = criticality_badge(t.criticality),
        author = html_escape(&detail.author_name),
        email = html_escape(&detail.author_email),
        created = format_timestamp(&t.created_at),
        description = nl2br(&html_escape(&t.description)),
        pdf = ApiUrls::with_params(PageUrls::TICKET_PDF, &[("id", &id)]),
        attachments = attachments,
        responses = responses,
        respond = ApiUrls::with_params(PageUrls::TICKET_RESPOND, &[("id", &id)]),
        admin_actions = admin_actions,
    )
}

pub async fn ticket_detail(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> PageResult {
    let detail = {
        let mut conn = state.db()?;
        let ticket = super::load_ticket(&mut conn, id)?;
        super::ensure_can_view(&user, &ticket)?;
        super::load_detail(&mut conn, ticket)?
    };

    let title = format!("Ticket #{}", detail.ticket.id);
    Ok(PageContext::load(&state, Some(&user), &cookies)
        .render(&title, &render_detail(&detail, &user))
        .into_response())
}

/// Flash the outcome of a ticket action and go back to the ticket.
fn action_outcome<T>(cookies: &Cookies, id: i32, result: Result<T, AppError>, success: &str) -> PageResult {
    let back = ticket_url(id);
    match result {
        Ok(_) => Ok(flash_redirect(cookies, FlashLevel::Success, success, &back)),
        Err(AppError::Validation(msg)) => Ok(flash_redirect(cookies, FlashLevel::Error, msg, &back)),
        Err(AppError::Conflict(msg)) => Ok(flash_redirect(cookies, FlashLevel::Warning, msg, &back)),
        Err(e) => Err(e.into()),
    }
}

pub async fn respond_submit(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    cookies: Cookies,
    Path(id): Path<i32>,
    Form(form): Form<RespondForm>,
) -> PageResult {
    let result = super::add_response(&state, &user, id, &form.content).await;
    action_outcome(&cookies, id, result, "Response sent successfully!")
}

pub async fn close_submit(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> PageResult {
    let result = super::close_ticket(&state, &admin, id).await;
    action_outcome(&cookies, id, result, "Ticket closed successfully!")
}

pub async fn reject_submit(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    cookies: Cookies,
    Path(id): Path<i32>,
    Form(form): Form<RejectForm>,
) -> PageResult {
    let result = super::reject_ticket(&state, &admin, id, form.justification.as_deref()).await;
    action_outcome(&cookies, id, result, "Ticket rejected successfully!")
}

pub fn configure_tickets_ui_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(PageUrls::DASHBOARD, get(dashboard))
        .route(PageUrls::MY_TICKETS, get(my_tickets))
        .route(PageUrls::TICKET_NEW, get(new_ticket_page).post(new_ticket_submit))
        .route(PageUrls::TICKET_DETAIL, get(ticket_detail))
        .route(PageUrls::TICKET_RESPOND, post(respond_submit))
        .route(PageUrls::TICKET_CLOSE, post(close_submit))
        .route(PageUrls::TICKET_REJECT, post(reject_submit))
}
