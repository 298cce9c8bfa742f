//! In-app notifications for ticket events.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::core::error::{AppError, AppResult};
use crate::core::shared::enums::NotificationKind;
use crate::core::shared::models::{NewNotification, Notification};
use crate::core::shared::schema::notifications;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::format_timestamp;
use crate::core::urls::{ApiUrls, PageUrls};
use crate::web::filters::html_escape;
use crate::web::{flash_redirect, AuthenticatedUser, FlashLevel, PageContext, PageResult};

/// Inserts one unread notification per recipient.
pub fn record(
    conn: &mut SqliteConnection,
    recipients: &[i32],
    ticket_id: Option<i32>,
    kind: NotificationKind,
    message: &str,
) -> QueryResult<usize> {
    if recipients.is_empty() {
        return Ok(0);
    }
    let rows: Vec<NewNotification> = recipients
        .iter()
        .map(|&user_id| NewNotification::unread(user_id, ticket_id, kind, message.to_string()))
        .collect();
    diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)
}

pub fn unread_count(conn: &mut SqliteConnection, user_id: i32) -> QueryResult<i64> {
    notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::read.eq(false))
        .count()
        .get_result(conn)
}

pub fn list_for_user(conn: &mut SqliteConnection, user_id: i32, unread_only: bool) -> QueryResult<Vec<Notification>> {
    let mut query = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .into_boxed();
    if unread_only {
        query = query.filter(notifications::read.eq(false));
    }
    query
        .order((notifications::created_at.desc(), notifications::id.desc()))
        .select(Notification::as_select())
        .load(conn)
}

/// Loads a notification and checks that `user_id` owns it.
fn owned(conn: &mut SqliteConnection, id: i32, user_id: i32) -> AppResult<Notification> {
    let notification = notifications::table
        .find(id)
        .select(Notification::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("Notification"))?;
    if notification.user_id != user_id {
        return Err(AppError::forbidden());
    }
    Ok(notification)
}

pub fn mark_all_read(conn: &mut SqliteConnection, user_id: i32) -> QueryResult<usize> {
    diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::read.eq(false)),
    )
    .set(notifications::read.eq(true))
    .execute(conn)
}

#[derive(Debug, Serialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
) -> AppResult<Json<NotificationList>> {
    let mut conn = state.db()?;
    let notifications = list_for_user(&mut conn, user.id, false)?;
    let unread_count = unread_count(&mut conn, user.id)?;
    Ok(Json(NotificationList {
        notifications,
        unread_count,
    }))
}

pub async fn list_unread(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
) -> AppResult<Json<NotificationList>> {
    let mut conn = state.db()?;
    let notifications = list_for_user(&mut conn, user.id, true)?;
    let unread_count = notifications.len() as i64;
    Ok(Json(NotificationList {
        notifications,
        unread_count,
    }))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    owned(&mut conn, id, user.id)?;
    diesel::update(notifications::table.find(id))
        .set(notifications::read.eq(true))
        .execute(&mut conn)?;
    Ok(Json(json!({ "success": true, "message": "Notification marked as read" })))
}

pub async fn mark_all_read_handler(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    let updated = mark_all_read(&mut conn, user.id)?;
    Ok(Json(json!({ "success": true, "message": "All notifications marked as read", "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    owned(&mut conn, id, user.id)?;
    diesel::delete(notifications::table.find(id)).execute(&mut conn)?;
    Ok(Json(json!({ "success": true, "message": "Notification deleted" })))
}

pub async fn clear_notifications(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    let deleted =
        diesel::delete(notifications::table.filter(notifications::user_id.eq(user.id))).execute(&mut conn)?;
    Ok(Json(json!({ "success": true, "message": "Notifications cleared", "deleted": deleted })))
}

fn render_notification(n: &Notification) -> String {
    let link = n
        .ticket_id
        .map(|id| {
            format!(
                r#" <a href="{}">View ticket</a>"#,
                ApiUrls::with_params(PageUrls::TICKET_DETAIL, &[("id", &id.to_string())])
            )
        })
        .unwrap_or_default();
    format!(
        r#"<tr class="{class}"><td>{kind}</td><td>{message}{link}</td><td>{date}</td></tr>"#,
        class = if n.read { "" } else { "unread" },
        kind = n.kind.label(),
        message = html_escape(&n.message),
        link = link,
        date = format_timestamp(&n.created_at),
    )
}

pub async fn notifications_page(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    cookies: Cookies,
) -> PageResult {
    let list = {
        let mut conn = state.db()?;
        list_for_user(&mut conn, user.id, false)?
    };
    let ctx = PageContext::load(&state, Some(&user), &cookies);

    let body = if list.is_empty() {
        r#"<div class="card"><h2>Notifications</h2><p>No notifications.</p></div>"#.to_string()
    } else {
        let rows: String = list.iter().map(render_notification).collect();
        format!(
            r#"<div class="card"><h2>Notifications</h2>
<form class="inline" method="post" action="{read_all}"><button type="submit" class="btn-secondary">Mark all as read</button></form>
<table><thead><tr><th>Type</th><th>Message</th><th>Date</th></tr></thead><tbody>{rows}</tbody></table></div>"#,
            read_all = PageUrls::NOTIFICATIONS_READ_ALL,
            rows = rows,
        )
    };
    Ok(ctx.render("Notifications", &body).into_response())
}

pub async fn mark_all_read_page(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user }: AuthenticatedUser,
    cookies: Cookies,
) -> PageResult<Response> {
    let mut conn = state.db()?;
    mark_all_read(&mut conn, user.id)?;
    Ok(flash_redirect(
        &cookies,
        FlashLevel::Success,
        "All notifications marked as read.",
        PageUrls::NOTIFICATIONS,
    ))
}

pub fn configure_notifications_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::NOTIFICATIONS,
            get(list_notifications).delete(clear_notifications),
        )
        .route(ApiUrls::NOTIFICATIONS_UNREAD, get(list_unread))
        .route(ApiUrls::NOTIFICATIONS_READ_ALL, post(mark_all_read_handler))
        .route(ApiUrls::NOTIFICATION_BY_ID, axum::routing::delete(delete_notification))
        .route(ApiUrls::NOTIFICATION_READ, post(mark_read))
        .route(PageUrls::NOTIFICATIONS, get(notifications_page))
        .route(PageUrls::NOTIFICATIONS_READ_ALL, post(mark_all_read_page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_user, test_context};

    #[test]
    fn test_record_and_count() {
        let ctx = test_context();
        let a = insert_user(&ctx.state, "Ana", "ana@example.com", true);
        let b = insert_user(&ctx.state, "Bia", "bia@example.com", true);
        let mut conn = ctx.state.db().expect("conn");

        let inserted = record(&mut conn, &[a.id, b.id], None, NotificationKind::NewTicket, "New ticket #1")
            .expect("insert");
        assert_eq!(inserted, 2);
        assert_eq!(record(&mut conn, &[], None, NotificationKind::NewTicket, "x").expect("noop"), 0);
        assert_eq!(unread_count(&mut conn, a.id).expect("count"), 1);

        assert_eq!(mark_all_read(&mut conn, a.id).expect("update"), 1);
        assert_eq!(unread_count(&mut conn, a.id).expect("count"), 0);
        assert_eq!(unread_count(&mut conn, b.id).expect("count"), 1);
    }

    #[test]
    fn test_owner_check() {
        let ctx = test_context();
        let a = insert_user(&ctx.state, "Ana", "ana@example.com", false);
        let b = insert_user(&ctx.state, "Bia", "bia@example.com", false);
        let mut conn = ctx.state.db().expect("conn");
        record(&mut conn, &[a.id], None, NotificationKind::Closed, "Ticket #1 closed").expect("insert");
        let id = list_for_user(&mut conn, a.id, false).expect("list")[0].id;

        assert!(owned(&mut conn, id, a.id).is_ok());
        assert!(matches!(owned(&mut conn, id, b.id), Err(AppError::Forbidden(_))));
        assert!(matches!(owned(&mut conn, id + 100, a.id), Err(AppError::NotFound(_))));
    }
}
