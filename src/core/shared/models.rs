use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::{Criticality, NotificationKind, TicketStatus};

pub use super::schema;

pub use super::schema::{attachments, notifications, responses, tickets, users};

#[derive(Debug, Clone, Serialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = tickets)]
#[diesel(belongs_to(User, foreign_key = author_id))]
pub struct Ticket {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub criticality: Criticality,
    pub created_at: NaiveDateTime,
    pub author_id: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub criticality: Criticality,
    pub created_at: NaiveDateTime,
    pub author_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable, Associations)]
#[diesel(table_name = responses)]
#[diesel(belongs_to(Ticket))]
pub struct Response {
    pub id: i32,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub ticket_id: i32,
    pub author_id: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = responses)]
pub struct NewResponse {
    pub content: String,
    pub created_at: NaiveDateTime,
    pub ticket_id: i32,
    pub author_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: i32,
    pub user_id: i32,
    pub ticket_id: Option<i32>,
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i32,
    pub ticket_id: Option<i32>,
    pub kind: NotificationKind,
    pub message: String,
    pub read: bool,
    pub created_at: NaiveDateTime,
}

impl NewNotification {
    pub fn unread(user_id: i32, ticket_id: Option<i32>, kind: NotificationKind, message: String) -> Self {
        Self {
            user_id,
            ticket_id,
            kind,
            message,
            read: false,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Selectable)]
#[diesel(table_name = attachments)]
pub struct Attachment {
    pub id: i32,
    pub filename: String,
    pub stored_name: String,
    #[serde(skip_serializing)]
    pub path: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: NaiveDateTime,
    pub uploaded_by: i32,
    pub ticket_id: Option<i32>,
    pub response_id: Option<i32>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = attachments)]
pub struct NewAttachment {
    pub filename: String,
    pub stored_name: String,
    pub path: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: NaiveDateTime,
    pub uploaded_by: i32,
    pub ticket_id: Option<i32>,
    pub response_id: Option<i32>,
}

/// A response joined with its author's display name.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub id: i32,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub author_id: i32,
    pub author_name: String,
}

/// A ticket joined with its author, responses and attachments.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub author_name: String,
    pub author_email: String,
    pub responses: Vec<ResponseView>,
    pub attachments: Vec<Attachment>,
}
