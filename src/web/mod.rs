//! Server-rendered pages: shared layout, page errors and session handling.

pub mod auth;
pub mod auth_handlers;
pub mod filters;
pub mod flash;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;
use tracing::warn;

use crate::core::error::AppError;
use crate::core::shared::models::User;
use crate::core::shared::state::AppState;
use crate::core::urls::PageUrls;
use crate::notifications;

use filters::html_escape;
use flash::FlashMessage;

pub use auth::{AdminUser, AuthenticatedUser, OptionalUser};
pub use flash::{push_flash, take_flashes, FlashLevel};

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, Arial, sans-serif; margin: 0; background: #f4f6f9; color: #222; }
header { background: #1f3c88; color: #fff; padding: 12px 24px; display: flex; align-items: center; justify-content: space-between; }
header a { color: #fff; margin-left: 16px; text-decoration: none; }
header .brand { font-weight: bold; font-size: 18px; margin-left: 0; }
main { max-width: 1100px; margin: 24px auto; padding: 0 16px; }
.card { background: #fff; border-radius: 6px; padding: 20px; margin-bottom: 20px; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
.alert { padding: 10px 14px; border-radius: 4px; margin-bottom: 12px; }
.alert-success { background: #e3f5e1; color: #1e5e1a; }
.alert-info { background: #e1eefa; color: #124a7a; }
.alert-warning { background: #fff4d6; color: #7a5a00; }
.alert-danger { background: #fbe3e3; color: #8a1c1c; }
table { width: 100%; border-collapse: collapse; }
th, td { text-align: left; padding: 8px; border-bottom: 1px solid #e5e5e5; }
th { background: #f0f2f5; }
.badge { display: inline-block; padding: 2px 8px; border-radius: 10px; font-size: 12px; color: #fff; }
.badge-primary { background: #1f6fd1; } .badge-warning { background: #e08a00; }
.badge-success { background: #2e8b3a; } .badge-danger { background: #c62828; }
.badge-secondary { background: #6c757d; } .badge-info { background: #17a2b8; }
form.inline { display: inline; }
input, select, textarea { padding: 6px 8px; border: 1px solid #ccc; border-radius: 4px; font: inherit; }
textarea { width: 100%; min-height: 100px; }
label { display: block; margin-top: 10px; font-weight: 600; }
button, .btn { background: #1f3c88; color: #fff; border: 0; padding: 8px 14px; border-radius: 4px; cursor: pointer; text-decoration: none; display: inline-block; }
.btn-danger { background: #c62828; } .btn-secondary { background: #6c757d; } .btn-success { background: #2e8b3a; }
.stats { display: flex; gap: 12px; flex-wrap: wrap; }
.stat { flex: 1; min-width: 120px; text-align: center; }
.stat strong { display: block; font-size: 26px; }
.muted { color: #777; font-size: 13px; }
.filters label { display: inline-block; margin-right: 8px; font-weight: normal; }
.response { border-left: 3px solid #1f3c88; padding-left: 12px; margin-bottom: 16px; }
.unread { font-weight: bold; }
"#;

/// Everything the shared layout needs besides the page body.
#[derive(Debug, Default)]
pub struct PageContext {
    pub user: Option<User>,
    pub unread: i64,
    pub flashes: Vec<FlashMessage>,
    pub company: String,
}

impl PageContext {
    pub fn load(state: &AppState, user: Option<&User>, cookies: &Cookies) -> Self {
        let unread = match user {
            Some(user) => state
                .db()
                .and_then(|mut conn| Ok(notifications::unread_count(&mut conn, user.id)?))
                .unwrap_or_else(|e| {
                    warn!("Failed to count notifications: {e}");
                    0
                }),
            None => 0,
        };

        Self {
            user: user.cloned(),
            unread,
            flashes: take_flashes(cookies),
            company: state.config.company_name.clone(),
        }
    }

    fn nav(&self) -> String {
        match &self.user {
            Some(user) => {
                let mut links = String::new();
                if user.is_admin {
                    links.push_str(&format!(r#"<a href="{}">Dashboard</a>"#, PageUrls::DASHBOARD));
                }
                links.push_str(&format!(
                    r#"<a href="{}">My Tickets</a><a href="{}">New Ticket</a><a href="{}">Notifications{}</a><a href="{}">Export PDF</a><a href="{}">Logout ({})</a>"#,
                    PageUrls::MY_TICKETS,
                    PageUrls::TICKET_NEW,
                    PageUrls::NOTIFICATIONS,
                    if self.unread > 0 {
                        format!(" ({})", self.unread)
                    } else {
                        String::new()
                    },
                    PageUrls::TICKETS_PDF,
                    PageUrls::LOGOUT,
                    html_escape(&user.name),
                ));
                links
            }
            None => format!(
                r#"<a href="{}">Login</a><a href="{}">Register</a>"#,
                PageUrls::LOGIN,
                PageUrls::REGISTER
            ),
        }
    }

    pub fn render(&self, title: &str, body: &str) -> Html<String> {
        let flashes: String = self
            .flashes
            .iter()
            .map(|f| {
                format!(
                    r#"<div class="alert {}">{}</div>"#,
                    f.level.css_class(),
                    html_escape(&f.message)
                )
            })
            .collect();

        Html(format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title} - {company}</title>
<style>{style}</style>
</head>
<body>
<header><a class="brand" href="/">{company} Helpdesk</a><nav>{nav}</nav></header>
<main>
{flashes}
{body}
</main>
</body>
</html>"#,
            title = html_escape(title),
            company = html_escape(&self.company),
            style = STYLE,
            nav = self.nav(),
            flashes = flashes,
            body = body,
        ))
    }
}

/// Minimal standalone page for errors raised outside a handler's layout.
pub fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    let body = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{title}</title><style>{style}</style></head>
<body><main><div class="card"><h1>{code} - {title}</h1><p>{message}</p><p><a class="btn" href="/">Back to start</a></p></div></main></body>
</html>"#,
        code = status.as_u16(),
        title = html_escape(title),
        message = html_escape(message),
        style = STYLE,
    );
    (status, Html(body)).into_response()
}

/// Error type for HTML routes.
#[derive(Debug)]
pub struct PageError(pub AppError);

pub type PageResult<T = Response> = Result<T, PageError>;

impl From<AppError> for PageError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<diesel::result::Error> for PageError {
    fn from(err: diesel::result::Error) -> Self {
        Self(err.into())
    }
}

impl From<diesel::r2d2::PoolError> for PageError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        match self.0 {
            AppError::Unauthorized => Redirect::to(PageUrls::LOGIN).into_response(),
            err => {
                let title = status.canonical_reason().unwrap_or("Error");
                error_page(status, title, &err.public_message())
            }
        }
    }
}

/// Flash `message` and redirect to `to`.
pub fn flash_redirect(cookies: &Cookies, level: FlashLevel, message: impl Into<String>, to: &str) -> Response {
    push_flash(cookies, level, message);
    Redirect::to(to).into_response()
}

/// Only same-site relative paths are accepted as post-login targets.
pub fn safe_next(next: Option<&str>) -> Option<String> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .map(|n| n.to_string())
}
