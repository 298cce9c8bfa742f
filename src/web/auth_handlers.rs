//! Login, logout, registration and password reset pages.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Duration;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_cookies::Cookies;
use tracing::{info, warn};

use crate::core::error::AppError;
use crate::core::shared::models::User;
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::now;
use crate::core::urls::{ApiUrls, PageUrls};
use crate::email::templates::password_reset_email;
use crate::security::{generate_token, hash_token, validate_new_password};
use crate::users::{self as accounts, Registration};

use super::filters::html_escape;
use super::{flash_redirect, safe_next, FlashLevel, OptionalUser, PageContext, PageResult};

pub const RESET_TOKEN_LIFETIME_HOURS: i64 = 1;
const INVALID_CREDENTIALS: &str = "Invalid email or password";
const RESET_SENT: &str = "If an account exists for that email, a password reset link has been sent.";

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

fn landing_for(user: &User) -> &'static str {
    if user.is_admin {
        PageUrls::DASHBOARD
    } else {
        PageUrls::MY_TICKETS
    }
}

/// Checks credentials. `None` covers both unknown email and wrong password.
pub fn authenticate(state: &AppState, conn: &mut SqliteConnection, email: &str, password: &str) -> Result<Option<User>, AppError> {
    let Some(user) = accounts::find_by_email(conn, email)? else {
        return Ok(None);
    };
    match state.passwords.verify(password, &user.password_hash) {
        Ok(true) => Ok(Some(user)),
        Ok(false) => Ok(None),
        Err(e) => {
            warn!(user_id = user.id, "Stored password hash unusable: {e}");
            Ok(None)
        }
    }
}

fn find_by_reset_token(conn: &mut SqliteConnection, token: &str) -> QueryResult<Option<User>> {
    users::table
        .filter(users::reset_token.eq(hash_token(token)))
        .filter(users::reset_token_expires_at.gt(now()))
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub async fn home(OptionalUser(user): OptionalUser) -> Redirect {
    match user {
        Some(user) => Redirect::to(landing_for(&user)),
        None => Redirect::to(PageUrls::LOGIN),
    }
}

pub async fn login_page(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    cookies: Cookies,
    Query(query): Query<NextQuery>,
) -> Response {
    if let Some(user) = user {
        return Redirect::to(landing_for(&user)).into_response();
    }

    let next = safe_next(query.next.as_deref()).unwrap_or_default();
    let body = format!(
        r#"<div class="card" style="max-width:420px;margin:auto">
<h2>Login</h2>
<form method="post" action="{action}">
<input type="hidden" name="next" value="{next}">
<label for="email">Email</label><input type="email" id="email" name="email" required autofocus>
<label for="password">Password</label><input type="password" id="password" name="password" required>
<p><button type="submit">Login</button></p>
</form>
<p class="muted"><a href="{forgot}">Forgot your password?</a> &middot; <a href="{register}">Create an account</a></p>
</div>"#,
        action = PageUrls::LOGIN,
        next = html_escape(&next),
        forgot = PageUrls::FORGOT_PASSWORD,
        register = PageUrls::REGISTER,
    );
    PageContext::load(&state, None, &cookies)
        .render("Login", &body)
        .into_response()
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> PageResult {
    let mut conn = state.db()?;
    let next = safe_next(form.next.as_deref());

    let Some(user) = authenticate(&state, &mut conn, &form.email, &form.password)? else {
        info!("Failed login attempt");
        let back = match &next {
            Some(next) => ApiUrls::with_query(PageUrls::LOGIN, &[("next", next)]),
            None => PageUrls::LOGIN.to_string(),
        };
        return Ok(flash_redirect(&cookies, FlashLevel::Error, INVALID_CREDENTIALS, &back));
    };

    state.auth.start_session(&cookies, &user)?;
    info!(user_id = user.id, "User logged in");
    let target = next.unwrap_or_else(|| landing_for(&user).to_string());
    Ok(flash_redirect(
        &cookies,
        FlashLevel::Success,
        format!("Welcome, {}!", user.name),
        &target,
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn api_login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let mut conn = state.db()?;
    let Some(user) = authenticate(&state, &mut conn, &req.email, &req.password)? else {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "message": INVALID_CREDENTIALS })),
        )
            .into_response());
    };

    let token = state.auth.start_session(&cookies, &user)?;
    info!(user_id = user.id, "User logged in via API");
    Ok(Json(json!({ "success": true, "token": token, "user": user })).into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>, cookies: Cookies) -> Response {
    cookies.remove(state.auth.removal_cookie());
    flash_redirect(&cookies, FlashLevel::Info, "You have been logged out.", PageUrls::LOGIN)
}

pub async fn register_page(
    State(state): State<Arc<AppState>>,
    OptionalUser(user): OptionalUser,
    cookies: Cookies,
) -> Response {
    if let Some(user) = user {
        return Redirect::to(landing_for(&user)).into_response();
    }

    let body = format!(
        r#"<div class="card" style="max-width:420px;margin:auto">
<h2>Create an account</h2>
<form method="post" action="{action}">
<label for="name">Name</label><input id="name" name="name" required>
<label for="email">Email</label><input type="email" id="email" name="email" required>
<label for="password">Password</label><input type="password" id="password" name="password" minlength="8" required>
<label for="confirm_password">Confirm password</label><input type="password" id="confirm_password" name="confirm_password" minlength="8" required>
<p><button type="submit">Register</button></p>
</form>
<p class="muted">Already registered? <a href="{login}">Login</a></p>
</div>"#,
        action = PageUrls::REGISTER,
        login = PageUrls::LOGIN,
    );
    PageContext::load(&state, None, &cookies)
        .render("Register", &body)
        .into_response()
}

pub async fn register_submit(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Form(form): Form<RegisterForm>,
) -> PageResult {
    let mut conn = state.db()?;
    let result = accounts::create_user(
        &mut conn,
        &state.passwords,
        Registration {
            name: &form.name,
            email: &form.email,
            password: &form.password,
            confirmation: &form.confirm_password,
            is_admin: state.config.is_bootstrap_admin(&form.email),
        },
    );

    match result {
        Ok(_) => Ok(flash_redirect(
            &cookies,
            FlashLevel::Success,
            "Registration successful. Please log in.",
            PageUrls::LOGIN,
        )),
        Err(AppError::Validation(msg) | AppError::Conflict(msg)) => {
            Ok(flash_redirect(&cookies, FlashLevel::Error, msg, PageUrls::REGISTER))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn forgot_password_page(State(state): State<Arc<AppState>>, cookies: Cookies) -> Response {
    let body = format!(
        r#"<div class="card" style="max-width:420px;margin:auto">
<h2>Forgot your password?</h2>
<p>Enter your email and we will send you a link to reset it.</p>
<form method="post" action="{action}">
<label for="email">Email</label><input type="email" id="email" name="email" required>
<p><button type="submit">Send reset link</button></p>
</form>
</div>"#,
        action = PageUrls::FORGOT_PASSWORD,
    );
    PageContext::load(&state, None, &cookies)
        .render("Forgot password", &body)
        .into_response()
}

pub async fn forgot_password_submit(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Form(form): Form<ForgotPasswordForm>,
) -> PageResult {
    let email = form.email.trim();
    if email.is_empty() {
        return Ok(flash_redirect(
            &cookies,
            FlashLevel::Error,
            "Email is required",
            PageUrls::FORGOT_PASSWORD,
        ));
    }

    let mut conn = state.db()?;
    if let Some(user) = accounts::find_by_email(&mut conn, email)? {
        let token = generate_token(32);
        diesel::update(users::table.find(user.id))
            .set((
                users::reset_token.eq(hash_token(&token)),
                users::reset_token_expires_at.eq(now() + Duration::hours(RESET_TOKEN_LIFETIME_HOURS)),
            ))
            .execute(&mut conn)?;
        drop(conn);

        let link = format!(
            "{}{}",
            state.config.public_url.trim_end_matches('/'),
            ApiUrls::with_params(PageUrls::RESET_PASSWORD, &[("token", &token)])
        );
        info!(user_id = user.id, "Password reset requested");
        state
            .email
            .notify(password_reset_email(&user, &link, &state.config.company_name))
            .await;
    }

    Ok(flash_redirect(&cookies, FlashLevel::Info, RESET_SENT, PageUrls::LOGIN))
}

pub async fn reset_password_page(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(token): Path<String>,
) -> PageResult {
    let mut conn = state.db()?;
    if find_by_reset_token(&mut conn, &token)?.is_none() {
        return Ok(flash_redirect(
            &cookies,
            FlashLevel::Error,
            "The reset link is invalid or has expired.",
            PageUrls::FORGOT_PASSWORD,
        ));
    }

    let body = format!(
        r#"<div class="card" style="max-width:420px;margin:auto">
<h2>Choose a new password</h2>
<form method="post" action="{action}">
<label for="password">New password</label><input type="password" id="password" name="password" minlength="8" required>
<label for="confirm_password">Confirm password</label><input type="password" id="confirm_password" name="confirm_password" minlength="8" required>
<p><button type="submit">Reset password</button></p>
</form>
</div>"#,
        action = html_escape(&ApiUrls::with_params(PageUrls::RESET_PASSWORD, &[("token", &token)])),
    );
    Ok(PageContext::load(&state, None, &cookies)
        .render("Reset password", &body)
        .into_response())
}

pub async fn reset_password_submit(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> PageResult {
    let mut conn = state.db()?;
    let Some(user) = find_by_reset_token(&mut conn, &token)? else {
        return Ok(flash_redirect(
            &cookies,
            FlashLevel::Error,
            "The reset link is invalid or has expired.",
            PageUrls::FORGOT_PASSWORD,
        ));
    };

    if let Err(msg) = validate_new_password(&form.password, &form.confirm_password) {
        let back = ApiUrls::with_params(PageUrls::RESET_PASSWORD, &[("token", &token)]);
        return Ok(flash_redirect(&cookies, FlashLevel::Error, msg, &back));
    }

    accounts::set_password(&mut conn, &state.passwords, user.id, &form.password)?;
    info!(user_id = user.id, "Password reset completed");
    Ok(flash_redirect(
        &cookies,
        FlashLevel::Success,
        "Your password has been reset. Please log in.",
        PageUrls::LOGIN,
    ))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(PageUrls::HOME, get(home))
        .route(PageUrls::LOGIN, get(login_page).post(login_submit))
        .route(PageUrls::LOGOUT, get(logout))
        .route(PageUrls::REGISTER, get(register_page).post(register_submit))
        .route(
            PageUrls::FORGOT_PASSWORD,
            get(forgot_password_page).post(forgot_password_submit),
        )
        .route(
            PageUrls::RESET_PASSWORD,
            get(reset_password_page).post(reset_password_submit),
        )
        .route(ApiUrls::LOGIN, post(api_login))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_user, test_context, TEST_PASSWORD};

    #[test]
    fn test_authenticate() {
        let ctx = test_context();
        insert_user(&ctx.state, "Ana", "ana@example.com", false);
        let mut conn = ctx.state.db().expect("conn");

        let ok = authenticate(&ctx.state, &mut conn, "ANA@example.com", TEST_PASSWORD).expect("query");
        assert_eq!(ok.map(|u| u.name), Some("Ana".to_string()));
        assert!(authenticate(&ctx.state, &mut conn, "ana@example.com", "wrong-password")
            .expect("query")
            .is_none());
        assert!(authenticate(&ctx.state, &mut conn, "ghost@example.com", TEST_PASSWORD)
            .expect("query")
            .is_none());
    }

    #[test]
    fn test_expired_reset_token_is_not_found() {
        let ctx = test_context();
        let user = insert_user(&ctx.state, "Ana", "ana@example.com", false);
        let mut conn = ctx.state.db().expect("conn");

        diesel::update(users::table.find(user.id))
            .set((
                users::reset_token.eq(hash_token("live")),
                users::reset_token_expires_at.eq(now() + Duration::minutes(5)),
            ))
            .execute(&mut conn)
            .expect("update");
        assert!(find_by_reset_token(&mut conn, "live").expect("query").is_some());
        assert!(find_by_reset_token(&mut conn, "other").expect("query").is_none());

        diesel::update(users::table.find(user.id))
            .set(users::reset_token_expires_at.eq(now() - Duration::minutes(1)))
            .execute(&mut conn)
            .expect("update");
        assert!(find_by_reset_token(&mut conn, "live").expect("query").is_none());
    }
}
