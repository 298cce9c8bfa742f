//! User accounts: lookups shared by the session layer and the admin API.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::core::error::{AppError, AppResult};
use crate::core::shared::models::{NewUser, User};
use crate::core::shared::schema::{attachments, notifications, responses, tickets, users};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::now;
use crate::core::urls::ApiUrls;
use crate::security::{validate_new_password, PasswordService};
use crate::web::{AdminUser, AuthenticatedUser};

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn find_by_id(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<User>> {
    users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .optional()
}

pub fn find_by_email(conn: &mut SqliteConnection, email: &str) -> QueryResult<Option<User>> {
    users::table
        .filter(users::email.eq(normalize_email(email)))
        .select(User::as_select())
        .first(conn)
        .optional()
}

/// Email addresses of every administrator.
pub fn admin_emails(conn: &mut SqliteConnection) -> QueryResult<Vec<String>> {
    users::table
        .filter(users::is_admin.eq(true))
        .select(users::email)
        .order(users::id.asc())
        .load(conn)
}

pub fn admin_ids(conn: &mut SqliteConnection) -> QueryResult<Vec<i32>> {
    users::table
        .filter(users::is_admin.eq(true))
        .select(users::id)
        .load(conn)
}

/// Validated input for a new account.
#[derive(Debug)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirmation: &'a str,
    pub is_admin: bool,
}

pub fn create_user(
    conn: &mut SqliteConnection,
    passwords: &PasswordService,
    reg: Registration<'_>,
) -> AppResult<User> {
    let name = reg.name.trim();
    let email = normalize_email(reg.email);
    if name.is_empty() || email.is_empty() || reg.password.is_empty() {
        return Err(AppError::validation("All fields are required"));
    }
    if !email.contains('@') {
        return Err(AppError::validation("Invalid email address"));
    }
    validate_new_password(reg.password, reg.confirmation).map_err(AppError::Validation)?;

    if find_by_email(conn, &email)?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let password_hash = passwords.hash(reg.password)?;
    let user = diesel::insert_into(users::table)
        .values(&NewUser {
            name: name.to_string(),
            email,
            password_hash,
            is_admin: reg.is_admin,
            created_at: now(),
        })
        .returning(User::as_returning())
        .get_result(conn)?;

    info!(user_id = user.id, is_admin = user.is_admin, "User created");
    Ok(user)
}

/// Grants administrator rights. Returns false when no such user exists.
pub fn set_admin(conn: &mut SqliteConnection, email: &str) -> QueryResult<bool> {
    let updated = diesel::update(users::table.filter(users::email.eq(normalize_email(email))))
        .set(users::is_admin.eq(true))
        .execute(conn)?;
    Ok(updated > 0)
}

pub fn set_password(
    conn: &mut SqliteConnection,
    passwords: &PasswordService,
    user_id: i32,
    password: &str,
) -> AppResult<()> {
    let hash = passwords.hash(password)?;
    diesel::update(users::table.find(user_id))
        .set((
            users::password_hash.eq(hash),
            users::reset_token.eq(None::<String>),
            users::reset_token_expires_at.eq(None::<chrono::NaiveDateTime>),
        ))
        .execute(conn)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub message: String,
    pub user: User,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<Vec<User>>> {
    let mut conn = state.db()?;
    let all = users::table
        .select(User::as_select())
        .order(users::name.asc())
        .load(&mut conn)?;
    Ok(Json(all))
}

pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let user = create_user(
        &mut conn,
        &state.passwords,
        Registration {
            name: &req.name,
            email: &req.email,
            password: &req.password,
            confirmation: &req.password,
            is_admin: req.is_admin,
        },
    )?;
    info!(admin_id = admin.id, user_id = user.id, "Account created by administrator");

    Ok(Json(UserResponse {
        success: true,
        message: "User created".to_string(),
        user,
    }))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user: current }: AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    if current.id != id && !current.is_admin {
        return Err(AppError::forbidden());
    }
    let mut conn = state.db()?;
    let user = find_by_id(&mut conn, id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser { user: current }: AuthenticatedUser,
    Path(id): Path<i32>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    if current.id != id && !current.is_admin {
        return Err(AppError::forbidden());
    }
    if req.is_admin.is_some() && !current.is_admin {
        return Err(AppError::Forbidden(
            "Only administrators can change roles".to_string(),
        ));
    }

    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::validation("Name cannot be empty")),
        other => other,
    };
    let email = req.email.as_deref().map(normalize_email);
    if matches!(&email, Some(e) if e.is_empty() || !e.contains('@')) {
        return Err(AppError::validation("Invalid email address"));
    }
    let password_hash = match req.password.as_deref() {
        Some(password) => {
            validate_new_password(password, password).map_err(AppError::Validation)?;
            Some(state.passwords.hash(password)?)
        }
        None => None,
    };

    let mut conn = state.db()?;
    let user = conn.transaction::<_, AppError, _>(|conn| {
        let existing = find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("User"))?;
        let email = email.filter(|e| *e != existing.email);
        if let Some(email) = &email {
            if find_by_email(conn, email)?.is_some() {
                return Err(AppError::Conflict("Email already registered".to_string()));
            }
        }

        if let Some(name) = name {
            diesel::update(users::table.find(id)).set(users::name.eq(name)).execute(conn)?;
        }
        if let Some(email) = email {
            diesel::update(users::table.find(id)).set(users::email.eq(email)).execute(conn)?;
        }
        if let Some(hash) = password_hash {
            diesel::update(users::table.find(id))
                .set((
                    users::password_hash.eq(hash),
                    users::reset_token.eq(None::<String>),
                    users::reset_token_expires_at.eq(None::<chrono::NaiveDateTime>),
                ))
                .execute(conn)?;
        }
        if let Some(is_admin) = req.is_admin {
            diesel::update(users::table.find(id)).set(users::is_admin.eq(is_admin)).execute(conn)?;
        }

        Ok(users::table.find(id).select(User::as_select()).first(conn)?)
    })?;
    info!(user_id = id, updated_by = current.id, "User updated");

    Ok(Json(UserResponse {
        success: true,
        message: "User updated".to_string(),
        user,
    }))
}

/// Removes an account with no tickets, responses or uploads. Its
/// notifications go with it.
pub fn delete_user(conn: &mut SqliteConnection, id: i32) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        find_by_id(conn, id)?.ok_or_else(|| AppError::not_found("User"))?;

        let authored: i64 = tickets::table
            .filter(tickets::author_id.eq(id))
            .count()
            .get_result(conn)?;
        let replies: i64 = responses::table
            .filter(responses::author_id.eq(id))
            .count()
            .get_result(conn)?;
        let uploads: i64 = attachments::table
            .filter(attachments::uploaded_by.eq(id))
            .count()
            .get_result(conn)?;
        if authored + replies + uploads > 0 {
            return Err(AppError::Conflict(
                "User has tickets or responses and cannot be deleted".to_string(),
            ));
        }

        diesel::delete(notifications::table.filter(notifications::user_id.eq(id))).execute(conn)?;
        diesel::delete(users::table.find(id)).execute(conn)?;
        Ok(())
    })
}

pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    if admin.id == id {
        return Err(AppError::validation("You cannot delete your own account"));
    }
    let mut conn = state.db()?;
    delete_user(&mut conn, id)?;
    info!(user_id = id, deleted_by = admin.id, "User deleted");

    Ok(Json(json!({ "success": true, "message": "User deleted" })))
}

pub fn configure_users_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::USERS, get(list_users).post(create_user_handler))
        .route(
            ApiUrls::USER_BY_ID,
            get(get_user).put(update_user).delete(delete_user_handler),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::{insert_user, test_context, TEST_PASSWORD};

    fn registration<'a>(email: &'a str, password: &'a str, confirmation: &'a str) -> Registration<'a> {
        Registration {
            name: "Bruno",
            email,
            password,
            confirmation,
            is_admin: false,
        }
    }

    #[test]
    fn test_create_user_normalizes_email_and_hashes() {
        let ctx = test_context();
        let mut conn = ctx.state.db().expect("conn");
        let user = create_user(
            &mut conn,
            &ctx.state.passwords,
            registration("  Bruno@Example.COM ", "longenough", "longenough"),
        )
        .expect("created");

        assert_eq!(user.email, "bruno@example.com");
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert!(ctx
            .state
            .passwords
            .verify("longenough", &user.password_hash)
            .expect("verify"));
        assert!(find_by_email(&mut conn, "BRUNO@example.com").expect("query").is_some());
    }

    #[test]
    fn test_create_user_rejects_duplicates_and_bad_passwords() {
        let ctx = test_context();
        insert_user(&ctx.state, "Ana", "ana@example.com", false);
        let mut conn = ctx.state.db().expect("conn");

        let dup = create_user(
            &mut conn,
            &ctx.state.passwords,
            registration("ana@example.com", TEST_PASSWORD, TEST_PASSWORD),
        );
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        let mismatch = create_user(
            &mut conn,
            &ctx.state.passwords,
            registration("new@example.com", "longenough", "different1"),
        );
        assert!(matches!(mismatch, Err(AppError::Validation(m)) if m == "Passwords do not match"));

        let short = create_user(
            &mut conn,
            &ctx.state.passwords,
            registration("new@example.com", "short", "short"),
        );
        assert!(matches!(short, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_set_admin_and_admin_emails() {
        let ctx = test_context();
        insert_user(&ctx.state, "Ana", "ana@example.com", false);
        insert_user(&ctx.state, "Root", "root@example.com", true);
        let mut conn = ctx.state.db().expect("conn");

        assert_eq!(admin_emails(&mut conn).expect("query"), vec!["root@example.com"]);
        assert!(set_admin(&mut conn, "ANA@example.com").expect("update"));
        assert!(!set_admin(&mut conn, "nobody@example.com").expect("update"));
        assert_eq!(admin_emails(&mut conn).expect("query").len(), 2);
    }

    #[test]
    fn test_delete_user_refuses_authors() {
        let ctx = test_context();
        let author = insert_user(&ctx.state, "Ana", "ana@example.com", false);
        let idle = insert_user(&ctx.state, "Bia", "bia@example.com", false);
        crate::core::shared::test_utils::insert_ticket(&ctx.state, author.id, "Printer", "jam");
        let mut conn = ctx.state.db().expect("conn");

        assert!(matches!(delete_user(&mut conn, author.id), Err(AppError::Conflict(_))));
        delete_user(&mut conn, idle.id).expect("deleted");
        assert!(find_by_id(&mut conn, idle.id).expect("query").is_none());
        assert!(matches!(delete_user(&mut conn, idle.id), Err(AppError::NotFound(_))));
    }
}
