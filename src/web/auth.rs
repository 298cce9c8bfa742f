//! Cookie/JWT session management and the authentication extractors

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::core::error::AppError;
use crate::core::shared::models::User;
use crate::core::shared::state::AppState;
use crate::core::urls::{ApiUrls, PageUrls};
use crate::users;

pub const AUTH_COOKIE: &str = "auth_token";

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| {
            if auth.to_lowercase().starts_with("bearer ") {
                Some(auth[7..].trim().to_string())
            } else {
                None
            }
        })
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: String,
    pub session_lifetime: Duration,
    pub secure_cookie: bool,
}

impl AuthConfig {
    pub fn from_config(session: &SessionConfig) -> Self {
        let jwt_secret = if session.secret.is_empty() {
            warn!("No session secret configured; sessions will not survive a restart");
            crate::security::generate_token(48)
        } else {
            session.secret.clone()
        };

        Self {
            jwt_secret,
            session_lifetime: Duration::minutes(session.lifetime_minutes.max(1)),
            secure_cookie: session.secure_cookie,
        }
    }

    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.jwt_secret.as_bytes())
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let mut roles = vec!["user".to_string()];
        if user.is_admin {
            roles.push("admin".to_string());
        }
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            roles,
            exp: (now + self.session_lifetime).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key())
            .map_err(|e| AppError::Internal(format!("Failed to sign session: {e}")))
    }

    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding_key(), &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| debug!("Rejected session token: {e}"))
            .ok()
    }

    /// Helper to create secure auth cookie
    pub fn session_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((AUTH_COOKIE, token.to_string()))
            .path("/")
            .secure(self.secure_cookie)
            .http_only(true)
            .same_site(tower_cookies::cookie::SameSite::Lax)
            .max_age(time::Duration::seconds(self.session_lifetime.num_seconds()))
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((AUTH_COOKIE, "")).path("/").build()
    }

    /// Sets a fresh session cookie for `user`.
    pub fn start_session(&self, cookies: &Cookies, user: &User) -> Result<String, AppError> {
        let token = self.issue_token(user)?;
        cookies.add(self.session_cookie(&token));
        Ok(token)
    }
}

/// Why a request could not be authenticated or authorized.
#[derive(Debug)]
pub enum AuthRejection {
    Unauthenticated { api: bool, next: String },
    Forbidden { api: bool },
    Failed(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated { api: true, .. } => AppError::Unauthorized.into_response(),
            Self::Unauthenticated { api: false, next } => {
                Redirect::to(&ApiUrls::with_query(PageUrls::LOGIN, &[("next", &next)])).into_response()
            }
            Self::Forbidden { api: true } => AppError::forbidden().into_response(),
            Self::Forbidden { api: false } => super::error_page(
                StatusCode::FORBIDDEN,
                "Access denied",
                "You do not have permission to access this page.",
            ),
            Self::Failed(err) => err.into_response(),
        }
    }
}

fn is_api_request(parts: &Parts) -> bool {
    parts.uri.path().starts_with("/api/")
}

/// Authenticated user extractor. Reads the session from the bearer token or
/// the session cookie and loads the current user row.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api = is_api_request(parts);
        let next = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let unauthenticated = || AuthRejection::Unauthenticated {
            api,
            next: next.clone(),
        };

        let cookies = Cookies::from_request_parts(parts, state).await.ok();
        let (token, from_cookie) = match extract_bearer_token(&parts.headers) {
            Some(token) => (token, false),
            None => match cookies.as_ref().and_then(|c| c.get(AUTH_COOKIE)) {
                Some(cookie) => (cookie.value().to_string(), true),
                None => return Err(unauthenticated()),
            },
        };

        let claims = state
            .auth
            .decode_token(&token)
            .ok_or_else(unauthenticated)?;
        let user_id: i32 = claims.sub.parse().map_err(|_| unauthenticated())?;

        let mut conn = state.db().map_err(AuthRejection::Failed)?;
        let user = users::find_by_id(&mut conn, user_id)
            .map_err(|e| AuthRejection::Failed(e.into()))?
            .ok_or_else(unauthenticated)?;

        // Sliding session: reissue once half the lifetime has passed.
        if from_cookie {
            let remaining = claims.exp - Utc::now().timestamp();
            if remaining < state.auth.session_lifetime.num_seconds() / 2 {
                if let Some(cookies) = cookies.as_ref() {
                    if let Err(e) = state.auth.start_session(cookies, &user) {
                        warn!("Failed to refresh session: {e}");
                    }
                }
            }
        }

        Ok(AuthenticatedUser { user })
    }
}

/// Optional authenticated user (doesn't fail if not authenticated)
pub struct OptionalUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(auth) => Ok(OptionalUser(Some(auth.user))),
            Err(AuthRejection::Failed(e)) => Err(AuthRejection::Failed(e)),
            Err(_) => Ok(OptionalUser(None)),
        }
    }
}

/// Authenticated administrator.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser { user } = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.is_admin {
            Ok(AdminUser(user))
        } else {
            Err(AuthRejection::Forbidden {
                api: is_api_request(parts),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::from_config(&SessionConfig {
            secret: "unit-test-secret".to_string(),
            lifetime_minutes: 30,
            secure_cookie: true,
        })
    }

    fn user(is_admin: bool) -> User {
        User {
            id: 7,
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: String::new(),
            is_admin,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_token_round_trip() {
        let auth = config();
        let token = auth.issue_token(&user(true)).expect("token");
        let claims = auth.decode_token(&token).expect("claims");
        assert_eq!(claims.sub, "7");
        assert!(claims.roles.contains(&"admin".to_string()));
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = config().issue_token(&user(false)).expect("token");
        let other = AuthConfig::from_config(&SessionConfig {
            secret: "different".to_string(),
            lifetime_minutes: 30,
            secure_cookie: false,
        });
        assert!(other.decode_token(&token).is_none());
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = config().session_cookie("abc");
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::minutes(30)));
    }

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().expect("header"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def".to_string()));
        headers.insert(header::AUTHORIZATION, "Basic xyz".parse().expect("header"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
