//! Application router.
//!
//! Combines the page and JSON routes of every module and wraps them in the
//! shared middleware stack.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware, Router,
};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::core::rate_limit::rate_limit_middleware;
use crate::core::shared::state::AppState;
use crate::security::{security_headers_middleware, SecurityHeadersConfig};

/// Multipart framing on top of the largest accepted file.
const UPLOAD_OVERHEAD: usize = 64 * 1024;

/// Every route, without middleware or state.
pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::main_module::configure_health_routes())
        .merge(crate::web::auth_handlers::configure_auth_routes())
        .merge(crate::users::configure_users_routes())
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::tickets::ui::configure_tickets_ui_routes())
        .merge(crate::notifications::configure_notifications_routes())
        .merge(crate::attachments::configure_attachments_routes())
        .merge(crate::reports::configure_reports_routes())
        .merge(crate::email::configure_email_routes())
}

pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origin = config.public_url.trim_end_matches('/');
    let allow_origin = match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            warn!("public_url {:?} is not a valid origin, cross-origin requests are refused", origin);
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// The full application: routes, state and middleware.
///
/// Layers run outermost first: tracing, CORS, security headers, rate
/// limiting, cookies, then the body limit on the handler.
pub fn create_router(state: Arc<AppState>) -> Router {
    let headers = if state.config.session.secure_cookie {
        SecurityHeadersConfig::default().with_hsts(31_536_000)
    } else {
        SecurityHeadersConfig::default()
    };

    configure_routes()
        .layer(DefaultBodyLimit::max(state.config.uploads.max_size + UPLOAD_OVERHEAD))
        .layer(CookieManagerLayer::new())
        .layer(middleware::from_fn_with_state(
            state.rate_limits.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::new(headers),
            security_headers_middleware,
        ))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::test_context;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_is_public_and_has_security_headers() {
        let ctx = test_context();
        let app = create_router(ctx.state.clone());

        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-frame-options").map(|v| v.as_bytes()),
            Some(&b"DENY"[..])
        );

        let body = response.into_body().collect().await.expect("body").to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["status"], "ok");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_pages_redirect_anonymous_users_to_login() {
        let ctx = test_context();
        let app = create_router(ctx.state.clone());

        let response = app
            .oneshot(Request::get("/my-tickets").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert!(response.status().is_redirection());
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(location.starts_with("/login"), "unexpected location {location}");
    }

    #[tokio::test]
    async fn test_api_requires_authentication() {
        let ctx = test_context();
        let app = create_router(ctx.state.clone());

        let response = app
            .oneshot(Request::get("/api/tickets/stats").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
