//! Session extraction from reverse proxy identity headers.
//!
//! An authenticating proxy in front of the storefront signs the visitor in
//! and forwards who they are in request headers. This middleware turns those
//! headers into a [`SessionUser`] request extension for the access guard.
//!
//! **Security:** the headers are trusted as-is. Only enable
//! `server.identity` when every request reaches the storefront through the
//! proxy, which must strip these headers from incoming client requests.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::{AppState, auth::SessionUser, config::IdentityHeadersConfig};

/// Middleware that inserts a [`SessionUser`] when identity headers are present.
///
/// A no-op when `server.identity` is not configured or when a session was
/// already inserted by an earlier layer.
pub async fn proxy_identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(identity) = &state.config.server.identity
        && req.extensions().get::<SessionUser>().is_none()
        && let Some(user) = session_from_headers(req.headers(), identity)
    {
        tracing::debug!(
            user_id = ?user.id,
            roles = ?user.roles,
            plan = ?user.plan,
            "Session from proxy identity headers"
        );
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}

/// Build a session from identity headers. `None` when the identity header is
/// missing or empty.
pub fn session_from_headers(
    headers: &HeaderMap,
    config: &IdentityHeadersConfig,
) -> Option<SessionUser> {
    let id = header_value(headers, &config.identity_header)?;

    let mut user = SessionUser::new().with_id(id);
    if let Some(email) = config
        .email_header
        .as_deref()
        .and_then(|name| header_value(headers, name))
    {
        user = user.with_email(email);
    }
    if let Some(roles) = config
        .roles_header
        .as_deref()
        .and_then(|name| header_value(headers, name))
    {
        user = user.with_roles(
            roles
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty()),
        );
    }
    if let Some(plan) = config
        .plan_header
        .as_deref()
        .and_then(|name| header_value(headers, name))
    {
        user = user.with_plan(plan);
    }
    Some(user)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
