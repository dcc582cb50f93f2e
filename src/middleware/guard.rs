//! Navigation guard middleware.
//!
//! Runs every navigation through [`AccessControl::check`](crate::authz::AccessControl::check)
//! before it reaches the storefront. Denied navigations are answered with a
//! `303 See Other` to the decision's redirect target.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use http::StatusCode;
use percent_encoding::percent_decode_str;

use crate::{AppState, auth::SessionUser};

/// The path as the asset server sees it: percent-decoded, with empty and `.`
/// segments dropped.
///
/// Returns `None` for paths that do not decode to UTF-8, contain `..`, or
/// decode a `?` or `#` into a segment.
pub fn canonical_request_path(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let mut canonical = String::with_capacity(decoded.len());
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains(['?', '#']) => return None,
            s => {
                canonical.push('/');
                canonical.push_str(s);
            }
        }
    }
    if canonical.is_empty() {
        canonical.push('/');
    }
    Some(canonical)
}

/// Middleware that allows or redirects each navigation.
///
/// The policy is resolved against [`canonical_request_path`]; paths that have
/// none are answered with `400`. Paths matching `server.bypass` (and the
/// sign-in completion endpoint) pass through unchecked. The session is read
/// from the [`SessionUser`] request extension; a missing extension means
/// signed out.
pub async fn access_guard_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(route) = canonical_request_path(req.uri().path()) else {
        tracing::info!(path = %req.uri().path(), "Rejected undecodable navigation path");
        return StatusCode::BAD_REQUEST.into_response();
    };

    if state.config.server.is_bypassed(&route) {
        return next.run(req).await;
    }

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let check = state.access.check_route(
        &route,
        &path_and_query,
        req.extensions().get::<SessionUser>(),
    );

    if check.decision.allowed {
        tracing::debug!(
            path = %path_and_query,
            pattern = ?check.resolution.pattern,
            "Navigation allowed"
        );
        return next.run(req).await;
    }

    match check.decision.redirect_target {
        Some(target) => {
            tracing::info!(
                path = %path_and_query,
                pattern = ?check.resolution.pattern,
                failed = ?check.decision.failed,
                redirect = %target,
                "Navigation denied"
            );
            Redirect::to(&target).into_response()
        }
        None => {
            tracing::warn!(path = %path_and_query, "Navigation denied without redirect target");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}
