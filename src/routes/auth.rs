//! Sign-in completion.
//!
//! The identity provider's success callback sends the browser to
//! `server.complete_path` with the `redirect` parameter the guard attached
//! when it denied the original navigation. This handler sends the browser on
//! to that destination.

use axum::{
    extract::{RawQuery, State},
    http::Uri,
    response::Redirect,
};

use crate::{AppState, auth::return_destination};

/// `GET /auth/complete?redirect=...`
///
/// Answers with a `303` to the decoded return path, or to the landing page
/// when it is missing or not a local path.
pub async fn complete_sign_in(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    uri: Uri,
) -> Redirect {
    let pages = &state.config.pages;
    let destination = return_destination(query.as_deref(), uri.path(), pages)
        .unwrap_or_else(|| pages.landing.clone());

    tracing::debug!(destination = %destination, "Sign-in complete");
    Redirect::to(&destination)
}
