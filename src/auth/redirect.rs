//! Carrying the original destination through sign-in.
//!
//! A denied navigation is sent to a fallback page with the requested path and
//! query encoded in a `redirect` parameter. After sign-in completes, the
//! parameter is read back, checked to be a local path, and navigated to.

use url::form_urlencoded;

use crate::config::PagesConfig;

/// Append `param=<requested>` to a fallback page URL.
///
/// `requested` is form-urlencoded in full, so its own query string survives
/// the round trip.
pub fn with_return_param(page: &str, param: &str, requested: &str) -> String {
    let separator = if page.contains('?') { '&' } else { '?' };
    let encoded: String = form_urlencoded::byte_serialize(requested.as_bytes()).collect();
    format!("{page}{separator}{param}={encoded}")
}

/// Read and decode a query parameter. Accepts a bare query string, one with
/// a leading `?`, or a full path with a query.
pub fn query_param(query: &str, param: &str) -> Option<String> {
    let query = match query.split_once('?') {
        Some((_, query)) => query,
        None => query,
    };
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == param)
        .map(|(_, value)| value.into_owned())
}

/// Only allow local absolute paths to prevent open redirect vulnerabilities.
pub fn is_safe_return_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}

/// Where to navigate once sign-in succeeds.
///
/// - A safe `redirect` parameter wins.
/// - An unsafe one falls back to the landing page.
/// - Without one, sign-in pages move on to the landing page and any other
///   page stays put (`None`).
pub fn return_destination(
    query: Option<&str>,
    current_path: &str,
    pages: &PagesConfig,
) -> Option<String> {
    if let Some(target) = query.and_then(|q| query_param(q, &pages.redirect_param)) {
        if is_safe_return_path(&target) {
            return Some(target);
        }
        tracing::warn!(target = %target, "Ignoring non-local sign-in return target");
        return Some(pages.landing.clone());
    }

    let on_auth_page = pages
        .auth_pages
        .iter()
        .any(|page| current_path == page || current_path.starts_with(&format!("{page}/")));
    on_auth_page.then(|| pages.landing.clone())
}
