//! HTTP surface: the sign-in completion endpoint, the storefront assets, and
//! the access layers in front of them.

pub mod auth;

use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    middleware::{access_guard_middleware, proxy_identity_middleware},
};

/// Build the router.
///
/// Layers run outermost first: tracing, identity headers, then the access
/// guard, so the guard always sees the session.
pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();
    let mut app = Router::new().route(
        &config.server.complete_path,
        get(auth::complete_sign_in),
    );

    #[cfg(feature = "server")]
    if let Some(assets) = &config.server.assets {
        app = add_asset_routes(app, assets);
    }

    app.layer(from_fn_with_state(state.clone(), access_guard_middleware))
        .layer(from_fn_with_state(state.clone(), proxy_identity_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the built storefront, falling back to the index file for client-side
/// routes.
#[cfg(feature = "server")]
fn add_asset_routes(
    app: Router<AppState>,
    assets: &crate::config::AssetsConfig,
) -> Router<AppState> {
    use tower_http::services::{ServeDir, ServeFile};

    let path = std::path::Path::new(&assets.path);
    if !path.exists() {
        tracing::warn!(path = %assets.path, "Storefront assets directory does not exist");
        return app;
    }

    tracing::info!(path = %assets.path, index = %assets.index, "Serving storefront assets");
    let serve_dir = ServeDir::new(path).fallback(ServeFile::new(path.join(&assets.index)));
    app.fallback_service(serve_dir)
}
