//! Route access control for the storefront.
//!
//! Maps navigation paths to access policies through a table of path patterns,
//! then decides per navigation whether the current session may proceed or
//! must be redirected (to sign in, to a permission or upgrade page, or home),
//! carrying the requested path through sign-in and back.
//!
//! The core ([`authz`]) is pure and synchronous. The [`middleware`] and
//! [`routes`] modules put it in front of the storefront as axum layers.

use std::sync::Arc;

pub mod auth;
pub mod authz;
pub mod config;
pub mod middleware;
#[cfg(feature = "cli")]
pub mod observability;
pub mod routes;
#[cfg(test)]
mod tests;

use authz::{AccessControl, PredicateRegistry};
use config::{ConfigError, StorefrontConfig};
pub use routes::build_app;

/// Shared state for request handlers and middleware.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<StorefrontConfig>,
    pub access: AccessControl,
}

impl AppState {
    /// Build state from configuration. Fails when `policy.lint = "deny"` and
    /// the route table has lint errors.
    pub fn new(
        config: StorefrontConfig,
        predicates: PredicateRegistry,
    ) -> Result<Self, ConfigError> {
        let access = AccessControl::from_config(&config, predicates)?;
        Ok(Self {
            config: Arc::new(config),
            access,
        })
    }
}
