//! Configuration for the storefront access layer.
//!
//! The route table, fallback pages, and server settings are read from a TOML
//! file (or JSON, by extension), with support for environment variable
//! interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [policy]
//! default = "authenticated"
//! lint = "deny"
//!
//! [pages]
//! sign_in = "/login"
//!
//! [server]
//! port = 8080
//! assets = { path = "${STOREFRONT_DIST}" }
//!
//! [[routes]]
//! pattern = "/"
//! access = "public"
//! title = "Home"
//!
//! [[routes]]
//! pattern = "/admin/*"
//! access = "role:admin"
//! ```

mod access;
mod observability;
mod server;

use std::path::Path;

pub use access::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;

use crate::authz::PolicyTable;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorefrontConfig {
    /// Defaults for unmatched paths and load-time linting.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Fallback pages for denials and the sign-in return flow.
    #[serde(default)]
    pub pages: PagesConfig,

    /// Route table, in declaration order.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl StorefrontConfig {
    /// Load configuration from a file. Files ending in `.json` are parsed as
    /// JSON, anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e, path.to_path_buf()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_str(&contents)
        }
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: StorefrontConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: StorefrontConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.pages.validate()?;
        self.server.validate()?;
        for route in &self.routes {
            route.validate()?;
        }
        Ok(())
    }

    /// Build the route table in declaration order.
    pub fn policy_table(&self) -> PolicyTable {
        PolicyTable::from_routes(
            self.routes
                .iter()
                .map(|route| (route.pattern.as_str(), route.descriptor())),
            self.policy.default_descriptor(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR}` references, leaving anything after a `#` comment marker
/// on a line untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid interpolation pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);

            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
