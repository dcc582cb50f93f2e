use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the sign-in completion endpoint. The identity provider's
    /// success callback sends the browser here with the `redirect` parameter.
    #[serde(default = "default_complete_path")]
    pub complete_path: String,

    /// Path prefixes that skip the access guard (static assets and the like).
    #[serde(default = "default_bypass")]
    pub bypass: Vec<String>,

    /// Built storefront assets to serve behind the guard.
    /// If omitted, only the guard and the sign-in completion endpoint run.
    #[serde(default)]
    pub assets: Option<AssetsConfig>,

    /// Identity headers set by a trusted authenticating proxy.
    /// If omitted, every request is treated as signed out unless another
    /// layer inserts a session.
    #[serde(default)]
    pub identity: Option<IdentityHeadersConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            complete_path: default_complete_path(),
            bypass: default_bypass(),
            assets: None,
            identity: None,
        }
    }
}

impl ServerConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if !self.complete_path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "server.complete_path must start with '/', got '{}'",
                self.complete_path
            )));
        }
        if let Some(identity) = &self.identity {
            identity.validate()?;
        }
        Ok(())
    }

    /// Whether a request path skips the access guard.
    pub fn is_bypassed(&self, path: &str) -> bool {
        path == self.complete_path || self.bypass.iter().any(|prefix| path.starts_with(prefix))
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

fn default_complete_path() -> String {
    "/auth/complete".to_string()
}

fn default_bypass() -> Vec<String> {
    vec!["/assets/".to_string(), "/favicon.ico".to_string()]
}

/// Static asset serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetsConfig {
    /// Directory containing the built storefront.
    pub path: String,

    /// File served for client-side routes that have no file of their own.
    #[serde(default = "default_index_file")]
    pub index: String,
}

fn default_index_file() -> String {
    "index.html".to_string()
}

/// Headers carrying the session from an authenticating reverse proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityHeadersConfig {
    /// Header containing the authenticated user's identity.
    /// A request without it is signed out.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Header containing the user's email.
    #[serde(default)]
    pub email_header: Option<String>,

    /// Header containing roles (comma-separated).
    #[serde(default = "default_roles_header")]
    pub roles_header: Option<String>,

    /// Header containing the subscription plan.
    #[serde(default = "default_plan_header")]
    pub plan_header: Option<String>,
}

impl Default for IdentityHeadersConfig {
    fn default() -> Self {
        Self {
            identity_header: default_identity_header(),
            email_header: None,
            roles_header: default_roles_header(),
            plan_header: default_plan_header(),
        }
    }
}

impl IdentityHeadersConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_header.is_empty() {
            return Err(ConfigError::Validation(
                "server.identity.identity_header cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_identity_header() -> String {
    "x-forwarded-user".to_string()
}

fn default_roles_header() -> Option<String> {
    Some("x-forwarded-groups".to_string())
}

fn default_plan_header() -> Option<String> {
    Some("x-forwarded-plan".to_string())
}
