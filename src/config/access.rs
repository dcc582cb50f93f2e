use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::authz::{AccessRule, Condition, ConditionOperator, PolicyDescriptor};

/// Defaults applied to paths no route matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Access rule for unmatched paths.
    #[serde(default = "default_access")]
    pub default: AccessRule,

    /// Title for unmatched paths.
    #[serde(default = "default_title")]
    pub default_title: Option<String>,

    /// What to do with route table lint findings at load time.
    #[serde(default)]
    pub lint: LintMode,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default: default_access(),
            default_title: default_title(),
            lint: LintMode::default(),
        }
    }
}

impl PolicyConfig {
    /// The descriptor returned for unmatched paths.
    pub fn default_descriptor(&self) -> PolicyDescriptor {
        let descriptor = PolicyDescriptor::new(self.default.clone());
        match &self.default_title {
            Some(title) => descriptor.with_title(title.clone()),
            None => descriptor,
        }
    }
}

fn default_access() -> AccessRule {
    AccessRule::Authenticated
}

fn default_title() -> Option<String> {
    Some("Protected Page".to_string())
}

/// Lint handling when the route table is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LintMode {
    /// Skip linting.
    Off,
    /// Log findings and continue.
    #[default]
    Warn,
    /// Refuse to start when any finding is an error.
    Deny,
}

/// Fallback pages used by the evaluator and the sign-in return flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PagesConfig {
    /// Where anonymous visitors are sent.
    #[serde(default = "default_sign_in")]
    pub sign_in: String,

    /// Where signed-in users without the required role are sent.
    #[serde(default = "default_forbidden")]
    pub forbidden: String,

    /// Where signed-in users on the wrong plan are sent.
    #[serde(default = "default_upgrade")]
    pub upgrade: String,

    /// Home page. Signed-in users hitting guest-only pages land here.
    #[serde(default = "default_landing")]
    pub landing: String,

    /// Query parameter carrying the originally requested path.
    #[serde(default = "default_redirect_param")]
    pub redirect_param: String,

    /// Sign-in pages. Completing sign-in on one of these without a return
    /// target moves on to `landing`.
    #[serde(default = "default_auth_pages")]
    pub auth_pages: Vec<String>,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            sign_in: default_sign_in(),
            forbidden: default_forbidden(),
            upgrade: default_upgrade(),
            landing: default_landing(),
            redirect_param: default_redirect_param(),
            auth_pages: default_auth_pages(),
        }
    }
}

impl PagesConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        for (name, page) in [
            ("sign_in", &self.sign_in),
            ("forbidden", &self.forbidden),
            ("upgrade", &self.upgrade),
            ("landing", &self.landing),
        ] {
            if !page.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "pages.{name} must be a local path starting with '/', got '{page}'"
                )));
            }
        }
        if let Some(page) = self.auth_pages.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Validation(format!(
                "pages.auth_pages entries must start with '/', got '{page}'"
            )));
        }
        if self.redirect_param.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pages.redirect_param cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_sign_in() -> String {
    "/login".to_string()
}

fn default_forbidden() -> String {
    "/error?message=insufficient_permissions".to_string()
}

fn default_upgrade() -> String {
    "/upgrade".to_string()
}

fn default_landing() -> String {
    "/".to_string()
}

fn default_redirect_param() -> String {
    "redirect".to_string()
}

fn default_auth_pages() -> Vec<String> {
    vec!["/login".into(), "/signup".into(), "/callback".into()]
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub pattern: String,
    pub access: AccessRule,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub redirect_on_deny: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RouteConfig {
    pub fn descriptor(&self) -> PolicyDescriptor {
        PolicyDescriptor {
            access: self.access.clone(),
            title: self.title.clone(),
            redirect_on_deny: self.redirect_on_deny.clone(),
            conditions: self.conditions.clone(),
            operator: self.operator,
            metadata: self.metadata.clone(),
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.pattern.trim().is_empty() {
            return Err(ConfigError::Validation(
                "routes entries need a non-empty pattern".into(),
            ));
        }
        if let Some(page) = &self.redirect_on_deny
            && !page.starts_with('/')
        {
            return Err(ConfigError::Validation(format!(
                "route '{}': redirect_on_deny must start with '/', got '{page}'",
                self.pattern
            )));
        }
        Ok(())
    }
}
