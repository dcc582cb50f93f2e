//! The signed-in user as seen by access checks.
//!
//! Sessions are owned by the authentication collaborator. Access checks only
//! read them: presence means signed in, and the optional fields carry role
//! memberships and the subscription plan.

use serde::{Deserialize, Serialize};

/// A signed-in user. `None` in place of a session means signed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// User ID from the identity provider.
    #[serde(default)]
    pub id: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Role memberships.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Subscription plan identifier.
    #[serde(default)]
    pub plan: Option<String>,
}

impl SessionUser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    /// Check if the user holds a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user is on a specific plan.
    pub fn has_plan(&self, plan: &str) -> bool {
        self.plan.as_deref() == Some(plan)
    }
}
