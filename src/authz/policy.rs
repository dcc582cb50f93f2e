//! Policy descriptors attached to route patterns.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// An access requirement.
///
/// The set of kinds is closed: rules are exact tags or `prefix:value` pairs,
/// never expressions. Tags that fit none of the known shapes parse to
/// [`AccessRule::Unrecognized`], which the evaluator always denies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccessRule {
    /// Anyone.
    Public,
    /// Only signed-out visitors (sign-in and sign-up pages).
    Guest,
    /// Any signed-in user.
    Authenticated,
    /// Signed-in user holding the named role.
    Role(String),
    /// Signed-in user on the named plan.
    Plan(String),
    /// Named predicate from the [`PredicateRegistry`](super::PredicateRegistry).
    Custom(String),
    /// Anything else, kept verbatim for diagnostics.
    Unrecognized(String),
}

impl AccessRule {
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        match tag {
            "public" => AccessRule::Public,
            "guest" => AccessRule::Guest,
            "authenticated" => AccessRule::Authenticated,
            _ => match tag.split_once(':') {
                Some(("role", name)) if !name.is_empty() => AccessRule::Role(name.to_string()),
                Some(("plan", name)) if !name.is_empty() => AccessRule::Plan(name.to_string()),
                Some(("custom", name)) if !name.is_empty() => {
                    AccessRule::Custom(name.to_string())
                }
                _ => AccessRule::Unrecognized(tag.to_string()),
            },
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, AccessRule::Unrecognized(_))
    }
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRule::Public => f.write_str("public"),
            AccessRule::Guest => f.write_str("guest"),
            AccessRule::Authenticated => f.write_str("authenticated"),
            AccessRule::Role(name) => write!(f, "role:{name}"),
            AccessRule::Plan(name) => write!(f, "plan:{name}"),
            AccessRule::Custom(name) => write!(f, "custom:{name}"),
            AccessRule::Unrecognized(tag) => f.write_str(tag),
        }
    }
}

impl FromStr for AccessRule {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for AccessRule {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for AccessRule {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<AccessRule> for String {
    fn from(value: AccessRule) -> Self {
        value.to_string()
    }
}

/// How extra conditions combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    /// At least one condition must pass.
    #[default]
    #[serde(alias = "OR", alias = "or")]
    Any,
    /// Every condition must pass.
    #[serde(alias = "AND", alias = "and")]
    All,
}

/// An additional labeled requirement on a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Label reported when the condition fails. Defaults to the rule tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub rule: AccessRule,
}

impl Condition {
    pub fn new(label: impl Into<String>, rule: impl Into<AccessRule>) -> Self {
        Self {
            label: Some(label.into()),
            rule: rule.into(),
        }
    }

    pub fn label(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.rule.to_string())
    }
}

/// The policy attached to a route pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyDescriptor {
    pub access: AccessRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Fallback page for signed-in users who are denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_on_deny: Option<String>,
    /// Checked after `access` passes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    pub operator: ConditionOperator,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PolicyDescriptor {
    pub fn new(access: impl Into<AccessRule>) -> Self {
        Self {
            access: access.into(),
            title: None,
            redirect_on_deny: None,
            conditions: Vec::new(),
            operator: ConditionOperator::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_redirect_on_deny(mut self, page: impl Into<String>) -> Self {
        self.redirect_on_deny = Some(page.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_operator(mut self, operator: ConditionOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Every rule this descriptor refers to, primary first.
    pub fn rules(&self) -> impl Iterator<Item = &AccessRule> {
        std::iter::once(&self.access).chain(self.conditions.iter().map(|c| &c.rule))
    }
}

impl From<AccessRule> for PolicyDescriptor {
    fn from(access: AccessRule) -> Self {
        Self::new(access)
    }
}
