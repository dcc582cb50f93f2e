//! Access evaluation: a policy and the current session in, allow or redirect out.
//!
//! Evaluation is pure and synchronous. Custom requirements are Rust closures
//! registered by name up front; a policy can only refer to them, never supply
//! code of its own.

use std::{collections::HashMap, fmt, sync::Arc};

use serde::Serialize;

use super::{AccessRule, ConditionOperator, PolicyDescriptor, pattern::normalize_path};
use crate::{
    auth::{SessionUser, with_return_param},
    config::PagesConfig,
};

/// A named custom requirement.
pub type Predicate = Arc<dyn Fn(&SessionUser) -> bool + Send + Sync>;

#[derive(Clone)]
struct RegisteredPredicate {
    check: Predicate,
    fallback: Option<String>,
}

/// Custom predicates available to `custom:<name>` rules.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, RegisteredPredicate>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate. Denials fall back to the sign-in page unless the
    /// route sets `redirect_on_deny`.
    pub fn register<F>(self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&SessionUser) -> bool + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(check), None)
    }

    /// Register a predicate with its own fallback page.
    pub fn register_with_fallback<F>(
        self,
        name: impl Into<String>,
        fallback: impl Into<String>,
        check: F,
    ) -> Self
    where
        F: Fn(&SessionUser) -> bool + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(check), Some(fallback.into()))
    }

    fn insert(mut self, name: String, check: Predicate, fallback: Option<String>) -> Self {
        if self.predicates.contains_key(&name) {
            tracing::warn!(predicate = %name, "Replacing previously registered predicate");
        }
        self.predicates
            .insert(name, RegisteredPredicate { check, fallback });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.predicates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    fn get(&self, name: &str) -> Option<&RegisteredPredicate> {
        self.predicates.get(name)
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("predicates", &self.names())
            .finish()
    }
}

/// Result of an access evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    /// Whether navigation may proceed
    pub allowed: bool,
    /// Where to send the browser instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    /// Labels of the requirements that failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl AccessDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            redirect_target: None,
            failed: Vec::new(),
        }
    }

    pub fn deny(redirect_target: impl Into<String>, failed: Vec<String>) -> Self {
        Self {
            allowed: false,
            redirect_target: Some(redirect_target.into()),
            failed,
        }
    }
}

/// Why a single rule failed, which picks the fallback page.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Denial {
    /// No session.
    SignIn,
    /// Signed in on a guest-only page.
    Landing,
    /// Missing role.
    Forbidden,
    /// Wrong plan.
    Upgrade,
    /// Custom predicate returned false.
    Custom(Option<String>),
    /// Unrecognized rule or unknown predicate.
    FailSafe,
}

/// Evaluates policy descriptors against the current session.
#[derive(Debug, Clone, Default)]
pub struct AccessEvaluator {
    pages: PagesConfig,
    predicates: PredicateRegistry,
}

impl AccessEvaluator {
    pub fn new(pages: PagesConfig, predicates: PredicateRegistry) -> Self {
        Self { pages, predicates }
    }

    pub fn pages(&self) -> &PagesConfig {
        &self.pages
    }

    pub fn predicates(&self) -> &PredicateRegistry {
        &self.predicates
    }

    /// Decide whether `user` may navigate to `requested` under `policy`.
    ///
    /// `requested` is the path with its query; it is carried in the redirect
    /// parameter of every denial except the guest-only one.
    pub fn evaluate(
        &self,
        policy: &PolicyDescriptor,
        user: Option<&SessionUser>,
        requested: &str,
    ) -> AccessDecision {
        if let Err(denial) = self.check_rule(&policy.access, user) {
            tracing::debug!(
                access = %policy.access,
                signed_in = user.is_some(),
                denial = ?denial,
                "Access rule denied"
            );
            let target = self.redirect_target(&denial, policy, requested);
            return AccessDecision::deny(target, vec![policy.access.to_string()]);
        }

        if policy.conditions.is_empty() {
            return AccessDecision::allow();
        }

        let mut failures: Vec<(String, Denial)> = Vec::new();
        for condition in &policy.conditions {
            match self.check_rule(&condition.rule, user) {
                Ok(()) if policy.operator == ConditionOperator::Any => {
                    return AccessDecision::allow();
                }
                Ok(()) => {}
                Err(denial) => failures.push((condition.label(), denial)),
            }
        }

        let Some((_, first)) = failures.first() else {
            return AccessDecision::allow();
        };
        let target = self.redirect_target(first, policy, requested);
        let failed: Vec<String> = failures.into_iter().map(|(label, _)| label).collect();
        tracing::debug!(
            operator = ?policy.operator,
            failed = ?failed,
            "Access conditions not met"
        );
        AccessDecision::deny(target, failed)
    }

    fn check_rule(&self, rule: &AccessRule, user: Option<&SessionUser>) -> Result<(), Denial> {
        match rule {
            AccessRule::Public => Ok(()),
            AccessRule::Guest => match user {
                None => Ok(()),
                Some(_) => Err(Denial::Landing),
            },
            AccessRule::Authenticated => user.map(|_| ()).ok_or(Denial::SignIn),
            AccessRule::Role(role) => match user {
                None => Err(Denial::SignIn),
                Some(user) if user.has_role(role) => Ok(()),
                Some(_) => Err(Denial::Forbidden),
            },
            AccessRule::Plan(plan) => match user {
                None => Err(Denial::SignIn),
                Some(user) if user.has_plan(plan) => Ok(()),
                Some(_) => Err(Denial::Upgrade),
            },
            AccessRule::Custom(name) => {
                let Some(user) = user else {
                    return Err(Denial::SignIn);
                };
                let Some(predicate) = self.predicates.get(name) else {
                    tracing::warn!(predicate = %name, "Unknown custom predicate, denying access");
                    return Err(Denial::FailSafe);
                };
                if (predicate.check)(user) {
                    Ok(())
                } else {
                    Err(Denial::Custom(predicate.fallback.clone()))
                }
            }
            AccessRule::Unrecognized(tag) => {
                tracing::warn!(access = %tag, "Unrecognized access rule, denying access");
                Err(Denial::FailSafe)
            }
        }
    }

    fn redirect_target(
        &self,
        denial: &Denial,
        policy: &PolicyDescriptor,
        requested: &str,
    ) -> String {
        let pages = &self.pages;
        let page = match denial {
            Denial::Landing => return pages.landing.clone(),
            Denial::SignIn | Denial::FailSafe => pages.sign_in.as_str(),
            Denial::Forbidden => policy.redirect_on_deny.as_deref().unwrap_or(&pages.forbidden),
            Denial::Upgrade => policy.redirect_on_deny.as_deref().unwrap_or(&pages.upgrade),
            Denial::Custom(fallback) => policy
                .redirect_on_deny
                .as_deref()
                .or(fallback.as_deref())
                .unwrap_or(&pages.sign_in),
        };
        with_return_param(page, &pages.redirect_param, &normalize_path(requested))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        auth::query_param,
        authz::{Condition, ConditionOperator},
    };

    fn evaluator() -> AccessEvaluator {
        let predicates = PredicateRegistry::new()
            .register("is_staff_email", |user: &SessionUser| {
                user.email
                    .as_deref()
                    .is_some_and(|email| email.ends_with("@store.example"))
            })
            .register_with_fallback("has_orders", "/shop", |user: &SessionUser| {
                user.has_role("buyer")
            });
        AccessEvaluator::new(PagesConfig::default(), predicates)
    }

    fn customer() -> SessionUser {
        SessionUser::new()
            .with_id("u-1")
            .with_email("pat@mail.example")
            .with_role("customer")
            .with_plan("basic")
    }

    #[rstest]
    #[case("public", None, true)]
    #[case("public", Some(customer()), true)]
    #[case("guest", None, true)]
    #[case("guest", Some(customer()), false)]
    #[case("authenticated", None, false)]
    #[case("authenticated", Some(customer()), true)]
    #[case("role:customer", Some(customer()), true)]
    #[case("role:admin", Some(customer()), false)]
    #[case("plan:basic", Some(customer()), true)]
    #[case("plan:premium", Some(customer()), false)]
    #[case("bogus", None, false)]
    #[case("bogus", Some(customer()), false)]
    fn test_allowed_by_kind(
        #[case] access: &str,
        #[case] user: Option<SessionUser>,
        #[case] allowed: bool,
    ) {
        let decision = evaluator().evaluate(&PolicyDescriptor::new(access), user.as_ref(), "/x");
        assert_eq!(decision.allowed, allowed);
        assert_eq!(decision.redirect_target.is_none(), allowed);
    }

    #[test]
    fn test_unrecognized_kind_fails_safe_to_sign_in() {
        let evaluator = evaluator();
        let policy = PolicyDescriptor::new("bogus");
        for user in [None, Some(customer())] {
            let decision = evaluator.evaluate(&policy, user.as_ref(), "/orders");
            assert!(!decision.allowed);
            assert_eq!(
                decision.redirect_target.as_deref(),
                Some("/login?redirect=%2Forders")
            );
            assert_eq!(decision.failed, vec!["bogus"]);
        }
    }

    #[test]
    fn test_redirect_preserves_requested_query() {
        let decision = evaluator().evaluate(
            &PolicyDescriptor::new("authenticated"),
            None,
            "/checkout/shipping?step=2",
        );
        let target = decision.redirect_target.unwrap();
        assert!(target.starts_with("/login?"));
        assert_eq!(
            query_param(&target, "redirect").as_deref(),
            Some("/checkout/shipping?step=2")
        );
    }

    #[test]
    fn test_requested_path_is_normalized() {
        let decision = evaluator().evaluate(&PolicyDescriptor::new("authenticated"), None, "orders");
        assert_eq!(
            decision.redirect_target.as_deref(),
            Some("/login?redirect=%2Forders")
        );
    }

    #[test]
    fn test_role_distinguishes_signed_out_from_wrong_role() {
        let evaluator = evaluator();
        let policy = PolicyDescriptor::new("role:admin");

        let signed_out = evaluator.evaluate(&policy, None, "/admin/users");
        assert_eq!(
            signed_out.redirect_target.as_deref(),
            Some("/login?redirect=%2Fadmin%2Fusers")
        );

        let wrong_role = evaluator.evaluate(&policy, Some(&customer()), "/admin/users");
        assert_eq!(
            wrong_role.redirect_target.as_deref(),
            Some("/error?message=insufficient_permissions&redirect=%2Fadmin%2Fusers")
        );
        assert_eq!(wrong_role.failed, vec!["role:admin"]);
    }

    #[test]
    fn test_wrong_plan_goes_to_upgrade() {
        let decision = evaluator().evaluate(
            &PolicyDescriptor::new("plan:premium"),
            Some(&customer()),
            "/deals",
        );
        assert_eq!(
            decision.redirect_target.as_deref(),
            Some("/upgrade?redirect=%2Fdeals")
        );
    }

    #[test]
    fn test_guest_page_sends_signed_in_user_home() {
        let decision = evaluator().evaluate(&PolicyDescriptor::new("guest"), Some(&customer()), "/login");
        assert_eq!(decision.redirect_target.as_deref(), Some("/"));
    }

    #[test]
    fn test_redirect_on_deny_overrides_signed_in_fallback_only() {
        let evaluator = evaluator();
        let policy = PolicyDescriptor::new("role:admin").with_redirect_on_deny("/account");

        let wrong_role = evaluator.evaluate(&policy, Some(&customer()), "/admin");
        assert_eq!(
            wrong_role.redirect_target.as_deref(),
            Some("/account?redirect=%2Fadmin")
        );

        let signed_out = evaluator.evaluate(&policy, None, "/admin");
        assert_eq!(
            signed_out.redirect_target.as_deref(),
            Some("/login?redirect=%2Fadmin")
        );
    }

    #[test]
    fn test_custom_predicates() {
        let evaluator = evaluator();
        let staff = customer().with_email("sam@store.example");

        let policy = PolicyDescriptor::new("custom:is_staff_email");
        assert!(evaluator.evaluate(&policy, Some(&staff), "/staff").allowed);

        let denied = evaluator.evaluate(&policy, Some(&customer()), "/staff");
        assert_eq!(
            denied.redirect_target.as_deref(),
            Some("/login?redirect=%2Fstaff")
        );

        let with_fallback = evaluator.evaluate(
            &PolicyDescriptor::new("custom:has_orders"),
            Some(&customer()),
            "/orders/history",
        );
        assert_eq!(
            with_fallback.redirect_target.as_deref(),
            Some("/shop?redirect=%2Forders%2Fhistory")
        );
    }

    #[test]
    fn test_custom_predicate_not_called_without_user() {
        let predicates = PredicateRegistry::new().register("never", |_: &SessionUser| {
            panic!("predicate must not run for signed-out visitors")
        });
        let evaluator = AccessEvaluator::new(PagesConfig::default(), predicates);
        let decision = evaluator.evaluate(&PolicyDescriptor::new("custom:never"), None, "/x");
        assert!(!decision.allowed);
    }

    #[test]
    fn test_unknown_predicate_denies() {
        let decision = evaluator().evaluate(
            &PolicyDescriptor::new("custom:not_registered").with_redirect_on_deny("/account"),
            Some(&customer()),
            "/x",
        );
        assert!(!decision.allowed);
        assert_eq!(decision.redirect_target.as_deref(), Some("/login?redirect=%2Fx"));
    }

    #[test]
    fn test_conditions_any() {
        let evaluator = evaluator();
        let policy = PolicyDescriptor::new("authenticated")
            .with_condition(Condition::new("Staff", "role:staff"))
            .with_condition(Condition::new("Premium", "plan:premium"));

        let denied = evaluator.evaluate(&policy, Some(&customer()), "/reports");
        assert!(!denied.allowed);
        assert_eq!(denied.failed, vec!["Staff", "Premium"]);
        assert_eq!(
            denied.redirect_target.as_deref(),
            Some("/error?message=insufficient_permissions&redirect=%2Freports")
        );

        let premium = customer().with_plan("premium");
        assert!(evaluator.evaluate(&policy, Some(&premium), "/reports").allowed);
    }

    #[test]
    fn test_conditions_all() {
        let evaluator = evaluator();
        let policy = PolicyDescriptor::new("authenticated")
            .with_operator(ConditionOperator::All)
            .with_condition(Condition::new("Customer", "role:customer"))
            .with_condition(Condition::new("Premium", "plan:premium"));

        let denied = evaluator.evaluate(&policy, Some(&customer()), "/vip");
        assert_eq!(denied.failed, vec!["Premium"]);
        assert_eq!(
            denied.redirect_target.as_deref(),
            Some("/upgrade?redirect=%2Fvip")
        );

        let premium = customer().with_plan("premium");
        assert_eq!(
            evaluator.evaluate(&policy, Some(&premium), "/vip"),
            AccessDecision::allow()
        );
    }

    #[test]
    fn test_access_checked_before_conditions() {
        let policy = PolicyDescriptor::new("authenticated")
            .with_condition(Condition::new("Premium", "plan:premium"));
        let decision = evaluator().evaluate(&policy, None, "/vip");
        assert_eq!(decision.failed, vec!["authenticated"]);
        assert_eq!(decision.redirect_target.as_deref(), Some("/login?redirect=%2Fvip"));
    }

    #[test]
    fn test_registry_names() {
        let registry = evaluator().predicates().clone();
        assert_eq!(registry.names(), vec!["has_orders", "is_staff_email"]);
        assert!(registry.contains("has_orders"));
        assert!(!registry.contains("missing"));
        assert_eq!(
            format!("{registry:?}"),
            "PredicateRegistry { predicates: [\"has_orders\", \"is_staff_email\"] }"
        );
    }
}
