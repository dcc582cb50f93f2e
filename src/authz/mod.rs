//! Route access control.
//!
//! Every storefront navigation goes through two pure steps:
//! 1. Resolve the path against the [`PolicyTable`] to get a [`PolicyDescriptor`]
//!    (exact patterns first, then the most specific matching pattern, then the
//!    table default)
//! 2. Evaluate the descriptor against the current [`SessionUser`] to get an
//!    [`AccessDecision`]: allow, or redirect to a fallback page carrying the
//!    requested path
//!
//! [`AccessControl`] bundles both for request handlers.
//!
//! [`SessionUser`]: crate::auth::SessionUser

mod engine;
pub mod lint;
mod pattern;
mod policy;
mod predicates;
mod table;

use std::sync::Arc;

pub use engine::{AccessDecision, AccessEvaluator, Predicate, PredicateRegistry};
pub use lint::{LintFinding, LintIssue, Severity, lint};
pub use pattern::{PathPattern, PatternDefect, PatternKind, Specificity, normalize_path};
pub use policy::{AccessRule, Condition, ConditionOperator, PolicyDescriptor};
pub use predicates::{CEO_ROLE, storefront_predicates};
pub use table::{Candidate, PolicyTable, Resolution, RouteEntry};

use crate::{
    auth::SessionUser,
    config::{ConfigError, LintMode, StorefrontConfig},
};

/// A resolved policy and the decision it produced.
#[derive(Debug, Clone)]
pub struct AccessCheck<'a> {
    pub resolution: Resolution<'a>,
    pub decision: AccessDecision,
}

/// The route table and evaluator, shared read-only across requests.
#[derive(Debug, Clone)]
pub struct AccessControl {
    table: Arc<PolicyTable>,
    evaluator: Arc<AccessEvaluator>,
}

impl AccessControl {
    pub fn new(table: PolicyTable, evaluator: AccessEvaluator) -> Self {
        Self {
            table: Arc::new(table),
            evaluator: Arc::new(evaluator),
        }
    }

    /// Build from configuration, linting the table per `policy.lint`.
    pub fn from_config(
        config: &StorefrontConfig,
        predicates: PredicateRegistry,
    ) -> Result<Self, ConfigError> {
        let table = config.policy_table();

        if config.policy.lint != LintMode::Off {
            let findings = lint(&table, &predicates);
            for finding in &findings {
                tracing::warn!(
                    pattern = %finding.pattern,
                    severity = %finding.severity,
                    "Route table: {}",
                    finding.issue
                );
            }

            let errors = findings.iter().filter(|f| f.is_error()).count();
            if config.policy.lint == LintMode::Deny && errors > 0 {
                let first = findings
                    .iter()
                    .find(|f| f.is_error())
                    .map(ToString::to_string)
                    .unwrap_or_default();
                return Err(ConfigError::Validation(format!(
                    "route table has {errors} lint error(s), first: {first}"
                )));
            }
        }

        tracing::debug!(
            routes = table.len(),
            predicates = predicates.len(),
            "Access control initialized"
        );
        let evaluator = AccessEvaluator::new(config.pages.clone(), predicates);
        Ok(Self::new(table, evaluator))
    }

    pub fn table(&self) -> &PolicyTable {
        &self.table
    }

    pub fn evaluator(&self) -> &AccessEvaluator {
        &self.evaluator
    }

    /// Resolve and evaluate a navigation. `path_and_query` may carry a query
    /// string; it is ignored for matching and preserved in redirects.
    pub fn check(&self, path_and_query: &str, user: Option<&SessionUser>) -> AccessCheck<'_> {
        self.check_route(path_and_query, path_and_query, user)
    }

    /// Like [`check`](Self::check), but matches `route` while redirects carry
    /// `requested`. Used when the matched path is a decoded form of the
    /// request target.
    pub fn check_route(
        &self,
        route: &str,
        requested: &str,
        user: Option<&SessionUser>,
    ) -> AccessCheck<'_> {
        let resolution = self.table.resolve_match(route);
        let decision = self
            .evaluator
            .evaluate(resolution.descriptor, user, requested);
        AccessCheck {
            resolution,
            decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = r#"
        [[routes]]
        pattern = "/"
        access = "public"

        [[routes]]
        pattern = "/orders"
        access = "authenticated"

        [[routes]]
        pattern = "/admin/*"
        access = "role:admin"

        [[routes]]
        pattern = "/staff"
        access = "custom:is_staff"
    "#;

    #[test]
    fn test_check_resolves_then_evaluates() {
        let config = StorefrontConfig::from_str(STORE).unwrap();
        let access = AccessControl::from_config(&config, PredicateRegistry::new()).unwrap();

        let check = access.check("/admin/users?tab=2", None);
        assert_eq!(check.resolution.pattern, Some("/admin/*"));
        assert_eq!(check.resolution.kind, Some(PatternKind::SingleWildcard));
        assert_eq!(
            check.decision.redirect_target.as_deref(),
            Some("/login?redirect=%2Fadmin%2Fusers%3Ftab%3D2")
        );

        let admin = SessionUser::new().with_id("a").with_role("admin");
        assert!(access.check("/admin/users", Some(&admin)).decision.allowed);
        assert!(access.check("/", None).decision.allowed);
    }

    #[test]
    fn test_check_route_matches_decoded_path_and_redirects_with_original() {
        let config = StorefrontConfig::from_str(STORE).unwrap();
        let access = AccessControl::from_config(&config, PredicateRegistry::new()).unwrap();

        let customer = SessionUser::new().with_id("c").with_role("customer");
        let check = access.check_route("/admin/report", "/%61dmin/report?x=1", Some(&customer));
        assert_eq!(check.resolution.pattern, Some("/admin/*"));
        assert_eq!(
            check.decision.redirect_target.as_deref(),
            Some("/error?message=insufficient_permissions&redirect=%2F%2561dmin%2Freport%3Fx%3D1")
        );
    }

    #[test]
    fn test_lint_warn_allows_unknown_predicate() {
        let config = StorefrontConfig::from_str(STORE).unwrap();
        assert!(AccessControl::from_config(&config, PredicateRegistry::new()).is_ok());
    }

    #[test]
    fn test_lint_deny_rejects_errors() {
        let config =
            StorefrontConfig::from_str(&format!("[policy]\nlint = \"deny\"\n{STORE}")).unwrap();
        let result = AccessControl::from_config(&config, PredicateRegistry::new());
        assert!(
            matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("custom:is_staff"))
        );

        let predicates = PredicateRegistry::new().register("is_staff", |_| false);
        assert!(AccessControl::from_config(&config, predicates).is_ok());
    }

    #[test]
    fn test_lint_deny_tolerates_warnings() {
        let config = StorefrontConfig::from_str(
            r#"
            [policy]
            lint = "deny"

            [[routes]]
            pattern = "/orders"
            access = "authenticated"

            [[routes]]
            pattern = "/orders"
            access = "public"
            "#,
        )
        .unwrap();
        let access = AccessControl::from_config(&config, PredicateRegistry::new()).unwrap();
        assert_eq!(
            access.table().resolve("/orders").access,
            AccessRule::Authenticated
        );
    }
}
