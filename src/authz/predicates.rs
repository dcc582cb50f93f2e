//! Predicates shipped with the storefront for `custom:<name>` rules.

use super::PredicateRegistry;

/// Role held by the company's chief executive.
pub const CEO_ROLE: &str = "ceo";

/// The predicate set the storefront binary registers.
///
/// - `is_ceo`: holds the `ceo` role
/// - `is_staff`: holds the `staff` or `admin` role
pub fn storefront_predicates() -> PredicateRegistry {
    PredicateRegistry::new()
        .register("is_ceo", |user| user.has_role(CEO_ROLE))
        .register("is_staff", |user| {
            user.has_role("staff") || user.has_role("admin")
        })
}
