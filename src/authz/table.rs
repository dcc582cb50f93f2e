//! The route policy table and resolver.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::{
    PolicyDescriptor,
    pattern::{PathPattern, PatternKind, Specificity, normalize_path, route_path},
};

/// A pattern and the policy it maps to.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub pattern: PathPattern,
    pub descriptor: PolicyDescriptor,
}

/// Outcome of resolving a path against the table.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    /// The winning pattern, or `None` when the default policy applied.
    pub pattern: Option<&'a str>,
    pub kind: Option<PatternKind>,
    pub descriptor: &'a PolicyDescriptor,
}

impl Resolution<'_> {
    pub fn is_default(&self) -> bool {
        self.pattern.is_none()
    }
}

/// A pattern that matches a given path, with its ranking.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate<'a> {
    pub pattern: &'a str,
    pub kind: PatternKind,
    pub specificity: Specificity,
    /// Position in the table (declaration order).
    pub position: usize,
    #[serde(skip)]
    pub descriptor: &'a PolicyDescriptor,
}

/// Immutable mapping from path patterns to policy descriptors.
///
/// Built once at startup and shared read-only. Declaration order is kept and
/// breaks ties between equally specific patterns (first declared wins).
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: Vec<RouteEntry>,
    exact: HashMap<String, usize>,
    default: PolicyDescriptor,
}

impl PolicyTable {
    /// Create an empty table that resolves everything to `default`.
    pub fn new(default: PolicyDescriptor) -> Self {
        Self {
            entries: Vec::new(),
            exact: HashMap::new(),
            default,
        }
    }

    /// Build a table from `(pattern, descriptor)` pairs in declaration order.
    pub fn from_routes<I, P>(routes: I, default: PolicyDescriptor) -> Self
    where
        I: IntoIterator<Item = (P, PolicyDescriptor)>,
        P: AsRef<str>,
    {
        routes
            .into_iter()
            .fold(Self::new(default), |table, (pattern, descriptor)| {
                table.with_route(pattern.as_ref(), descriptor)
            })
    }

    /// Append a route.
    pub fn with_route(mut self, pattern: &str, descriptor: PolicyDescriptor) -> Self {
        let pattern = PathPattern::parse(pattern);
        if pattern.kind() == PatternKind::Exact {
            self.exact
                .entry(pattern.as_str().to_string())
                .or_insert(self.entries.len());
        }
        self.entries.push(RouteEntry {
            pattern,
            descriptor,
        });
        self
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn default_descriptor(&self) -> &PolicyDescriptor {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a navigation path to its policy.
    pub fn resolve(&self, path: &str) -> &PolicyDescriptor {
        self.resolve_match(path).descriptor
    }

    /// Resolve a navigation path, reporting which pattern won.
    pub fn resolve_match(&self, path: &str) -> Resolution<'_> {
        let normalized = normalize_path(path);
        let route = route_path(&normalized);

        if let Some(&index) = self.exact.get(route) {
            let entry = &self.entries[index];
            tracing::trace!(path = %route, pattern = %entry.pattern, "Exact route match");
            return Self::matched(entry);
        }

        let mut best: Option<(&RouteEntry, Specificity)> = None;
        for entry in &self.entries {
            if entry.pattern.kind() == PatternKind::Exact || !entry.pattern.matches(route) {
                continue;
            }
            let specificity = entry.pattern.specificity();
            // Strictly greater, so the first declared pattern keeps ties
            if best.is_none_or(|(_, current)| specificity > current) {
                best = Some((entry, specificity));
            }
        }

        match best {
            Some((entry, specificity)) => {
                tracing::trace!(
                    path = %route,
                    pattern = %entry.pattern,
                    score = specificity.score(),
                    "Pattern route match"
                );
                Self::matched(entry)
            }
            None => {
                tracing::debug!(path = %route, "No route pattern matched, using default policy");
                Resolution {
                    pattern: None,
                    kind: None,
                    descriptor: &self.default,
                }
            }
        }
    }

    fn matched(entry: &RouteEntry) -> Resolution<'_> {
        Resolution {
            pattern: Some(entry.pattern.as_str()),
            kind: Some(entry.pattern.kind()),
            descriptor: &entry.descriptor,
        }
    }

    /// Every pattern matching `path`, best first.
    pub fn candidates(&self, path: &str) -> Vec<Candidate<'_>> {
        let normalized = normalize_path(path);
        let route = route_path(&normalized);

        let mut candidates: Vec<Candidate<'_>> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.pattern.matches(route))
            .map(|(position, entry)| Candidate {
                pattern: entry.pattern.as_str(),
                kind: entry.pattern.kind(),
                specificity: entry.pattern.specificity(),
                position,
                descriptor: &entry.descriptor,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.specificity
                .cmp(&a.specificity)
                .then(a.position.cmp(&b.position))
        });
        candidates
    }

    /// Patterns grouped by access tag, in declaration order within a group.
    pub fn routes_by_access(&self) -> BTreeMap<String, Vec<&str>> {
        let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for entry in &self.entries {
            groups
                .entry(entry.descriptor.access.to_string())
                .or_default()
                .push(entry.pattern.as_str());
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::authz::AccessRule;

    fn policy(tag: &str) -> PolicyDescriptor {
        PolicyDescriptor::new(tag)
    }

    fn storefront_table() -> PolicyTable {
        PolicyTable::from_routes(
            [
                ("/", policy("public").with_title("Home")),
                ("/product/:id", policy("public").with_title("Product Detail")),
                ("/category/:category", policy("public").with_title("Category")),
                ("/login", policy("guest").with_title("Login")),
                ("/signup", policy("guest").with_title("Sign Up")),
                ("/callback", policy("public").with_title("Callback")),
                ("/error", policy("public").with_title("Error")),
                ("/search", policy("authenticated").with_title("Search Results")),
                ("/wishlist", policy("authenticated").with_title("Wishlist")),
                ("/deals", policy("authenticated").with_title("Deals")),
                ("/orders", policy("authenticated").with_title("Orders")),
                ("/checkout", policy("authenticated").with_title("Checkout")),
                ("/checkout/*", policy("authenticated").with_title("Checkout Process")),
                ("/admin", policy("role:admin").with_title("Admin Panel")),
                ("/admin/*", policy("role:admin").with_title("Admin")),
                ("/admin/**/*", policy("role:admin").with_title("Admin Deep")),
                ("/premium/*", policy("plan:premium").with_title("Premium Features")),
            ],
            policy("authenticated").with_title("Protected Page"),
        )
    }

    #[rstest]
    #[case("/", "Home")]
    #[case("", "Home")]
    #[case("index", "Home")]
    #[case("/product/42", "Product Detail")]
    #[case("product/42", "Product Detail")]
    #[case("/category/shoes", "Category")]
    #[case("/checkout", "Checkout")]
    #[case("/checkout/shipping", "Checkout Process")]
    #[case("/checkout/shipping?step=2", "Checkout Process")]
    #[case("/admin", "Admin Panel")]
    #[case("/admin/users", "Admin")]
    #[case("/admin/users/edit", "Admin Deep")]
    #[case("/premium/recipes", "Premium Features")]
    #[case("/unmapped/path", "Protected Page")]
    #[case("/premium/recipes/1", "Protected Page")]
    fn test_resolve_storefront(#[case] path: &str, #[case] title: &str) {
        let table = storefront_table();
        assert_eq!(table.resolve(path).title.as_deref(), Some(title), "path {path}");
    }

    #[test]
    fn test_exact_entry_wins_over_overlapping_wildcards() {
        let table = PolicyTable::from_routes(
            [
                ("/admin/**/*", policy("role:admin")),
                ("/admin/*", policy("role:admin")),
                ("/admin/:section", policy("role:staff")),
                ("/admin/help", policy("public")),
            ],
            policy("authenticated"),
        );

        let resolution = table.resolve_match("/admin/help");
        assert_eq!(resolution.descriptor.access, AccessRule::Public);
        assert_eq!(resolution.pattern, Some("/admin/help"));
        assert_eq!(resolution.kind, Some(PatternKind::Exact));
    }

    #[test]
    fn test_parameterized_ranks_above_single_wildcard() {
        let table = PolicyTable::from_routes(
            [
                ("/admin/*", policy("role:admin")),
                ("/admin/:id", policy("role:staff")),
            ],
            policy("authenticated"),
        );

        assert_eq!(
            table.resolve("/admin/42").access,
            AccessRule::Role("staff".into())
        );
    }

    #[test]
    fn test_single_wildcard_does_not_match_two_segments() {
        let table = PolicyTable::from_routes(
            [("/admin/*", policy("role:admin"))],
            policy("public"),
        );

        assert_eq!(table.resolve("/admin/users").access, AccessRule::Role("admin".into()));
        assert!(table.resolve_match("/admin/users/edit").is_default());

        let table = table.with_route("/admin/**/*", policy("role:owner"));
        assert_eq!(
            table.resolve("/admin/users/edit").access,
            AccessRule::Role("owner".into())
        );
        // The single wildcard still wins for one segment
        assert_eq!(table.resolve("/admin/users").access, AccessRule::Role("admin".into()));
    }

    #[test]
    fn test_longer_pattern_wins_within_kind() {
        let table = PolicyTable::from_routes(
            [
                ("/shop/**/*", policy("public")),
                ("/shop/vip/**/*", policy("plan:vip")),
            ],
            policy("authenticated"),
        );

        assert_eq!(table.resolve("/shop/vip/lounge/bar").access, AccessRule::Plan("vip".into()));
        assert_eq!(table.resolve("/shop/regular/aisle").access, AccessRule::Public);
    }

    #[test]
    fn test_equal_specificity_tie_goes_to_first_declared() {
        let table = PolicyTable::from_routes(
            [
                ("/shop/:id", policy("role:first")),
                ("/:id/cart", policy("role:second")),
            ],
            policy("authenticated"),
        );
        // Both are parameterized, both nine characters, both match
        assert_eq!(table.resolve("/shop/cart").access, AccessRule::Role("first".into()));

        let reversed = PolicyTable::from_routes(
            [
                ("/:id/cart", policy("role:second")),
                ("/shop/:id", policy("role:first")),
            ],
            policy("authenticated"),
        );
        assert_eq!(reversed.resolve("/shop/cart").access, AccessRule::Role("second".into()));
    }

    #[test]
    fn test_duplicate_exact_pattern_first_declared_wins() {
        let table = PolicyTable::from_routes(
            [("/deals", policy("public")), ("/deals", policy("plan:gold"))],
            policy("authenticated"),
        );
        assert_eq!(table.resolve("/deals").access, AccessRule::Public);
    }

    #[test]
    fn test_empty_table_resolves_to_default() {
        let table = PolicyTable::new(policy("authenticated"));
        assert!(table.is_empty());
        let resolution = table.resolve_match("/anything");
        assert!(resolution.is_default());
        assert_eq!(resolution.descriptor.access, AccessRule::Authenticated);
    }

    #[test]
    fn test_candidates_are_ranked() {
        let table = storefront_table().with_route("/admin/:section", policy("role:staff"));
        let candidates = table.candidates("/admin/users");
        let patterns: Vec<&str> = candidates.iter().map(|c| c.pattern).collect();
        assert_eq!(patterns, vec!["/admin/:section", "/admin/*", "/admin/**/*"]);
    }

    #[test]
    fn test_routes_by_access() {
        let table = storefront_table();
        let groups = table.routes_by_access();
        assert_eq!(groups["guest"], vec!["/login", "/signup"]);
        assert_eq!(groups["role:admin"], vec!["/admin", "/admin/*", "/admin/**/*"]);
        assert_eq!(groups["plan:premium"], vec!["/premium/*"]);
    }
}
