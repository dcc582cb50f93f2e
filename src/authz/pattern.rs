//! Route path patterns and specificity ranking.
//!
//! Four pattern kinds are recognized, by syntax:
//!
//! | Kind | Example | Matches |
//! |------|---------|---------|
//! | Exact | `/orders` | only `/orders` |
//! | Parameterized | `/product/:id` | `/product/42`, not `/product/42/reviews` |
//! | Single-level wildcard | `/admin/*` | `/admin/users`, not `/admin/users/edit` |
//! | Deep wildcard | `/admin/**/*` | `/admin/users`, `/admin/users/edit`, ... |
//!
//! Wildcard bases may contain `:name` segments. Patterns that cannot be
//! classified cleanly (see [`PatternDefect`]) fall back to literal matching.

use std::fmt;

use serde::Serialize;

const DEEP_WILDCARD_SUFFIX: &str = "/**/*";
const SINGLE_WILDCARD_SUFFIX: &str = "/*";

/// Normalize a navigation path.
///
/// Empty paths and the `index` sentinel become `/`; a leading `/` is added
/// when missing. Applying this twice yields the same result as applying it
/// once.
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() || path == "index" {
        return "/".to_string();
    }
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Strip the query string and fragment from a normalized path.
pub(crate) fn route_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

/// Split a path into its segments. `/` has no segments.
fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// The shape of a pattern. Declaration order is ranking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    DeepWildcard,
    SingleWildcard,
    Parameterized,
    Exact,
}

impl PatternKind {
    /// Numeric rank, higher is more specific.
    pub fn rank(self) -> u32 {
        match self {
            PatternKind::DeepWildcard => 0,
            PatternKind::SingleWildcard => 1,
            PatternKind::Parameterized => 2,
            PatternKind::Exact => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::DeepWildcard => "deep_wildcard",
            PatternKind::SingleWildcard => "single_wildcard",
            PatternKind::Parameterized => "parameterized",
            PatternKind::Exact => "exact",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pattern could not be classified as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternDefect {
    /// Contains `:` but no segment of the form `:name`.
    NoParameterSegment,
    /// A segment consisting of a bare `:`.
    EmptyParameterName,
    /// `*` somewhere other than a trailing `/*` or `/**/*`.
    MisplacedWildcard,
}

impl fmt::Display for PatternDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternDefect::NoParameterSegment => {
                f.write_str("contains ':' but no ':name' segment")
            }
            PatternDefect::EmptyParameterName => f.write_str("parameter segment has no name"),
            PatternDefect::MisplacedWildcard => {
                f.write_str("'*' is only allowed as a trailing '/*' or '/**/*'")
            }
        }
    }
}

/// One segment of a pattern base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    fn matches(&self, value: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == value,
            Segment::Param(_) => !value.is_empty(),
        }
    }

    pub(crate) fn is_param(&self) -> bool {
        matches!(self, Segment::Param(_))
    }
}

/// Ranking key for a pattern: kind first, then length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Specificity {
    pub kind: PatternKind,
    pub length: usize,
}

impl Specificity {
    /// Integer form of the ranking, for display and logs.
    pub fn score(&self) -> u32 {
        self.kind.rank() * 10_000 + self.length.min(9_999) as u32
    }
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    kind: PatternKind,
    base: Vec<Segment>,
    defect: Option<PatternDefect>,
}

impl PathPattern {
    /// Parse a pattern. Never fails: defective patterns match literally and
    /// carry a [`PatternDefect`] for the linter.
    pub fn parse(pattern: &str) -> Self {
        let raw = normalize_path(pattern);

        let (kind, base_str) = if let Some(base) = raw.strip_suffix(DEEP_WILDCARD_SUFFIX) {
            (PatternKind::DeepWildcard, base)
        } else if let Some(base) = raw.strip_suffix(SINGLE_WILDCARD_SUFFIX) {
            (PatternKind::SingleWildcard, base)
        } else if raw.contains(':') {
            (PatternKind::Parameterized, raw.as_str())
        } else {
            (PatternKind::Exact, raw.as_str())
        };

        let mut defect = None;
        if base_str.contains('*') {
            defect = Some(PatternDefect::MisplacedWildcard);
        }

        let mut base = Vec::new();
        for segment in split_segments(base_str) {
            match segment.strip_prefix(':') {
                Some("") => {
                    defect.get_or_insert(PatternDefect::EmptyParameterName);
                    base.push(Segment::Literal(segment.to_string()));
                }
                Some(name) => base.push(Segment::Param(name.to_string())),
                None => {
                    if segment.contains(':') {
                        defect.get_or_insert(PatternDefect::NoParameterSegment);
                    }
                    base.push(Segment::Literal(segment.to_string()));
                }
            }
        }

        if kind == PatternKind::Parameterized && !base.iter().any(Segment::is_param) {
            defect.get_or_insert(PatternDefect::NoParameterSegment);
        }

        let kind = if defect.is_some() {
            PatternKind::Exact
        } else {
            kind
        };

        Self {
            raw,
            kind,
            base,
            defect,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn defect(&self) -> Option<PatternDefect> {
        self.defect
    }

    pub fn specificity(&self) -> Specificity {
        Specificity {
            kind: self.kind,
            length: self.raw.len(),
        }
    }

    /// Segments before any wildcard suffix.
    pub(crate) fn base(&self) -> &[Segment] {
        &self.base
    }

    /// Names of the `:name` segments, in order.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.base
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Check whether a normalized path (without query string) has this
    /// pattern's shape.
    pub fn matches(&self, path: &str) -> bool {
        let segments = split_segments(path);
        let base_len = self.base.len();
        let base_matches = |prefix: &[&str]| {
            self.base
                .iter()
                .zip(prefix)
                .all(|(pattern, value)| pattern.matches(value))
        };

        match self.kind {
            PatternKind::Exact => self.raw == path,
            PatternKind::Parameterized => segments.len() == base_len && base_matches(&segments),
            PatternKind::SingleWildcard => {
                segments.len() == base_len + 1
                    && base_matches(&segments[..base_len])
                    && !segments[base_len].is_empty()
            }
            PatternKind::DeepWildcard => {
                segments.len() > base_len
                    && base_matches(&segments[..base_len])
                    && segments[base_len..].iter().all(|s| !s.is_empty())
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", "/")]
    #[case("index", "/")]
    #[case("/", "/")]
    #[case("orders", "/orders")]
    #[case("/orders", "/orders")]
    #[case("checkout/shipping?step=2", "/checkout/shipping?step=2")]
    #[case("//double", "//double")]
    fn test_normalize_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
        // Idempotent
        assert_eq!(normalize_path(&normalize_path(input)), expected);
    }

    #[test]
    fn test_route_path_strips_query_and_fragment() {
        assert_eq!(route_path("/checkout/shipping?step=2"), "/checkout/shipping");
        assert_eq!(route_path("/deals#top"), "/deals");
        assert_eq!(route_path("/orders"), "/orders");
        assert_eq!(route_path("/?x=1"), "/");
    }

    #[rstest]
    #[case("/orders", PatternKind::Exact)]
    #[case("/", PatternKind::Exact)]
    #[case("/product/:id", PatternKind::Parameterized)]
    #[case("/admin/*", PatternKind::SingleWildcard)]
    #[case("/admin/**/*", PatternKind::DeepWildcard)]
    #[case("/*", PatternKind::SingleWildcard)]
    #[case("/shop/:store/*", PatternKind::SingleWildcard)]
    fn test_kind_from_syntax(#[case] pattern: &str, #[case] kind: PatternKind) {
        let parsed = PathPattern::parse(pattern);
        assert_eq!(parsed.kind(), kind);
        assert_eq!(parsed.defect(), None);
    }

    #[rstest]
    #[case("/foo:bar", PatternDefect::NoParameterSegment)]
    #[case("/product/:", PatternDefect::EmptyParameterName)]
    #[case("/a/*/b", PatternDefect::MisplacedWildcard)]
    #[case("/a/**", PatternDefect::MisplacedWildcard)]
    fn test_defective_patterns_fall_back_to_exact(
        #[case] pattern: &str,
        #[case] defect: PatternDefect,
    ) {
        let parsed = PathPattern::parse(pattern);
        assert_eq!(parsed.defect(), Some(defect));
        assert_eq!(parsed.kind(), PatternKind::Exact);
        assert!(parsed.matches(pattern));
    }

    #[test]
    fn test_pattern_is_normalized() {
        assert_eq!(PathPattern::parse("orders").as_str(), "/orders");
        assert_eq!(PathPattern::parse("").as_str(), "/");
    }

    #[test]
    fn test_parameterized_matching() {
        let pattern = PathPattern::parse("/product/:id");
        assert!(pattern.matches("/product/42"));
        assert!(pattern.matches("/product/blue-shirt"));
        assert!(!pattern.matches("/product"));
        assert!(!pattern.matches("/product/"));
        assert!(!pattern.matches("/product/42/reviews"));
        assert!(!pattern.matches("/category/42"));
        assert_eq!(pattern.parameter_names(), vec!["id"]);
    }

    #[test]
    fn test_multiple_parameters() {
        let pattern = PathPattern::parse("/orders/:order/items/:item");
        assert!(pattern.matches("/orders/7/items/3"));
        assert!(!pattern.matches("/orders/7/lines/3"));
        assert_eq!(pattern.parameter_names(), vec!["order", "item"]);
    }

    #[test]
    fn test_single_wildcard_matches_exactly_one_segment() {
        let pattern = PathPattern::parse("/admin/*");
        assert!(pattern.matches("/admin/users"));
        assert!(!pattern.matches("/admin/users/edit"));
        assert!(!pattern.matches("/admin"));
        assert!(!pattern.matches("/admin/"));
        assert!(!pattern.matches("/administrator/users"));
    }

    #[test]
    fn test_root_single_wildcard() {
        let pattern = PathPattern::parse("/*");
        assert!(pattern.matches("/deals"));
        assert!(!pattern.matches("/"));
        assert!(!pattern.matches("/deals/today"));
    }

    #[test]
    fn test_deep_wildcard_matches_one_or_more_segments() {
        let pattern = PathPattern::parse("/admin/**/*");
        assert!(pattern.matches("/admin/users"));
        assert!(pattern.matches("/admin/users/edit"));
        assert!(pattern.matches("/admin/settings/billing/history"));
        assert!(!pattern.matches("/admin"));
        assert!(!pattern.matches("/admin/"));
        assert!(!pattern.matches("/admin/users//edit"));
        assert!(!pattern.matches("/adminx/users"));
    }

    #[test]
    fn test_wildcard_base_with_parameter() {
        let pattern = PathPattern::parse("/shop/:store/*");
        assert!(pattern.matches("/shop/berlin/deals"));
        assert!(!pattern.matches("/shop/berlin/deals/today"));
        assert!(!pattern.matches("/shop//deals"));
    }

    #[test]
    fn test_specificity_ordering_is_by_kind_then_length() {
        let exact = PathPattern::parse("/a").specificity();
        let param = PathPattern::parse("/a/:id").specificity();
        let single = PathPattern::parse("/a/*").specificity();
        let long_deep = PathPattern::parse("/a/very/long/base/path/that/keeps/going/**/*")
            .specificity();

        assert!(exact > param);
        assert!(param > single);
        assert!(single > long_deep);
        assert!(exact.score() > param.score());
        assert!(single.score() > long_deep.score());

        let short_single = PathPattern::parse("/a/*").specificity();
        let long_single = PathPattern::parse("/a/b/*").specificity();
        assert!(long_single > short_single);
    }
}
