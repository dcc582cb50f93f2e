//! Static checks over a route table.
//!
//! Resolution never fails at runtime, so mistakes in the table show up as
//! surprising redirects instead of errors. The linter reports them up front.

use std::fmt;

use serde::Serialize;

use super::{
    AccessRule, PolicyDescriptor, PredicateRegistry, PolicyTable,
    pattern::{PathPattern, PatternDefect, PatternKind, Segment},
};

/// Label used for findings about the table's default policy.
pub const DEFAULT_POLICY_LABEL: &str = "(default)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LintIssue {
    /// Another pattern of the same kind and length can match the same path;
    /// declaration order decides between them.
    AmbiguousTie { other: String },
    /// Never selected because another pattern always wins.
    Unreachable { shadowed_by: String },
    MalformedPattern { defect: PatternDefect },
    UnknownAccess { tag: String },
    UnknownPredicate { name: String },
}

impl LintIssue {
    pub fn severity(&self) -> Severity {
        match self {
            LintIssue::AmbiguousTie { .. } | LintIssue::Unreachable { .. } => Severity::Warning,
            LintIssue::MalformedPattern { .. }
            | LintIssue::UnknownAccess { .. }
            | LintIssue::UnknownPredicate { .. } => Severity::Error,
        }
    }
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintIssue::AmbiguousTie { other } => write!(
                f,
                "ties with '{other}' (same kind and length); the earlier declaration wins"
            ),
            LintIssue::Unreachable { shadowed_by } => {
                write!(f, "never selected, '{shadowed_by}' always wins")
            }
            LintIssue::MalformedPattern { defect } => {
                write!(f, "malformed pattern ({defect}), matched literally")
            }
            LintIssue::UnknownAccess { tag } => {
                write!(f, "unrecognized access rule '{tag}', every visitor is denied")
            }
            LintIssue::UnknownPredicate { name } => {
                write!(f, "no predicate registered for 'custom:{name}'")
            }
        }
    }
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    pub pattern: String,
    pub severity: Severity,
    #[serde(flatten)]
    pub issue: LintIssue,
}

impl LintFinding {
    fn new(pattern: impl Into<String>, issue: LintIssue) -> Self {
        Self {
            pattern: pattern.into(),
            severity: issue.severity(),
            issue,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for LintFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.pattern, self.issue)
    }
}

/// Check a table against the registered predicates.
///
/// Findings are reported on the later of two conflicting patterns, in
/// declaration order.
pub fn lint(table: &PolicyTable, predicates: &PredicateRegistry) -> Vec<LintFinding> {
    let mut findings = Vec::new();
    let entries = table.entries();

    for (index, entry) in entries.iter().enumerate() {
        let pattern = &entry.pattern;

        if let Some(defect) = pattern.defect() {
            findings.push(LintFinding::new(
                pattern.as_str(),
                LintIssue::MalformedPattern { defect },
            ));
        }

        let earlier = &entries[..index];
        if let Some(first) = earlier
            .iter()
            .find(|e| e.pattern.as_str() == pattern.as_str())
        {
            findings.push(LintFinding::new(
                pattern.as_str(),
                LintIssue::Unreachable {
                    shadowed_by: first.pattern.as_str().to_string(),
                },
            ));
        } else if let Some(other) = earlier.iter().find(|e| ties(&e.pattern, pattern)) {
            findings.push(LintFinding::new(
                pattern.as_str(),
                LintIssue::AmbiguousTie {
                    other: other.pattern.as_str().to_string(),
                },
            ));
        }

        if let Some(covering) = entries.iter().find(|e| covers_single_wildcard(&e.pattern, pattern))
        {
            findings.push(LintFinding::new(
                pattern.as_str(),
                LintIssue::Unreachable {
                    shadowed_by: covering.pattern.as_str().to_string(),
                },
            ));
        }

        check_rules(pattern.as_str(), &entry.descriptor, predicates, &mut findings);
    }

    check_rules(
        DEFAULT_POLICY_LABEL,
        table.default_descriptor(),
        predicates,
        &mut findings,
    );

    for finding in &findings {
        tracing::debug!(
            pattern = %finding.pattern,
            severity = %finding.severity,
            issue = %finding.issue,
            "Route table lint finding"
        );
    }
    findings
}

fn check_rules(
    pattern: &str,
    descriptor: &PolicyDescriptor,
    predicates: &PredicateRegistry,
    findings: &mut Vec<LintFinding>,
) {
    for rule in descriptor.rules() {
        match rule {
            AccessRule::Unrecognized(tag) => findings.push(LintFinding::new(
                pattern,
                LintIssue::UnknownAccess { tag: tag.clone() },
            )),
            AccessRule::Custom(name) if !predicates.contains(name) => findings.push(
                LintFinding::new(pattern, LintIssue::UnknownPredicate { name: name.clone() }),
            ),
            _ => {}
        }
    }
}

/// Two segments can match the same value.
fn compatible(a: &Segment, b: &Segment) -> bool {
    match (a, b) {
        (Segment::Literal(a), Segment::Literal(b)) => a == b,
        _ => true,
    }
}

/// `a` and `b` rank equally and some path matches both.
fn ties(a: &PathPattern, b: &PathPattern) -> bool {
    if a.kind() == PatternKind::Exact || a.specificity() != b.specificity() {
        return false;
    }
    let (a_base, b_base) = (a.base(), b.base());
    let same_shape = match a.kind() {
        PatternKind::DeepWildcard => true,
        _ => a_base.len() == b_base.len(),
    };
    same_shape && a_base.iter().zip(b_base).all(|(x, y)| compatible(x, y))
}

/// `parameterized` outranks `wildcard` on every path `wildcard` matches.
fn covers_single_wildcard(parameterized: &PathPattern, wildcard: &PathPattern) -> bool {
    if parameterized.kind() != PatternKind::Parameterized
        || wildcard.kind() != PatternKind::SingleWildcard
    {
        return false;
    }
    let (covering, base) = (parameterized.base(), wildcard.base());
    let Some((last, prefix)) = covering.split_last() else {
        return false;
    };
    prefix.len() == base.len()
        && last.is_param()
        && prefix.iter().zip(base).all(|(p, w)| match (p, w) {
            (Segment::Param(_), _) => true,
            (Segment::Literal(p), Segment::Literal(w)) => p == w,
            (Segment::Literal(_), Segment::Param(_)) => false,
        })
}
