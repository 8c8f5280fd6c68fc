//! Branch rules and git reference matching.
//!
//! A branch rule maps a set of branch (or tag) patterns to a workspace and
//! decides whether pipelines may be triggered on matching references, and
//! whether deployments there need approval.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

const HEADS_PREFIX: &str = "refs/heads/";
const TAGS_PREFIX: &str = "refs/tags/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Org,
    Project,
    App,
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeType::Org => "org",
            ScopeType::Project => "project",
            ScopeType::App => "app",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(rename = "scopeType")]
    pub scope_type: ScopeType,
    #[serde(rename = "scopeId")]
    pub scope_id: u64,
}

impl Scope {
    pub fn new(scope_type: ScopeType, scope_id: u64) -> Self {
        Self {
            scope_type,
            scope_id,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope_type, self.scope_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Workspace {
    Dev,
    Test,
    Staging,
    Prod,
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Workspace::Dev => "DEV",
            Workspace::Test => "TEST",
            Workspace::Staging => "STAGING",
            Workspace::Prod => "PROD",
        };
        f.write_str(s)
    }
}

/// A scoped branch policy.
///
/// `rule` holds one or more comma-separated patterns, e.g.
/// `"feature/*,bugfix/*"`. The default value is the "no rule matched" rule:
/// no workspace, no triggering, no approval.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRule {
    #[serde(default)]
    pub id: u64,
    #[serde(flatten)]
    pub scope: Option<Scope>,
    pub rule: String,
    #[serde(default)]
    pub workspace: Option<Workspace>,
    #[serde(default)]
    pub is_trigger_pipeline: bool,
    #[serde(default)]
    pub need_approval: bool,
    #[serde(default)]
    pub is_protect: bool,
}

impl BranchRule {
    pub fn patterns(&self) -> impl Iterator<Item = BranchPattern> + '_ {
        self.rule
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(BranchPattern::parse)
    }

    /// Specificity of the most specific pattern of this rule that matches
    /// `name` (already stripped of its `refs/...` prefix).
    pub fn best_match(&self, name: &str) -> Option<Specificity> {
        self.patterns()
            .filter(|p| p.matches(name))
            .map(|p| p.specificity())
            .max()
    }

    pub fn is_matched(&self) -> bool {
        self.workspace.is_some()
    }
}

/// One pattern of a branch rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchPattern {
    /// A literal branch or tag name.
    Exact(String),
    /// `prefix/*`: anything under the prefix, at any depth.
    Prefix(String),
    /// Any other glob containing `*`.
    Wildcard(String),
    /// `*`: every reference.
    CatchAll,
}

impl BranchPattern {
    pub fn parse(raw: &str) -> Self {
        let raw = strip_ref_prefix(raw.trim());
        if raw == "*" || raw == "**" {
            return BranchPattern::CatchAll;
        }
        if let Some(prefix) = raw.strip_suffix("/**").or_else(|| raw.strip_suffix("/*"))
            && !prefix.contains('*')
        {
            return BranchPattern::Prefix(format!("{prefix}/"));
        }
        if raw.contains('*') {
            return BranchPattern::Wildcard(raw.to_string());
        }
        BranchPattern::Exact(raw.to_string())
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            BranchPattern::Exact(exact) => exact == name,
            BranchPattern::Prefix(prefix) => name.len() > prefix.len() && name.starts_with(prefix),
            BranchPattern::Wildcard(glob) => glob_match(glob, name),
            BranchPattern::CatchAll => true,
        }
    }

    pub fn specificity(&self) -> Specificity {
        match self {
            BranchPattern::Exact(s) => Specificity::new(3, s.len()),
            BranchPattern::Prefix(p) => Specificity::new(2, p.len()),
            BranchPattern::Wildcard(g) => Specificity::new(1, g.chars().filter(|c| *c != '*').count()),
            BranchPattern::CatchAll => Specificity::new(0, 0),
        }
    }
}

/// Ordering key for competing matches: pattern kind first, then how many
/// literal characters the pattern pins down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    kind: u8,
    literal_len: usize,
}

impl Specificity {
    const fn new(kind: u8, literal_len: usize) -> Self {
        Self { kind, literal_len }
    }
}

/// `*` matches any run of characters, including `/`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return text.is_empty(),
    };
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

/// Strip `refs/heads/` or `refs/tags/` from a git reference.
pub fn strip_ref_prefix(reference: &str) -> &str {
    reference
        .strip_prefix(HEADS_PREFIX)
        .or_else(|| reference.strip_prefix(TAGS_PREFIX))
        .unwrap_or(reference)
}

pub fn is_tag_ref(reference: &str) -> bool {
    reference.starts_with(TAGS_PREFIX)
}

/// Whether `reference` matches any of `patterns`.
pub fn is_ref_pattern_match(reference: &str, patterns: &[String]) -> bool {
    let name = strip_ref_prefix(reference);
    patterns
        .iter()
        .any(|p| BranchPattern::parse(p).matches(name))
}

/// Pick the rule governing `reference`.
///
/// The most specific matching pattern wins; between equally specific
/// matches the rule listed first wins. Returns `BranchRule::default()` when
/// nothing matches.
pub fn resolve(reference: &str, rules: &[BranchRule]) -> BranchRule {
    let name = strip_ref_prefix(reference);
    rules
        .iter()
        .enumerate()
        .filter_map(|(idx, rule)| rule.best_match(name).map(|spec| (spec, idx, rule)))
        .max_by(|(a_spec, a_idx, _), (b_spec, b_idx, _)| match a_spec.cmp(b_spec) {
            Ordering::Equal => b_idx.cmp(a_idx),
            other => other,
        })
        .map(|(_, _, rule)| rule.clone())
        .unwrap_or_default()
}

/// Workspace of every branch in `branches` that resolves to a rule.
pub fn valid_branch_workspaces(
    branches: &[String],
    rules: &[BranchRule],
) -> BTreeMap<String, Workspace> {
    branches
        .iter()
        .filter_map(|branch| {
            resolve(branch, rules)
                .workspace
                .map(|ws| (strip_ref_prefix(branch).to_string(), ws))
        })
        .collect()
}
