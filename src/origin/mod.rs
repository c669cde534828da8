//! Origin allow-list policy for cross-origin session requests.
//!
//! The policy is resolved once at startup and handed to the session handler,
//! which consults it per request using the context's header accessors. The
//! transport layer itself never rejects an origin; what a rejection looks
//! like on the wire is the handler's decision.

use std::fmt;
use std::sync::Arc;

/// Custom origin check supplied by the caller.
pub type OriginPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync + 'static>;

/// Immutable allow-list of origin patterns plus an optional custom predicate.
///
/// Patterns use shell-style wildcards: `*` matches any run of characters,
/// `?` matches exactly one. An origin is allowed when any pattern matches or
/// the predicate accepts it. Comparison is case-sensitive against the origin
/// exactly as the client sent it, e.g. `https://*.example.com`.
///
/// # Examples
///
/// ```
/// use gantry::origin::OriginPolicy;
///
/// let policy = OriginPolicy::new()
///     .allow("https://*.example.com")
///     .check_with(|origin| origin.ends_with(".internal:8080"));
///
/// assert!(policy.allows("https://app.example.com"));
/// assert!(policy.allows("http://tools.internal:8080"));
/// assert!(!policy.allows("https://evil.test"));
/// ```
#[derive(Clone, Default)]
pub struct OriginPolicy {
    patterns: Vec<String>,
    predicate: Option<OriginPredicate>,
}

impl OriginPolicy {
    /// Creates an empty policy that allows nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assembles a policy from already-collected parts.
    pub fn from_parts(patterns: Vec<String>, predicate: Option<OriginPredicate>) -> Self {
        Self {
            patterns,
            predicate,
        }
    }

    /// Adds one wildcard pattern to the allow-list.
    #[must_use]
    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Installs the custom predicate, consulted when no pattern matches.
    #[must_use]
    pub fn check_with<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// `true` when `origin` matches a pattern or passes the predicate.
    pub fn allows(&self, origin: &str) -> bool {
        if self
            .patterns
            .iter()
            .any(|pattern| wildcard_match(pattern, origin))
        {
            return true;
        }
        self.predicate.as_ref().is_some_and(|check| check(origin))
    }

    /// `true` when the policy has neither patterns nor a predicate.
    ///
    /// Handlers use this to tell "nothing configured" (fall back to
    /// same-origin checks) apart from "configured to reject".
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.predicate.is_none()
    }
}

impl fmt::Debug for OriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginPolicy")
            .field("patterns", &self.patterns)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Matches `text` against a shell-style pattern (`*` any run, `?` one char).
///
/// Greedy two-cursor scan with backtracking to the most recent `*`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_text = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_text = t;
            p += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            star_text += 1;
            t = star_text;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern() {
        assert!(wildcard_match("https://a.test", "https://a.test"));
        assert!(!wildcard_match("https://a.test", "https://b.test"));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(wildcard_match("https://*.example.com", "https://app.example.com"));
        assert!(wildcard_match("https://*", "https://anything.at.all"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("https://*.example.com", "https://example.com"));
    }

    #[test]
    fn star_backtracks() {
        assert!(wildcard_match("*.com", "a.b.com"));
        assert!(wildcard_match("a*b*c", "axxbyyc"));
        assert!(!wildcard_match("a*b*c", "axxbyy"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(wildcard_match("http://host:808?", "http://host:8080"));
        assert!(!wildcard_match("http://host:808?", "http://host:808"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!wildcard_match("https://App.test", "https://app.test"));
    }

    #[test]
    fn policy_patterns_and_predicate() {
        let policy = OriginPolicy::new()
            .allow("https://*.example.com")
            .check_with(|origin| origin == "http://localhost:3000");

        assert!(policy.allows("https://x.example.com"));
        assert!(policy.allows("http://localhost:3000"));
        assert!(!policy.allows("http://localhost:4000"));
    }

    #[test]
    fn empty_policy_allows_nothing() {
        let policy = OriginPolicy::new();
        assert!(policy.is_empty());
        assert!(!policy.allows("https://anything.test"));
    }
}
