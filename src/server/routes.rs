//! The fixed per-instance route table.
//!
//! Every bootstrap wires exactly two entries: an exact match on `/` for the
//! session endpoint and a wildcard for static assets. Patterns are checked
//! in registration order and the first hit wins; trailing slashes are
//! normalized on both sides so `/app/` and `/app` behave identically. The
//! table is built once at wire time and never mutated afterwards, and
//! nothing about it is process-global.

/// Where a matched path is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    /// The session bridge behind the exact session-endpoint entry.
    Session,
    /// The static asset responder behind the wildcard entry.
    Assets,
}

// Compiled form of a pattern string: `/*`-suffixed patterns match by
// prefix, anything else must match the whole path.
#[derive(Debug, Clone)]
enum RoutePattern {
    Exact(String),
    Wildcard(String),
}

impl RoutePattern {
    fn parse(pattern: &str) -> Self {
        let pattern = normalize(pattern);
        match pattern.strip_suffix("/*") {
            Some(prefix) => Self::Wildcard(prefix.to_owned()),
            None => Self::Exact(pattern.to_owned()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        match self {
            Self::Exact(exact) => exact == path,
            Self::Wildcard(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

// A trailing slash is not significant, except on the bare root.
fn normalize(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

/// Ordered route entries owned by one server instance.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<(RoutePattern, RouteTarget)>,
}

impl RouteTable {
    /// The two-entry table every bootstrap wires: exact `/` to the session
    /// bridge, everything else to static assets.
    pub fn standard() -> Self {
        Self::with_routes(vec![
            ("/", RouteTarget::Session),
            ("/*", RouteTarget::Assets),
        ])
    }

    fn with_routes(routes: Vec<(&str, RouteTarget)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(pattern, target)| (RoutePattern::parse(pattern), target))
                .collect(),
        }
    }

    /// First matching target in registration order.
    pub fn resolve(&self, path: &str) -> Option<RouteTarget> {
        self.routes
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|&(_, target)| target)
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// `true` when no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_exactly_two_entries() {
        let table = RouteTable::standard();
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
    }

    #[test]
    fn root_resolves_to_the_session_endpoint() {
        let table = RouteTable::standard();
        assert_eq!(table.resolve("/"), Some(RouteTarget::Session));
    }

    #[test]
    fn every_other_path_resolves_to_assets() {
        let table = RouteTable::standard();
        for path in ["/app.css", "/img/logo.svg", "/deep/nested/file", "/index.html"] {
            assert_eq!(table.resolve(path), Some(RouteTarget::Assets), "{path}");
        }
    }

    #[test]
    fn trailing_slashes_are_normalized() {
        let table = RouteTable::standard();
        assert_eq!(table.resolve("/sub/"), Some(RouteTarget::Assets));
    }

    #[test]
    fn first_match_wins() {
        let table = RouteTable::with_routes(vec![
            ("/*", RouteTarget::Assets),
            ("/", RouteTarget::Session),
        ]);
        // The wildcard shadows everything when registered first.
        assert_eq!(table.resolve("/"), Some(RouteTarget::Assets));
    }

    #[test]
    fn empty_table_resolves_nothing() {
        let table = RouteTable::with_routes(Vec::new());
        assert_eq!(table.resolve("/"), None);
    }
}
