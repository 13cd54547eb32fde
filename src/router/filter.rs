use crate::http::HttpMethod;
use crate::token::Token;

use super::join_paths;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Path { path: String, prefix: bool },
    Controller(Token),
}

/// One route selector: a path (optionally ending in `/*`) or a controller,
/// optionally restricted to a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    target: Target,
    method: HttpMethod,
}

impl RouteSpec {
    /// Routes whose path equals `path`; a trailing `*` also selects sub-paths.
    pub fn path(path: impl AsRef<str>) -> Self {
        let raw = path.as_ref();
        let (raw, prefix) = match raw.strip_suffix('*') {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        Self {
            target: Target::Path {
                path: join_paths(&[raw]),
                prefix,
            },
            method: HttpMethod::All,
        }
    }

    /// Every route of controller `C`.
    pub fn controller<C: 'static>() -> Self {
        Self {
            target: Target::Controller(Token::of::<C>()),
            method: HttpMethod::All,
        }
    }

    /// Restricts the selector to `method`.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    fn matches(&self, path: &str, method: HttpMethod, controller: &Token) -> bool {
        if !self.method.matches(method) {
            return false;
        }
        match &self.target {
            Target::Controller(token) => token == controller,
            Target::Path { path: selected, prefix: false } => selected == path,
            Target::Path { path: selected, prefix: true } => {
                selected == "/"
                    || path == selected
                    || path
                        .strip_prefix(selected.as_str())
                        .map_or(false, |rest| rest.starts_with('/'))
            }
        }
    }
}

/// Selects the routes a module's middleware applies to.
///
/// Paths are compared against route templates without the global prefix.
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::http::HttpMethod;
/// use ferrous_nest::router::{RouteFilter, RouteSpec};
/// use ferrous_nest::Token;
///
/// struct CatsController;
///
/// let filter = RouteFilter::path("cats/*").exclude(RouteSpec::path("cats/health"));
/// let cats = Token::of::<CatsController>();
///
/// assert!(filter.matches("/cats/:id", HttpMethod::Get, &cats));
/// assert!(!filter.matches("/cats/health", HttpMethod::Get, &cats));
/// assert!(!filter.matches("/dogs", HttpMethod::Get, &cats));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteFilter {
    include: Vec<RouteSpec>,
    exclude: Vec<RouteSpec>,
}

impl RouteFilter {
    /// Every route.
    pub fn all() -> Self {
        Self::default()
    }

    /// Routes selected by any of `specs`.
    pub fn for_routes(specs: impl IntoIterator<Item = RouteSpec>) -> Self {
        Self {
            include: specs.into_iter().collect(),
            exclude: Vec::new(),
        }
    }

    /// Shorthand for a single path selector.
    pub fn path(path: impl AsRef<str>) -> Self {
        Self::for_routes([RouteSpec::path(path)])
    }

    /// Shorthand for a single controller selector.
    pub fn controller<C: 'static>() -> Self {
        Self::for_routes([RouteSpec::controller::<C>()])
    }

    /// Leaves out routes selected by `spec`.
    pub fn exclude(mut self, spec: RouteSpec) -> Self {
        self.exclude.push(spec);
        self
    }

    /// True when the route is selected.
    pub fn matches(&self, path: &str, method: HttpMethod, controller: &Token) -> bool {
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|spec| spec.matches(path, method, controller));
        included
            && !self
                .exclude
                .iter()
                .any(|spec| spec.matches(path, method, controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cats;
    struct Dogs;

    #[test]
    fn controller_and_method_selectors() {
        let filter = RouteFilter::for_routes([
            RouteSpec::controller::<Cats>(),
            RouteSpec::path("/dogs").method(HttpMethod::Post),
        ]);
        let cats = Token::of::<Cats>();
        let dogs = Token::of::<Dogs>();

        assert!(filter.matches("/anything", HttpMethod::Delete, &cats));
        assert!(filter.matches("/dogs", HttpMethod::Post, &dogs));
        assert!(!filter.matches("/dogs", HttpMethod::Get, &dogs));
    }

    #[test]
    fn prefix_does_not_match_partial_segments() {
        let filter = RouteFilter::path("cat*");
        let cats = Token::of::<Cats>();
        assert!(filter.matches("/cat/1", HttpMethod::Get, &cats));
        assert!(!filter.matches("/category", HttpMethod::Get, &cats));
        assert!(RouteFilter::path("*").matches("/x", HttpMethod::Get, &cats));
    }
}
