use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{DiError, DiResult};
use crate::http::decode_path_segment;

/// Joins path fragments into a normalized route path.
///
/// The result has a single leading slash, no empty segments and no trailing
/// slash; joining nothing yields `/`.
///
/// ```rust
/// use ferrous_nest::router::join_paths;
///
/// assert_eq!(join_paths(&["api/", "/users", ":id/"]), "/api/users/:id");
/// assert_eq!(join_paths(&["", "/"]), "/");
/// ```
pub fn join_paths(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard,
}

/// A parsed route template.
///
/// Segments are literal, `:name` parameters, or a trailing `*` that matches
/// the rest of the path (bound as the `*` parameter, possibly empty).
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::router::RoutePattern;
///
/// let pattern = RoutePattern::parse("/users/:id/files/*").unwrap();
/// let params = pattern.matches("/users/42/files/a/b.txt").unwrap();
/// assert_eq!(params["id"], "42");
/// assert_eq!(params["*"], "a/b.txt");
///
/// assert!(pattern.matches("/users/42").is_none());
/// assert!(RoutePattern::parse("/users/:").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    template: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parses `template`.
    pub fn parse(template: &str) -> DiResult<Self> {
        let template = join_paths(&[template]);
        let invalid = |reason: String| DiError::InvalidRoute {
            path: template.clone(),
            reason,
        };

        let raw: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut names = HashSet::new();
        for (i, segment) in raw.iter().enumerate() {
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(invalid(format!("invalid parameter name '{}'", segment)));
                }
                if !names.insert(name) {
                    return Err(invalid(format!("parameter '{}' declared twice", name)));
                }
                segments.push(Segment::Param(name.to_string()));
            } else if *segment == "*" {
                if i + 1 != raw.len() {
                    return Err(invalid("wildcard must be the last segment".to_string()));
                }
                segments.push(Segment::Wildcard);
            } else if segment.contains(['*', '?', '#', ':']) {
                return Err(invalid(format!("invalid segment '{}'", segment)));
            } else {
                segments.push(Segment::Static(segment.to_string()));
            }
        }

        Ok(Self {
            template: template.clone(),
            segments,
        })
    }

    /// Normalized template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Names of the `:name` parameters, in order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True when the template has no parameter and no wildcard.
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Static(_)))
    }

    /// Matches `path` (without query string), returning decoded parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = HashMap::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard => {
                    let rest: Vec<String> = parts[i.min(parts.len())..]
                        .iter()
                        .map(|p| decode_path_segment(p))
                        .collect();
                    params.insert("*".to_string(), rest.join("/"));
                    return Some(params);
                }
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), decode_path_segment(value));
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_matches_only_root() {
        let root = RoutePattern::parse("").unwrap();
        assert_eq!(root.template(), "/");
        assert!(root.matches("/").is_some());
        assert!(root.matches("//").is_some());
        assert!(root.matches("/a").is_none());
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let pattern = RoutePattern::parse("cats/:id").unwrap();
        assert_eq!(pattern.matches("/cats/7/").unwrap()["id"], "7");
    }

    #[test]
    fn params_are_percent_decoded() {
        let pattern = RoutePattern::parse("/files/:name").unwrap();
        assert_eq!(pattern.matches("/files/a%20b").unwrap()["name"], "a b");
    }

    #[test]
    fn wildcard_may_match_nothing() {
        let pattern = RoutePattern::parse("/static/*").unwrap();
        assert_eq!(pattern.matches("/static").unwrap()["*"], "");
        assert!(!pattern.is_static());
    }

    #[test]
    fn malformed_templates_are_rejected() {
        for template in ["/a/*/b", "/:id/:id", "/a:b", "/:na-me", "/q?x"] {
            assert!(RoutePattern::parse(template).is_err(), "{}", template);
        }
    }
}
