//! Transport-neutral HTTP request and response model.

mod error;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tokio_util::sync::CancellationToken;

pub use error::{ErrorKind, FieldError, HttpError};

/// HTTP method of a route or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
    /// Route-only: matches every method
    All,
}

impl HttpMethod {
    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::All => "ALL",
        }
    }

    /// True when a route declared with `self` serves `request`.
    pub fn matches(self, request: HttpMethod) -> bool {
        self == HttpMethod::All || self == request
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            "HEAD" => Ok(HttpMethod::Head),
            "ALL" => Ok(HttpMethod::All),
            other => Err(HttpError::bad_request(format!("Unsupported method {}", other))),
        }
    }
}

/// An inbound request as handed over by a transport.
///
/// Header names are stored lower-case. `params` is filled by the router
/// from the matched route template.
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::http::{HttpMethod, HttpRequest};
/// use serde_json::json;
///
/// let request = HttpRequest::new(HttpMethod::Post, "/cats?limit=10")
///     .with_header("Content-Type", "application/json")
///     .with_body(json!({ "name": "Tom" }));
///
/// assert_eq!(request.path, "/cats");
/// assert_eq!(request.query_param("limit"), Some("10"));
/// assert_eq!(request.header("content-type"), Some("application/json"));
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method
    pub method: HttpMethod,
    /// Path without query string
    pub path: String,
    /// Path parameters bound by the router
    pub params: HashMap<String, String>,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Headers, lower-case names
    pub headers: HashMap<String, String>,
    /// Parsed body, `Null` when absent
    pub body: Value,
    /// Cancelled when the client goes away
    pub cancellation: CancellationToken,
}

impl HttpRequest {
    /// Creates a request; a query string in `path` is split off and parsed.
    pub fn new(method: HttpMethod, path: impl AsRef<str>) -> Self {
        let (path, query) = match path.as_ref().split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (path.as_ref().to_string(), HashMap::new()),
        };
        Self {
            method,
            path,
            params: HashMap::new(),
            query,
            headers: HashMap::new(),
            body: Value::Null,
            cancellation: CancellationToken::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Uses `token` as the request's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Path parameter bound by the router.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Parses `a=1&b=two` into a map. The last occurrence of a key wins.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    percent_decode(raw, true)
}

/// Percent-decodes one path segment; `+` is kept as is.
pub(crate) fn decode_path_segment(raw: &str) -> String {
    percent_decode(raw, false)
}

fn percent_decode(raw: &str, plus_as_space: bool) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' if plus_as_space => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// An outbound response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Headers in insertion order
    pub headers: Vec<(String, String)>,
    /// JSON body, `Null` for an empty body
    pub body: Value,
}

impl HttpResponse {
    /// Response with `status` and `body`.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// `200 OK` with `body`.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_components_are_decoded() {
        let query = parse_query("name=Tom+Cat&tag=a%2Fb&flag&bad=%zz");
        assert_eq!(query["name"], "Tom Cat");
        assert_eq!(query["tag"], "a/b");
        assert_eq!(query["flag"], "");
        assert_eq!(query["bad"], "%zz");
    }

    #[test]
    fn trailing_percent_is_kept() {
        assert_eq!(decode_component("100%"), "100%");
        assert_eq!(decode_component("%4"), "%4");
        assert_eq!(decode_path_segment("a+b%20c"), "a+b c");
    }

    #[test]
    fn method_parsing_is_case_insensitive() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert!("BREW".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::All.matches(HttpMethod::Delete));
        assert!(!HttpMethod::Get.matches(HttpMethod::Post));
    }
}
