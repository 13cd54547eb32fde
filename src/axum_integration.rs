//! Axum adapter.
//!
//! [`AxumTransport`] turns the application's route table into an
//! [`axum::Router`]. Requests are converted to [`HttpRequest`], run through
//! the dispatcher, and the [`HttpResponse`] is written back as JSON.
//!
//! ```rust,no_run
//! # use ferrous_nest::{Application, DiResult, Module, ModuleDef};
//! use ferrous_nest::axum_integration::AxumTransport;
//! # struct AppModule;
//! # impl Module for AppModule {
//! #     fn define() -> ModuleDef { ModuleDef::new::<Self>() }
//! # }
//!
//! # async fn serve() -> DiResult<()> {
//! let app = Application::create::<AppModule>().await?;
//! let mut transport = AxumTransport::new();
//! app.mount(&mut transport)?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, transport.into_router()).await.unwrap();
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{self, MethodRouter};
use axum::{Json, Router};
use serde_json::Value;

use crate::error::{DiError, DiResult};
use crate::http::{parse_query, HttpError, HttpMethod, HttpRequest, HttpResponse};
use crate::router::RoutePattern;
use crate::transport::{HttpTransport, RouteHandler};

struct Mounted {
    router: MethodRouter,
    methods: Vec<HttpMethod>,
}

/// Default request body limit, in bytes.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Transport building an [`axum::Router`].
pub struct AxumTransport {
    routes: HashMap<String, Mounted>,
    order: Vec<String>,
    body_limit: usize,
}

impl AxumTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            order: Vec::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Sets the maximum accepted body size.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Router serving every registered route.
    pub fn into_router(self) -> Router {
        let mut routes = self.routes;
        let mut router = Router::new();
        for path in self.order {
            if let Some(mounted) = routes.remove(&path) {
                router = router.route(&path, mounted.router);
            }
        }
        router.fallback(|request: Request| async move {
            let error = HttpError::not_found(format!("Cannot {} {}", request.method(), request.uri().path()));
            into_response(error.to_response(false))
        })
    }
}

impl Default for AxumTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for AxumTransport {
    fn register_route(&mut self, method: HttpMethod, path: &str, handler: RouteHandler) -> DiResult<()> {
        let pattern = RoutePattern::parse(path)?;
        let axum_path = axum_path(&pattern);
        let limit = self.body_limit;
        let endpoint = move |request: Request| {
            let handler = handler.clone();
            async move {
                let request = match from_axum(request, limit).await {
                    Ok(request) => request,
                    Err(error) => return into_response(error.to_response(false)),
                };
                // axum drops this future when the client goes away
                let guard = request.cancellation.clone().drop_guard();
                let response = handler(request).await;
                guard.disarm();
                into_response(response)
            }
        };

        let method_router = match method {
            HttpMethod::Get => routing::get(endpoint),
            HttpMethod::Post => routing::post(endpoint),
            HttpMethod::Put => routing::put(endpoint),
            HttpMethod::Patch => routing::patch(endpoint),
            HttpMethod::Delete => routing::delete(endpoint),
            HttpMethod::Options => routing::options(endpoint),
            HttpMethod::Head => routing::head(endpoint),
            HttpMethod::All => routing::any(endpoint),
        };

        let duplicate = |reason: &str| DiError::InvalidRoute {
            path: pattern.template().to_string(),
            reason: reason.to_string(),
        };
        match self.routes.remove(&axum_path) {
            Some(mut mounted) => {
                // axum panics on overlapping methods
                if mounted.methods.contains(&method) {
                    self.routes.insert(axum_path, mounted);
                    return Err(duplicate("method already mounted on this path"));
                }
                if method == HttpMethod::All || mounted.methods.contains(&HttpMethod::All) {
                    self.routes.insert(axum_path, mounted);
                    return Err(duplicate("ALL route shares its path with another route"));
                }
                mounted.methods.push(method);
                mounted.router = mounted.router.merge(method_router);
                self.routes.insert(axum_path, mounted);
            }
            None => {
                self.order.push(axum_path.clone());
                self.routes.insert(
                    axum_path,
                    Mounted {
                        router: method_router,
                        methods: vec![method],
                    },
                );
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for AxumTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxumTransport")
            .field("paths", &self.order)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

fn axum_path(pattern: &RoutePattern) -> String {
    match pattern.template().strip_suffix('*') {
        Some(base) => format!("{}*rest", base),
        None => pattern.template().to_string(),
    }
}

async fn from_axum(request: Request, limit: usize) -> Result<HttpRequest, HttpError> {
    let (parts, body) = request.into_parts();
    let method: HttpMethod = parts.method.as_str().parse()?;

    let mut request = HttpRequest::new(method, parts.uri.path());
    if let Some(query) = parts.uri.query() {
        request.query = parse_query(query);
    }
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    let bytes = to_bytes(body, limit)
        .await
        .map_err(|err| HttpError::new(413, "Request body too large").with_cause(err))?;
    if !bytes.is_empty() {
        request.body = serde_json::from_slice(&bytes)?;
    }
    Ok(request)
}

fn into_response(response: HttpResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = if response.body.is_null() {
        (status, Body::empty()).into_response()
    } else {
        (status, Json::<Value>(response.body)).into_response()
    };
    for (name, value) in response.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            out.headers_mut().append(name, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_is_named_for_axum() {
        let pattern = RoutePattern::parse("/static/*").unwrap();
        assert_eq!(axum_path(&pattern), "/static/*rest");
        let pattern = RoutePattern::parse("/users/:id").unwrap();
        assert_eq!(axum_path(&pattern), "/users/:id");
    }

    #[test]
    fn null_body_is_empty() {
        let response = into_response(HttpResponse::new(204, Value::Null).with_header("x-id", "7"));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["x-id"], "7");
    }
}
