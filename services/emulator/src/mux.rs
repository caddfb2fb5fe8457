//! Read-only route registry with version-matrix matching.
//!
//! The emulated APIs accept an optional `/v{major.minor}` prefix on every
//! path and allow multi-segment captures mid-path (image names contain
//! slashes), which axum's matcher cannot express. Routes are therefore an
//! immutable list of `(method, pattern, handler)` tuples compiled at
//! construction and matched in registration order from a single fallback
//! handler; the first match wins and nothing is mutated afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use regex::Regex;

use crate::api::error::{self, ApiError};

/// Named captures of a matched route. The `version` key holds the version
/// token when the request used the versioned path form.
pub type Vars = HashMap<String, String>;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, ApiError>> + Send>>;
type Handler = Box<dyn Fn(Vars, Request<Body>) -> HandlerFuture + Send + Sync>;

struct Route {
    method: Method,
    pattern: Regex,
    handler: Handler,
}

/// An immutable dispatch table.
#[derive(Default)]
pub struct Mux {
    routes: Vec<Route>,
}

impl Mux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a GET route. `pattern` is a path regex with named captures;
    /// the optional version prefix is prepended automatically.
    pub fn get<H, F>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(Vars, Request<Body>) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Response, ApiError>> + Send + 'static,
    {
        self.push(Method::GET, &format!(r"^(?:/v(?P<version>[0-9.]+))?{pattern}$"), handler);
    }

    /// Register a GET route matched without the version prefix.
    pub fn get_exact<H, F>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(Vars, Request<Body>) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Response, ApiError>> + Send + 'static,
    {
        self.push(Method::GET, &format!("^{pattern}$"), handler);
    }

    fn push<H, F>(&mut self, method: Method, anchored: &str, handler: H)
    where
        H: Fn(Vars, Request<Body>) -> F + Send + Sync + 'static,
        F: Future<Output = Result<Response, ApiError>> + Send + 'static,
    {
        let pattern = Regex::new(anchored).expect("route pattern must compile");
        self.routes.push(Route {
            method,
            pattern,
            handler: Box::new(move |vars, req| -> HandlerFuture {
                Box::pin(handler(vars, req))
            }),
        });
    }

    /// Match the request against the table and run the handler; errors are
    /// rendered here, the single place status codes and bodies come from.
    pub async fn dispatch(&self, req: Request<Body>) -> Response {
        let path = req.uri().path().to_string();
        for route in &self.routes {
            if route.method != req.method() {
                continue;
            }
            let Some(caps) = route.pattern.captures(&path) else {
                continue;
            };
            let mut vars = Vars::new();
            for name in route.pattern.capture_names().flatten() {
                if let Some(m) = caps.name(name) {
                    vars.insert(name.to_string(), m.as_str().to_string());
                }
            }
            let version = vars.get("version").cloned().unwrap_or_default();
            return match (route.handler)(vars, req).await {
                Ok(response) => response,
                Err(err) => error::error_response(&err, &version),
            };
        }
        not_found()
    }
}

fn not_found() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("404 page not found\n"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn echo_mux() -> Mux {
        let mut mux = Mux::new();
        mux.get(r"/images/(?P<name>.+)/json", |vars: Vars, _req| async move {
            let body = format!(
                "v={} name={}",
                vars.get("version").map(String::as_str).unwrap_or(""),
                vars["name"]
            );
            Ok(body.into_response())
        });
        mux.get_exact("/_ping", |_vars, _req| async { Ok("pong".into_response()) });
        mux
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn matches_versioned_and_unversioned_forms() {
        let mux = echo_mux();

        let response = mux.dispatch(request("/images/alpine:3.11/json")).await;
        assert_eq!(body_text(response).await, "v= name=alpine:3.11");

        let response = mux
            .dispatch(request("/v1.40/images/library/alpine:3.11/json"))
            .await;
        assert_eq!(body_text(response).await, "v=1.40 name=library/alpine:3.11");
    }

    #[tokio::test]
    async fn exact_routes_reject_version_prefix() {
        let mux = echo_mux();
        assert_eq!(mux.dispatch(request("/_ping")).await.status(), StatusCode::OK);
        assert_eq!(
            mux.dispatch(request("/v1.40/_ping")).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn unmatched_paths_get_plain_404() {
        let mux = echo_mux();
        let response = mux.dispatch(request("/no/such/route")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "404 page not found\n");
    }

    #[tokio::test]
    async fn handler_errors_render_at_the_boundary() {
        let mut mux = Mux::new();
        mux.get(r"/boom", |_vars, _req| async {
            Err(ApiError::not_found("unknown image: x"))
        });

        let response = mux.dispatch(request("/v1.40/boom")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let text = body_text(response).await;
        assert_eq!(text, r#"{"message":"unknown image: x"}"#);
    }
}
