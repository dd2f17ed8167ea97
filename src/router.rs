//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Middleware registered
//! with [`Router::wrap`] runs around every request, matched or not, so a 404
//! is logged like any other response.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    middleware: Arc<[Arc<dyn Middleware>]>,
    fallback: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Arc::from(Vec::new()),
            fallback: not_found.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use reqtrace::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is malformed or conflicts with an existing route.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Adds a middleware around every request. The first one added is the
    /// outermost.
    pub fn wrap(mut self, middleware: impl Middleware) -> Self {
        let mut stack = self.middleware.to_vec();
        stack.push(Arc::new(middleware));
        self.middleware = stack.into();
        self
    }

    /// Runs `req` through the middleware stack and the matching handler.
    /// Unmatched requests get `404 Not Found`.
    pub async fn handle(&self, mut req: Request) -> Response {
        let endpoint = match self.lookup(req.method(), req.path()) {
            Some((handler, params)) => {
                req.set_params(params);
                handler
            }
            None => Arc::clone(&self.fallback),
        };
        Next::chain(Arc::clone(&self.middleware), endpoint).run(req).await
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::Empty;

    use super::*;

    fn request(method: Method, uri: &str) -> Request {
        let req = http::Request::builder().method(method).uri(uri).body(Empty::<Bytes>::new()).unwrap();
        Request::from_http(req)
    }

    async fn get_user(req: Request) -> Response {
        Response::text(format!("user {}", req.param("id").unwrap_or("?")))
    }

    #[tokio::test]
    async fn routes_by_method_and_path() {
        let app = Router::new().get("/users/{id}", get_user);

        let res = app.handle(request(Method::GET, "/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);

        let res = app.handle(request(Method::DELETE, "/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let res = app.handle(request(Method::GET, "/orders")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let _ = Router::new()
            .get("/users/{id}", get_user)
            .get("/users/{name}", get_user);
    }
}
