//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and the response
//! on its way back. It is the place for cross-cutting concerns; the crate
//! ships one, [`RequestLog`], which assigns request ids, recovers panics and
//! writes one access-log record per request.
//!
//! A middleware receives the request and a [`Next`] holding the rest of the
//! chain. Calling [`Next::run`] continues; not calling it short-circuits.
//!
//! ```rust
//! use reqtrace::middleware::{Middleware, Next};
//! use reqtrace::{BoxFuture, Request, Response, StatusCode};
//!
//! struct RequireJson;
//!
//! impl Middleware for RequireJson {
//!     fn call(&self, req: Request, next: Next) -> BoxFuture {
//!         if req.header("content-type") != Some("application/json") {
//!             return Box::pin(async { Response::status(StatusCode::UNSUPPORTED_MEDIA_TYPE) });
//!         }
//!         next.run(req)
//!     }
//! }
//! ```

mod body;
mod observer;
mod recover;
mod request_id;
mod request_log;

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;

pub use body::normalize_body;
pub use observer::ResponseObserver;
pub use recover::{abort, guard, AbortHandler, Outcome};
pub use request_id::{resolve_request_id, RequestLogger, REQUEST_ID_HEADER};
pub use request_log::{classify, RequestLog, Severity};

/// Per-request interceptor. See the [module docs](self).
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of a middleware chain, ending in an endpoint handler.
pub struct Next {
    stack: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    /// A chain with no middleware left: `run` calls `handler` directly.
    pub fn new(handler: impl Handler) -> Self {
        Self::chain(Arc::from(Vec::new()), handler.into_boxed_handler())
    }

    pub(crate) fn chain(stack: Arc<[Arc<dyn Middleware>]>, endpoint: BoxedHandler) -> Self {
        Self { stack, index: 0, endpoint }
    }

    /// Passes the request to the next middleware, or to the endpoint once the
    /// stack is exhausted.
    pub fn run(mut self, req: Request) -> BoxFuture {
        match self.stack.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware.call(req, self)
            }
            None => self.endpoint.call(req),
        }
    }
}
