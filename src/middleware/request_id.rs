//! Correlation ids and the per-request logging context.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use tracing::Span;
use uuid::Uuid;

use crate::request::Request;

/// Default header carrying the request id. Header names are case-insensitive,
/// so this matches `X-Request-Id` on the wire.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Returns the request id for `req`.
///
/// A non-empty `header` is reused verbatim, so ids survive hops between
/// services. Otherwise a UUID v4 is generated and written back into the
/// request headers; the handler and a second call both see the same value.
pub fn resolve_request_id(header: &HeaderName, req: &mut Request) -> String {
    if let Some(existing) = req.headers().get(header).filter(|v| !v.is_empty()) {
        return String::from_utf8_lossy(existing.as_bytes()).into_owned();
    }

    let id = Uuid::new_v4().to_string();
    // A hyphenated uuid is always a valid header value.
    if let Ok(value) = HeaderValue::from_str(&id) {
        req.headers_mut().insert(header.clone(), value);
    }
    id
}

/// A logging handle bound to one request's id.
///
/// [`RequestLog`](super::RequestLog) stores one in the request extensions
/// before calling the handler. Code further down fetches it explicitly:
///
/// ```rust
/// use reqtrace::middleware::RequestLogger;
/// use reqtrace::{Request, Response};
///
/// async fn get_user(req: Request) -> Response {
///     if let Some(log) = RequestLogger::from_request(&req) {
///         log.in_scope(|| tracing::info!(user = req.param("id"), "loading user"));
///     }
///     Response::text("alice")
/// }
/// ```
///
/// Events recorded inside the span carry `request_id`. The handler future
/// already runs inside it, so plain `tracing` macros in async handler code
/// are correlated too; the explicit handle matters for work moved elsewhere
/// (spawned tasks, blocking pools).
#[derive(Clone, Debug)]
pub struct RequestLogger {
    request_id: Arc<str>,
    span: Span,
}

impl RequestLogger {
    pub(crate) fn new(request_id: &str) -> Self {
        let span = tracing::info_span!("request", request_id = %request_id);
        Self { request_id: Arc::from(request_id), span }
    }

    /// The logger attached by [`RequestLog`](super::RequestLog), if any.
    pub fn from_request(req: &Request) -> Option<&Self> {
        req.extensions().get::<Self>()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Runs `f` with the request span entered.
    pub fn in_scope<F: FnOnce() -> T, T>(&self, f: F) -> T {
        self.span.in_scope(f)
    }
}
