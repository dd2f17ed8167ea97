//! Per-request access logging with request ids and panic recovery.

use std::panic;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::HeaderName;
use http::StatusCode;
use tracing::{Instrument, Level};

use super::body;
use super::observer::ResponseObserver;
use super::recover::{self, Outcome};
use super::request_id::{resolve_request_id, RequestLogger, REQUEST_ID_HEADER};
use super::{Middleware, Next};
use crate::error::PanicError;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

type Filter = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Request-id, recovery and access-log middleware.
///
/// For every request it:
///
/// 1. reuses the request id header or generates one, and binds a
///    [`RequestLogger`] to it;
/// 2. buffers the body for the log, leaving an identical body for the handler;
/// 3. runs the rest of the chain, turning a panic into `500 Internal Server
///    Error` (except [`abort`](super::abort), which propagates untouched);
/// 4. emits one event with `remote_ip`, `host`, `method`, `path`, `body`,
///    `status_code`, `latency` (seconds), `tag = "request"`, `request_id`,
///    plus `error` and `stack` after a panic. Level and message follow
///    [`classify`].
///
/// ```rust,no_run
/// use reqtrace::middleware::RequestLog;
/// use reqtrace::{health, Router};
///
/// let app = Router::new()
///     .get("/healthz", health::liveness)
///     .wrap(RequestLog::new().filter(health::is_probe));
/// ```
#[derive(Clone)]
pub struct RequestLog {
    header: HeaderName,
    filter: Option<Filter>,
}

impl RequestLog {
    pub fn new() -> Self {
        recover::install_hook();
        Self { header: HeaderName::from_static(REQUEST_ID_HEADER), filter: None }
    }

    /// Header to read the request id from and write generated ids to.
    pub fn header(mut self, name: HeaderName) -> Self {
        self.header = name;
        self
    }

    /// Requests for which `skip` returns `true` go straight to the next
    /// handler: no request id, no body capture, no log record.
    pub fn filter<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(skip));
        self
    }
}

impl Default for RequestLog {
    fn default() -> Self { Self::new() }
}

impl Middleware for RequestLog {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture {
        if self.filter.as_ref().is_some_and(|skip| skip(&req)) {
            return next.run(req);
        }

        let start = Instant::now();
        let request_id = resolve_request_id(&self.header, &mut req);
        let logger = RequestLogger::new(&request_id);
        req.extensions_mut().insert(logger.clone());
        let span = logger.span().clone();

        Box::pin(
            async move {
                let body = body::snapshot(&mut req).await;
                let mut record = RequestRecord::new(&req, body);
                let mut observer = ResponseObserver::new();

                // The rest of the chain starts inside the guard: handlers and
                // middleware may panic before returning their future.
                let response = match recover::guard(async move { next.run(req).await }).await {
                    Outcome::Completed(res) => res,
                    Outcome::Aborted(payload) => panic::resume_unwind(payload),
                    Outcome::Recovered { error, stack } => {
                        record.error = Some(error);
                        record.stack = Some(stack);
                        Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                };

                observer.observe(&response);
                record.finish(observer.status(), start.elapsed());
                record.emit(&logger);
                response
            }
            .instrument(span),
        )
    }
}

// ── Severity ──────────────────────────────────────────────────────────────────

/// Severity class of a finished request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// Severity and message for a finished request. A recovered panic wins over
/// any status.
///
/// | Condition      | Severity | Message          |
/// |----------------|----------|------------------|
/// | panic          | error    | `panic recover`  |
/// | status ≥ 500   | error    | `server error`   |
/// | status ≥ 400   | error    | `client error`   |
/// | status ≥ 300   | warn     | `redirect`       |
/// | status ≥ 200   | info     | `success`        |
/// | status ≥ 100   | info     | `informative`    |
/// | otherwise      | warn     | `unknown status` |
pub fn classify(panicked: bool, status: u16) -> (Severity, &'static str) {
    match status {
        _ if panicked => (Severity::Error, "panic recover"),
        500.. => (Severity::Error, "server error"),
        400.. => (Severity::Error, "client error"),
        300.. => (Severity::Warn, "redirect"),
        200.. => (Severity::Info, "success"),
        100.. => (Severity::Info, "informative"),
        _ => (Severity::Warn, "unknown status"),
    }
}

/// Seconds, truncated to centiseconds.
fn latency_secs(elapsed: Duration) -> f64 {
    (elapsed.as_millis() / 10) as f64 / 100.0
}

// ── Record ────────────────────────────────────────────────────────────────────

/// Fields of one access-log record. Request fields are filled before the
/// handler runs; `status_code` and `latency` after it returns.
struct RequestRecord {
    remote_ip: String,
    host: String,
    method: String,
    path: String,
    body: String,
    status_code: u16,
    latency: f64,
    error: Option<PanicError>,
    stack: Option<String>,
}

impl RequestRecord {
    fn new(req: &Request, body: String) -> Self {
        Self {
            remote_ip: req.remote_addr().map(|a| a.ip().to_string()).unwrap_or_default(),
            host: req.host().to_owned(),
            method: req.method().to_string(),
            path: req.path().to_owned(),
            body,
            status_code: 0,
            latency: 0.0,
            error: None,
            stack: None,
        }
    }

    fn finish(&mut self, status: StatusCode, elapsed: Duration) {
        self.status_code = status.as_u16();
        self.latency = latency_secs(elapsed);
    }

    fn emit(&self, logger: &RequestLogger) {
        let (severity, message) = classify(self.error.is_some(), self.status_code);
        let record = self;

        // `event!` needs the level at compile time.
        macro_rules! emit_at {
            ($level:expr) => {
                tracing::event!(
                    $level,
                    request_id = logger.request_id(),
                    remote_ip = %record.remote_ip,
                    host = %record.host,
                    method = %record.method,
                    path = %record.path,
                    body = %record.body,
                    status_code = record.status_code,
                    latency = record.latency,
                    tag = "request",
                    error = record.error.as_ref().map(tracing::field::display),
                    stack = record.stack.as_deref(),
                    "{}",
                    message
                )
            };
        }

        logger.in_scope(|| match severity {
            Severity::Info  => emit_at!(Level::INFO),
            Severity::Warn  => emit_at!(Level::WARN),
            Severity::Error => emit_at!(Level::ERROR),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_takes_precedence_over_status() {
        assert_eq!(classify(true, 200), (Severity::Error, "panic recover"));
        assert_eq!(classify(true, 500), (Severity::Error, "panic recover"));
    }

    #[test]
    fn classifies_by_status_class() {
        assert_eq!(classify(false, 503), (Severity::Error, "server error"));
        assert_eq!(classify(false, 404), (Severity::Error, "client error"));
        assert_eq!(classify(false, 301), (Severity::Warn, "redirect"));
        assert_eq!(classify(false, 201), (Severity::Info, "success"));
        assert_eq!(classify(false, 101), (Severity::Info, "informative"));
        assert_eq!(classify(false, 0), (Severity::Warn, "unknown status"));
        assert_eq!(classify(false, 99), (Severity::Warn, "unknown status"));
    }

    #[test]
    fn latency_is_truncated_to_centiseconds() {
        assert_eq!(latency_secs(Duration::ZERO), 0.0);
        assert_eq!(latency_secs(Duration::from_millis(9)), 0.0);
        assert_eq!(latency_secs(Duration::from_millis(1_239)), 1.23);
        assert_eq!(latency_secs(Duration::from_secs(2)), 2.0);
    }
}
