//! Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Probes arrive every few seconds from every kubelet and carry nothing worth
//! logging. [`is_probe`] is the usual [`RequestLog`](crate::middleware::RequestLog)
//! filter:
//!
//! ```rust,no_run
//! use reqtrace::middleware::RequestLog;
//! use reqtrace::{health, Router};
//!
//! let app = Router::new()
//!     .get(health::LIVENESS_PATH, health::liveness)
//!     .get(health::READINESS_PATH, health::readiness)
//!     .wrap(RequestLog::new().filter(health::is_probe));
//! ```

use http::Method;

use crate::{Request, Response};

pub const LIVENESS_PATH: &str = "/healthz";
pub const READINESS_PATH: &str = "/readyz";

/// Liveness probe. Always `200 OK` with body `"ok"`: if the process can
/// answer HTTP at all, it is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// Readiness probe (default implementation). Replace it with your own handler
/// when readiness depends on downstream services.
pub async fn readiness(_req: Request) -> Response {
    Response::text("ready")
}

/// `true` for `GET` or `HEAD` on either probe path.
pub fn is_probe(req: &Request) -> bool {
    (req.method() == Method::GET || req.method() == Method::HEAD)
        && matches!(req.path(), LIVENESS_PATH | READINESS_PATH)
}
