//! # reqtrace
//!
//! Request traceability for HTTP services, without touching every handler.
//!
//! [`RequestLog`](middleware::RequestLog) wraps a [`Router`] and, for each
//! request:
//!
//! - reuses the `x-request-id` header or generates one, writes it back into
//!   the request and binds a [`RequestLogger`](middleware::RequestLogger)
//!   (a `tracing` span) to it;
//! - buffers the body for the log and hands the handler an identical copy;
//! - turns a handler panic into `500 Internal Server Error` with the panic
//!   message and stack in the log, unless the handler called
//!   [`abort`](middleware::abort);
//! - emits one structured `tracing` event: `info` for 1xx/2xx, `warn` for
//!   3xx, `error` for 4xx/5xx and panics.
//!
//! The crate emits through [`tracing`] and never installs a subscriber; the
//! binary decides format and filtering.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use reqtrace::middleware::RequestLog;
//! use reqtrace::{health, Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt().json().init();
//!
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .post("/users",     create_user)
//!         .get("/healthz",    health::liveness)
//!         .wrap(RequestLog::new().filter(health::is_probe));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#))
//! }
//!
//! async fn create_user(mut req: Request) -> Response {
//!     match req.bytes().await {
//!         Ok(body) if !body.is_empty() => Response::builder()
//!             .status(StatusCode::CREATED)
//!             .header("location", "/users/99")
//!             .json(body),
//!         _ => Response::status(StatusCode::BAD_REQUEST),
//!     }
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod health;
pub mod middleware;

pub use error::{BoxError, Error, PanicError};
pub use handler::{BoxFuture, Handler};
pub use http::{HeaderName, Method, StatusCode};
pub use request::{Body, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
