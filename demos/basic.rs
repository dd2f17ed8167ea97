//! Request logging demo: JSON access log, request ids, panic recovery.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -H 'x-request-id: my-trace-1' http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{ "name": "alice" }'
//!   curl http://localhost:3000/panic      # 500, logged with stack
//!   curl http://localhost:3000/healthz    # not logged

use reqtrace::middleware::{RequestLog, RequestLogger};
use reqtrace::{health, Request, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app = Router::new()
        .get("/users/{id}",        get_user)
        .post("/users",            create_user)
        .delete("/users/{id}",     delete_user)
        .get("/panic",             explode)
        .get(health::LIVENESS_PATH,  health::liveness)
        .get(health::READINESS_PATH, health::readiness)
        .wrap(RequestLog::new().filter(health::is_probe));

    if let Err(e) = Server::bind("0.0.0.0:3000").serve(app).await {
        tracing::error!("server error: {e}");
    }
}

// GET /users/{id}
async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    tracing::info!(user = id, "looking up user");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /users
//
// The access log already captured the body; reading it here still yields
// every byte.
async fn create_user(mut req: Request) -> Response {
    let body = match req.bytes().await {
        Ok(body) if !body.is_empty() => body,
        _ => return Response::status(StatusCode::BAD_REQUEST),
    };

    // Work handed to another task keeps its correlation through the logger.
    if let Some(log) = RequestLogger::from_request(&req).cloned() {
        tokio::spawn(async move {
            log.in_scope(|| tracing::info!(bytes = body.len(), "queued welcome email"));
        });
    }

    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#)
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(_req: Request) -> Response {
    Response::status(StatusCode::NO_CONTENT)
}

// GET /panic → 500, "panic recover" record
async fn explode(_req: Request) -> Response {
    panic!("something went badly wrong")
}
