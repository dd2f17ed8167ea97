//! HTTP server and graceful shutdown.
//!
//! [`Server::serve`] stops on SIGTERM (what Kubernetes sends before SIGKILL)
//! or Ctrl-C: it stops accepting, lets in-flight connections finish, then
//! returns. Keep `terminationGracePeriodSeconds` above your slowest request.
//! [`Server::serve_with_shutdown`] takes any future as the signal instead.
//!
//! # Aborted requests
//!
//! A panic that escapes the router (the [`abort`](crate::middleware::abort)
//! payload, or any panic when no recovering middleware is installed) unwinds
//! the task serving that connection. The connection is dropped without a
//! response; the server and every other connection keep running.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::request::Request;
use crate::router::Router;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server. HTTP/1.1 and HTTP/2 are negotiated per connection.
pub struct Server {
    bind: Bind,
}

impl Server {
    /// Configures the server to bind to `addr` when it starts serving.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use reqtrace::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { bind: Bind::Addr(addr) }
    }

    /// Serves on an already-bound listener (e.g. port 0 in tests).
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener) }
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves `router` until `signal` resolves, then drains in-flight
    /// connections.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let router = Arc::new(router);
        let mut tasks = JoinSet::new();

        info!(addr = %listener.local_addr()?, "listening");

        tokio::pin!(signal);
        loop {
            tokio::select! {
                // Shutdown first, so a queued backlog cannot delay it.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    tasks.spawn(serve_connection(Arc::clone(&router), stream, remote_addr));
                }

                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if res.is_err_and(|e| e.is_panic()) {
                        debug!("connection aborted by handler");
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(router: Arc<Router>, stream: tokio::net::TcpStream, remote_addr: SocketAddr) {
    // Called once per request on the connection.
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { dispatch(router, req, remote_addr).await }
    });

    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), svc)
        .await
    {
        error!(peer = %remote_addr, "connection error: {e}");
    }
}

/// Routes one request and produces one response.
///
/// The error type is [`Infallible`](std::convert::Infallible): routing
/// failures are responses (404), and panics are either recovered by
/// middleware or unwind the connection task.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<http_body_util::Full<bytes::Bytes>>, std::convert::Infallible> {
    let req = Request::from_http(req).with_remote_addr(remote_addr);
    Ok(router.handle(req).await.into_inner())
}

/// Resolves on SIGTERM or SIGINT (Ctrl-C). Ctrl-C only on non-Unix targets.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
