//! Panic recovery and aborts over a real TCP connection.

use reqtrace::middleware::{abort, RequestLog};
use reqtrace::{Request, Response, Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn ok(_req: Request) -> Response {
    Response::text("ok")
}

async fn boom(_req: Request) -> Response {
    panic!("boom")
}

async fn hang_up(_req: Request) -> Response {
    abort()
}

/// Sends one `Connection: close` request and returns whatever came back.
async fn roundtrip(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = format!("GET {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    // A reset connection counts as an empty reply.
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn server_survives_panics_and_aborts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .get("/ok", ok)
        .get("/boom", boom)
        .get("/hang-up", hang_up)
        .wrap(RequestLog::new());

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(Server::from_listener(listener).serve_with_shutdown(app, async move {
        let _ = stopped.await;
    }));

    let reply = roundtrip(addr, "/boom").await;
    assert!(reply.starts_with("HTTP/1.1 500"), "unexpected reply: {reply:?}");

    let reply = roundtrip(addr, "/hang-up").await;
    assert!(!reply.starts_with("HTTP/1.1"), "abort must not produce a response: {reply:?}");

    let reply = roundtrip(addr, "/ok").await;
    assert!(reply.starts_with("HTTP/1.1 200"), "unexpected reply: {reply:?}");
    assert!(reply.ends_with("ok"));

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
