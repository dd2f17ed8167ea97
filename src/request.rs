//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{AsHeaderName, HOST};
use http::{Extensions, HeaderMap, Method, Uri};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::error::{BoxError, Error};

/// Streaming request body. Boxed so requests from hyper and requests built by
/// hand (tests, other hosts) share one type.
pub type Body = BoxBody<Bytes, BoxError>;

/// An incoming HTTP request.
///
/// The body is left as a stream until someone asks for it. Middleware may
/// replace it (see [`Request::body_mut`]) as long as the replacement yields
/// the same bytes.
pub struct Request {
    inner: http::Request<Body>,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Wraps any `http::Request` whose body yields [`Bytes`].
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            inner: req.map(|body| body.map_err(Into::<BoxError>::into).boxed()),
            params: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Records the peer address. Set by [`Server`](crate::Server) for every
    /// accepted connection.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> &Method { self.inner.method() }
    pub fn uri(&self) -> &Uri { self.inner.uri() }
    pub fn path(&self) -> &str { self.inner.uri().path() }
    pub fn headers(&self) -> &HeaderMap { self.inner.headers() }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { self.inner.headers_mut() }
    pub fn extensions(&self) -> &Extensions { self.inner.extensions() }
    pub fn extensions_mut(&mut self) -> &mut Extensions { self.inner.extensions_mut() }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn body(&self) -> &Body { self.inner.body() }
    pub fn body_mut(&mut self) -> &mut Body { self.inner.body_mut() }

    /// Header lookup. Names are case-insensitive; values that are not
    /// visible ASCII are skipped.
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// The target host: the URI authority for absolute-form targets (and
    /// HTTP/2), the `Host` header otherwise.
    pub fn host(&self) -> &str {
        self.inner
            .uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| self.header(HOST))
            .unwrap_or_default()
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Reads the whole body into memory. The body is consumed: a second call
    /// returns empty bytes.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        let body = std::mem::replace(self.inner.body_mut(), empty());
        let collected = body.collect().await.map_err(Error::Body)?;
        Ok(collected.to_bytes())
    }
}

/// A body with no bytes.
pub(crate) fn empty() -> Body {
    Empty::new().map_err(|never| match never {}).boxed()
}

/// A body replaying `bytes` in a single frame.
pub(crate) fn full(bytes: Bytes) -> Body {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}
