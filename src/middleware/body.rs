//! Request body capture for the access log.

use std::string::FromUtf8Error;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Body as _;
use serde_json::{Map, Value};

use crate::request::{self, Request};

/// Buffers the request body, puts an identical body back on the request and
/// returns the normalized form for logging.
///
/// A read error ends the capture early: whatever arrived before it is both
/// logged and replayed to the handler. It never fails the request.
pub(crate) async fn snapshot(req: &mut Request) -> String {
    if req.body().is_end_stream() {
        return String::new();
    }

    let mut body = std::mem::replace(req.body_mut(), request::empty());
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Some(data) = frame.data_ref() {
                    buf.extend_from_slice(data);
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "request body read failed");
                break;
            }
        }
    }

    let bytes: Bytes = buf.freeze();
    *req.body_mut() = request::full(bytes.clone());
    normalize_body(&bytes)
}

/// The logged form of a request body.
///
/// A JSON object has its insignificant whitespace removed; keys, numbers and
/// escapes are kept byte for byte. Anything else, including JSON arrays and
/// scalars, is returned as text (invalid UTF-8 replaced).
pub fn normalize_body(data: &[u8]) -> String {
    if serde_json::from_slice::<Map<String, Value>>(data).is_err() {
        return String::from_utf8_lossy(data).into_owned();
    }

    match compact(data) {
        Ok(compact) => compact,
        Err(err) => {
            tracing::error!(error = %err, "error compacting body request json");
            String::new()
        }
    }
}

/// Drops whitespace outside string literals from valid JSON text.
fn compact(json: &[u8]) -> Result<String, FromUtf8Error> {
    let mut out = Vec::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for &byte in json {
        if in_string {
            out.push(byte);
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
        } else if !matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
            in_string = byte == b'"';
            out.push(byte);
        }
    }

    String::from_utf8(out)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures_util::stream;
    use http_body_util::{Empty, Full, StreamBody};
    use hyper::body::Frame;

    use super::*;
    use crate::error::BoxError;

    fn request<B>(body: B) -> Request
    where
        B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Request::from_http(http::Request::builder().uri("/").body(body).unwrap())
    }

    #[test]
    fn compacts_json_objects_preserving_key_order() {
        let raw = b"{\n  \"zeta\": 1,\n  \"alpha\": [1, 2, {\"b\": true, \"a\": null}],\n  \"name\": \"a b\"\n}";
        assert_eq!(
            normalize_body(raw),
            r#"{"zeta":1,"alpha":[1,2,{"b":true,"a":null}],"name":"a b"}"#
        );
    }

    #[test]
    fn compaction_keeps_numbers_and_duplicates_verbatim() {
        assert_eq!(normalize_body(b"{\"id\": 12345678901234567890123}"), r#"{"id":12345678901234567890123}"#);
        assert_eq!(normalize_body(b"{ \"p\": 1.50, \"n\": 1e2 }"), r#"{"p":1.50,"n":1e2}"#);
        assert_eq!(normalize_body(b"{\"a\": 1, \"a\": 2}"), r#"{"a":1,"a":2}"#);
    }

    #[test]
    fn whitespace_inside_strings_survives() {
        let raw = b"{ \"msg\" : \"say \\\"hi  there\\\"\\n\" ,\n \"k\\\\\" : \" x \" }";
        assert_eq!(normalize_body(raw), r#"{"msg":"say \"hi  there\"\n","k\\":" x "}"#);
    }

    #[test]
    fn leaves_non_objects_untouched() {
        assert_eq!(normalize_body(b"name=alice&age=3"), "name=alice&age=3");
        assert_eq!(normalize_body(b"[1, 2, 3]"), "[1, 2, 3]");
        assert_eq!(normalize_body(b"{\"broken\": "), "{\"broken\": ");
        assert_eq!(normalize_body(b""), "");
    }

    #[tokio::test]
    async fn empty_body_is_not_read() {
        let mut req = request(Empty::<Bytes>::new());
        assert_eq!(snapshot(&mut req).await, "");
        assert!(req.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handler_reads_the_same_bytes() {
        let sent = "{ \"user\" : \"alice\" }";
        let mut req = request(Full::new(Bytes::from_static(sent.as_bytes())));

        assert_eq!(snapshot(&mut req).await, r#"{"user":"alice"}"#);
        assert_eq!(req.bytes().await.unwrap(), sent.as_bytes());
    }

    #[tokio::test]
    async fn multi_frame_bodies_are_joined() {
        let frames = stream::iter(vec![
            Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"hello "))),
            Ok(Frame::data(Bytes::from_static(b"world"))),
        ]);
        let mut req = request(StreamBody::new(frames));

        assert_eq!(snapshot(&mut req).await, "hello world");
        assert_eq!(req.bytes().await.unwrap(), "hello world".as_bytes());
    }

    #[tokio::test]
    async fn read_error_keeps_partial_body() {
        let frames = stream::iter(vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err(std::io::Error::other("connection reset")),
        ]);
        let mut req = request(StreamBody::new(frames));

        assert_eq!(snapshot(&mut req).await, "partial");
        assert_eq!(req.bytes().await.unwrap(), "partial".as_bytes());
    }
}
