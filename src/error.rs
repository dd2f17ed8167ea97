//! Unified error types.

use std::any::Any;

/// Boxed error used for request bodies and panic payloads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The error type returned by reqtrace's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding a port, accepting a connection, reading a
/// request body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("body: {0}")]
    Body(#[source] BoxError),
}

/// A panic payload recovered by [`RequestLog`](crate::middleware::RequestLog),
/// coerced into an error value.
///
/// Handlers that want the original error kept intact can panic with a boxed
/// error: `std::panic::panic_any(BoxError::from(err))`.
#[derive(Debug, thiserror::Error)]
pub enum PanicError {
    #[error("{0}")]
    Error(BoxError),

    #[error("{0}")]
    Message(String),
}

impl PanicError {
    /// Coerces a panic payload. Formatting macros (`panic!("...")`) produce
    /// `&'static str` or `String` payloads; anything else is opaque.
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<BoxError>() {
            Ok(err) => return Self::Error(*err),
            Err(p) => p,
        };
        let payload = match payload.downcast::<String>() {
            Ok(msg) => return Self::Message(*msg),
            Err(p) => p,
        };
        match payload.downcast::<&'static str>() {
            Ok(msg) => Self::Message((*msg).to_owned()),
            Err(_) => Self::Message("Box<dyn Any>".to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_payloads_become_messages() {
        let err = PanicError::from_payload(Box::new("boom"));
        assert_eq!(err.to_string(), "boom");

        let err = PanicError::from_payload(Box::new(String::from("kaboom 42")));
        assert_eq!(err.to_string(), "kaboom 42");
    }

    #[test]
    fn boxed_errors_are_kept() {
        let io = std::io::Error::other("disk on fire");
        let err = PanicError::from_payload(Box::new(BoxError::from(io)));
        assert!(matches!(err, PanicError::Error(_)));
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn opaque_payloads_get_a_generic_message() {
        let err = PanicError::from_payload(Box::new(17_u32));
        assert_eq!(err.to_string(), "Box<dyn Any>");
    }
}
