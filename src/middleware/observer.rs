//! Status capture for the access log.

use http::StatusCode;

use crate::response::Response;

/// Records the status of the response leaving the chain.
///
/// Only the first observation counts, the same way a status line can only be
/// written once. The response itself is never touched.
#[derive(Debug, Default)]
pub struct ResponseObserver {
    status: Option<StatusCode>,
}

impl ResponseObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, res: &Response) {
        self.status.get_or_insert(res.status_code());
    }

    /// The recorded status, `200 OK` when nothing was observed.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ok() {
        let observer = ResponseObserver::new();
        assert_eq!(observer.status(), StatusCode::OK);
    }

    #[test]
    fn keeps_the_first_status() {
        let mut observer = ResponseObserver::new();
        observer.observe(&Response::status(StatusCode::CREATED));
        observer.observe(&Response::status(StatusCode::INTERNAL_SERVER_ERROR));

        assert_eq!(observer.status(), StatusCode::CREATED);
    }
}
