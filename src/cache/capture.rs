//! Response capture: a write-through [`ResponseWriter`] decorator.

use std::io;

use crate::http::{Headers, ResponseWriter, StatusCode, WriteFuture};

/// Forwards every write to the wrapped sink and keeps a copy.
///
/// Header mutations go straight to the inner sink, so the client sees them
/// as they happen. Status and body writes are forwarded and also recorded.
/// After the upstream is done, [`finish`](Self::finish) yields what was sent.
///
/// A failed body write leaves the recorded body short of what the upstream
/// produced. The first such failure is kept and reported by
/// [`failure`](Self::failure); a failed capture must not be stored.
pub struct ResponseCapture<'w> {
    inner: &'w mut dyn ResponseWriter,
    status: Option<StatusCode>,
    body: Vec<u8>,
    failure: Option<io::ErrorKind>,
}

impl<'w> ResponseCapture<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: None,
            body: Vec::new(),
            failure: None,
        }
    }

    /// Status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Kind of the first body write that failed, if any.
    pub fn failure(&self) -> Option<io::ErrorKind> {
        self.failure
    }

    /// Ends the capture, returning the status (200 if none was written), a
    /// snapshot of the inner sink's headers, and the body.
    pub fn finish(self) -> (StatusCode, Headers, Vec<u8>) {
        let headers = self.inner.headers().clone();
        (self.status.unwrap_or(StatusCode::OK), headers, self.body)
    }
}

impl ResponseWriter for ResponseCapture<'_> {
    fn headers(&self) -> &Headers {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.inner.headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.inner.write_status(status);
    }

    fn write_body<'a>(&'a mut self, chunk: &'a [u8]) -> WriteFuture<'a> {
        Box::pin(async move {
            if let Err(err) = self.inner.write_body(chunk).await {
                self.failure = self.failure.or(Some(err.kind()));
                return Err(err);
            }
            self.body.extend_from_slice(chunk);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;

    #[tokio::test]
    async fn forwards_and_records() {
        let mut client = Response::new(StatusCode::OK);
        let mut capture = ResponseCapture::new(&mut client);

        capture.headers_mut().insert("Content-Type", "text/plain");
        assert_eq!(capture.headers().get("content-type"), Some("text/plain"));
        capture.write_status(StatusCode::CREATED);
        capture.write_body(b"hello ").await.unwrap();
        capture.write_body(b"world").await.unwrap();
        assert_eq!(capture.status(), Some(StatusCode::CREATED));

        let (status, headers, body) = capture.finish();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(body, b"hello world");

        assert_eq!(client.status(), StatusCode::CREATED);
        assert_eq!(client.body_ref(), b"hello world");
    }

    #[tokio::test]
    async fn missing_status_is_ok() {
        let mut client = Response::new(StatusCode::OK);
        let mut capture = ResponseCapture::new(&mut client);
        capture.write_body(b"x").await.unwrap();
        assert_eq!(capture.status(), None);
        assert_eq!(capture.finish().0, StatusCode::OK);
    }

    struct Broken(Headers);

    impl ResponseWriter for Broken {
        fn headers(&self) -> &Headers {
            &self.0
        }

        fn headers_mut(&mut self) -> &mut Headers {
            &mut self.0
        }

        fn write_status(&mut self, _status: StatusCode) {}

        fn write_body<'a>(&'a mut self, _chunk: &'a [u8]) -> WriteFuture<'a> {
            Box::pin(std::future::ready(Err(io::Error::from(io::ErrorKind::BrokenPipe))))
        }
    }

    #[tokio::test]
    async fn failed_writes_are_not_recorded() {
        let mut sink = Broken(Headers::new());
        let mut capture = ResponseCapture::new(&mut sink);
        assert!(capture.write_body(b"lost").await.is_err());
        assert!(capture.body().is_empty());
        assert_eq!(capture.failure(), Some(io::ErrorKind::BrokenPipe));
    }

    #[tokio::test]
    async fn clean_capture_has_no_failure() {
        let mut client = Response::new(StatusCode::OK);
        let mut capture = ResponseCapture::new(&mut client);
        capture.write_body(b"ok").await.unwrap();
        assert_eq!(capture.failure(), None);
    }
}
