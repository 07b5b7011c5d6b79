//! Request body: either a buffered byte string or a read-once stream.

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

type BodyStream = Pin<Box<dyn AsyncRead + Send + Sync>>;

enum Kind {
    Full(Bytes),
    Stream(BodyStream),
}

/// An HTTP message body.
///
/// A body parsed off the wire by [`Server`](crate::server::Server) is already
/// buffered. A body built with [`Body::from_reader`] can be read exactly once;
/// [`Body::buffer`] drains it and swaps in a replayable buffer holding the same
/// bytes, so a later consumer still sees the original payload.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// use rttp_cache::http::Body;
///
/// let mut body = Body::from_reader(&b"payload"[..]);
/// assert!(body.as_bytes().is_none());
///
/// let bytes = body.buffer().await?;
/// assert_eq!(&bytes[..], b"payload");
/// assert_eq!(body.as_bytes().map(|b| &b[..]), Some(&b"payload"[..]));
/// # Ok(())
/// # }
/// ```
pub struct Body {
    kind: Kind,
}

impl Body {
    /// An empty, buffered body.
    pub fn empty() -> Self {
        Self::from(Bytes::new())
    }

    /// Wraps a read-once byte stream.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        Self {
            kind: Kind::Stream(Box::pin(reader)),
        }
    }

    /// Returns the buffered bytes, or `None` while the body is an unread stream.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.kind {
            Kind::Full(bytes) => Some(bytes),
            Kind::Stream(_) => None,
        }
    }

    /// Returns `true` if the body is a stream that has not been buffered yet.
    pub fn is_stream(&self) -> bool {
        matches!(self.kind, Kind::Stream(_))
    }

    /// Drains a streamed body and replaces it with a buffer of the same bytes.
    ///
    /// Already-buffered bodies are returned as-is. If the stream fails midway
    /// the body is left empty; the bytes read so far are not recoverable.
    pub async fn buffer(&mut self) -> io::Result<Bytes> {
        let mut stream = match std::mem::replace(&mut self.kind, Kind::Full(Bytes::new())) {
            Kind::Full(bytes) => {
                self.kind = Kind::Full(bytes.clone());
                return Ok(bytes);
            }
            Kind::Stream(stream) => stream,
        };

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        let bytes = Bytes::from(buf);
        self.kind = Kind::Full(bytes.clone());
        Ok(bytes)
    }

    /// Consumes the body, reading a stream to completion.
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        self.buffer().await
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Full(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from(Bytes::from_static(text.as_bytes()))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Kind::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }
    }

    #[tokio::test]
    async fn buffer_is_idempotent() {
        let mut body = Body::from_reader(&b"abc"[..]);
        assert!(body.is_stream());
        assert_eq!(&body.buffer().await.unwrap()[..], b"abc");
        assert!(!body.is_stream());
        assert_eq!(&body.buffer().await.unwrap()[..], b"abc");
    }

    #[tokio::test]
    async fn broken_stream_reports_error() {
        let mut body = Body::from_reader(BrokenReader);
        let err = body.buffer().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn full_body_into_bytes() {
        let body = Body::from("hello");
        assert_eq!(&body.into_bytes().await.unwrap()[..], b"hello");
    }
}
