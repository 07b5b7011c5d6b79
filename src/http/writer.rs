//! The response write surface shared by client sinks and decorators.

use std::future::Future;
use std::io;
use std::pin::Pin;

use super::{Headers, StatusCode};

/// Future returned by [`ResponseWriter::write_body`].
pub type WriteFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;

/// Destination of an HTTP response, written piecewise.
///
/// Headers are mutated in place, the status is written once, and the body is
/// written in one or more chunks. [`Response`](super::Response) is the
/// buffered implementation; [`ResponseCapture`](crate::cache::ResponseCapture)
/// decorates another writer to observe what passes through it.
pub trait ResponseWriter: Send {
    /// Headers that will be sent with the response.
    fn headers(&self) -> &Headers;

    /// Mutable access to the response headers.
    fn headers_mut(&mut self) -> &mut Headers;

    /// Writes the status code.
    fn write_status(&mut self, status: StatusCode);

    /// Writes a chunk of the response body.
    fn write_body<'a>(&'a mut self, chunk: &'a [u8]) -> WriteFuture<'a>;
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &Headers {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        (**self).headers_mut()
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status);
    }

    fn write_body<'a>(&'a mut self, chunk: &'a [u8]) -> WriteFuture<'a> {
        (**self).write_body(chunk)
    }
}
