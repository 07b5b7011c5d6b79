//! HTTP/1.1 protocol types.
//!
//! This module provides the primitives the cache layer reads and writes:
//! [`Method`], [`StatusCode`], [`Headers`], [`Body`], [`Request`], [`Response`],
//! and the [`ResponseWriter`] write surface.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod body;
pub mod headers;
pub mod request;
pub mod response;
pub mod writer;

pub use body::Body;
pub use headers::Headers;
pub use request::Request;
pub use response::Response;
pub use writer::{ResponseWriter, WriteFuture};

/// An HTTP response status code.
///
/// Any three-digit code is representable, since an upstream may answer with
/// codes this crate has no name for and a cached entry must replay them
/// verbatim. Well-known codes are available as associated constants.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::StatusCode;
///
/// let status = StatusCode::OK;
/// assert_eq!(status.as_u16(), 200);
/// assert_eq!(status.canonical_reason(), "OK");
/// assert!(status.is_success());
///
/// let odd = StatusCode::from_u16(299).unwrap();
/// assert_eq!(odd.canonical_reason(), "Unknown");
/// assert!(StatusCode::from_u16(42).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct StatusCode(u16);

macro_rules! status_codes {
    ($(($konst:ident, $code:expr, $reason:expr);)+) => {
        impl StatusCode {
            $(
                #[doc = concat!("`", stringify!($code), " ", $reason, "`")]
                pub const $konst: StatusCode = StatusCode($code);
            )+

            /// Returns the canonical reason phrase, or `"Unknown"` for unnamed codes.
            pub fn canonical_reason(self) -> &'static str {
                match self.0 {
                    $($code => $reason,)+
                    _ => "Unknown",
                }
            }
        }
    };
}

status_codes! {
    (CONTINUE, 100, "Continue");
    (SWITCHING_PROTOCOLS, 101, "Switching Protocols");

    (OK, 200, "OK");
    (CREATED, 201, "Created");
    (ACCEPTED, 202, "Accepted");
    (NON_AUTHORITATIVE_INFORMATION, 203, "Non-Authoritative Information");
    (NO_CONTENT, 204, "No Content");
    (RESET_CONTENT, 205, "Reset Content");
    (PARTIAL_CONTENT, 206, "Partial Content");

    (MULTIPLE_CHOICES, 300, "Multiple Choices");
    (MOVED_PERMANENTLY, 301, "Moved Permanently");
    (FOUND, 302, "Found");
    (SEE_OTHER, 303, "See Other");
    (NOT_MODIFIED, 304, "Not Modified");
    (TEMPORARY_REDIRECT, 307, "Temporary Redirect");
    (PERMANENT_REDIRECT, 308, "Permanent Redirect");

    (BAD_REQUEST, 400, "Bad Request");
    (UNAUTHORIZED, 401, "Unauthorized");
    (FORBIDDEN, 403, "Forbidden");
    (NOT_FOUND, 404, "Not Found");
    (METHOD_NOT_ALLOWED, 405, "Method Not Allowed");
    (CONFLICT, 409, "Conflict");
    (GONE, 410, "Gone");
    (LENGTH_REQUIRED, 411, "Length Required");
    (PAYLOAD_TOO_LARGE, 413, "Payload Too Large");
    (URI_TOO_LONG, 414, "URI Too Long");
    (UNSUPPORTED_MEDIA_TYPE, 415, "Unsupported Media Type");
    (UNPROCESSABLE_ENTITY, 422, "Unprocessable Entity");
    (TOO_MANY_REQUESTS, 429, "Too Many Requests");

    (INTERNAL_SERVER_ERROR, 500, "Internal Server Error");
    (NOT_IMPLEMENTED, 501, "Not Implemented");
    (BAD_GATEWAY, 502, "Bad Gateway");
    (SERVICE_UNAVAILABLE, 503, "Service Unavailable");
    (GATEWAY_TIMEOUT, 504, "Gateway Timeout");
    (HTTP_VERSION_NOT_SUPPORTED, 505, "HTTP Version Not Supported");
}

impl StatusCode {
    /// Builds a status code from its numeric value.
    ///
    /// Returns `None` unless `code` is a three-digit number (100–999).
    pub fn from_u16(code: u16) -> Option<Self> {
        (100..=999).contains(&code).then_some(Self(code))
    }

    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for `2xx` codes.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// Error returned when a number is not a valid three-digit status code.
#[derive(Debug, thiserror::Error)]
#[error("invalid HTTP status code: {0}")]
pub struct InvalidStatusCode(pub u16);

impl TryFrom<u16> for StatusCode {
    type Error = InvalidStatusCode;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::from_u16(code).ok_or(InvalidStatusCode(code))
    }
}

/// An HTTP request method.
///
/// Standard methods are represented as unit variants for zero-cost comparison.
/// Non-standard methods are captured in the `Custom` variant.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.as_str(), "GET");
/// assert!(method.is_safe());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns `true` if this method is "safe" (RFC 9110 §9.2.1): GET, HEAD, OPTIONS, TRACE.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Trace)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
