//! Upstream forwarding.
//!
//! [`HttpUpstream`] is the terminal handler of the binary's middleware chain:
//! it replays the request against the configured origin with `reqwest` and
//! turns the reply into a [`Response`]. Transport failures become
//! `502 Bad Gateway`.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::Context;
use crate::http::{Headers, Request, Response, StatusCode};
use crate::middleware::{MiddlewareHandler, RequestId, from_handler};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Errors while talking to the origin.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream url {url:?}: must be absolute http(s)")]
    InvalidUrl { url: String },

    #[error("method {0} cannot be forwarded")]
    Method(String),

    #[error("failed to read request body: {0}")]
    Body(#[source] io::Error),

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Forwards requests to one origin.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base: String,
}

impl HttpUpstream {
    /// `base` is the origin URL, e.g. `http://127.0.0.1:9000`. Redirects are
    /// passed through to the client, not followed.
    pub fn new(base: &str) -> Result<Self, ProxyError> {
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ProxyError::InvalidUrl { url: base.to_owned() });
        }
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_owned(),
        })
    }

    /// This upstream as the last handler of a middleware chain.
    pub fn into_handler(self) -> MiddlewareHandler {
        let upstream = Arc::new(self);
        from_handler(move |ctx: Context| {
            let upstream = Arc::clone(&upstream);
            async move { upstream.handle(ctx).await }
        })
    }

    pub async fn handle(&self, ctx: Context) -> Response {
        let (mut request, extensions) = ctx.into_parts();
        let request_id = extensions
            .get::<RequestId>()
            .map(|id| id.as_str().to_owned())
            .unwrap_or_default();

        match self.send(&mut request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(request_id = %request_id, error = %err, path = %request.path(), "upstream unavailable");
                Response::new(StatusCode::BAD_GATEWAY).body("Bad Gateway")
            }
        }
    }

    async fn send(&self, request: &mut Request) -> Result<Response, ProxyError> {
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|_| ProxyError::Method(request.method().to_string()))?;
        let body = request.body_mut().buffer().await.map_err(ProxyError::Body)?;
        let url = format!("{}{}", self.base, request.uri());

        let mut builder = self.client.request(method, &url);
        for (name, value) in forwardable(request.headers()) {
            builder = builder.header(name, value);
        }
        if !request.host().is_empty() {
            builder = builder.header("X-Forwarded-Host", request.host());
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let reply = builder.send().await?;
        let status = StatusCode::from_u16(reply.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        debug!(url = %url, status = status.as_u16(), "upstream replied");

        let headers = reply_headers(reply.headers(), &url);

        let mut response = Response::new(status);
        for (name, value) in forwardable(&headers) {
            response.add_header(name, value);
        }
        let bytes = reply.bytes().await?;
        Ok(response.body_bytes(bytes.to_vec()))
    }
}

/// Converts upstream headers. Values that are not valid UTF-8 are dropped.
fn reply_headers(map: &reqwest::header::HeaderMap, url: &str) -> Headers {
    let mut headers = Headers::with_capacity(map.len());
    for (name, value) in map {
        match value.to_str() {
            Ok(value) => headers.insert(name.as_str(), value),
            Err(_) => debug!(url, header = %name, "dropping non-utf8 upstream header"),
        }
    }
    headers
}

/// End-to-end headers of a message.
///
/// Drops hop-by-hop headers, anything named in `Connection`, and the framing
/// and negotiation headers the proxy sets itself. `Accept-Encoding` is not
/// forwarded, so the origin answers with identity bodies that are safe to
/// store and replay to any client.
fn forwardable(headers: &Headers) -> Vec<(&str, &str)> {
    let named: Vec<String> = headers
        .get_all("Connection")
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.to_ascii_lowercase();
            !HOP_BY_HOP.contains(&name.as_str())
                && !matches!(name.as_str(), "host" | "content-length" | "accept-encoding")
                && !named.contains(&name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn rejects_relative_base() {
        assert!(matches!(
            HttpUpstream::new("localhost:9000"),
            Err(ProxyError::InvalidUrl { .. })
        ));
        assert_eq!(HttpUpstream::new("http://origin/").unwrap().base, "http://origin");
    }

    #[test]
    fn strips_connection_scoped_headers() {
        let headers: Headers = [
            ("Host", "svc"),
            ("Connection", "keep-alive, X-Session"),
            ("X-Session", "abc"),
            ("Transfer-Encoding", "chunked"),
            ("Accept-Encoding", "gzip"),
            ("Content-Length", "3"),
            ("Accept", "text/html"),
            ("Set-Cookie", "a=1"),
            ("Set-Cookie", "b=2"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            forwardable(&headers),
            [("Accept", "text/html"), ("Set-Cookie", "a=1"), ("Set-Cookie", "b=2")]
        );
    }

    #[test]
    fn non_utf8_reply_headers_are_dropped() {
        use reqwest::header::{HeaderMap, HeaderValue};

        let mut map = HeaderMap::new();
        map.append("x-raw", HeaderValue::from_bytes(b"caf\xe9").unwrap());
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));

        let headers = reply_headers(&map, "http://origin/x");
        assert!(!headers.contains("X-Raw"));
        assert_eq!(headers.get_all("Set-Cookie").collect::<Vec<_>>(), ["a=1", "b=2"]);
    }

    #[tokio::test]
    async fn unreachable_origin_is_502() {
        let upstream = HttpUpstream::new("http://127.0.0.1:1").unwrap();
        let ctx = Context::new(Request::new(Method::Get, "/x").header("Host", "svc"));
        let response = upstream.handle(ctx).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
