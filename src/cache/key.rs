//! Cache key derivation.
//!
//! A key is the digest of `host + uri | method | header-digest | body-digest`,
//! where each optional component is empty when its dimension is disabled.
//! Only fixed-length digests enter the key, so its size does not depend on
//! the request's headers or body.

use std::fmt;

use crate::config::{DEFAULT_IGNORED_HEADERS, HashKeyConfig, split_fields};
use crate::http::{Headers, Request};

use super::error::CacheError;
use super::hash::digest;

/// Opaque cache key; a hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderPolicy {
    Disabled,
    /// Only these headers, in this order.
    Allow(Vec<String>),
    /// Every header except these.
    Deny(Vec<String>),
}

/// Derives [`CacheKey`]s under one hashing policy.
///
/// The policy is resolved once from configuration and never changes while
/// requests are served.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    method: bool,
    headers: HeaderPolicy,
    body: bool,
}

impl KeyBuilder {
    pub fn new(config: &HashKeyConfig) -> Self {
        let header = &config.header;
        let headers = if !header.enable {
            HeaderPolicy::Disabled
        } else {
            let allow = header.fields.as_deref().map(split_fields).unwrap_or_default();
            let deny = header
                .ignore_fields
                .as_deref()
                .map(split_fields)
                .unwrap_or_default();

            if !allow.is_empty() {
                HeaderPolicy::Allow(allow)
            } else if !deny.is_empty() {
                HeaderPolicy::Deny(deny)
            } else {
                HeaderPolicy::Deny(DEFAULT_IGNORED_HEADERS.iter().map(|h| h.to_string()).collect())
            }
        };

        Self {
            method: config.method.enable,
            headers,
            body: config.body.enable,
        }
    }

    /// Computes the key for `request`.
    ///
    /// With body hashing enabled the body is drained and replaced by a
    /// replayable buffer of the same bytes before this returns, so the
    /// request can still be forwarded. With body hashing disabled the body
    /// is not touched.
    ///
    /// # Errors
    ///
    /// [`CacheError::KeyBuild`] if the body stream fails while being drained.
    pub async fn build(&self, request: &mut Request) -> Result<CacheKey, CacheError> {
        let body_digest = if self.body {
            let bytes = request
                .body_mut()
                .buffer()
                .await
                .map_err(CacheError::KeyBuild)?;
            digest(&bytes)
        } else {
            String::new()
        };

        let method = if self.method {
            request.method().as_str()
        } else {
            ""
        };

        let header_digest = match &self.headers {
            HeaderPolicy::Disabled => String::new(),
            HeaderPolicy::Allow(fields) => allow_list_digest(request.headers(), fields),
            HeaderPolicy::Deny(ignored) => deny_list_digest(request.headers(), ignored),
        };

        let material = format!(
            "{}{}|{}|{}|{}",
            request.host(),
            request.uri(),
            method,
            header_digest,
            body_digest
        );
        Ok(CacheKey(digest(material)))
    }
}

fn allow_list_digest(headers: &Headers, fields: &[String]) -> String {
    let mut material = String::new();
    for field in fields {
        material.push('|');
        material.push_str(headers.get(field).unwrap_or(""));
    }
    digest(material)
}

/// Digest of every header not in `ignored`, independent of header order and
/// name casing. Values of a repeated header keep their relative order.
fn deny_list_digest(headers: &Headers, ignored: &[String]) -> String {
    let mut kept = headers.clone();
    for name in ignored {
        kept.remove(name);
    }

    let mut pairs: Vec<(String, &str)> = kept
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut material = String::new();
    for (name, value) in pairs {
        material.push_str(&name);
        material.push(':');
        material.push_str(value);
        material.push('\n');
    }
    digest(material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeaderHashConfig, Toggle};
    use crate::http::{Body, Method};

    fn policy(method: bool, header: HeaderHashConfig, body: bool) -> KeyBuilder {
        KeyBuilder::new(&HashKeyConfig {
            method: Toggle { enable: method },
            header,
            body: Toggle { enable: body },
        })
    }

    fn headers_on() -> HeaderHashConfig {
        HeaderHashConfig {
            enable: true,
            ..HeaderHashConfig::default()
        }
    }

    fn get(target: &str) -> Request {
        Request::new(Method::Get, target).header("Host", "svc")
    }

    async fn key(builder: &KeyBuilder, mut req: Request) -> CacheKey {
        builder.build(&mut req).await.unwrap()
    }

    #[tokio::test]
    async fn plain_key_matches_documented_layout() {
        let builder = KeyBuilder::new(&HashKeyConfig::default());
        let k = key(&builder, get("/foo")).await;
        assert_eq!(k.as_str(), digest("svc/foo|GET||"));
    }

    #[tokio::test]
    async fn query_is_part_of_the_key() {
        let builder = KeyBuilder::new(&HashKeyConfig::default());
        assert_ne!(key(&builder, get("/foo?a=1")).await, key(&builder, get("/foo?a=2")).await);
    }

    #[tokio::test]
    async fn method_dimension_can_be_disabled() {
        let with = policy(true, HeaderHashConfig::default(), false);
        let without = policy(false, HeaderHashConfig::default(), false);
        let post = || Request::new(Method::Post, "/foo").header("Host", "svc");

        assert_ne!(key(&with, get("/foo")).await, key(&with, post()).await);
        assert_eq!(key(&without, get("/foo")).await, key(&without, post()).await);
    }

    #[tokio::test]
    async fn default_deny_list_ignores_volatile_headers() {
        let builder = policy(true, headers_on(), false);
        let a = get("/").header("X-Request-Id", "1").header("Accept", "text/html");
        let b = get("/").header("accept", "text/html").header("x-request-id", "2");
        let c = get("/").header("Accept", "application/json");

        assert_eq!(key(&builder, a).await, key(&builder, b).await);
        assert_ne!(
            key(&builder, get("/").header("Accept", "text/html")).await,
            key(&builder, c).await
        );
    }

    #[tokio::test]
    async fn configured_deny_list_replaces_default() {
        let builder = policy(
            true,
            HeaderHashConfig {
                enable: true,
                ignore_fields: Some("Cookie".into()),
                ..HeaderHashConfig::default()
            },
            false,
        );
        assert_eq!(
            key(&builder, get("/").header("Cookie", "a")).await,
            key(&builder, get("/").header("Cookie", "b")).await
        );
        assert_ne!(
            key(&builder, get("/").header("X-Request-Id", "1")).await,
            key(&builder, get("/").header("X-Request-Id", "2")).await
        );
    }

    #[tokio::test]
    async fn allow_list_wins_and_respects_order() {
        let builder = policy(
            true,
            HeaderHashConfig {
                enable: true,
                fields: Some("Accept, X-Tenant".into()),
                ignore_fields: Some("Accept".into()),
            },
            false,
        );

        let a = get("/").header("Accept", "json").header("X-Tenant", "t1").header("Cookie", "x");
        let b = get("/").header("X-Tenant", "t1").header("Accept", "json").header("Cookie", "y");
        assert_eq!(key(&builder, a).await, key(&builder, b).await);

        let swapped = get("/").header("Accept", "t1").header("X-Tenant", "json");
        let original = get("/").header("Accept", "json").header("X-Tenant", "t1");
        assert_ne!(key(&builder, swapped).await, key(&builder, original).await);

        let missing = get("/").header("X-Tenant", "t1");
        let empty = get("/").header("Accept", "").header("X-Tenant", "t1");
        assert_eq!(key(&builder, missing).await, key(&builder, empty).await);
    }

    #[tokio::test]
    async fn body_digest_separates_payloads_and_keeps_body() {
        let builder = policy(true, HeaderHashConfig::default(), true);
        let post = |body: &'static [u8]| {
            Request::new(Method::Post, "/search")
                .header("Host", "svc")
                .with_body(Body::from_reader(body))
        };

        let mut first = post(&b"{\"q\":1}"[..]);
        let k1 = builder.build(&mut first).await.unwrap();
        let k2 = key(&builder, post(&b"{\"q\":2}"[..])).await;
        assert_ne!(k1, k2);
        assert_eq!(k1, key(&builder, post(&b"{\"q\":1}"[..])).await);

        let replay = first.take_body().into_bytes().await.unwrap();
        assert_eq!(&replay[..], b"{\"q\":1}");
    }

    #[tokio::test]
    async fn body_untouched_when_disabled() {
        let builder = KeyBuilder::new(&HashKeyConfig::default());
        let mut req = get("/upload").with_body(Body::from_reader(&b"big"[..]));
        builder.build(&mut req).await.unwrap();
        assert!(req.body().is_stream());
    }

    #[tokio::test]
    async fn unreadable_body_fails_key_build() {
        struct Broken;
        impl tokio::io::AsyncRead for Broken {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _: &mut std::task::Context<'_>,
                _: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::other("boom")))
            }
        }

        let builder = policy(true, HeaderHashConfig::default(), true);
        let mut req = get("/").with_body(Body::from_reader(Broken));
        let err = builder.build(&mut req).await.unwrap_err();
        assert_eq!(err.kind(), "key_build");
    }

    #[tokio::test]
    async fn key_size_is_bounded() {
        let builder = policy(true, headers_on(), true);
        let req = get("/").header("X-Big", "v".repeat(100_000)).with_body(vec![7u8; 1 << 20]);
        assert_eq!(key(&builder, req).await.as_str().len(), super::super::hash::DIGEST_LEN);
    }
}
