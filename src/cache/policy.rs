//! Cacheability policy.
//!
//! Decides whether a captured upstream response may be stored and until when,
//! from the request's and response's `Cache-Control`, `Expires`, `Date`,
//! `Age`, `Last-Modified`, `Vary` and `Authorization` headers. A
//! [`ForceCache`] override skips all of that and applies a fixed TTL.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::config::ForceCacheConfig;
use crate::http::{Headers, Method, StatusCode};

/// TTL applied by [`ForceCache`] when the configured one is not positive.
pub const DEFAULT_FORCE_TTL: Duration = Duration::from_secs(3600);

/// Largest lifetime honored; bigger delta-seconds and TTLs are clamped to it.
pub const MAX_LIFETIME: Duration = Duration::from_secs(1 << 31);

/// Share of the `Last-Modified` age used as heuristic freshness.
const HEURISTIC_FRACTION: u32 = 10;

/// Parsed `Cache-Control` directives relevant to a shared cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub public: bool,
    pub private: bool,
    pub no_cache: bool,
    pub no_store: bool,
    pub must_revalidate: bool,
    pub max_age: Option<Duration>,
    pub s_maxage: Option<Duration>,
}

impl CacheControl {
    /// Merges every `Cache-Control` header line. Unknown directives and
    /// unparsable delta-seconds are ignored.
    pub fn parse(headers: &Headers) -> Self {
        let mut cc = Self::default();

        for line in headers.get_all("Cache-Control") {
            for part in line.split(',') {
                let part = part.trim();
                let (name, value) = match part.split_once('=') {
                    Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
                    None => (part, None),
                };

                if name.eq_ignore_ascii_case("public") {
                    cc.public = true;
                } else if name.eq_ignore_ascii_case("private") {
                    cc.private = true;
                } else if name.eq_ignore_ascii_case("no-cache") {
                    cc.no_cache = true;
                } else if name.eq_ignore_ascii_case("no-store") {
                    cc.no_store = true;
                } else if name.eq_ignore_ascii_case("must-revalidate") {
                    cc.must_revalidate = true;
                } else if name.eq_ignore_ascii_case("max-age") {
                    cc.max_age = value.and_then(delta_seconds).or(cc.max_age);
                } else if name.eq_ignore_ascii_case("s-maxage") {
                    cc.s_maxage = value.and_then(delta_seconds).or(cc.s_maxage);
                }
            }
        }

        cc
    }

    fn has_explicit_lifetime(&self) -> bool {
        self.max_age.is_some() || self.s_maxage.is_some()
    }
}

/// Non-negative integer seconds, saturating at [`MAX_LIFETIME`].
fn delta_seconds(value: &str) -> Option<Duration> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs = value.parse::<u64>().unwrap_or(u64::MAX);
    Some(Duration::from_secs(secs).min(MAX_LIFETIME))
}

/// Why a response was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uncacheable {
    Method,
    Status,
    RequestNoStore,
    ResponseNoStore,
    ResponseNoCache,
    ResponsePrivate,
    Authorization,
    VaryAll,
    NoFreshness,
    Expired,
}

impl Uncacheable {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method not cacheable",
            Self::Status => "status not cacheable by default",
            Self::RequestNoStore => "request no-store",
            Self::ResponseNoStore => "response no-store",
            Self::ResponseNoCache => "response no-cache",
            Self::ResponsePrivate => "response private",
            Self::Authorization => "authorized request without shared-cache permission",
            Self::VaryAll => "vary *",
            Self::NoFreshness => "no freshness information",
            Self::Expired => "already stale",
        }
    }
}

impl fmt::Display for Uncacheable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Store until the given instant, which is strictly in the future.
    Cacheable(SystemTime),
    Uncacheable(Uncacheable),
}

impl Verdict {
    pub fn expires_at(&self) -> Option<SystemTime> {
        match self {
            Self::Cacheable(at) => Some(*at),
            Self::Uncacheable(_) => None,
        }
    }

    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::Cacheable(_))
    }
}

/// Fixed-TTL override that stores every response regardless of headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceCache {
    ttl: Duration,
}

impl ForceCache {
    /// `None` when the override is disabled.
    pub fn from_config(config: &ForceCacheConfig) -> Option<Self> {
        if !config.enable {
            return None;
        }
        let ttl = match u64::try_from(config.expired_time) {
            Ok(secs) if secs > 0 => Duration::from_secs(secs).min(MAX_LIFETIME),
            _ => DEFAULT_FORCE_TTL,
        };
        Some(Self { ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Storage decision for upstream responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    force: Option<ForceCache>,
}

impl CachePolicy {
    pub fn new(force: &ForceCacheConfig) -> Self {
        Self {
            force: ForceCache::from_config(force),
        }
    }

    pub fn force(&self) -> Option<ForceCache> {
        self.force
    }

    /// Evaluates a response against the request that produced it.
    pub fn evaluate(
        &self,
        method: &Method,
        request_headers: &Headers,
        status: StatusCode,
        response_headers: &Headers,
        now: SystemTime,
    ) -> Verdict {
        if let Some(force) = self.force {
            return match now.checked_add(force.ttl) {
                Some(expires_at) => Verdict::Cacheable(expires_at),
                None => Verdict::Uncacheable(Uncacheable::Expired),
            };
        }

        match freshness(method, request_headers, status, response_headers, now) {
            Ok(expires_at) if expires_at > now => Verdict::Cacheable(expires_at),
            Ok(_) => Verdict::Uncacheable(Uncacheable::Expired),
            Err(reason) => Verdict::Uncacheable(reason),
        }
    }
}

fn cacheable_by_default(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 203 | 204 | 206 | 300 | 301 | 404 | 405 | 410 | 414 | 501)
}

fn freshness(
    method: &Method,
    request_headers: &Headers,
    status: StatusCode,
    response_headers: &Headers,
    now: SystemTime,
) -> Result<SystemTime, Uncacheable> {
    let req_cc = CacheControl::parse(request_headers);
    let res_cc = CacheControl::parse(response_headers);
    let expires = response_headers.get("Expires");
    let explicit = res_cc.has_explicit_lifetime() || expires.is_some();

    match method {
        Method::Get => {}
        Method::Post if explicit => {}
        _ => return Err(Uncacheable::Method),
    }

    if req_cc.no_store {
        return Err(Uncacheable::RequestNoStore);
    }
    if res_cc.no_store {
        return Err(Uncacheable::ResponseNoStore);
    }
    if res_cc.private {
        return Err(Uncacheable::ResponsePrivate);
    }
    if res_cc.no_cache {
        return Err(Uncacheable::ResponseNoCache);
    }
    if request_headers.contains("Authorization")
        && !(res_cc.public || res_cc.s_maxage.is_some() || res_cc.must_revalidate)
    {
        return Err(Uncacheable::Authorization);
    }
    if response_headers
        .get_all("Vary")
        .flat_map(|v| v.split(','))
        .any(|v| v.trim() == "*")
    {
        return Err(Uncacheable::VaryAll);
    }
    if !cacheable_by_default(status) && !explicit && !res_cc.public {
        return Err(Uncacheable::Status);
    }

    let date = response_headers.get("Date").and_then(parse_date);
    let lifetime = if let Some(s_maxage) = res_cc.s_maxage {
        s_maxage
    } else if let Some(max_age) = res_cc.max_age {
        max_age
    } else if let Some(expires) = expires {
        // An unparsable Expires means "already expired".
        let Some(expires) = parse_date(expires) else {
            return Err(Uncacheable::Expired);
        };
        expires
            .duration_since(date.unwrap_or(now))
            .unwrap_or(Duration::ZERO)
    } else if let Some(last_modified) = response_headers.get("Last-Modified").and_then(parse_date) {
        date.unwrap_or(now)
            .duration_since(last_modified)
            .unwrap_or(Duration::ZERO)
            / HEURISTIC_FRACTION
    } else {
        return Err(Uncacheable::NoFreshness);
    };

    let age = response_headers
        .get("Age")
        .and_then(|v| delta_seconds(v.trim()))
        .unwrap_or(Duration::ZERO);

    now.checked_add(lifetime.saturating_sub(age).min(MAX_LIFETIME))
        .ok_or(Uncacheable::Expired)
}

fn parse_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}
