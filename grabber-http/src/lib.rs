//! Minimal HTTP transport for bounded page fetches.
//!
//! - Fixed header set: identifying `User-Agent`, `Accept: text/html`, plus
//!   caller-provided extras (the fixed pair always wins)
//! - Connect/read timeouts and an overall deadline from [`Timeouts`]
//! - Manual redirect following with loop detection and a hop limit
//! - Responses are handed back with the body unread so callers can stream it
//! - Optional *raw* request/response logging via `GRABBER_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust,no_run
//! # async fn demo() -> Result<(), grabber_http::HttpError> {
//! use grabber_common::FetchConfig;
//!
//! let cfg = FetchConfig::default();
//! let client = grabber_http::HttpClient::from_config(&cfg)?;
//! let url = url::Url::parse("https://example.com/").unwrap();
//! let resp = client.get_following_redirects(&url, cfg.redirect_limit).await?;
//! assert!(resp.status().is_success());
//! # Ok(()) }
//! ```
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, each redirect hop, and transport errors. Raw request
//! lines (curl form) and response headers go to target `http.raw` when
//! `GRABBER_HTTP_RAW=1`.
//!
//! Transport errors are never retried here.

mod redirect;

pub use redirect::{RedirectChain, is_redirect, resolve_location};

use grabber_common::{FetchConfig, Timeouts};
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use url::Url;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "GRABBER_HTTP_RAW";

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(url: &Url, headers: &HeaderMap) -> String {
    let mut parts = vec!["curl".to_string(), "-XGET".to_string()];
    for (name, val) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", name, val.replace('\'', r"'\''")));
    }
    parts.push(format!("'{}'", url.as_str()));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if matches!(
                key.to_ascii_lowercase().as_str(),
                "authorization" | "cookie" | "set-cookie" | "proxy-authorization"
            ) {
                val = "<redacted>".into();
            }
            (key, val)
        })
        .collect()
}

fn next_request_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("r{:x}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL {url}: {reason}")]
    Url { url: String, reason: String },
    #[error("client build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("server returned {0}")]
    Status(StatusCode),
    #[error("redirect {status} without a Location header")]
    MissingLocation { status: StatusCode },
    #[error("redirect loop detected at {0}")]
    RedirectLoop(Url),
    #[error("more than {limit} redirects")]
    TooManyRedirects { limit: usize },
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_builder() {
            Self::Build(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ==============================
// Client
// ==============================

/// Shared, pooled HTTP client. Cloning is cheap and clones share the pool.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    headers: HeaderMap,
    pub timeouts: Timeouts,
}

impl HttpClient {
    /// Build a client from fetch settings.
    ///
    /// ```
    /// use grabber_common::FetchConfig;
    /// use grabber_http::HttpClient;
    ///
    /// let client = HttpClient::from_config(&FetchConfig::default()).unwrap();
    /// assert_eq!(client.timeouts.connect, 10);
    /// assert_eq!(client.header("accept"), Some("text/html"));
    /// ```
    pub fn from_config(cfg: &FetchConfig) -> Result<Self, HttpError> {
        let headers = build_headers(cfg)?;
        let inner = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(cfg.timeouts.connect())
            .read_timeout(cfg.timeouts.read())
            .timeout(cfg.timeouts.overall())
            .default_headers(headers.clone())
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            headers,
            timeouts: cfg.timeouts,
        })
    }

    /// Value of a default request header, if set.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Issue a single GET without following redirects.
    ///
    /// The returned response still owns an unread body; dropping it closes
    /// the connection.
    pub async fn get(&self, url: &Url) -> Result<Response, HttpError> {
        let req_id = next_request_id();
        tracing::debug!(
            req_id=%req_id,
            host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
            scheme=%url.scheme(),
            "http.request.start"
        );
        if raw_enabled() {
            let curl = make_curl(url, &self.headers);
            tracing::debug!(target: "http.raw", %req_id, %curl, "request");
        }

        let t0 = std::time::Instant::now();
        let resp = match self.inner.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(err) => {
                let err = HttpError::from(err);
                tracing::warn!(req_id=%req_id, url=%url, error=%err, "http.network_error.send");
                return Err(err);
            }
        };

        let headers = resp.headers();
        tracing::debug!(
            req_id=%req_id,
            status=%resp.status(),
            duration_ms=t0.elapsed().as_millis() as u64,
            content_type=?headers.get(reqwest::header::CONTENT_TYPE),
            content_length=?resp.content_length(),
            "http.response.headers"
        );
        if raw_enabled() {
            let hdrs = redact_headers(headers);
            tracing::info!(target: "http.raw", %req_id, status=%resp.status(), headers=?hdrs);
        }
        Ok(resp)
    }

    /// GET `url`, following redirects until a 2xx response.
    ///
    /// Every distinct redirect target counts once against `limit`; a target
    /// seen before (including the starting URL) is a loop. Non-2xx,
    /// non-redirect statuses are returned as [`HttpError::Status`].
    pub async fn get_following_redirects(
        &self,
        url: &Url,
        limit: usize,
    ) -> Result<Response, HttpError> {
        let mut chain = RedirectChain::new(url.clone(), limit);
        let mut current = url.clone();

        loop {
            let resp = self.get(&current).await?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }
            if !is_redirect(status) {
                tracing::debug!(url=%current, %status, "http.status.rejected");
                return Err(HttpError::Status(status));
            }

            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(HttpError::MissingLocation { status })?;
            let target = resolve_location(&current, location)?;
            // Redirect bodies are never read; release the connection now.
            drop(resp);

            chain.record(&target)?;
            tracing::debug!(
                from=%current,
                to=%target,
                %status,
                hop=chain.len(),
                limit,
                "http.redirect"
            );
            current = target;
        }
    }
}

fn build_headers(cfg: &FetchConfig) -> Result<HeaderMap, HttpError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &cfg.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::Build(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::Build(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }
    let agent = HeaderValue::from_str(cfg.user_agent.trim())
        .map_err(|e| HttpError::Build(format!("invalid user agent: {e}")))?;
    headers.insert(USER_AGENT, agent);
    headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
    Ok(headers)
}
